//! Cart store.
//!
//! Local view of the signed-in user's cart. Mutations are optimistic: the
//! local lines change immediately and are reconciled with the cart service
//! afterwards, with rollback on failure. The store follows the session: it
//! empties itself on sign-out and reloads on sign-in.

mod checkout;
mod error;
mod optimistic;

pub use checkout::CheckoutOutcome;
pub use error::CartError;
pub use optimistic::Rollback;

use std::sync::Arc;

use emporium_core::{CartLines, Price, Product, ProductId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use crate::api::CartApi;
use crate::error::add_breadcrumb;
use crate::session::AuthState;

/// Observable cart state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartState {
    lines: CartLines,
    /// Bumped on every change to `lines`.
    revision: u64,
    /// Bumped when a load starts or the cart is reset.
    load_epoch: u64,
    loading: bool,
    /// Mutations applied locally whose remote call has not resolved.
    pending: usize,
}

impl CartState {
    #[must_use]
    pub const fn lines(&self) -> &CartLines {
        &self.lines
    }

    /// Whether a load is in flight.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    /// Counter that moves whenever the lines change.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Total units in the cart.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.lines.count()
    }

    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.lines.subtotal()
    }
}

/// How a fetched cart was handled.
enum LoadOutcome {
    Applied,
    /// Another load or a reset started meanwhile.
    Stale,
    /// A mutation landed or is in flight; the result may predate it.
    Outdated,
}

/// Process-wide cart.
pub struct CartStore {
    state: watch::Sender<CartState>,
    session: watch::Receiver<AuthState>,
    api: Arc<dyn CartApi>,
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl CartStore {
    /// Create an empty cart following `session`.
    #[must_use]
    pub fn new(api: Arc<dyn CartApi>, session: watch::Receiver<AuthState>) -> Self {
        Self {
            state: watch::Sender::new(CartState::default()),
            session,
            api,
        }
    }

    fn is_authenticated(&self) -> bool {
        self.session.borrow().is_authenticated()
    }

    fn require_session(&self) -> Result<(), CartError> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(CartError::NotAuthenticated)
        }
    }

    // =========================================================================
    // Session Sync
    // =========================================================================

    /// Keep the cart in step with the session.
    ///
    /// Loads whenever a session is established (or the principal changes)
    /// and resets on sign-out. Load failures are logged.
    pub fn spawn_session_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let mut session = self.session.clone();

        tokio::spawn(async move {
            let mut last = AuthState::Initializing;
            loop {
                let current = session.borrow_and_update().clone();
                if current != last {
                    store.follow(&current);
                    last = current;
                }
                if session.changed().await.is_err() {
                    debug!("Session store dropped, stopping cart sync");
                    break;
                }
            }
        })
    }

    fn follow(self: &Arc<Self>, state: &AuthState) {
        match state {
            AuthState::Initializing => {}
            AuthState::Anonymous => self.reset(),
            AuthState::Authenticated(_) => {
                // Loads run detached so a sign-out arriving mid-load resets
                // the cart right away and the load result is discarded.
                let store = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(e) = store.load().await {
                        error!("Failed to load cart: {e}");
                    }
                });
            }
        }
    }

    /// Empty the cart locally and invalidate any in-flight load.
    pub fn reset(&self) {
        self.state.send_if_modified(|state| {
            state.load_epoch += 1;
            let was_loading = std::mem::replace(&mut state.loading, false);
            if state.lines.is_empty() {
                return was_loading;
            }
            state.lines.clear();
            state.revision += 1;
            true
        });
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Replace local lines with the authoritative cart.
    ///
    /// Without a session this resets the cart and succeeds. A fetch only
    /// starts once no mutation is in flight, and its result is fetched
    /// again if a mutation landed meanwhile. A result is dropped if another
    /// load or a reset started while it was in flight.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Api` if the cart cannot be fetched.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<(), CartError> {
        if !self.is_authenticated() {
            self.reset();
            return Ok(());
        }

        let mut epoch = 0;
        self.state.send_modify(|state| {
            state.load_epoch += 1;
            state.loading = true;
            epoch = state.load_epoch;
        });
        let mut updates = self.state.subscribe();

        loop {
            let current = updates
                .wait_for(|state| state.pending == 0 || state.load_epoch != epoch)
                .await
                .is_ok_and(|state| state.load_epoch == epoch);
            if !current {
                debug!("Cart load superseded before fetching");
                return Ok(());
            }

            let revision = self.state.borrow().revision;
            let result = self.api.fetch_cart().await;
            let still_signed_in = self.is_authenticated();

            let mut outcome = LoadOutcome::Applied;
            self.state.send_if_modified(|state| {
                if state.load_epoch != epoch {
                    outcome = LoadOutcome::Stale;
                    return false;
                }
                if result.is_ok()
                    && still_signed_in
                    && (state.revision != revision || state.pending > 0)
                {
                    outcome = LoadOutcome::Outdated;
                    return false;
                }
                state.loading = false;
                if let (Ok(lines), true) = (&result, still_signed_in) {
                    let (fresh, dropped) = CartLines::from_remote(lines.iter().cloned());
                    if dropped > 0 {
                        debug!(dropped, "Ignoring zero-quantity lines from the cart service");
                    }
                    if fresh != state.lines {
                        state.lines = fresh;
                        state.revision += 1;
                    }
                }
                true
            });

            match outcome {
                LoadOutcome::Applied => return result.map(|_| ()).map_err(CartError::from),
                LoadOutcome::Stale => {
                    debug!("Discarding stale cart load");
                    return result.map(|_| ()).map_err(CartError::from);
                }
                LoadOutcome::Outdated => {
                    debug!("Cart changed while loading, fetching again");
                }
            }
        }
    }

    /// Add `quantity` units of `product`.
    ///
    /// The cart service is sent the delta. On failure the cart is reloaded.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotAuthenticated` without a session,
    /// `CartError::InvalidQuantity` for a zero quantity and
    /// `CartError::Api` if the cart service rejects the change.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn add_item(&self, product: &Product, quantity: u32) -> Result<(), CartError> {
        self.require_session()?;
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }

        let line = product.to_cart_line(quantity);
        self.mutate(
            Rollback::Reload,
            |lines| {
                lines.add(line)?;
                Ok(true)
            },
            self.api.increment(&product.id, quantity),
        )
        .await?;

        add_breadcrumb(
            "cart",
            "Added to cart",
            Some(&[("product_id", product.id.as_str())]),
        );
        info!(quantity, "Added to cart");
        Ok(())
    }

    /// Set the quantity of an existing line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotAuthenticated` without a session,
    /// `CartError::InvalidQuantity` for zero, `CartError::LineNotFound` if
    /// the product is not in the cart (no remote call is made in these
    /// cases) and `CartError::Api` if the cart service rejects the change.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn set_quantity(&self, product_id: &ProductId, quantity: u32) -> Result<(), CartError> {
        self.require_session()?;
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }

        self.mutate(
            Rollback::Reload,
            |lines| {
                lines.set_quantity(product_id, quantity)?;
                Ok(true)
            },
            self.api.set_quantity(product_id, quantity),
        )
        .await?;

        add_breadcrumb(
            "cart",
            "Updated cart quantity",
            Some(&[("product_id", product_id.as_str())]),
        );
        Ok(())
    }

    /// Remove a line. A line missing locally is still deleted remotely.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotAuthenticated` without a session and
    /// `CartError::Api` if the cart service rejects the removal, after the
    /// previous lines have been restored.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove_item(&self, product_id: &ProductId) -> Result<(), CartError> {
        self.require_session()?;

        self.mutate(
            Rollback::Snapshot,
            |lines| Ok(lines.remove(product_id).is_some()),
            self.api.remove(product_id),
        )
        .await?;

        add_breadcrumb(
            "cart",
            "Removed from cart",
            Some(&[("product_id", product_id.as_str())]),
        );
        Ok(())
    }

    /// Remove every line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotAuthenticated` without a session and
    /// `CartError::Api` if the cart service rejects the change, after the
    /// previous lines have been restored.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<(), CartError> {
        self.require_session()?;

        self.mutate(
            Rollback::Snapshot,
            |lines| {
                let changed = !lines.is_empty();
                lines.clear();
                Ok(changed)
            },
            self.api.clear(),
        )
        .await?;

        add_breadcrumb("cart", "Cleared cart", None);
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> CartState {
        self.state.borrow().clone()
    }

    /// Watch the cart.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn lines(&self) -> CartLines {
        self.state.borrow().lines.clone()
    }

    /// Total units in the cart.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.state.borrow().count()
    }

    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.state.borrow().subtotal()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.borrow().lines.is_empty()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }
}
