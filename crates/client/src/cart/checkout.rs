//! Placing an order.

use tracing::{info, instrument};

use super::{CartError, CartStore};
use crate::error::add_breadcrumb;
use crate::routes::{CHECKOUT, HOME, login_location};

/// Result of a checkout attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// Not signed in; navigate to `location` (the login page, returning to
    /// checkout).
    LoginRequired { location: String },
    /// Nothing to buy.
    EmptyCart,
    /// Hand off to the payment provider. The cart is left as is.
    Redirect(String),
    /// The order was placed and the cart emptied; navigate to `location`.
    Completed { location: String },
}

impl CheckoutOutcome {
    /// Inline message for outcomes that stay on the checkout page.
    #[must_use]
    pub const fn message(&self) -> Option<&'static str> {
        match self {
            Self::EmptyCart => Some("Your cart is empty."),
            _ => None,
        }
    }
}

impl CartStore {
    /// Start checkout for the current cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Checkout` if the checkout call fails and
    /// `CartError::Api` if the order went through but the cart could not be
    /// cleared afterwards.
    #[instrument(skip(self))]
    pub async fn checkout(&self) -> Result<CheckoutOutcome, CartError> {
        if !self.is_authenticated() {
            return Ok(CheckoutOutcome::LoginRequired {
                location: login_location(CHECKOUT),
            });
        }
        if self.is_empty() {
            return Ok(CheckoutOutcome::EmptyCart);
        }

        add_breadcrumb("checkout", "Started checkout", None);
        let redirect = self
            .api
            .start_checkout()
            .await
            .map_err(CartError::Checkout)?;
        if let Some(url) = redirect {
            info!("Checkout handed off to payment provider");
            return Ok(CheckoutOutcome::Redirect(url));
        }

        self.clear().await?;
        info!("Order placed");
        Ok(CheckoutOutcome::Completed {
            location: HOME.to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use secrecy::SecretString;

    use super::*;
    use crate::session::SessionStore;
    use crate::storage::MemoryStore;
    use crate::test_support::{CartCall, FakeAuth, FakeCart, Op, RecordingSink, line, user};

    async fn setup(server: Vec<emporium_core::CartLine>, sign_in: bool) -> (CartStore, Arc<FakeCart>) {
        let session = SessionStore::new(
            Arc::new(FakeAuth::replying(Some("tok"), Some(user("1", &[])))),
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingSink::default()),
        );
        session.initialize();
        if sign_in {
            session
                .login("user1@example.com", SecretString::from("pw"))
                .await
                .unwrap();
        }
        let remote = Arc::new(FakeCart::with_lines(server));
        let cart = CartStore::new(remote.clone(), session.subscribe());
        cart.load().await.unwrap();
        (cart, remote)
    }

    #[tokio::test]
    async fn test_checkout_requires_login() {
        let (cart, remote) = setup(vec![line("p1", 10, 1)], false).await;

        let outcome = cart.checkout().await.unwrap();

        assert_eq!(
            outcome,
            CheckoutOutcome::LoginRequired {
                location: "/login?redirect=%2Fcheckout".to_string()
            }
        );
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_empty_cart() {
        let (cart, remote) = setup(Vec::new(), true).await;

        let outcome = cart.checkout().await.unwrap();

        assert_eq!(outcome, CheckoutOutcome::EmptyCart);
        assert_eq!(outcome.message(), Some("Your cart is empty."));
        assert!(remote.mutation_calls().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_redirect_keeps_cart() {
        let (cart, remote) = setup(vec![line("p1", 10, 1)], true).await;
        remote.redirect_checkout_to("https://pay.example/session/9");

        let outcome = cart.checkout().await.unwrap();

        assert_eq!(
            outcome,
            CheckoutOutcome::Redirect("https://pay.example/session/9".to_string())
        );
        assert_eq!(cart.count(), 1);
    }

    #[tokio::test]
    async fn test_checkout_without_redirect_clears_cart() {
        let (cart, remote) = setup(vec![line("p1", 10, 2)], true).await;

        let outcome = cart.checkout().await.unwrap();

        assert_eq!(
            outcome,
            CheckoutOutcome::Completed {
                location: "/".to_string()
            }
        );
        assert!(cart.is_empty());
        assert_eq!(remote.mutation_calls(), vec![CartCall::Checkout, CartCall::Clear]);
    }

    #[tokio::test]
    async fn test_checkout_failure_is_surfaced() {
        let (cart, remote) = setup(vec![line("p1", 10, 2)], true).await;
        remote.fail(Op::Checkout, 500);

        assert!(matches!(cart.checkout().await, Err(CartError::Checkout(_))));
        assert_eq!(cart.count(), 2);
    }
}
