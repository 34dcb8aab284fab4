//! Application context shared across screens.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::admin::AdminConsole;
use crate::api::{
    ApiError, AuthApi, CartApi, CatalogApi, CredentialSink, HttpAuthApi, HttpCartApi,
    HttpCatalogApi, HttpTransport, HttpUserAdminApi, UserAdminApi,
};
use crate::cart::CartStore;
use crate::config::ClientConfig;
use crate::routes::{self, Navigation};
use crate::session::{AuthState, SessionStore};
use crate::storage::{FileStore, KeyValueStore};

/// Collaborators the context is assembled from.
///
/// [`AppContext::new`] builds the HTTP-backed set; tests and embedders
/// with their own backends use [`AppContext::from_parts`].
pub struct Collaborators {
    pub auth: Arc<dyn AuthApi>,
    pub cart: Arc<dyn CartApi>,
    pub catalog: Arc<dyn CatalogApi>,
    pub users: Arc<dyn UserAdminApi>,
    pub storage: Arc<dyn KeyValueStore>,
    pub credentials: Arc<dyn CredentialSink>,
}

/// Shared client state.
///
/// This struct is cheaply cloneable via `Arc` and gives every screen the
/// same session, cart and catalog.
#[derive(Clone)]
pub struct AppContext {
    inner: Arc<AppContextInner>,
}

struct AppContextInner {
    config: ClientConfig,
    session: SessionStore,
    cart: Arc<CartStore>,
    catalog: Arc<dyn CatalogApi>,
    admin: AdminConsole,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("api_base_url", &self.inner.config.api_base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Create a context talking to the configured backend.
    ///
    /// The session is persisted under `config.data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(config.api_base_url.clone())?;
        let parts = Collaborators {
            auth: Arc::new(HttpAuthApi::new(transport.clone())),
            cart: Arc::new(HttpCartApi::new(transport.clone())),
            catalog: Arc::new(HttpCatalogApi::new(
                transport.clone(),
                config.catalog_cache_ttl,
            )),
            users: Arc::new(HttpUserAdminApi::new(transport.clone())),
            storage: Arc::new(FileStore::new(config.session_file())),
            credentials: Arc::new(transport),
        };
        Ok(Self::from_parts(config, parts))
    }

    /// Create a context over the given collaborators.
    #[must_use]
    pub fn from_parts(config: ClientConfig, parts: Collaborators) -> Self {
        let session = SessionStore::new(parts.auth, parts.storage, parts.credentials);
        let cart = Arc::new(CartStore::new(parts.cart, session.subscribe()));
        let admin = AdminConsole::new(session.subscribe(), parts.catalog.clone(), parts.users);

        Self {
            inner: Arc::new(AppContextInner {
                config,
                session,
                cart,
                catalog: parts.catalog,
                admin,
            }),
        }
    }

    /// Restore the persisted session and start keeping the cart in step
    /// with it.
    ///
    /// Must be called from within a Tokio runtime. The returned handle
    /// runs until the context is dropped.
    pub fn start(&self) -> JoinHandle<()> {
        let sync = self.inner.cart.spawn_session_sync();
        let state = self.inner.session.initialize();
        tracing::info!(
            authenticated = state.is_authenticated(),
            "Client context started"
        );
        sync
    }

    /// Where navigating to `location` leads for the current session.
    #[must_use]
    pub fn navigate(&self, location: &str) -> Navigation {
        routes::resolve(location, &self.inner.session.state())
    }

    /// Where the header's checkout entry point leads.
    #[must_use]
    pub fn checkout_entry(&self) -> String {
        routes::checkout_entry(&self.inner.session.state())
    }

    /// Current session state.
    #[must_use]
    pub fn auth_state(&self) -> AuthState {
        self.inner.session.state()
    }

    /// Get a reference to the client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Get a reference to the session store.
    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    /// Get a reference to the cart store.
    #[must_use]
    pub fn cart(&self) -> &Arc<CartStore> {
        &self.inner.cart
    }

    /// Get a reference to the catalog API.
    #[must_use]
    pub fn catalog(&self) -> &Arc<dyn CatalogApi> {
        &self.inner.catalog
    }

    /// Get a reference to the management console.
    #[must_use]
    pub fn admin(&self) -> &AdminConsole {
        &self.inner.admin
    }
}
