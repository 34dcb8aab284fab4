//! Session store.
//!
//! Owns the authentication state, keeps it in step with the durable
//! key-value store and pushes the credential to the HTTP transport.
//!
//! The token and user record are always written and cleared as a pair. A
//! persisted pair that cannot be restored in full is treated as corrupt:
//! it is wiped and the store settles on [`AuthState::Anonymous`].

mod error;
mod state;

pub use error::SessionError;
pub use state::{AuthState, Session};

use std::sync::Arc;

use emporium_core::{Email, RoleSet, UserRecord};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::api::{AuthApi, CredentialSink, Credentials, NewAccount};
use crate::error::{clear_sentry_user, set_sentry_user};
use crate::storage::KeyValueStore;

/// Storage keys for session data.
pub mod keys {
    /// Bearer token.
    pub const TOKEN: &str = "auth_token";
    /// JSON-encoded user record.
    pub const USER: &str = "auth_user";
}

/// Placeholder some writers persist instead of a missing value.
const UNDEFINED: &str = "undefined";

/// Signup form input.
#[derive(Debug, Clone)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password: SecretString,
    pub confirm_password: SecretString,
}

/// Process-wide authentication state.
pub struct SessionStore {
    state: watch::Sender<AuthState>,
    auth: Arc<dyn AuthApi>,
    storage: Arc<dyn KeyValueStore>,
    credentials: Arc<dyn CredentialSink>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Create a store in the [`AuthState::Initializing`] state.
    #[must_use]
    pub fn new(
        auth: Arc<dyn AuthApi>,
        storage: Arc<dyn KeyValueStore>,
        credentials: Arc<dyn CredentialSink>,
    ) -> Self {
        Self {
            state: watch::Sender::new(AuthState::Initializing),
            auth,
            storage,
            credentials,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Restore the persisted session, if any.
    ///
    /// Runs once; later calls return the current state untouched. Corrupt
    /// or partial persisted data is cleared and logged, never returned.
    #[instrument(skip(self))]
    pub fn initialize(&self) -> AuthState {
        if !self.state.borrow().is_initializing() {
            return self.state();
        }

        match self.restore() {
            Some(session) => {
                self.credentials.set_credential(session.token());
                set_sentry_user(&session.user().id, Some(session.user().email.as_str()));
                info!(user_id = %session.user().id, "Session restored");
                self.state.send_replace(AuthState::Authenticated(session));
            }
            None => {
                self.wipe_persisted();
                self.credentials.clear_credential();
                self.state.send_replace(AuthState::Anonymous);
            }
        }

        self.state()
    }

    /// Read the persisted pair. `None` means there is nothing usable.
    fn restore(&self) -> Option<Session> {
        let read = |key: &str| match self.storage.get(key) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(error = %e, key, "Failed to read persisted session");
                Err(())
            }
        };
        let token = read(keys::TOKEN).ok()?;
        let user = read(keys::USER).ok()?;

        let (token, user) = match (token, user) {
            (None, None) => return None,
            (Some(token), Some(user)) => (token, user),
            _ => {
                warn!("Persisted session is incomplete, clearing it");
                return None;
            }
        };

        if token.trim().is_empty() || token == UNDEFINED {
            warn!("Persisted session token is empty, clearing session");
            return None;
        }
        if user == UNDEFINED {
            warn!("Persisted user record is undefined, clearing session");
            return None;
        }
        let user: UserRecord = match serde_json::from_str(&user) {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Persisted user record is corrupt, clearing session");
                return None;
            }
        };

        Some(Session::new(SecretString::from(token), user))
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Sign in with email and password.
    ///
    /// On any failure the in-memory state and persisted data are left as
    /// they were.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidEmail` before any network call if the
    /// email is malformed, `SessionError::InvalidCredentials` if the auth
    /// service rejects the credentials, `SessionError::ContractViolation`
    /// if the reply lacks a token or user, `SessionError::Api` for other
    /// remote failures and `SessionError::Storage` if persisting fails.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: SecretString) -> Result<Session, SessionError> {
        let credentials = Credentials {
            email: Email::parse(email)?,
            password,
        };

        let response = self.auth.login(&credentials).await.map_err(|e| {
            if e.is_unauthorized() {
                SessionError::InvalidCredentials
            } else {
                SessionError::Api(e)
            }
        })?;

        let token = response
            .token
            .filter(|t| !t.trim().is_empty())
            .ok_or(SessionError::ContractViolation("login reply has no token"))?;
        let user = response
            .user
            .ok_or(SessionError::ContractViolation("login reply has no user"))?;

        self.persist(&token, &user)?;

        let session = Session::new(SecretString::from(token), user);
        // The credential must be in place before subscribers see the new
        // state, so their first request is authenticated.
        self.credentials.set_credential(session.token());
        set_sentry_user(&session.user().id, Some(session.user().email.as_str()));
        self.state
            .send_replace(AuthState::Authenticated(session.clone()));

        info!(user_id = %session.user().id, "User logged in");
        Ok(session)
    }

    /// Register a new account. Does not sign in.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::PasswordMismatch`, `SessionError::MissingUsername`
    /// or `SessionError::InvalidEmail` for invalid input (no network call),
    /// and `SessionError::SignupRejected` if the auth service refuses it.
    #[instrument(skip(self, form), fields(email = %form.email))]
    pub async fn signup(&self, form: SignupForm) -> Result<(), SessionError> {
        if form.password.expose_secret() != form.confirm_password.expose_secret() {
            return Err(SessionError::PasswordMismatch);
        }
        let username = form.username.trim();
        if username.is_empty() {
            return Err(SessionError::MissingUsername);
        }
        let account = NewAccount {
            username: username.to_owned(),
            email: Email::parse(&form.email)?,
            password: form.password,
        };

        self.auth
            .signup(&account)
            .await
            .map_err(SessionError::SignupRejected)?;
        info!("Account created");
        Ok(())
    }

    /// Sign out. Idempotent and infallible.
    #[instrument(skip(self))]
    pub fn logout(&self) {
        self.credentials.clear_credential();
        self.wipe_persisted();
        clear_sentry_user();

        let was_authenticated = self.state.send_if_modified(|state| {
            let changed = !matches!(state, AuthState::Anonymous);
            *state = AuthState::Anonymous;
            changed
        });
        if was_authenticated {
            info!("User logged out");
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write token and user as a pair. If the second write fails the first
    /// is rolled back to its previous value.
    fn persist(&self, token: &str, user: &UserRecord) -> Result<(), SessionError> {
        let user_json = serde_json::to_string(user)?;
        let previous_token = self.storage.get(keys::TOKEN)?;

        self.storage.set(keys::TOKEN, token)?;
        if let Err(e) = self.storage.set(keys::USER, &user_json) {
            let restored = match previous_token {
                Some(previous) => self.storage.set(keys::TOKEN, &previous),
                None => self.storage.remove(keys::TOKEN),
            };
            if let Err(restore_err) = restored {
                warn!(error = %restore_err, "Failed to restore previous session token");
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn wipe_persisted(&self) {
        for key in [keys::TOKEN, keys::USER] {
            if let Err(e) = self.storage.remove(key) {
                warn!(error = %e, key, "Failed to clear persisted session");
            }
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Watch the state. The receiver sees every transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// The signed-in user.
    #[must_use]
    pub fn current_user(&self) -> Option<UserRecord> {
        self.state.borrow().user().cloned()
    }

    /// Roles of the signed-in user; empty when signed out.
    #[must_use]
    pub fn roles(&self) -> RoleSet {
        self.state.borrow().roles()
    }

    /// Name to greet the user with.
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        self.state
            .borrow()
            .user()
            .map(|u| u.display_name().to_owned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::{FileStore, MemoryStore};
    use crate::test_support::{AuthReply, FakeAuth, FlakyStore, RecordingSink, user};

    struct Harness<S> {
        store: SessionStore,
        auth: Arc<FakeAuth>,
        storage: Arc<S>,
        sink: Arc<RecordingSink>,
    }

    fn harness_with<S: KeyValueStore + 'static>(auth: FakeAuth, storage: S) -> Harness<S> {
        let auth = Arc::new(auth);
        let storage = Arc::new(storage);
        let sink = Arc::new(RecordingSink::default());
        let store = SessionStore::new(auth.clone(), storage.clone(), sink.clone());
        Harness {
            store,
            auth,
            storage,
            sink,
        }
    }

    fn harness(auth: FakeAuth) -> Harness<MemoryStore> {
        harness_with(auth, MemoryStore::new())
    }

    fn admin_reply() -> FakeAuth {
        FakeAuth::replying(Some("tok-1"), Some(user("1", &["ROLE_ADMIN"])))
    }

    fn persisted<S: KeyValueStore>(h: &Harness<S>) -> (Option<String>, Option<String>) {
        (
            h.storage.get(keys::TOKEN).unwrap(),
            h.storage.get(keys::USER).unwrap(),
        )
    }

    // =========================================================================
    // initialize
    // =========================================================================

    #[test]
    fn test_initialize_without_persisted_data_is_anonymous() {
        let h = harness(admin_reply());
        assert!(h.store.state().is_initializing());
        assert_eq!(h.store.initialize(), AuthState::Anonymous);
        assert!(!h.store.is_authenticated());
    }

    #[test]
    fn test_initialize_restores_valid_pair() {
        let h = harness(admin_reply());
        let record = user("5", &["ROLE_MANAGER"]);
        h.storage.set(keys::TOKEN, "persisted").unwrap();
        h.storage
            .set(keys::USER, &serde_json::to_string(&record).unwrap())
            .unwrap();

        let state = h.store.initialize();
        assert!(state.is_authenticated());
        assert_eq!(h.store.current_user(), Some(record));
        assert_eq!(h.sink.current().as_deref(), Some("persisted"));
    }

    #[test]
    fn test_initialize_self_heals_undefined_user() {
        let h = harness(admin_reply());
        h.storage.set(keys::TOKEN, "abc").unwrap();
        h.storage.set(keys::USER, "undefined").unwrap();

        assert_eq!(h.store.initialize(), AuthState::Anonymous);
        assert_eq!(persisted(&h), (None, None));
        assert_eq!(h.sink.current(), None);
    }

    #[test]
    fn test_initialize_self_heals_unparsable_user() {
        let h = harness(admin_reply());
        h.storage.set(keys::TOKEN, "abc").unwrap();
        h.storage.set(keys::USER, "{not json").unwrap();

        assert_eq!(h.store.initialize(), AuthState::Anonymous);
        assert_eq!(persisted(&h), (None, None));
    }

    #[test]
    fn test_initialize_clears_half_pair() {
        let h = harness(admin_reply());
        h.storage.set(keys::TOKEN, "abc").unwrap();

        assert_eq!(h.store.initialize(), AuthState::Anonymous);
        assert_eq!(persisted(&h), (None, None));
    }

    #[test]
    fn test_initialize_rejects_empty_token() {
        let h = harness(admin_reply());
        h.storage.set(keys::TOKEN, "").unwrap();
        h.storage
            .set(keys::USER, &serde_json::to_string(&user("1", &[])).unwrap())
            .unwrap();

        assert_eq!(h.store.initialize(), AuthState::Anonymous);
        assert_eq!(persisted(&h), (None, None));
    }

    #[test]
    fn test_initialize_read_error_is_anonymous() {
        let h = harness_with(admin_reply(), FlakyStore::default());
        h.storage
            .fail_reads
            .store(true, std::sync::atomic::Ordering::SeqCst);

        assert_eq!(h.store.initialize(), AuthState::Anonymous);
    }

    #[tokio::test]
    async fn test_corrupt_session_file_is_cleared_and_login_works() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();
        let h = harness_with(admin_reply(), FileStore::new(&path));

        assert_eq!(h.store.initialize(), AuthState::Anonymous);
        assert_eq!(persisted(&h), (None, None));

        h.store
            .login("user1@example.com", SecretString::from("pw"))
            .await
            .unwrap();
        assert!(h.store.is_authenticated());

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get(keys::TOKEN).unwrap().as_deref(), Some("tok-1"));
    }

    #[test]
    fn test_initialize_runs_once() {
        let h = harness(admin_reply());
        h.store.initialize();
        h.storage.set(keys::TOKEN, "late").unwrap();
        h.storage
            .set(keys::USER, &serde_json::to_string(&user("1", &[])).unwrap())
            .unwrap();

        assert_eq!(h.store.initialize(), AuthState::Anonymous);
    }

    // =========================================================================
    // login
    // =========================================================================

    #[tokio::test]
    async fn test_login_persists_pair_and_sets_credential() {
        let h = harness(admin_reply());
        h.store.initialize();

        let session = h
            .store
            .login("user1@example.com", SecretString::from("pw"))
            .await
            .unwrap();

        assert_eq!(session.user().id.as_str(), "1");
        assert!(h.store.is_authenticated());
        assert!(h.store.roles().contains(&emporium_core::RoleTag::Admin));
        assert_eq!(h.store.display_name().as_deref(), Some("user1"));
        assert_eq!(h.sink.current().as_deref(), Some("tok-1"));

        let (token, user_json) = persisted(&h);
        assert_eq!(token.as_deref(), Some("tok-1"));
        let restored: UserRecord = serde_json::from_str(&user_json.unwrap()).unwrap();
        assert_eq!(&restored, session.user());
    }

    #[tokio::test]
    async fn test_login_rejects_malformed_email_without_network() {
        let h = harness(admin_reply());
        h.store.initialize();

        let err = h
            .store
            .login("not-an-email", SecretString::from("pw"))
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::InvalidEmail(_)));
        assert_eq!(h.auth.calls(), 0);
    }

    #[tokio::test]
    async fn test_login_missing_token_is_contract_violation() {
        let h = harness(FakeAuth::replying(None, Some(user("1", &[]))));
        h.store.initialize();

        let err = h
            .store
            .login("user1@example.com", SecretString::from("pw"))
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::ContractViolation(_)));
        assert!(!h.store.is_authenticated());
        assert_eq!(persisted(&h), (None, None));
        assert_eq!(h.sink.current(), None);
    }

    #[tokio::test]
    async fn test_login_missing_user_is_contract_violation() {
        let h = harness(FakeAuth::replying(Some("tok"), None));
        h.store.initialize();

        let err = h
            .store
            .login("user1@example.com", SecretString::from("pw"))
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::ContractViolation(_)));
        assert_eq!(persisted(&h), (None, None));
    }

    #[tokio::test]
    async fn test_login_unauthorized_is_invalid_credentials() {
        let h = harness(FakeAuth::with_reply(AuthReply::Status(401)));
        h.store.initialize();

        let err = h
            .store
            .login("user1@example.com", SecretString::from("wrong"))
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::InvalidCredentials));
        assert_eq!(h.store.state(), AuthState::Anonymous);
    }

    #[tokio::test]
    async fn test_login_server_error_is_api_error() {
        let h = harness(FakeAuth::with_reply(AuthReply::Status(500)));
        h.store.initialize();

        let err = h
            .store
            .login("user1@example.com", SecretString::from("pw"))
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Api(_)));
    }

    #[tokio::test]
    async fn test_login_failed_user_write_restores_previous_pair() {
        let h = harness_with(admin_reply(), FlakyStore::default());
        h.store.initialize();
        h.store
            .login("user1@example.com", SecretString::from("pw"))
            .await
            .unwrap();
        let before = persisted(&h);
        let state_before = h.store.state();

        h.auth.set_reply(AuthReply::Ok(crate::api::LoginResponse {
            token: Some("tok-2".to_string()),
            user: Some(user("2", &[])),
        }));
        h.storage.fail_set_of(keys::USER);

        let err = h
            .store
            .login("user2@example.com", SecretString::from("pw"))
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Storage(_)));
        assert_eq!(persisted(&h), before);
        assert_eq!(h.store.state(), state_before);
        assert_eq!(h.sink.current().as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn test_login_failed_first_write_leaves_nothing() {
        let h = harness_with(admin_reply(), FlakyStore::default());
        h.store.initialize();
        h.storage.fail_set_of(keys::TOKEN);

        let err = h
            .store
            .login("user1@example.com", SecretString::from("pw"))
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Storage(_)));
        assert_eq!(persisted(&h), (None, None));
        assert!(!h.store.is_authenticated());
    }

    // =========================================================================
    // logout / signup
    // =========================================================================

    #[tokio::test]
    async fn test_logout_clears_everything_and_is_idempotent() {
        let h = harness(admin_reply());
        h.store.initialize();
        h.store
            .login("user1@example.com", SecretString::from("pw"))
            .await
            .unwrap();
        let mut rx = h.store.subscribe();
        rx.mark_unchanged();

        h.store.logout();
        assert_eq!(h.store.state(), AuthState::Anonymous);
        assert_eq!(persisted(&h), (None, None));
        assert_eq!(h.sink.current(), None);
        assert!(h.store.roles().is_empty());
        assert!(rx.has_changed().unwrap());

        rx.mark_unchanged();
        h.store.logout();
        assert!(!rx.has_changed().unwrap());
        assert_eq!(h.store.state(), AuthState::Anonymous);
    }

    #[tokio::test]
    async fn test_restart_round_trip() {
        let storage = Arc::new(MemoryStore::new());
        let first = SessionStore::new(
            Arc::new(admin_reply()),
            storage.clone(),
            Arc::new(RecordingSink::default()),
        );
        first.initialize();
        let session = first
            .login("user1@example.com", SecretString::from("pw"))
            .await
            .unwrap();

        let second = SessionStore::new(
            Arc::new(admin_reply()),
            storage,
            Arc::new(RecordingSink::default()),
        );
        assert_eq!(second.initialize(), AuthState::Authenticated(session));
    }

    fn signup_form(password: &str, confirm: &str, username: &str) -> SignupForm {
        SignupForm {
            username: username.to_string(),
            email: "new@example.com".to_string(),
            password: SecretString::from(password),
            confirm_password: SecretString::from(confirm),
        }
    }

    #[tokio::test]
    async fn test_signup_validates_before_calling_service() {
        let h = harness(admin_reply());

        let err = h
            .store
            .signup(signup_form("pw1", "pw2", "sam"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::PasswordMismatch));

        let err = h
            .store
            .signup(signup_form("pw", "pw", "  "))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::MissingUsername));

        assert!(h.auth.signups.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_signup_does_not_log_in() {
        let h = harness(admin_reply());
        h.store.initialize();

        h.store
            .signup(signup_form("pw", "pw", " sam "))
            .await
            .unwrap();

        let signups = h.auth.signups.lock().unwrap();
        assert_eq!(signups.len(), 1);
        assert_eq!(signups.first().unwrap().username, "sam");
        assert!(!h.store.is_authenticated());
    }
}
