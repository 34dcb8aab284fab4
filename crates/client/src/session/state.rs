//! Observable authentication state.

use emporium_core::{AccessTier, RoleSet, UserRecord};
use secrecy::{ExposeSecret, SecretString};

/// An authenticated session: the credential and the principal it belongs to.
#[derive(Debug, Clone)]
pub struct Session {
    token: SecretString,
    user: UserRecord,
}

impl Session {
    #[must_use]
    pub const fn new(token: SecretString, user: UserRecord) -> Self {
        Self { token, user }
    }

    /// The bearer credential.
    #[must_use]
    pub const fn token(&self) -> &SecretString {
        &self.token
    }

    /// The signed-in principal.
    #[must_use]
    pub const fn user(&self) -> &UserRecord {
        &self.user
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.user == other.user && self.token.expose_secret() == other.token.expose_secret()
    }
}

impl Eq for Session {}

/// Authentication state as seen by the rest of the client.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    /// Persisted state has not been read yet.
    #[default]
    Initializing,
    /// No session.
    Anonymous,
    /// Signed in.
    Authenticated(Session),
}

impl AuthState {
    /// Whether a session token is held.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    #[must_use]
    pub const fn is_initializing(&self) -> bool {
        matches!(self, Self::Initializing)
    }

    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) => Some(session),
            Self::Initializing | Self::Anonymous => None,
        }
    }

    #[must_use]
    pub fn user(&self) -> Option<&UserRecord> {
        self.session().map(Session::user)
    }

    /// Roles of the signed-in principal; empty when signed out.
    #[must_use]
    pub fn roles(&self) -> RoleSet {
        self.user().map(|u| u.roles.clone()).unwrap_or_default()
    }

    /// Access tier of the signed-in principal.
    #[must_use]
    pub fn tier(&self) -> Option<AccessTier> {
        self.user().map(UserRecord::tier)
    }
}
