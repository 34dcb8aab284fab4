//! Remote services.
//!
//! Each backend service is a trait so the stores can be driven by an
//! in-process fake; the `Http*` types implement them over [`HttpTransport`].

mod auth;
mod cart;
mod catalog;
mod transport;
mod users;

pub use auth::{AuthApi, Credentials, HttpAuthApi, LoginResponse, NewAccount};
pub use cart::{CartApi, HttpCartApi};
pub use catalog::{ALL_CATEGORIES, CatalogApi, HttpCatalogApi};
pub use transport::HttpTransport;
pub use users::{HttpUserAdminApi, UserAdminApi};

use secrecy::SecretString;
use thiserror::Error;

/// Errors returned by the remote services.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be sent or the response not read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Status { status: u16, message: String },

    /// The response body was not the expected JSON.
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// A request URL could not be built.
    #[error("Invalid request URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiError {
    /// HTTP status of a rejected request, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the service rejected the caller's credentials.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    /// Whether the failure is on the server side (5xx).
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(500..=599))
    }
}

/// Receiver of the session credential.
///
/// The session store pushes the token here on login/restore and clears it
/// on logout, so every outgoing call carries the current credential.
pub trait CredentialSink: Send + Sync {
    /// Attach `token` to subsequent requests.
    fn set_credential(&self, token: &SecretString);

    /// Stop sending a credential.
    fn clear_credential(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let unauthorized = ApiError::Status {
            status: 401,
            message: String::new(),
        };
        assert!(unauthorized.is_unauthorized());
        assert!(!unauthorized.is_server_error());

        let forbidden = ApiError::Status {
            status: 403,
            message: String::new(),
        };
        assert!(forbidden.is_unauthorized());

        let unavailable = ApiError::Status {
            status: 503,
            message: "down".to_string(),
        };
        assert!(unavailable.is_server_error());
        assert_eq!(unavailable.to_string(), "API error: 503 - down");
    }
}
