//! Session error types.

use thiserror::Error;

use crate::api::ApiError;
use crate::storage::StorageError;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] emporium_core::EmailError),

    /// Password and confirmation differ.
    #[error("passwords do not match")]
    PasswordMismatch,

    /// Signup without a username.
    #[error("username is required")]
    MissingUsername,

    /// The auth service rejected the credentials.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The auth service answered successfully but without the data the
    /// session needs.
    #[error("auth service contract violation: {0}")]
    ContractViolation(&'static str),

    /// Login call failed.
    #[error("auth service error: {0}")]
    Api(#[from] ApiError),

    /// The auth service refused the signup.
    #[error("signup rejected: {0}")]
    SignupRejected(#[source] ApiError),

    /// Persisting the session failed.
    #[error("session storage error: {0}")]
    Storage(#[from] StorageError),

    /// The user record could not be encoded for storage.
    #[error("failed to encode user record: {0}")]
    Encode(#[from] serde_json::Error),
}
