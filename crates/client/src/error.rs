//! Unified error handling with Sentry integration.
//!
//! Every fallible operation returns its module's error type; [`ClientError`]
//! gathers them for the UI, which shows [`ClientError::user_message`] inline
//! and calls [`ClientError::report`] so collaborator failures reach Sentry.

use thiserror::Error;

use crate::admin::AdminError;
use crate::api::ApiError;
use crate::cart::CartError;
use crate::config::ConfigError;
use crate::session::SessionError;
use crate::storage::StorageError;

/// Client-level error type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// A remote call outside the stores (catalog reads) failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Local storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Session operation failed.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Management console operation failed.
    #[error("Admin error: {0}")]
    Admin(#[from] AdminError),
}

/// Result type alias for `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Whether a remote failure is the collaborator's fault rather than the
/// user's or the network's.
const fn is_collaborator_failure(err: &ApiError) -> bool {
    match err {
        ApiError::Status { status, .. } => *status >= 500,
        ApiError::Decode(_) | ApiError::Url(_) => true,
        ApiError::Http(_) => false,
    }
}

impl ClientError {
    /// Whether this error should be sent to Sentry.
    #[must_use]
    pub const fn is_reportable(&self) -> bool {
        match self {
            Self::Config(_) | Self::Storage(_) => true,
            Self::Api(err) => is_collaborator_failure(err),
            Self::Session(err) => match err {
                SessionError::ContractViolation(_)
                | SessionError::Storage(_)
                | SessionError::Encode(_) => true,
                SessionError::Api(api) | SessionError::SignupRejected(api) => {
                    is_collaborator_failure(api)
                }
                SessionError::InvalidEmail(_)
                | SessionError::PasswordMismatch
                | SessionError::MissingUsername
                | SessionError::InvalidCredentials => false,
            },
            Self::Cart(err) => match err {
                CartError::Api(api) | CartError::Checkout(api) => is_collaborator_failure(api),
                CartError::NotAuthenticated
                | CartError::InvalidQuantity
                | CartError::LineNotFound(_) => false,
            },
            Self::Admin(err) => match err {
                AdminError::Api(api) => is_collaborator_failure(api),
                AdminError::NotAuthenticated
                | AdminError::Forbidden(_)
                | AdminError::InvalidEmail(_)
                | AdminError::MissingField(_) => false,
            },
        }
    }

    /// Capture collaborator failures to Sentry. User errors are only logged
    /// at debug level.
    pub fn report(&self) {
        if self.is_reportable() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Client error"
            );
        } else {
            tracing::debug!(error = %self, "User-facing error");
        }
    }

    /// Message to show inline. Never exposes internal details.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Config(_) => "The storefront is not configured correctly.",
            Self::Api(_) => "Failed to load products. Please try again.",
            Self::Storage(_) => "Could not access local storage.",
            Self::Session(err) => match err {
                SessionError::InvalidEmail(_) => "Please enter a valid email address.",
                SessionError::PasswordMismatch => "Passwords do not match.",
                SessionError::MissingUsername => "Please choose a username.",
                SessionError::InvalidCredentials
                | SessionError::ContractViolation(_)
                | SessionError::Api(_) => "Login failed. Please check your credentials.",
                SessionError::SignupRejected(_) => "Signup failed. Please try again.",
                SessionError::Storage(_) | SessionError::Encode(_) => {
                    "Could not save your session. Please try again."
                }
            },
            Self::Cart(err) => match err {
                CartError::NotAuthenticated => "Please log in to continue.",
                CartError::InvalidQuantity => "Quantity must be at least 1.",
                CartError::LineNotFound(_) => "That item is no longer in your cart.",
                CartError::Api(_) => "Could not update your cart. Please try again.",
                CartError::Checkout(_) => "Failed to start checkout. Please try again.",
            },
            Self::Admin(err) => match err {
                AdminError::NotAuthenticated => "Please log in to continue.",
                AdminError::Forbidden(_) => "You do not have permission to do that.",
                AdminError::InvalidEmail(_) => "Please enter a valid email address.",
                AdminError::MissingField(_) => "Please fill in all required fields.",
                AdminError::Api(_) => "The request failed. Please try again.",
            },
        }
    }
}

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added to cart", Some(&[("product_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
