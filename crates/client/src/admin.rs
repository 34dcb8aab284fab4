//! Management console for managers and admins.
//!
//! Every operation checks the signed-in principal's capability before
//! touching the network.

use std::sync::Arc;

use emporium_core::{Capability, Email, ManagedUser, NewProduct, ProductId, UserId, UserRecord};
use secrecy::SecretString;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, instrument};

use crate::api::{ApiError, CatalogApi, NewAccount, UserAdminApi};
use crate::session::AuthState;

/// Errors from console operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// No one is signed in.
    #[error("not signed in")]
    NotAuthenticated,

    /// The principal lacks the capability.
    #[error("requires {0} access")]
    Forbidden(Capability),

    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] emporium_core::EmailError),

    /// A required form field is blank.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// The service rejected the operation.
    #[error("management service error: {0}")]
    Api(#[from] ApiError),
}

/// Action the console may offer on a listed user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Flag,
    Unflag,
    Delete,
}

impl UserAction {
    /// Capability needed to perform the action.
    #[must_use]
    pub const fn capability(self) -> Capability {
        match self {
            Self::Flag => Capability::ManagerOrAdmin,
            Self::Unflag | Self::Delete => Capability::AdminOnly,
        }
    }
}

/// Actions `principal` may take on `target`.
///
/// Flagging is only offered for unflagged users and clearing the flag only
/// for flagged ones.
#[must_use]
pub fn user_actions(principal: &UserRecord, target: &ManagedUser) -> Vec<UserAction> {
    let applicable = [
        (UserAction::Flag, !target.flagged),
        (UserAction::Unflag, target.flagged),
        (UserAction::Delete, true),
    ];
    applicable
        .into_iter()
        .filter(|(action, applies)| *applies && principal.can(action.capability()))
        .map(|(action, _)| action)
        .collect()
}

/// Manager registration form input.
#[derive(Debug, Clone)]
pub struct ManagerForm {
    pub username: String,
    pub email: String,
    pub password: SecretString,
}

/// Capability-checked product and user management.
pub struct AdminConsole {
    session: watch::Receiver<AuthState>,
    catalog: Arc<dyn CatalogApi>,
    users: Arc<dyn UserAdminApi>,
}

impl std::fmt::Debug for AdminConsole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConsole").finish_non_exhaustive()
    }
}

impl AdminConsole {
    #[must_use]
    pub fn new(
        session: watch::Receiver<AuthState>,
        catalog: Arc<dyn CatalogApi>,
        users: Arc<dyn UserAdminApi>,
    ) -> Self {
        Self {
            session,
            catalog,
            users,
        }
    }

    /// Check the signed-in principal against `capability`.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::NotAuthenticated` or `AdminError::Forbidden`.
    pub fn authorize(&self, capability: Capability) -> Result<(), AdminError> {
        let state = self.session.borrow();
        let user = state.user().ok_or(AdminError::NotAuthenticated)?;
        if user.can(capability) {
            Ok(())
        } else {
            Err(AdminError::Forbidden(capability))
        }
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns an authorization error, `AdminError::MissingField` for a
    /// blank name, or `AdminError::Api`.
    #[instrument(skip(self, product), fields(name = %product.name))]
    pub async fn add_product(&self, product: &NewProduct) -> Result<(), AdminError> {
        self.authorize(Capability::ManagerOrAdmin)?;
        if product.name.trim().is_empty() {
            return Err(AdminError::MissingField("name"));
        }
        self.catalog.add_product(product).await?;
        info!("Product created");
        Ok(())
    }

    /// Delete a product.
    ///
    /// # Errors
    ///
    /// Returns an authorization error or `AdminError::Api`.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete_product(&self, id: &ProductId) -> Result<(), AdminError> {
        self.authorize(Capability::AdminOnly)?;
        self.catalog.delete_product(id).await?;
        info!("Product deleted");
        Ok(())
    }

    /// Create a manager account.
    ///
    /// # Errors
    ///
    /// Returns an authorization error, a validation error or `AdminError::Api`.
    #[instrument(skip(self, form), fields(email = %form.email))]
    pub async fn register_manager(&self, form: ManagerForm) -> Result<(), AdminError> {
        self.authorize(Capability::AdminOnly)?;
        let username = form.username.trim();
        if username.is_empty() {
            return Err(AdminError::MissingField("username"));
        }
        let account = NewAccount {
            username: username.to_owned(),
            email: Email::parse(&form.email)?,
            password: form.password,
        };
        self.users.register_manager(&account).await?;
        info!("Manager account created");
        Ok(())
    }

    /// Every registered user.
    ///
    /// # Errors
    ///
    /// Returns an authorization error or `AdminError::Api`.
    #[instrument(skip(self))]
    pub async fn list_users(&self) -> Result<Vec<ManagedUser>, AdminError> {
        self.authorize(Capability::ManagerOrAdmin)?;
        Ok(self.users.list_users().await?)
    }

    /// Flag a user for admin review.
    ///
    /// # Errors
    ///
    /// Returns an authorization error or `AdminError::Api`.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn flag_user(&self, id: &UserId) -> Result<(), AdminError> {
        self.authorize(UserAction::Flag.capability())?;
        self.users.flag_user(id).await?;
        info!("User flagged");
        Ok(())
    }

    /// Clear a user's flag.
    ///
    /// # Errors
    ///
    /// Returns an authorization error or `AdminError::Api`.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn unflag_user(&self, id: &UserId) -> Result<(), AdminError> {
        self.authorize(UserAction::Unflag.capability())?;
        self.users.unflag_user(id).await?;
        info!("User unflagged");
        Ok(())
    }

    /// Delete a user account.
    ///
    /// # Errors
    ///
    /// Returns an authorization error or `AdminError::Api`.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn delete_user(&self, id: &UserId) -> Result<(), AdminError> {
        self.authorize(UserAction::Delete.capability())?;
        self.users.delete_user(id).await?;
        info!("User deleted");
        Ok(())
    }
}
