//! User management service client.

use async_trait::async_trait;
use emporium_core::{ManagedUser, UserId};
use reqwest::Method;
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::instrument;

use super::{ApiError, HttpTransport, NewAccount};

/// Remote user management service.
#[async_trait]
pub trait UserAdminApi: Send + Sync {
    /// Every registered user.
    async fn list_users(&self) -> Result<Vec<ManagedUser>, ApiError>;

    /// Flag a user for review.
    async fn flag_user(&self, id: &UserId) -> Result<(), ApiError>;

    /// Clear a user's flag.
    async fn unflag_user(&self, id: &UserId) -> Result<(), ApiError>;

    /// Delete a user account.
    async fn delete_user(&self, id: &UserId) -> Result<(), ApiError>;

    /// Create an account holding the manager role.
    async fn register_manager(&self, account: &NewAccount) -> Result<(), ApiError>;
}

#[derive(Serialize)]
struct ManagerBody<'a> {
    email: &'a str,
    password: &'a str,
    username: &'a str,
}

fn user_path(id: &UserId) -> String {
    format!("admin/users/{}", urlencoding::encode(id.as_str()))
}

/// [`UserAdminApi`] over HTTP at `{base}/admin`.
#[derive(Debug, Clone)]
pub struct HttpUserAdminApi {
    transport: HttpTransport,
}

impl HttpUserAdminApi {
    #[must_use]
    pub const fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl UserAdminApi for HttpUserAdminApi {
    #[instrument(skip(self))]
    async fn list_users(&self) -> Result<Vec<ManagedUser>, ApiError> {
        self.transport.get_json("admin/users").await
    }

    #[instrument(skip(self), fields(user_id = %id))]
    async fn flag_user(&self, id: &UserId) -> Result<(), ApiError> {
        self.transport
            .send::<()>(Method::PUT, &format!("{}/flag", user_path(id)), None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %id))]
    async fn unflag_user(&self, id: &UserId) -> Result<(), ApiError> {
        self.transport
            .send::<()>(Method::PUT, &format!("{}/unflag", user_path(id)), None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %id))]
    async fn delete_user(&self, id: &UserId) -> Result<(), ApiError> {
        self.transport
            .send::<()>(Method::DELETE, &user_path(id), None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, account), fields(email = %account.email))]
    async fn register_manager(&self, account: &NewAccount) -> Result<(), ApiError> {
        let body = ManagerBody {
            email: account.email.as_str(),
            password: account.password.expose_secret(),
            username: &account.username,
        };
        self.transport
            .send(Method::POST, "admin/managers", Some(&body))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_path() {
        assert_eq!(user_path(&UserId::new("7")), "admin/users/7");
        assert_eq!(user_path(&UserId::new("a/b")), "admin/users/a%2Fb");
    }
}
