//! Auth service client.

use async_trait::async_trait;
use emporium_core::{Email, UserRecord};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{ApiError, HttpTransport};

/// Login form input.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: Email,
    pub password: SecretString,
}

/// Signup form input, already validated.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: Email,
    pub password: SecretString,
}

/// Body of a successful login.
///
/// Both fields are optional on the wire; the session store decides what a
/// missing half means.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<UserRecord>,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SignupBody<'a> {
    email: &'a str,
    password: &'a str,
    username: &'a str,
}

/// Remote authentication service.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange credentials for a token and user record.
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ApiError>;

    /// Register a new account.
    async fn signup(&self, account: &NewAccount) -> Result<(), ApiError>;
}

/// [`AuthApi`] over HTTP at `{base}/auth`.
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    transport: HttpTransport,
}

impl HttpAuthApi {
    #[must_use]
    pub const fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ApiError> {
        let body = LoginBody {
            email: credentials.email.as_str(),
            password: credentials.password.expose_secret(),
        };
        self.transport
            .send_json(Method::POST, "auth/login", &body)
            .await
    }

    #[instrument(skip(self, account), fields(email = %account.email))]
    async fn signup(&self, account: &NewAccount) -> Result<(), ApiError> {
        let body = SignupBody {
            email: account.email.as_str(),
            password: account.password.expose_secret(),
            username: &account.username,
        };
        self.transport
            .send(Method::POST, "auth/signup", Some(&body))
            .await?;
        Ok(())
    }
}
