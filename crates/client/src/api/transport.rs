//! JSON-over-HTTP transport shared by all services.

use std::sync::{Arc, PoisonError, RwLock};

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::instrument;
use url::Url;

use super::{ApiError, CredentialSink};

/// HTTP client bound to the backend base URL.
///
/// Cheap to clone; clones share the connection pool and the credential.
#[derive(Clone)]
pub struct HttpTransport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    client: reqwest::Client,
    base_url: Url,
    credential: RwLock<Option<SecretString>>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.inner.base_url.as_str())
            .field("has_credential", &self.has_credential())
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Create a transport for the backend at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(base_url: Url) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("emporium-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(TransportInner {
                client,
                base_url,
                credential: RwLock::new(None),
            }),
        })
    }

    /// The backend base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Whether a credential is currently attached.
    #[must_use]
    pub fn has_credential(&self) -> bool {
        self.inner
            .credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Absolute URL for `path` below the base URL.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Url` if the result is not a valid URL.
    pub fn url(&self, path: &str) -> Result<Url, ApiError> {
        let base = self.inner.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    /// `GET` a JSON document.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails, the status is not a success or
    /// the body does not decode as `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let body = self.send::<()>(Method::GET, path, None).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Send `body` and decode the JSON reply.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails, the status is not a success or
    /// the body does not decode as `T`.
    pub async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let reply = self.send(method, path, Some(body)).await?;
        Ok(serde_json::from_str(&reply)?)
    }

    /// Send a request and return the raw reply body.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the status is not a success.
    #[instrument(skip(self, body), fields(method = %method))]
    pub async fn send<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<String, ApiError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let url = self.url(path)?;
        let mut request = self.inner.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let token = self
            .inner
            .credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(token) = token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "Request rejected");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: text,
            });
        }

        Ok(text)
    }
}

impl CredentialSink for HttpTransport {
    fn set_credential(&self, token: &SecretString) {
        *self
            .inner
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
    }

    fn clear_credential(&self) {
        *self
            .inner
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}
