//! Cart service client.

use async_trait::async_trait;
use emporium_core::{CartLine, ProductId};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{ApiError, HttpTransport};

/// Remote cart service. The server keys the cart by the bearer credential.
#[async_trait]
pub trait CartApi: Send + Sync {
    /// The authoritative cart lines.
    async fn fetch_cart(&self) -> Result<Vec<CartLine>, ApiError>;

    /// Add `delta` units of a product (creating the line if needed).
    async fn increment(&self, product_id: &ProductId, delta: u32) -> Result<(), ApiError>;

    /// Overwrite the quantity of an existing line.
    async fn set_quantity(&self, product_id: &ProductId, quantity: u32) -> Result<(), ApiError>;

    /// Delete a line.
    async fn remove(&self, product_id: &ProductId) -> Result<(), ApiError>;

    /// Delete every line.
    async fn clear(&self) -> Result<(), ApiError>;

    /// Start checkout. Returns the payment redirect, if the server sent one.
    async fn start_checkout(&self) -> Result<Option<String>, ApiError>;
}

#[derive(Deserialize)]
struct CartEnvelope {
    #[serde(default)]
    items: Option<Vec<CartLine>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IncrementBody<'a> {
    product_id: &'a ProductId,
    quantity: u32,
}

#[derive(Serialize)]
struct QuantityBody {
    quantity: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutReply {
    #[serde(default)]
    redirect_url: Option<String>,
}

/// Payment redirect carried by a checkout reply, if any.
///
/// Anything that is not a JSON object with a non-blank `redirectUrl` counts
/// as an opaque success.
fn checkout_redirect(body: &str) -> Option<String> {
    serde_json::from_str::<CheckoutReply>(body)
        .ok()
        .and_then(|reply| reply.redirect_url)
        .filter(|url| !url.trim().is_empty())
}

/// Cart lines from a `GET /cart` body. A missing or null `items` is an
/// empty cart, as is an empty body.
fn parse_cart(body: &str) -> Result<Vec<CartLine>, ApiError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let envelope: CartEnvelope = serde_json::from_str(body)?;
    Ok(envelope.items.unwrap_or_default())
}

fn line_path(product_id: &ProductId) -> String {
    format!("product/cart/items/{}", urlencoding::encode(product_id.as_str()))
}

/// [`CartApi`] over HTTP at `{base}/product`.
#[derive(Debug, Clone)]
pub struct HttpCartApi {
    transport: HttpTransport,
}

impl HttpCartApi {
    #[must_use]
    pub const fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl CartApi for HttpCartApi {
    #[instrument(skip(self))]
    async fn fetch_cart(&self) -> Result<Vec<CartLine>, ApiError> {
        let body = self
            .transport
            .send::<()>(Method::GET, "product/cart", None)
            .await?;
        parse_cart(&body)
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn increment(&self, product_id: &ProductId, delta: u32) -> Result<(), ApiError> {
        let body = IncrementBody {
            product_id,
            quantity: delta,
        };
        self.transport
            .send(Method::POST, "product/cart/items", Some(&body))
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn set_quantity(&self, product_id: &ProductId, quantity: u32) -> Result<(), ApiError> {
        self.transport
            .send(
                Method::PATCH,
                &line_path(product_id),
                Some(&QuantityBody { quantity }),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn remove(&self, product_id: &ProductId) -> Result<(), ApiError> {
        self.transport
            .send::<()>(Method::DELETE, &line_path(product_id), None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<(), ApiError> {
        self.transport
            .send::<()>(Method::DELETE, "product/cart", None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn start_checkout(&self) -> Result<Option<String>, ApiError> {
        let body = self
            .transport
            .send(Method::POST, "product/checkout", Some(&serde_json::json!({})))
            .await?;
        Ok(checkout_redirect(&body))
    }
}
