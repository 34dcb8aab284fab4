//! Catalog service client with a short-lived listing cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use emporium_core::{NewProduct, Product, ProductId, Review};
use moka::future::Cache;
use reqwest::Method;
use tracing::{debug, instrument};

use super::{ApiError, HttpTransport};

/// Synthetic category that lists the whole catalog.
pub const ALL_CATEGORIES: &str = "All";

/// Remote catalog service.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Category names, with [`ALL_CATEGORIES`] first.
    async fn categories(&self) -> Result<Vec<String>, ApiError>;

    /// Products in `category`; [`ALL_CATEGORIES`] lists everything.
    async fn products(&self, category: &str) -> Result<Vec<Product>, ApiError>;

    /// A single product.
    async fn product(&self, id: &ProductId) -> Result<Product, ApiError>;

    /// Reviews of a product.
    async fn reviews(&self, id: &ProductId) -> Result<Vec<Review>, ApiError>;

    /// Create a product.
    async fn add_product(&self, product: &NewProduct) -> Result<(), ApiError>;

    /// Delete a product.
    async fn delete_product(&self, id: &ProductId) -> Result<(), ApiError>;
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Categories,
    Products(String),
    Product(ProductId),
}

#[derive(Debug, Clone)]
enum CacheValue {
    Categories(Arc<Vec<String>>),
    Products(Arc<Vec<Product>>),
    Product(Box<Product>),
}

/// [`CatalogApi`] over HTTP at `{base}/product`.
///
/// Categories, listings and product details are cached for the configured
/// TTL. Product writes drop the whole cache.
#[derive(Clone)]
pub struct HttpCatalogApi {
    transport: HttpTransport,
    cache: Cache<CacheKey, CacheValue>,
}

impl std::fmt::Debug for HttpCatalogApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCatalogApi")
            .field("transport", &self.transport)
            .field("cached_entries", &self.cache.entry_count())
            .finish()
    }
}

impl HttpCatalogApi {
    #[must_use]
    pub fn new(transport: HttpTransport, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(ttl)
            .build();
        Self { transport, cache }
    }

    /// Drop every cached listing.
    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

/// Path listing the products of `category`.
fn products_path(category: &str) -> String {
    if category.eq_ignore_ascii_case(ALL_CATEGORIES) {
        "product/list".to_string()
    } else {
        format!(
            "product/category/{}",
            urlencoding::encode(&category.to_lowercase())
        )
    }
}

/// Prepend the synthetic "All" category unless the server already sent it.
fn with_all_category(mut names: Vec<String>) -> Vec<String> {
    names.retain(|name| !name.eq_ignore_ascii_case(ALL_CATEGORIES));
    names.insert(0, ALL_CATEGORIES.to_string());
    names
}

fn product_path(id: &ProductId) -> String {
    format!("product/{}", urlencoding::encode(id.as_str()))
}

#[async_trait]
impl CatalogApi for HttpCatalogApi {
    #[instrument(skip(self))]
    async fn categories(&self) -> Result<Vec<String>, ApiError> {
        if let Some(CacheValue::Categories(names)) = self.cache.get(&CacheKey::Categories).await {
            debug!("Cache hit for categories");
            return Ok(names.as_ref().clone());
        }

        let names = with_all_category(self.transport.get_json("product/categories").await?);
        self.cache
            .insert(
                CacheKey::Categories,
                CacheValue::Categories(Arc::new(names.clone())),
            )
            .await;
        Ok(names)
    }

    #[instrument(skip(self))]
    async fn products(&self, category: &str) -> Result<Vec<Product>, ApiError> {
        let path = products_path(category);
        let key = CacheKey::Products(path.clone());
        if let Some(CacheValue::Products(products)) = self.cache.get(&key).await {
            debug!("Cache hit for products");
            return Ok(products.as_ref().clone());
        }

        let products: Vec<Product> = self.transport.get_json(&path).await?;
        self.cache
            .insert(key, CacheValue::Products(Arc::new(products.clone())))
            .await;
        Ok(products)
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn product(&self, id: &ProductId) -> Result<Product, ApiError> {
        let key = CacheKey::Product(id.clone());
        if let Some(CacheValue::Product(product)) = self.cache.get(&key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let product: Product = self.transport.get_json(&product_path(id)).await?;
        self.cache
            .insert(key, CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(product)
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn reviews(&self, id: &ProductId) -> Result<Vec<Review>, ApiError> {
        self.transport
            .get_json(&format!(
                "product/reviews/{}",
                urlencoding::encode(id.as_str())
            ))
            .await
    }

    #[instrument(skip(self, product), fields(name = %product.name))]
    async fn add_product(&self, product: &NewProduct) -> Result<(), ApiError> {
        self.transport
            .send(Method::POST, "product/add", Some(product))
            .await?;
        self.invalidate_all().await;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn delete_product(&self, id: &ProductId) -> Result<(), ApiError> {
        self.transport
            .send::<()>(Method::DELETE, &product_path(id), None)
            .await?;
        self.invalidate_all().await;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_products_path() {
        assert_eq!(products_path("All"), "product/list");
        assert_eq!(products_path("all"), "product/list");
        assert_eq!(products_path("Home Goods"), "product/category/home%20goods");
    }

    #[test]
    fn test_with_all_category() {
        let names = with_all_category(vec!["Books".to_string(), "Toys".to_string()]);
        assert_eq!(names, vec!["All", "Books", "Toys"]);

        let names = with_all_category(vec!["all".to_string(), "Books".to_string()]);
        assert_eq!(names, vec!["All", "Books"]);

        assert_eq!(with_all_category(Vec::new()), vec!["All"]);
    }

    #[test]
    fn test_product_path() {
        assert_eq!(product_path(&ProductId::new("42")), "product/42");
    }
}
