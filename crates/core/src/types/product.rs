//! Catalog types.

use serde::{Deserialize, Serialize};

use super::cart::CartLine;
use super::id::ProductId;
use super::price::Price;

/// A product as served by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub price: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl Product {
    /// The image to show in listings and cart lines.
    #[must_use]
    pub fn primary_image(&self) -> Option<&str> {
        self.image_url
            .as_deref()
            .or_else(|| self.images.first().map(String::as_str))
    }

    /// A cart line for `quantity` units of this product.
    #[must_use]
    pub fn to_cart_line(&self, quantity: u32) -> CartLine {
        CartLine {
            product_id: self.id.clone(),
            title: self.name.clone(),
            price: self.price,
            image_url: self.primary_image().map(str::to_owned),
            quantity,
        }
    }
}

/// A customer review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    /// Display name of the reviewer.
    #[serde(default)]
    pub user: String,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

/// Payload for creating a product from the management console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: Price,
    pub images: Vec<String>,
}

impl NewProduct {
    /// Build the payload from the single image URL the form collects.
    #[must_use]
    pub fn with_image(
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        price: Price,
        image_url: impl Into<String>,
    ) -> Self {
        let image_url = image_url.into();
        Self {
            name: name.into(),
            description: description.into(),
            category: category.into(),
            price,
            images: if image_url.trim().is_empty() {
                Vec::new()
            } else {
                vec![image_url]
            },
        }
    }
}
