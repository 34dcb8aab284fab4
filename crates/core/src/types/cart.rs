//! Cart lines and the line collection.
//!
//! [`CartLines`] is the only way to hold a cart: it keeps lines in insertion
//! order, at most one line per product, every quantity at least one. Totals
//! are computed from the lines on demand and never stored.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::id::ProductId;
use super::price::Price;

/// One product in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    #[serde(alias = "id")]
    pub product_id: ProductId,
    #[serde(alias = "name", default)]
    pub title: String,
    pub price: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub quantity: u32,
}

impl CartLine {
    /// Price of the whole line.
    #[must_use]
    pub fn line_price(&self) -> Price {
        self.price.times(self.quantity)
    }
}

/// Rejected line-collection edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartLineError {
    /// Quantities and deltas must be at least one.
    #[error("quantity must be at least 1")]
    ZeroQuantity,
    /// No line exists for the product.
    #[error("product {0} is not in the cart")]
    UnknownProduct(ProductId),
}

/// Ordered, duplicate-free collection of cart lines.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct CartLines(Vec<CartLine>);

impl CartLines {
    /// An empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Build a collection from lines reported by the remote cart.
    ///
    /// Lines with a zero quantity are dropped and repeated products are
    /// merged into the first occurrence, so whatever the server sends the
    /// collection stays structurally valid. Also returns how many lines
    /// were dropped.
    #[must_use]
    pub fn from_remote(lines: impl IntoIterator<Item = CartLine>) -> (Self, usize) {
        let mut cart = Self::new();
        let mut dropped = 0;
        for line in lines {
            // A zero-quantity line is the only possible error here.
            if cart.add(line).is_err() {
                dropped += 1;
            }
        }
        (cart, dropped)
    }

    /// Add `line.quantity` units of `line.product_id`.
    ///
    /// Increments the existing line when the product is already present
    /// (its title, price and image are kept), otherwise appends `line`.
    ///
    /// # Errors
    ///
    /// Returns `CartLineError::ZeroQuantity` if `line.quantity` is zero.
    pub fn add(&mut self, line: CartLine) -> Result<(), CartLineError> {
        if line.quantity == 0 {
            return Err(CartLineError::ZeroQuantity);
        }
        match self.get_mut(&line.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(line.quantity);
            }
            None => self.0.push(line),
        }
        Ok(())
    }

    /// Overwrite the quantity of an existing line.
    ///
    /// # Errors
    ///
    /// Returns `CartLineError::ZeroQuantity` if `quantity` is zero and
    /// `CartLineError::UnknownProduct` if the product has no line.
    pub fn set_quantity(
        &mut self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), CartLineError> {
        if quantity == 0 {
            return Err(CartLineError::ZeroQuantity);
        }
        let line = self
            .get_mut(product_id)
            .ok_or_else(|| CartLineError::UnknownProduct(product_id.clone()))?;
        line.quantity = quantity;
        Ok(())
    }

    /// Remove the line for `product_id`, returning it if it existed.
    pub fn remove(&mut self, product_id: &ProductId) -> Option<CartLine> {
        let index = self.0.iter().position(|l| &l.product_id == product_id)?;
        Some(self.0.remove(index))
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// The line for `product_id`.
    #[must_use]
    pub fn get(&self, product_id: &ProductId) -> Option<&CartLine> {
        self.0.iter().find(|l| &l.product_id == product_id)
    }

    fn get_mut(&mut self, product_id: &ProductId) -> Option<&mut CartLine> {
        self.0.iter_mut().find(|l| &l.product_id == product_id)
    }

    /// Whether the product has a line.
    #[must_use]
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.get(product_id).is_some()
    }

    /// Lines in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &CartLine> {
        self.0.iter()
    }

    /// Lines as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[CartLine] {
        &self.0
    }

    /// Number of distinct products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.0.iter().map(|l| u64::from(l.quantity)).sum()
    }

    /// Sum of price times quantity over all lines.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.0.iter().map(CartLine::line_price).sum()
    }
}

impl<'a> IntoIterator for &'a CartLines {
    type Item = &'a CartLine;
    type IntoIter = std::slice::Iter<'a, CartLine>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn line(id: &str, price: u32, quantity: u32) -> CartLine {
        CartLine {
            product_id: ProductId::new(id),
            title: format!("Product {id}"),
            price: Price::from(price),
            image_url: None,
            quantity,
        }
    }

    #[test]
    fn test_add_merges_by_product() {
        let mut cart = CartLines::new();
        cart.add(line("p1", 10, 3)).unwrap();
        cart.add(line("p2", 4, 1)).unwrap();
        cart.add(line("p1", 10, 2)).unwrap();

        assert_eq!(cart.len(), 2);
        assert_eq!(cart.get(&ProductId::new("p1")).unwrap().quantity, 5);
        assert_eq!(cart.iter().next().unwrap().product_id.as_str(), "p1");
    }

    #[test]
    fn test_add_keeps_existing_line_details() {
        let mut cart = CartLines::new();
        cart.add(line("p1", 10, 1)).unwrap();
        let mut repriced = line("p1", 99, 1);
        repriced.title = "Renamed".to_string();
        cart.add(repriced).unwrap();

        let kept = cart.get(&ProductId::new("p1")).unwrap();
        assert_eq!(kept.price, Price::from(10));
        assert_eq!(kept.title, "Product p1");
    }

    #[test]
    fn test_set_quantity_is_absolute() {
        let mut cart = CartLines::new();
        cart.add(line("p1", 10, 3)).unwrap();
        cart.add(line("p1", 10, 2)).unwrap();
        cart.set_quantity(&ProductId::new("p1"), 2).unwrap();
        assert_eq!(cart.count(), 2);
    }

    #[test]
    fn test_zero_quantities_rejected() {
        let mut cart = CartLines::new();
        assert_eq!(cart.add(line("p1", 1, 0)), Err(CartLineError::ZeroQuantity));
        cart.add(line("p1", 1, 1)).unwrap();
        assert_eq!(
            cart.set_quantity(&ProductId::new("p1"), 0),
            Err(CartLineError::ZeroQuantity)
        );
        assert_eq!(cart.count(), 1);
    }

    #[test]
    fn test_set_quantity_unknown_product() {
        let mut cart = CartLines::new();
        assert!(matches!(
            cart.set_quantity(&ProductId::new("nope"), 2),
            Err(CartLineError::UnknownProduct(_))
        ));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cart = CartLines::new();
        cart.add(line("p1", 1, 1)).unwrap();
        cart.add(line("p2", 1, 1)).unwrap();

        assert!(cart.remove(&ProductId::new("p1")).is_some());
        assert!(cart.remove(&ProductId::new("p1")).is_none());
        assert_eq!(cart.len(), 1);

        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.count(), 0);
        assert_eq!(cart.subtotal(), Price::ZERO);
    }

    #[test]
    fn test_totals_follow_lines() {
        let mut cart = CartLines::new();
        cart.add(line("p1", 10, 2)).unwrap();
        cart.add(line("p2", 3, 4)).unwrap();
        assert_eq!(cart.count(), 6);
        assert_eq!(cart.subtotal(), Price::from(32));

        cart.set_quantity(&ProductId::new("p1"), 5).unwrap();
        assert_eq!(cart.subtotal(), Price::from(62));
    }

    #[test]
    fn test_from_remote_normalizes() {
        let (cart, dropped) = CartLines::from_remote(vec![
            line("p1", 10, 1),
            line("p2", 5, 0),
            line("p1", 10, 2),
        ]);
        assert_eq!(dropped, 1);
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.count(), 3);
    }

    #[test]
    fn test_line_accepts_catalog_field_names() {
        let parsed: CartLine = serde_json::from_str(
            r#"{"id": 12, "name": "Mug", "price": 7.5, "imageUrl": "/m.png", "quantity": 2}"#,
        )
        .unwrap();
        assert_eq!(parsed.product_id.as_str(), "12");
        assert_eq!(parsed.title, "Mug");
        assert_eq!(parsed.line_price(), Price::from(15));
    }
}
