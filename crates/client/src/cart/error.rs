//! Cart error types.

use emporium_core::{CartLineError, ProductId};
use thiserror::Error;

use crate::api::ApiError;

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Cart operations need a signed-in session.
    #[error("not signed in")]
    NotAuthenticated,

    /// Quantities must be at least one.
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    /// The product has no line in the cart.
    #[error("product {0} is not in the cart")]
    LineNotFound(ProductId),

    /// The cart service rejected the operation. Local state has been
    /// rolled back or reloaded.
    #[error("cart service error: {0}")]
    Api(#[from] ApiError),

    /// Checkout could not be started.
    #[error("checkout failed: {0}")]
    Checkout(#[source] ApiError),
}

impl From<CartLineError> for CartError {
    fn from(err: CartLineError) -> Self {
        match err {
            CartLineError::ZeroQuantity => Self::InvalidQuantity,
            CartLineError::UnknownProduct(id) => Self::LineNotFound(id),
        }
    }
}
