//! Core types for the storefront client.
//!
//! This module provides type-safe wrappers for the domain concepts shared by
//! the stores, the guards and the HTTP services.

pub mod cart;
pub mod email;
pub mod id;
pub mod price;
pub mod product;
pub mod role;
pub mod user;

pub use cart::{CartLine, CartLineError, CartLines};
pub use email::{Email, EmailError};
pub use id::*;
pub use price::Price;
pub use product::{NewProduct, Product, Review};
pub use role::{AccessTier, Capability, RoleSet, RoleTag};
pub use user::{ManagedUser, UserRecord};
