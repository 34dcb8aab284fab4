//! Emporium Core - Shared types library.
//!
//! This crate provides the domain types used by the storefront client:
//! product and user ids, email addresses, prices, role tags and access
//! capabilities, user records, and the cart line collection.
//!
//! # Architecture
//!
//! The core crate contains only types and pure logic - no I/O, no HTTP
//! clients, no async. Invariants that do not depend on a remote service
//! (one line per product, quantities of at least one, role hierarchy) live
//! here so that every consumer gets them for free.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers and domain records

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
