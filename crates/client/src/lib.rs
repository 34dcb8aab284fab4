//! Emporium storefront client library.
//!
//! Everything a storefront front end needs below the view layer: the
//! session store, the optimistic cart store, route guards and navigation,
//! checkout, catalog access and the management console. Screens render
//! from the observable state these expose and call their operations.
//!
//! # Modules
//!
//! - [`session`] - Authentication state, persisted across restarts
//! - [`cart`] - Optimistic cart with rollback, synced to the session
//! - [`guard`] / [`routes`] - Capability checks and navigation decisions
//! - [`admin`] - Capability-checked product and user management
//! - [`api`] - Remote service traits and their HTTP implementations
//! - [`state`] - [`AppContext`] wiring it all together

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod admin;
pub mod api;
pub mod cart;
pub mod config;
pub mod error;
pub mod guard;
pub mod routes;
pub mod session;
pub mod state;
pub mod storage;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use config::ClientConfig;
pub use error::ClientError;
pub use state::{AppContext, Collaborators};
