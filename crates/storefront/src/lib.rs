//! Bazaar storefront library.
//!
//! Shopping carts for anonymous and signed-in shoppers, served over a JSON
//! API. Exposed as a library so the binary, the CLI and the integration tests
//! share one implementation.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
