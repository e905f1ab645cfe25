//! Bazaar Core - Shared cart domain types.
//!
//! This crate provides the types shared by Bazaar components:
//! - `storefront` - Cart HTTP service
//! - `cli` - Command-line tools for migrations and maintenance
//!
//! # Architecture
//!
//! The core crate contains only types and pure cart logic - no I/O, no
//! database access, no HTTP clients. Line matching, quantity accumulation and
//! identity binding live here so every adapter agrees on them.
//!
//! # Modules
//!
//! - [`types`] - IDs, session tokens, carts, and product snapshots

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
