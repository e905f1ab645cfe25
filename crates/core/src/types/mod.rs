//! Core types for Bazaar.
//!
//! This module provides type-safe wrappers for the cart domain.

pub mod cart;
pub mod id;
pub mod product;
pub mod session;

pub use cart::{
    BindingError, Cart, CartIdentity, CartItem, EnrichedCart, EnrichedCartItem, LineKey,
};
pub use id::*;
pub use product::ProductSnapshot;
pub use session::SessionId;
