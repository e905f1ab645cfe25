//! Shopping carts.
//!
//! [`CartService`] owns the cart operations. It sits on three seams, each a
//! trait with a production and an in-process implementation:
//!
//! - [`CartStore`]: durable storage, the source of truth
//! - [`CartCache`]: read-through cache keyed by identity
//! - [`ProductCatalog`]: product data for enriched reads
//!
//! [`IdentityResolver`] turns request credentials into the identity a cart
//! operation acts on.

pub mod cache;
pub mod enrich;
pub mod identity;
pub mod service;
pub mod store;

pub use cache::{CacheError, CacheKey, CartCache, MokaCartCache, NoopCartCache};
pub use enrich::ProductCatalog;
pub use identity::{IdentityResolver, JwtValidator, ResolvedIdentity, TokenValidator};
pub use service::{CartError, CartService, MergeOutcome, parse_product_id};
pub use store::{CartStore, MemoryCartStore};
