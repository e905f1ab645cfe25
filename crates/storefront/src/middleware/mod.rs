//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request span with `request_id` and `user_id` fields)
//! 3. Request ID (add unique ID to each request)
//!
//! Cart identity is resolved per handler by the [`CartRequestIdentity`]
//! extractor rather than by a layer.

pub mod identity;
pub mod request_id;

pub use identity::CartRequestIdentity;
pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};
