//! Cart identity extractor.
//!
//! Resolves the `Authorization` and `X-Session-ID` headers on every cart
//! request. Resolution never rejects a request: a shopper with no usable
//! credentials simply has no identity, and the handler decides what that means.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};
use bazaar_core::CartIdentity;

use crate::cart::ResolvedIdentity;
use crate::error::set_sentry_user;
use crate::state::AppState;

/// The identity a cart request acts on.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(CartRequestIdentity(resolved): CartRequestIdentity) -> impl IntoResponse {
///     match resolved.identity {
///         Some(identity) => format!("Shopping as {identity:?}"),
///         None => "Anonymous".to_string(),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CartRequestIdentity(pub ResolvedIdentity);

impl FromRequestParts<AppState> for CartRequestIdentity {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let resolved = state.identity().resolve_headers(&parts.headers);

        if let Some(CartIdentity::User(user_id)) = &resolved.identity {
            tracing::Span::current().record("user_id", tracing::field::display(user_id));
            set_sentry_user(user_id);
        }

        Ok(Self(resolved))
    }
}
