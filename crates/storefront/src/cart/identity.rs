//! Resolve who a request is shopping as.
//!
//! An authenticated user always wins over a session token. The session token is
//! still kept on the result so a login request can merge the guest cart into
//! the user's cart.

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use bazaar_core::{CartIdentity, SessionId, UserId};

/// Header carrying the anonymous session token.
pub const SESSION_HEADER: &str = "x-session-id";

/// Validates a bearer credential into a user.
///
/// Implementations return `None` for any credential they reject; the reason is
/// theirs to log.
pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: &str) -> Option<UserId>;
}

/// Claims carried by an access token.
///
/// `exp` is checked by `jsonwebtoken` itself.
#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default, rename = "userId")]
    user_id: Option<String>,
}

/// HS256 JSON Web Token validator.
pub struct JwtValidator {
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl TokenValidator for JwtValidator {
    fn validate(&self, token: &str) -> Option<UserId> {
        let data = match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => data,
            Err(e) => {
                debug!(error = %e, "Rejected bearer token");
                return None;
            }
        };

        let subject = data.claims.sub.or(data.claims.user_id)?;
        match UserId::parse(&subject) {
            Ok(id) if !id.is_nil() => Some(id),
            _ => {
                debug!("Bearer token subject is not a user id");
                None
            }
        }
    }
}

/// Outcome of identity resolution for one request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedIdentity {
    /// The identity cart operations act on.
    pub identity: Option<CartIdentity>,
    /// The session token presented, kept even when a user was resolved.
    pub session_id: Option<SessionId>,
}

impl ResolvedIdentity {
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        self.identity.is_none()
    }
}

/// Resolves request credentials into a [`CartIdentity`].
#[derive(Clone)]
pub struct IdentityResolver {
    validator: Arc<dyn TokenValidator>,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(validator: Arc<dyn TokenValidator>) -> Self {
        Self { validator }
    }

    /// Resolve from a bearer credential and a session token, either possibly absent.
    #[must_use]
    pub fn resolve(&self, bearer: Option<&str>, session: Option<&str>) -> ResolvedIdentity {
        let session_id = session.and_then(SessionId::parse);
        let user = bearer
            .filter(|t| !t.trim().is_empty())
            .and_then(|t| self.validator.validate(t));

        let identity = match (user, &session_id) {
            (Some(user_id), _) => Some(CartIdentity::User(user_id)),
            (None, Some(session_id)) => Some(CartIdentity::Session(session_id.clone())),
            (None, None) => None,
        };

        ResolvedIdentity {
            identity,
            session_id,
        }
    }

    /// Resolve from request headers.
    #[must_use]
    pub fn resolve_headers(&self, headers: &HeaderMap) -> ResolvedIdentity {
        self.resolve(bearer_token(headers), session_token(headers))
    }
}

/// The token from an `Authorization: Bearer <token>` header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// The raw `X-Session-ID` header value.
#[must_use]
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}
