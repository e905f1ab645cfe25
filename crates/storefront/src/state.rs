//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::cart::{CartService, IdentityResolver, JwtValidator, MokaCartCache};
use crate::config::StorefrontConfig;
use crate::db::{PgCartStore, PgProductCatalog};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the cart service, identity resolution and the database pool.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pool: Option<PgPool>,
    carts: CartService,
    identity: IdentityResolver,
}

impl AppState {
    /// Wire the production cart service: `PostgreSQL` store and catalog, moka cache, JWT auth.
    #[must_use]
    pub fn new(config: &StorefrontConfig, pool: PgPool) -> Self {
        let store = Arc::new(PgCartStore::new(pool.clone()));
        let cache = Arc::new(MokaCartCache::new(
            config.cart.cache_capacity,
            config.cart.session_ttl,
        ));
        let catalog = Arc::new(PgProductCatalog::new(
            pool.clone(),
            config.cart.product_cache_ttl,
        ));
        let carts = CartService::new(store, cache, catalog);
        let identity = IdentityResolver::new(Arc::new(JwtValidator::new(&config.jwt_secret)));

        Self::from_parts(carts, identity, Some(pool))
    }

    /// Build state from already-wired parts. Without a pool, readiness always succeeds.
    #[must_use]
    pub fn from_parts(carts: CartService, identity: IdentityResolver, pool: Option<PgPool>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                pool,
                carts,
                identity,
            }),
        }
    }

    /// Get a reference to the database connection pool, if any.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn carts(&self) -> &CartService {
        &self.inner.carts
    }

    #[must_use]
    pub fn identity(&self) -> &IdentityResolver {
        &self.inner.identity
    }
}
