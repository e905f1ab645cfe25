//! Shared fixtures for the Bazaar integration tests.
//!
//! Everything here runs in-process: carts live in [`MemoryCartStore`], the
//! catalog is a fixed map, and the HTTP tests drive the axum router directly
//! without binding a socket.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p bazaar-integration-tests
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rust_decimal::Decimal;
use secrecy::SecretString;

use bazaar_core::{Cart, CartIdentity, CartItem, ProductId, ProductSnapshot, SessionId, UserId};
use bazaar_storefront::cart::{
    CacheError, CacheKey, CartCache, CartService, CartStore, IdentityResolver, JwtValidator,
    MemoryCartStore, MokaCartCache, ProductCatalog,
};
use bazaar_storefront::db::RepositoryError;
use bazaar_storefront::routes;
use bazaar_storefront::state::AppState;

/// Signing secret for test access tokens.
pub const TEST_JWT_SECRET: &str = "k8#Qz!v2Lr9@Wm4^Tn7&Xp1*Hs6$Jd3%";

/// A product id derived from a small number, stable across runs.
#[must_use]
pub fn product(n: u128) -> ProductId {
    ProductId::new(uuid::Uuid::from_u128(n))
}

/// A session identity.
///
/// # Panics
///
/// Panics on a blank token.
#[must_use]
pub fn session(token: &str) -> CartIdentity {
    CartIdentity::Session(session_id(token))
}

/// A session token.
///
/// # Panics
///
/// Panics on a blank token.
#[must_use]
pub fn session_id(token: &str) -> SessionId {
    SessionId::parse(token).unwrap_or_else(|| panic!("blank session token {token:?}"))
}

#[must_use]
pub fn user() -> (UserId, CartIdentity) {
    let id = UserId::generate();
    (id, CartIdentity::User(id))
}

#[must_use]
pub fn item(product_n: u128, quantity: u32, size: &str, color: &str) -> CartItem {
    CartItem::new(product(product_n), quantity, size, color)
}

/// Cart store that counts calls on top of [`MemoryCartStore`].
#[derive(Debug, Default)]
pub struct CountingStore {
    pub inner: MemoryCartStore,
    reads: AtomicUsize,
    saves: AtomicUsize,
}

impl CountingStore {
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CartStore for CountingStore {
    async fn find_by_user(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_user(user_id).await
    }

    async fn find_by_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<Cart>, RepositoryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_session(session_id).await
    }

    async fn save(&self, cart: Cart) -> Result<Cart, RepositoryError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(cart).await
    }

    async fn delete_by_session(&self, session_id: &SessionId) -> Result<(), RepositoryError> {
        self.inner.delete_by_session(session_id).await
    }
}

/// A cache whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingCache;

#[async_trait]
impl CartCache for FailingCache {
    async fn get(&self, _key: &CacheKey) -> Result<Option<Cart>, CacheError> {
        Err(CacheError::Backend("connection refused".to_owned()))
    }

    async fn set(&self, _key: &CacheKey, _cart: &Cart) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".to_owned()))
    }

    async fn invalidate(&self, _key: &CacheKey) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".to_owned()))
    }
}

/// A catalog holding a fixed set of products. Lookups for `broken` ids fail.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    products: HashMap<ProductId, ProductSnapshot>,
    broken: HashSet<ProductId>,
}

impl StaticCatalog {
    /// Add a product priced at `cents` hundredths.
    #[must_use]
    pub fn with_product(mut self, id: ProductId, name: &str, cents: i64) -> Self {
        self.products.insert(
            id,
            ProductSnapshot {
                id,
                name: name.to_owned(),
                slug: name.to_lowercase().replace(' ', "-"),
                image: Some(format!("https://cdn.bazaar.test/{id}.jpg")),
                price: Decimal::new(cents, 2),
            },
        );
        self
    }

    /// Make lookups of `id` fail.
    #[must_use]
    pub fn with_broken(mut self, id: ProductId) -> Self {
        self.broken.insert(id);
        self
    }
}

#[async_trait]
impl ProductCatalog for StaticCatalog {
    async fn get_product(&self, id: ProductId) -> Result<Option<ProductSnapshot>, RepositoryError> {
        if self.broken.contains(&id) {
            return Err(RepositoryError::DataCorruption(format!(
                "product {id} has no price"
            )));
        }
        Ok(self.products.get(&id).cloned())
    }
}

/// A cart service wired to in-process collaborators, with handles on each.
pub struct Harness {
    pub service: CartService,
    pub store: Arc<CountingStore>,
    pub cache: Arc<dyn CartCache>,
}

impl Harness {
    /// Moka cache, empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::build(
            Arc::new(MokaCartCache::new(1_000, Duration::from_secs(600))),
            StaticCatalog::default(),
        )
    }

    #[must_use]
    pub fn with_cache(cache: Arc<dyn CartCache>) -> Self {
        Self::build(cache, StaticCatalog::default())
    }

    #[must_use]
    pub fn with_catalog(catalog: StaticCatalog) -> Self {
        Self::build(
            Arc::new(MokaCartCache::new(1_000, Duration::from_secs(600))),
            catalog,
        )
    }

    fn build(cache: Arc<dyn CartCache>, catalog: StaticCatalog) -> Self {
        let store = Arc::new(CountingStore::default());
        let service = CartService::new(store.clone(), cache.clone(), Arc::new(catalog));
        Self {
            service,
            store,
            cache,
        }
    }

    /// The axum application over this harness's service.
    #[must_use]
    pub fn router(&self) -> Router {
        let validator = Arc::new(JwtValidator::new(&SecretString::from(TEST_JWT_SECRET)));
        let state = AppState::from_parts(
            self.service.clone(),
            IdentityResolver::new(validator),
            None,
        );
        routes::router(state)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Sign an hour-long HS256 access token for `user_id` with [`TEST_JWT_SECRET`].
///
/// # Panics
///
/// Panics if signing fails.
#[must_use]
pub fn access_token(user_id: UserId) -> String {
    let claims = serde_json::json!({
        "sub": user_id.to_string(),
        "exp": Utc::now().timestamp() + 3600,
    });
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .unwrap_or_else(|e| panic!("failed to sign test token: {e}"))
}
