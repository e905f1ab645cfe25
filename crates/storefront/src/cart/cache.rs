//! Read-through cart cache.
//!
//! The cache is an optimization only. Every failure is reported to the caller
//! as a [`CacheError`], which the cart service logs and ignores, falling back
//! to the store. User carts never expire; session carts expire after a
//! configured TTL measured from their last write.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;

use bazaar_core::{Cart, CartIdentity};

/// Key of a cached cart: `cart:user:<id>` or `cart:session:<token>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(CartIdentity);

impl CacheKey {
    #[must_use]
    pub const fn new(identity: CartIdentity) -> Self {
        Self(identity)
    }

    #[must_use]
    pub const fn identity(&self) -> &CartIdentity {
        &self.0
    }
}

impl From<&CartIdentity> for CacheKey {
    fn from(identity: &CartIdentity) -> Self {
        Self(identity.clone())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            CartIdentity::User(id) => write!(f, "cart:user:{id}"),
            CartIdentity::Session(id) => write!(f, "cart:session:{id}"),
        }
    }
}

/// Cache backend failure.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Cache of carts keyed by identity.
#[async_trait]
pub trait CartCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Cart>, CacheError>;

    /// Store `cart` under `key`, replacing any previous entry and restarting
    /// its expiry.
    async fn set(&self, key: &CacheKey, cart: &Cart) -> Result<(), CacheError>;

    async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError>;
}

/// Per-entry expiry: none for user carts, `session_ttl` for session carts.
struct CartExpiry {
    session_ttl: Duration,
}

impl CartExpiry {
    fn ttl_for(&self, key: &CacheKey) -> Option<Duration> {
        match key.identity() {
            CartIdentity::User(_) => None,
            CartIdentity::Session(_) => Some(self.session_ttl),
        }
    }
}

impl Expiry<CacheKey, Cart> for CartExpiry {
    fn expire_after_create(
        &self,
        key: &CacheKey,
        _value: &Cart,
        _created_at: Instant,
    ) -> Option<Duration> {
        self.ttl_for(key)
    }

    fn expire_after_update(
        &self,
        key: &CacheKey,
        _value: &Cart,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        self.ttl_for(key)
    }
}

/// In-process cart cache backed by `moka`.
#[derive(Clone)]
pub struct MokaCartCache {
    cache: Cache<CacheKey, Cart>,
}

impl MokaCartCache {
    /// Create a cache holding at most `capacity` carts.
    #[must_use]
    pub fn new(capacity: u64, session_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .expire_after(CartExpiry { session_ttl })
            .build();
        Self { cache }
    }

    /// Number of cached carts, after applying pending evictions.
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

#[async_trait]
impl CartCache for MokaCartCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Cart>, CacheError> {
        Ok(self.cache.get(key).await)
    }

    async fn set(&self, key: &CacheKey, cart: &Cart) -> Result<(), CacheError> {
        self.cache.insert(key.clone(), cart.clone()).await;
        Ok(())
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}

/// A cache that never holds anything. Every read is a miss.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCartCache;

#[async_trait]
impl CartCache for NoopCartCache {
    async fn get(&self, _key: &CacheKey) -> Result<Option<Cart>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &CacheKey, _cart: &Cart) -> Result<(), CacheError> {
        Ok(())
    }

    async fn invalidate(&self, _key: &CacheKey) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bazaar_core::{SessionId, UserId};

    use super::*;

    fn session_key(s: &str) -> CacheKey {
        CacheKey::new(CartIdentity::Session(SessionId::parse(s).unwrap()))
    }

    #[test]
    fn test_cache_key_format() {
        let user = UserId::new(uuid::Uuid::from_u128(1));
        assert_eq!(
            CacheKey::new(CartIdentity::User(user)).to_string(),
            "cart:user:00000000-0000-0000-0000-000000000001"
        );
        assert_eq!(session_key("abc").to_string(), "cart:session:abc");
    }

    #[test]
    fn test_expiry_by_identity_kind() {
        let expiry = CartExpiry {
            session_ttl: Duration::from_secs(60),
        };
        let user = CacheKey::new(CartIdentity::User(UserId::generate()));

        assert_eq!(expiry.ttl_for(&user), None);
        assert_eq!(
            expiry.ttl_for(&session_key("s")),
            Some(Duration::from_secs(60))
        );
    }

    #[tokio::test]
    async fn test_set_get_invalidate() {
        let cache = MokaCartCache::new(100, Duration::from_secs(60));
        let key = session_key("s-1");
        let cart = Cart::empty(key.identity().clone());

        assert_eq!(cache.get(&key).await.unwrap(), None);
        cache.set(&key, &cart).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(cart));

        cache.invalidate(&key).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_session_entries_expire() {
        let cache = MokaCartCache::new(100, Duration::from_millis(50));
        let key = session_key("short-lived");
        cache
            .set(&key, &Cart::empty(key.identity().clone()))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_user_entries_outlive_session_ttl() {
        let cache = MokaCartCache::new(100, Duration::from_millis(50));
        let key = CacheKey::new(CartIdentity::User(UserId::generate()));
        cache
            .set(&key, &Cart::empty(key.identity().clone()))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.get(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_noop_cache_always_misses() {
        let cache = NoopCartCache;
        let key = session_key("s");
        cache
            .set(&key, &Cart::empty(key.identity().clone()))
            .await
            .unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), None);
    }
}
