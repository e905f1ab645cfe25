//! Cart operations.
//!
//! Reads go cache first, then store, and backfill the cache when the store had
//! a cart. Writes go to the store first and then refresh the cache. The cache
//! never decides an outcome: its failures are logged and the operation
//! carries on against the store, and a cached cart whose row was deleted
//! elsewhere is dropped and the write replayed against the store.
//!
//! Every operation is a read-modify-write of the whole cart, so two requests
//! editing the same cart concurrently race and the last save wins.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use bazaar_core::{Cart, CartIdentity, CartItem, EnrichedCart, LineKey, ProductId, SessionId};

use super::cache::{CacheKey, CartCache};
use super::enrich::{ProductCatalog, enrich};
use super::store::CartStore;
use crate::db::RepositoryError;

/// Errors from cart operations.
#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("a user or session identity is required")]
    IdentityRequired,

    #[error("invalid product reference: {0}")]
    InvalidReference(String),

    #[error("quantity must be at least 1")]
    InvalidQuantity,

    #[error("authentication required")]
    Unauthorized,

    #[error("cart store unavailable: {0}")]
    StoreUnavailable(#[from] RepositoryError),
}

/// Result of [`CartService::merge_carts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No session cart, or an empty one. Nothing was written.
    NothingToMerge,
    /// The session cart was folded into the user cart and deleted.
    Merged {
        cart: Cart,
        /// Number of session lines folded in.
        lines: usize,
    },
}

/// Parse a client-supplied product reference.
///
/// # Errors
///
/// Returns `CartError::InvalidReference` for anything that is not a non-nil UUID.
pub fn parse_product_id(raw: &str) -> Result<ProductId, CartError> {
    match ProductId::parse(raw) {
        Ok(id) if !id.is_nil() => Ok(id),
        _ => Err(CartError::InvalidReference(raw.to_owned())),
    }
}

fn require(identity: Option<&CartIdentity>) -> Result<&CartIdentity, CartError> {
    identity.ok_or(CartError::IdentityRequired)
}

/// Cart engine over a store, a cache and a product catalog.
#[derive(Clone)]
pub struct CartService {
    inner: Arc<CartServiceInner>,
}

struct CartServiceInner {
    store: Arc<dyn CartStore>,
    cache: Arc<dyn CartCache>,
    catalog: Arc<dyn ProductCatalog>,
}

impl CartService {
    #[must_use]
    pub fn new(
        store: Arc<dyn CartStore>,
        cache: Arc<dyn CartCache>,
        catalog: Arc<dyn ProductCatalog>,
    ) -> Self {
        Self {
            inner: Arc::new(CartServiceInner {
                store,
                cache,
                catalog,
            }),
        }
    }

    /// The cart for `identity`, or an unsaved empty cart if none is stored.
    ///
    /// Never writes to the store.
    ///
    /// # Errors
    ///
    /// `IdentityRequired` without an identity, `StoreUnavailable` if the store
    /// cannot be read.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, identity: Option<&CartIdentity>) -> Result<Cart, CartError> {
        let identity = require(identity)?;
        Ok(self.load(identity).await?.unwrap_or_else(|| Cart::empty(identity.clone())))
    }

    /// The cart for `identity` with current product data on each line.
    ///
    /// # Errors
    ///
    /// As [`Self::get_cart`]. Catalog failures only affect the lines concerned.
    #[instrument(skip(self))]
    pub async fn get_cart_enriched(
        &self,
        identity: Option<&CartIdentity>,
    ) -> Result<EnrichedCart, CartError> {
        let cart = self.get_cart(identity).await?;
        Ok(enrich(self.inner.catalog.as_ref(), cart).await)
    }

    /// Add `item` to the cart, creating the cart on first use.
    ///
    /// Adding a line that already exists adds to its quantity.
    ///
    /// # Errors
    ///
    /// `IdentityRequired`, `InvalidQuantity` for a zero quantity,
    /// `InvalidReference` for a nil product, or `StoreUnavailable`.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        identity: Option<&CartIdentity>,
        item: CartItem,
    ) -> Result<Cart, CartError> {
        let identity = require(identity)?;
        if item.quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }
        if item.product_id.is_nil() {
            return Err(CartError::InvalidReference(item.product_id.to_string()));
        }

        self.modify(identity, true, |cart| {
            cart.bind(identity.clone())
                .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;
            cart.add_line(item.clone());
            Ok(true)
        })
        .await
    }

    /// Remove the line identified by `key`.
    ///
    /// Removing a line that is not in the cart, or from a cart that does not
    /// exist, changes nothing and writes nothing.
    ///
    /// # Errors
    ///
    /// `IdentityRequired` or `StoreUnavailable`.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        identity: Option<&CartIdentity>,
        key: &LineKey,
    ) -> Result<Cart, CartError> {
        let identity = require(identity)?;
        self.modify(identity, false, |cart| {
            let removed = cart.remove_line(key);
            if !removed {
                debug!("Line not in cart");
            }
            Ok(removed)
        })
        .await
    }

    /// Set the quantity of an existing line. A quantity of `0` removes it.
    ///
    /// # Errors
    ///
    /// `IdentityRequired` or `StoreUnavailable`.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        identity: Option<&CartIdentity>,
        key: &LineKey,
        quantity: u32,
    ) -> Result<Cart, CartError> {
        let identity = require(identity)?;
        self.modify(identity, false, |cart| Ok(cart.set_quantity(key, quantity)))
            .await
    }

    /// Remove every line, keeping the cart itself.
    ///
    /// # Errors
    ///
    /// `IdentityRequired` or `StoreUnavailable`.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, identity: Option<&CartIdentity>) -> Result<Cart, CartError> {
        let identity = require(identity)?;
        self.modify(identity, false, |cart| {
            if cart.is_empty() {
                return Ok(false);
            }
            cart.items.clear();
            Ok(true)
        })
        .await
    }

    /// Fold the cart of `session_id` into the signed-in user's cart.
    ///
    /// Quantities of matching lines are added; other lines are appended. The
    /// user cart is saved before the session cart is deleted. A crash between
    /// the two leaves both carts in place, and a retry will add the session
    /// lines again.
    ///
    /// Reads go straight to the store so a stale cache entry cannot drop lines.
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless `identity` is a user, `StoreUnavailable` if any
    /// store call fails.
    #[instrument(skip(self))]
    pub async fn merge_carts(
        &self,
        identity: Option<&CartIdentity>,
        session_id: Option<&SessionId>,
    ) -> Result<MergeOutcome, CartError> {
        let Some(CartIdentity::User(user_id)) = identity else {
            return Err(CartError::Unauthorized);
        };
        let user_id = *user_id;
        let Some(session_id) = session_id else {
            return Ok(MergeOutcome::NothingToMerge);
        };

        let store = &self.inner.store;
        let guest = match store.find_by_session(session_id).await? {
            Some(guest) if !guest.is_empty() => guest,
            _ => return Ok(MergeOutcome::NothingToMerge),
        };

        let mut cart = store
            .find_by_user(user_id)
            .await?
            .unwrap_or_else(|| Cart::empty(CartIdentity::User(user_id)));
        let lines = cart.absorb(&guest);
        let cart = store.save(cart).await?;
        store.delete_by_session(session_id).await?;

        self.invalidate(&CacheKey::new(CartIdentity::User(user_id)))
            .await;
        self.invalidate(&CacheKey::new(CartIdentity::Session(session_id.clone())))
            .await;

        info!(%user_id, lines, "Merged session cart into user cart");
        Ok(MergeOutcome::Merged { cart, lines })
    }

    async fn load(&self, identity: &CartIdentity) -> Result<Option<Cart>, CartError> {
        let key = CacheKey::from(identity);
        match self.inner.cache.get(&key).await {
            Ok(Some(cart)) => return Ok(Some(cart)),
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "Cart cache read failed"),
        }
        self.load_stored(identity, &key).await
    }

    async fn load_stored(
        &self,
        identity: &CartIdentity,
        key: &CacheKey,
    ) -> Result<Option<Cart>, CartError> {
        let stored = match identity {
            CartIdentity::User(id) => self.inner.store.find_by_user(*id).await?,
            CartIdentity::Session(id) => self.inner.store.find_by_session(id).await?,
        };
        if let Some(cart) = &stored {
            self.refill(key, cart).await;
        }
        Ok(stored)
    }

    /// Read-modify-write of the cart for `identity`.
    ///
    /// `change` reports whether it altered the cart; unaltered carts are not
    /// saved. Without a stored cart, `create` decides between starting an empty
    /// one and returning an unsaved empty cart untouched.
    ///
    /// A cached cart can outlive its row when carts are purged by another
    /// process. Saving it then fails with `NotFound`, so the key is dropped
    /// and `change` is applied once more to a fresh store read.
    async fn modify<F>(
        &self,
        identity: &CartIdentity,
        create: bool,
        change: F,
    ) -> Result<Cart, CartError>
    where
        F: Fn(&mut Cart) -> Result<bool, CartError> + Send + Sync,
    {
        let key = CacheKey::from(identity);
        let mut stale = false;

        loop {
            let current = if stale {
                self.load_stored(identity, &key).await?
            } else {
                self.load(identity).await?
            };
            let mut cart = match current {
                Some(cart) => cart,
                None if create => Cart::empty(identity.clone()),
                None => return Ok(Cart::empty(identity.clone())),
            };
            if !change(&mut cart)? {
                return Ok(cart);
            }

            match self.inner.store.save(cart).await {
                Ok(saved) => {
                    self.refill(&key, &saved).await;
                    return Ok(saved);
                }
                Err(RepositoryError::NotFound) if !stale => {
                    debug!(key = %key, "Cached cart no longer stored");
                    self.invalidate(&key).await;
                    stale = true;
                }
                Err(e) => {
                    if matches!(e, RepositoryError::NotFound) {
                        self.invalidate(&key).await;
                    }
                    return Err(e.into());
                }
            }
        }
    }

    async fn refill(&self, key: &CacheKey, cart: &Cart) {
        if let Err(e) = self.inner.cache.set(key, cart).await {
            warn!(key = %key, error = %e, "Cart cache write failed");
        }
    }

    async fn invalidate(&self, key: &CacheKey) {
        if let Err(e) = self.inner.cache.invalidate(key).await {
            warn!(key = %key, error = %e, "Cart cache invalidation failed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use bazaar_core::ProductSnapshot;

    use super::*;
    use crate::cart::cache::MokaCartCache;
    use crate::cart::store::MemoryCartStore;

    struct EmptyCatalog;

    #[async_trait]
    impl ProductCatalog for EmptyCatalog {
        async fn get_product(
            &self,
            _id: ProductId,
        ) -> Result<Option<ProductSnapshot>, RepositoryError> {
            Ok(None)
        }
    }

    fn service() -> (CartService, Arc<MemoryCartStore>, Arc<MokaCartCache>) {
        let store = Arc::new(MemoryCartStore::new());
        let cache = Arc::new(MokaCartCache::new(100, Duration::from_secs(60)));
        let service = CartService::new(store.clone(), cache.clone(), Arc::new(EmptyCatalog));
        (service, store, cache)
    }

    fn session(s: &str) -> CartIdentity {
        CartIdentity::Session(SessionId::parse(s).unwrap())
    }

    #[test]
    fn test_parse_product_id() {
        let id = ProductId::generate();
        assert_eq!(parse_product_id(&id.to_string()).unwrap(), id);
        assert!(matches!(
            parse_product_id("abc"),
            Err(CartError::InvalidReference(_))
        ));
        assert!(matches!(
            parse_product_id("00000000-0000-0000-0000-000000000000"),
            Err(CartError::InvalidReference(_))
        ));
    }

    #[tokio::test]
    async fn test_get_cart_without_identity_is_rejected() {
        let (service, _, _) = service();
        assert!(matches!(
            service.get_cart(None).await,
            Err(CartError::IdentityRequired)
        ));
    }

    #[tokio::test]
    async fn test_get_cart_never_persists() {
        let (service, store, _) = service();
        let cart = service.get_cart(Some(&session("s"))).await.unwrap();

        assert!(!cart.is_persisted());
        assert!(cart.is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_add_item_rejects_zero_quantity() {
        let (service, store, _) = service();
        let item = CartItem::new(ProductId::generate(), 0, "M", "red");

        assert!(matches!(
            service.add_item(Some(&session("s")), item).await,
            Err(CartError::InvalidQuantity)
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_add_item_refills_cache() {
        let (service, _, cache) = service();
        let identity = session("s");
        let saved = service
            .add_item(
                Some(&identity),
                CartItem::new(ProductId::generate(), 2, "M", "red"),
            )
            .await
            .unwrap();

        let cached = cache.get(&CacheKey::from(&identity)).await.unwrap();
        assert_eq!(cached, Some(saved));
    }

    #[tokio::test]
    async fn test_noop_remove_does_not_write() {
        let (service, store, _) = service();
        let identity = session("s");
        let product = ProductId::generate();
        let saved = service
            .add_item(Some(&identity), CartItem::new(product, 1, "M", "red"))
            .await
            .unwrap();

        let after = service
            .remove_item(Some(&identity), &LineKey::new(product, "L", "red"))
            .await
            .unwrap();
        assert_eq!(after.updated_at, saved.updated_at);
        assert_eq!(store.carts().await, vec![saved]);
    }

    #[tokio::test]
    async fn test_update_quantity_sets_exact_value() {
        let (service, _, _) = service();
        let identity = session("s");
        let product = ProductId::generate();
        service
            .add_item(Some(&identity), CartItem::new(product, 5, "M", "red"))
            .await
            .unwrap();

        let key = LineKey::new(product, "M", "red");
        let cart = service
            .update_quantity(Some(&identity), &key, 2)
            .await
            .unwrap();
        assert_eq!(cart.line(&key).map(|l| l.quantity), Some(2));

        let cart = service
            .update_quantity(Some(&identity), &key, 0)
            .await
            .unwrap();
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_clear_cart_keeps_record() {
        let (service, store, _) = service();
        let identity = session("s");
        let first = service
            .add_item(
                Some(&identity),
                CartItem::new(ProductId::generate(), 1, "", ""),
            )
            .await
            .unwrap();

        let cleared = service.clear_cart(Some(&identity)).await.unwrap();
        assert!(cleared.is_empty());
        assert_eq!(cleared.id, first.id);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_merge_requires_user() {
        let (service, _, _) = service();
        let guest = SessionId::parse("s").unwrap();

        assert!(matches!(
            service.merge_carts(None, Some(&guest)).await,
            Err(CartError::Unauthorized)
        ));
        assert!(matches!(
            service.merge_carts(Some(&session("s")), Some(&guest)).await,
            Err(CartError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_add_after_out_of_band_delete_recreates_cart() {
        let (service, store, cache) = service();
        let identity = session("purged");
        let first = service
            .add_item(
                Some(&identity),
                CartItem::new(ProductId::generate(), 1, "", ""),
            )
            .await
            .unwrap();
        store
            .delete_by_session(identity.session_id().unwrap())
            .await
            .unwrap();

        let product = ProductId::generate();
        let cart = service
            .add_item(Some(&identity), CartItem::new(product, 3, "", ""))
            .await
            .unwrap();

        assert_ne!(cart.id, first.id);
        assert_eq!(cart.items, vec![CartItem::new(product, 3, "", "")]);
        assert_eq!(store.carts().await, vec![cart.clone()]);
        assert_eq!(
            cache.get(&CacheKey::from(&identity)).await.unwrap(),
            Some(cart)
        );
    }

    #[tokio::test]
    async fn test_remove_after_out_of_band_delete_writes_nothing() {
        let (service, store, cache) = service();
        let identity = session("purged");
        let product = ProductId::generate();
        service
            .add_item(Some(&identity), CartItem::new(product, 1, "M", "red"))
            .await
            .unwrap();
        store
            .delete_by_session(identity.session_id().unwrap())
            .await
            .unwrap();

        let cart = service
            .remove_item(Some(&identity), &LineKey::new(product, "M", "red"))
            .await
            .unwrap();

        assert!(cart.is_empty());
        assert!(!cart.is_persisted());
        assert!(store.is_empty().await);
        assert_eq!(cache.get(&CacheKey::from(&identity)).await.unwrap(), None);
    }
}
