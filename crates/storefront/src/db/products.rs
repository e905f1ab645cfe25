//! Product catalog lookups for cart enrichment.
//!
//! Snapshots are cached in-process for a configurable TTL. Missing products are
//! not cached, so a product created after a miss shows up on the next read.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use bazaar_core::{ProductId, ProductSnapshot};

use super::RepositoryError;
use crate::cart::enrich::ProductCatalog;

/// Upper bound on cached product snapshots.
const PRODUCT_CACHE_CAPACITY: u64 = 5_000;

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    slug: String,
    price: Decimal,
    images: Vec<String>,
}

impl From<ProductRow> for ProductSnapshot {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId::new(row.id),
            name: row.name,
            slug: row.slug,
            image: row.images.into_iter().next(),
            price: row.price,
        }
    }
}

/// Product catalog backed by `storefront.product`.
#[derive(Clone)]
pub struct PgProductCatalog {
    inner: Arc<PgProductCatalogInner>,
}

struct PgProductCatalogInner {
    pool: PgPool,
    cache: Cache<ProductId, ProductSnapshot>,
}

impl PgProductCatalog {
    /// Create a catalog whose snapshots live for `ttl`.
    #[must_use]
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(PRODUCT_CACHE_CAPACITY)
            .time_to_live(ttl)
            .build();

        Self {
            inner: Arc::new(PgProductCatalogInner { pool, cache }),
        }
    }

    /// Drop a cached snapshot, e.g. after a price change.
    pub async fn invalidate(&self, id: ProductId) {
        self.inner.cache.invalidate(&id).await;
    }
}

#[async_trait]
impl ProductCatalog for PgProductCatalog {
    #[instrument(skip(self))]
    async fn get_product(&self, id: ProductId) -> Result<Option<ProductSnapshot>, RepositoryError> {
        if let Some(product) = self.inner.cache.get(&id).await {
            debug!("Product cache hit");
            return Ok(Some(product));
        }

        let row = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, name, slug, price, images
            FROM storefront.product
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.inner.pool)
        .await?;

        let Some(product) = row.map(ProductSnapshot::from) else {
            return Ok(None);
        };

        self.inner.cache.insert(id, product.clone()).await;
        Ok(Some(product))
    }
}
