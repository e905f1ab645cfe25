//! Attach live product data to cart lines.

use async_trait::async_trait;
use tracing::warn;

use bazaar_core::{Cart, CartItem, EnrichedCart, EnrichedCartItem, ProductId, ProductSnapshot};

use crate::db::RepositoryError;

/// Product lookup by id.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_product(&self, id: ProductId) -> Result<Option<ProductSnapshot>, RepositoryError>;
}

/// Resolve every line of `cart` against `catalog`.
///
/// Lines whose product is missing, or whose lookup fails, are returned without
/// product data instead of failing the whole view. Lookups run one after
/// another in line order.
pub async fn enrich(catalog: &dyn ProductCatalog, cart: Cart) -> EnrichedCart {
    let mut items = Vec::with_capacity(cart.items.len());
    for item in &cart.items {
        items.push(enrich_line(catalog, item.clone()).await);
    }
    EnrichedCart::new(cart, items)
}

async fn enrich_line(catalog: &dyn ProductCatalog, item: CartItem) -> EnrichedCartItem {
    let product = match catalog.get_product(item.product_id).await {
        Ok(Some(product)) => Some(product),
        Ok(None) => {
            warn!(product_id = %item.product_id, "Cart line refers to an unknown product");
            None
        }
        Err(e) => {
            warn!(product_id = %item.product_id, error = %e, "Product lookup failed");
            None
        }
    };
    EnrichedCartItem { item, product }
}
