//! Product display data used to enrich cart lines.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// Current catalog data for a product, as shown next to a cart line.
///
/// Reflects the product at read time, not at the time it was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    /// Primary image URL.
    pub image: Option<String>,
    /// Live unit price.
    pub price: Decimal,
}
