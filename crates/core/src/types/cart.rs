//! Shopping cart domain types.
//!
//! A cart belongs to exactly one [`CartIdentity`]: either an authenticated
//! user or an anonymous session. Lines are keyed by `(product, size, color)`
//! and quantities accumulate when the same line is added again.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{CartId, ProductId, UserId};
use super::product::ProductSnapshot;
use super::session::SessionId;

/// Who a cart belongs to.
///
/// Serialized as a single `userId` or `sessionId` field so a cart document
/// never carries both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CartIdentity {
    /// Authenticated account.
    #[serde(rename = "userId")]
    User(UserId),
    /// Anonymous shopper session.
    #[serde(rename = "sessionId")]
    Session(SessionId),
}

impl CartIdentity {
    /// Whether this identity is an authenticated user.
    #[must_use]
    pub const fn is_user(&self) -> bool {
        matches!(self, Self::User(_))
    }

    /// The user ID, if user-bound.
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::User(id) => Some(*id),
            Self::Session(_) => None,
        }
    }

    /// The session token, if session-bound.
    #[must_use]
    pub const fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::User(_) => None,
            Self::Session(id) => Some(id),
        }
    }
}

impl From<UserId> for CartIdentity {
    fn from(id: UserId) -> Self {
        Self::User(id)
    }
}

impl From<SessionId> for CartIdentity {
    fn from(id: SessionId) -> Self {
        Self::Session(id)
    }
}

/// Attempted to move a user-bound cart back to a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cart is bound to user {user_id} and cannot be rebound")]
pub struct BindingError {
    /// The user the cart is already bound to.
    pub user_id: UserId,
}

/// Identifies a cart line: product plus the selected variant options.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineKey {
    pub product_id: ProductId,
    pub selected_size: String,
    pub selected_color: String,
}

impl LineKey {
    #[must_use]
    pub fn new(
        product_id: ProductId,
        selected_size: impl Into<String>,
        selected_color: impl Into<String>,
    ) -> Self {
        Self {
            product_id,
            selected_size: selected_size.into(),
            selected_color: selected_color.into(),
        }
    }
}

/// A single cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: ProductId,
    /// Always at least 1 for a stored line.
    pub quantity: u32,
    #[serde(default)]
    pub selected_size: String,
    #[serde(default)]
    pub selected_color: String,
}

impl CartItem {
    /// Create a new cart line.
    #[must_use]
    pub fn new(
        product_id: ProductId,
        quantity: u32,
        selected_size: impl Into<String>,
        selected_color: impl Into<String>,
    ) -> Self {
        Self {
            product_id,
            quantity,
            selected_size: selected_size.into(),
            selected_color: selected_color.into(),
        }
    }

    /// Whether this item occupies the line identified by `key`.
    #[must_use]
    pub fn matches(&self, key: &LineKey) -> bool {
        self.product_id == key.product_id
            && self.selected_size == key.selected_size
            && self.selected_color == key.selected_color
    }

    /// Whether two items occupy the same line.
    #[must_use]
    pub fn same_line(&self, other: &Self) -> bool {
        self.product_id == other.product_id
            && self.selected_size == other.selected_size
            && self.selected_color == other.selected_color
    }

    /// The line this item occupies.
    #[must_use]
    pub fn line_key(&self) -> LineKey {
        LineKey::new(
            self.product_id,
            self.selected_size.clone(),
            self.selected_color.clone(),
        )
    }
}

/// A shopping cart.
///
/// `id` is `None` until the cart is first saved; reads for an identity with
/// no stored cart return such an unsaved, empty cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: Option<CartId>,
    #[serde(flatten)]
    pub identity: CartIdentity,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// An unsaved, empty cart for `identity`.
    #[must_use]
    pub fn empty(identity: CartIdentity) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            identity,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the cart has been written to the store.
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }

    /// Find the line identified by `key`.
    #[must_use]
    pub fn line(&self, key: &LineKey) -> Option<&CartItem> {
        self.items.iter().find(|i| i.matches(key))
    }

    /// Bind the cart to `identity`.
    ///
    /// A session cart may be promoted to a user; a user cart is terminal and
    /// only accepts its own user.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError`] when rebinding a user cart to a different
    /// identity.
    pub fn bind(&mut self, identity: CartIdentity) -> Result<(), BindingError> {
        if let CartIdentity::User(current) = self.identity
            && identity != CartIdentity::User(current)
        {
            return Err(BindingError { user_id: current });
        }
        self.identity = identity;
        Ok(())
    }

    /// Add `item`, accumulating quantity onto an existing line if present.
    ///
    /// Quantities saturate at `u32::MAX`.
    pub fn add_line(&mut self, item: CartItem) {
        if let Some(existing) = self.items.iter_mut().find(|i| i.same_line(&item)) {
            existing.quantity = existing.quantity.saturating_add(item.quantity);
        } else {
            self.items.push(item);
        }
    }

    /// Remove the line identified by `key`. Returns whether a line was removed.
    pub fn remove_line(&mut self, key: &LineKey) -> bool {
        let before = self.items.len();
        self.items.retain(|i| !i.matches(key));
        self.items.len() != before
    }

    /// Set the quantity of an existing line; `0` removes it.
    ///
    /// Returns whether the cart changed.
    pub fn set_quantity(&mut self, key: &LineKey, quantity: u32) -> bool {
        if quantity == 0 {
            return self.remove_line(key);
        }
        match self.items.iter_mut().find(|i| i.matches(key)) {
            Some(line) if line.quantity != quantity => {
                line.quantity = quantity;
                true
            }
            _ => false,
        }
    }

    /// Fold every line of `other` into this cart. Returns the number of lines
    /// taken from `other`.
    pub fn absorb(&mut self, other: &Self) -> usize {
        for item in &other.items {
            self.add_line(item.clone());
        }
        other.items.len()
    }
}

/// A cart line together with the product it refers to, resolved at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedCartItem {
    #[serde(flatten)]
    pub item: CartItem,
    /// Absent when the product could not be resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductSnapshot>,
}

impl EnrichedCartItem {
    /// Line total at the current price, if the product is known.
    #[must_use]
    pub fn line_total(&self) -> Option<Decimal> {
        self.product
            .as_ref()
            .map(|p| p.price * Decimal::from(self.item.quantity))
    }
}

/// Read-only cart view with product details. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedCart {
    pub id: Option<CartId>,
    /// Absent for a shopper with neither a user nor a session identity.
    #[serde(flatten)]
    pub identity: Option<CartIdentity>,
    pub items: Vec<EnrichedCartItem>,
    pub item_count: u64,
    /// Sum of line totals over lines with a resolved product.
    pub subtotal: Decimal,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl EnrichedCart {
    /// Combine a cart with its resolved lines.
    #[must_use]
    pub fn new(cart: Cart, items: Vec<EnrichedCartItem>) -> Self {
        let subtotal = items.iter().filter_map(EnrichedCartItem::line_total).sum();
        Self {
            item_count: cart.item_count(),
            id: cart.id,
            identity: Some(cart.identity),
            items,
            subtotal,
            created_at: Some(cart.created_at),
            updated_at: Some(cart.updated_at),
        }
    }

    /// An empty view for a shopper with no identity at all.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            id: None,
            identity: None,
            items: Vec::new(),
            item_count: 0,
            subtotal: Decimal::ZERO,
            created_at: None,
            updated_at: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product(n: u128) -> ProductId {
        ProductId::new(uuid::Uuid::from_u128(n))
    }

    fn session_cart() -> Cart {
        Cart::empty(CartIdentity::Session(SessionId::parse("guest-1").unwrap()))
    }

    #[test]
    fn test_add_line_accumulates_same_line() {
        let mut cart = session_cart();
        cart.add_line(CartItem::new(product(1), 2, "M", "red"));
        cart.add_line(CartItem::new(product(1), 3, "M", "red"));

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items.first().map(|i| i.quantity), Some(5));
    }

    #[test]
    fn test_add_line_distinguishes_variants() {
        let mut cart = session_cart();
        cart.add_line(CartItem::new(product(1), 1, "M", "red"));
        cart.add_line(CartItem::new(product(1), 1, "L", "red"));
        cart.add_line(CartItem::new(product(1), 1, "M", "blue"));
        cart.add_line(CartItem::new(product(2), 1, "M", "red"));

        assert_eq!(cart.items.len(), 4);
        assert_eq!(cart.item_count(), 4);
    }

    #[test]
    fn test_add_line_saturates() {
        let mut cart = session_cart();
        cart.add_line(CartItem::new(product(1), u32::MAX - 1, "", ""));
        cart.add_line(CartItem::new(product(1), 10, "", ""));
        assert_eq!(cart.items.first().map(|i| i.quantity), Some(u32::MAX));
    }

    #[test]
    fn test_remove_line_exact_match_only() {
        let mut cart = session_cart();
        cart.add_line(CartItem::new(product(1), 1, "M", "red"));

        assert!(!cart.remove_line(&LineKey::new(product(1), "M", "blue")));
        assert_eq!(cart.items.len(), 1);

        assert!(cart.remove_line(&LineKey::new(product(1), "M", "red")));
        assert!(cart.is_empty());

        assert!(!cart.remove_line(&LineKey::new(product(1), "M", "red")));
    }

    #[test]
    fn test_set_quantity_zero_removes() {
        let mut cart = session_cart();
        cart.add_line(CartItem::new(product(1), 4, "S", "green"));
        let key = LineKey::new(product(1), "S", "green");

        assert!(cart.set_quantity(&key, 2));
        assert_eq!(cart.line(&key).map(|l| l.quantity), Some(2));
        assert!(!cart.set_quantity(&key, 2));
        assert!(cart.set_quantity(&key, 0));
        assert!(cart.line(&key).is_none());
    }

    #[test]
    fn test_absorb_accumulates_and_appends() {
        let user = UserId::new(uuid::Uuid::from_u128(99));
        let mut user_cart = Cart::empty(CartIdentity::User(user));
        user_cart.add_line(CartItem::new(product(1), 2, "7", "red"));

        let mut guest = session_cart();
        guest.add_line(CartItem::new(product(1), 3, "7", "red"));
        guest.add_line(CartItem::new(product(2), 1, "8", "blue"));

        assert_eq!(user_cart.absorb(&guest), 2);
        assert_eq!(
            user_cart.items,
            vec![
                CartItem::new(product(1), 5, "7", "red"),
                CartItem::new(product(2), 1, "8", "blue"),
            ]
        );
    }

    #[test]
    fn test_bind_session_to_user_allowed() {
        let mut cart = session_cart();
        let user = UserId::generate();
        cart.bind(CartIdentity::User(user)).unwrap();
        assert_eq!(cart.identity.user_id(), Some(user));
        assert!(cart.identity.session_id().is_none());
    }

    #[test]
    fn test_bind_user_is_terminal() {
        let user = UserId::generate();
        let mut cart = Cart::empty(CartIdentity::User(user));

        let err = cart
            .bind(CartIdentity::Session(SessionId::parse("guest-2").unwrap()))
            .unwrap_err();
        assert_eq!(err.user_id, user);
        assert!(cart.bind(CartIdentity::User(UserId::generate())).is_err());
        assert!(cart.bind(CartIdentity::User(user)).is_ok());
    }

    #[test]
    fn test_cart_serializes_single_identity_field() {
        let user = UserId::new(uuid::Uuid::from_u128(7));
        let cart = Cart::empty(CartIdentity::User(user));
        let json = serde_json::to_value(&cart).unwrap();

        assert_eq!(json["userId"], serde_json::json!(user.to_string()));
        assert!(json.get("sessionId").is_none());
        assert_eq!(json["items"], serde_json::json!([]));
    }

    #[test]
    fn test_enriched_subtotal_skips_unresolved_lines() {
        let mut cart = session_cart();
        cart.add_line(CartItem::new(product(1), 2, "", ""));
        cart.add_line(CartItem::new(product(2), 1, "", ""));

        let items = vec![
            EnrichedCartItem {
                item: cart.items.first().cloned().unwrap(),
                product: Some(ProductSnapshot {
                    id: product(1),
                    name: "Khussa".to_owned(),
                    slug: "khussa".to_owned(),
                    image: None,
                    price: Decimal::new(1250, 2),
                }),
            },
            EnrichedCartItem {
                item: cart.items.get(1).cloned().unwrap(),
                product: None,
            },
        ];

        let view = EnrichedCart::new(cart, items);
        assert_eq!(view.item_count, 3);
        assert_eq!(view.subtotal, Decimal::new(2500, 2));
    }

    #[test]
    fn test_anonymous_view_has_no_identity_fields() {
        let json = serde_json::to_value(EnrichedCart::anonymous()).unwrap();
        assert!(json.get("userId").is_none());
        assert!(json.get("sessionId").is_none());
        assert_eq!(json["itemCount"], serde_json::json!(0));
    }
}
