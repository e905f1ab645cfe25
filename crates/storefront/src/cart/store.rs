//! Durable cart storage.
//!
//! The store is the source of truth for carts. It keeps at most one cart per
//! user and one per session, and `save` is a whole-document replace: callers
//! read, modify, and write back the full item list. Concurrent writers race
//! and the last write wins.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use tokio::sync::RwLock;

use bazaar_core::{Cart, CartId, CartIdentity, SessionId, UserId};

use crate::db::RepositoryError;

/// Keyed persistence for carts.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Find the cart bound to `user_id`.
    async fn find_by_user(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError>;

    /// Find the cart bound to `session_id`.
    async fn find_by_session(&self, session_id: &SessionId)
    -> Result<Option<Cart>, RepositoryError>;

    /// Insert a cart without an id, or replace the stored cart with the same id.
    ///
    /// Inserts assign an id and stamp `created_at`/`updated_at`. An insert for
    /// an identity that already has a cart replaces that cart's items instead,
    /// so two first writes for one identity resolve last-write-wins. Replaces
    /// keep the stored `created_at` and stamp a strictly later `updated_at`.
    ///
    /// # Errors
    ///
    /// `Conflict` if a replace would move a cart onto an identity held by
    /// another cart, `NotFound` if a replaced cart no longer exists.
    async fn save(&self, cart: Cart) -> Result<Cart, RepositoryError>;

    /// Delete the cart bound to `session_id`. Deleting an absent cart is not an error.
    async fn delete_by_session(&self, session_id: &SessionId) -> Result<(), RepositoryError>;
}

/// Timestamp for a write that follows `previous`.
///
/// Truncated to microseconds (the `PostgreSQL` resolution) and always strictly
/// after `previous`, so `updated_at` increases even when the clock does not.
#[must_use]
pub fn next_updated_at(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now().trunc_subsecs(6);
    match previous {
        Some(prev) if now <= prev => prev + TimeDelta::microseconds(1),
        _ => now,
    }
}

/// In-process cart store.
///
/// Used for tests and for running the service without a database. Keeps the
/// same one-cart-per-identity rule as the `PostgreSQL` unique indexes.
#[derive(Debug, Default)]
pub struct MemoryCartStore {
    carts: RwLock<HashMap<CartId, Cart>>,
}

impl MemoryCartStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored carts, oldest first.
    pub async fn carts(&self) -> Vec<Cart> {
        let mut carts: Vec<Cart> = self.carts.read().await.values().cloned().collect();
        carts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        carts
    }

    /// Number of stored carts.
    pub async fn len(&self) -> usize {
        self.carts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.carts.read().await.is_empty()
    }

    async fn find(&self, identity: &CartIdentity) -> Option<Cart> {
        self.carts
            .read()
            .await
            .values()
            .find(|c| &c.identity == identity)
            .cloned()
    }
}

#[async_trait]
impl CartStore for MemoryCartStore {
    async fn find_by_user(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        Ok(self.find(&CartIdentity::User(user_id)).await)
    }

    async fn find_by_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<Cart>, RepositoryError> {
        Ok(self.find(&CartIdentity::Session(session_id.clone())).await)
    }

    async fn save(&self, mut cart: Cart) -> Result<Cart, RepositoryError> {
        let mut carts = self.carts.write().await;
        let holder = carts
            .iter()
            .find(|(_, c)| c.identity == cart.identity)
            .map(|(id, c)| (*id, c.created_at, c.updated_at));

        let id = match (cart.id, holder) {
            (Some(id), Some((held_by, _, _))) if held_by != id => {
                return Err(RepositoryError::Conflict(
                    "a cart already exists for this identity".to_owned(),
                ));
            }
            (Some(id), _) => {
                let existing = carts.get(&id).ok_or(RepositoryError::NotFound)?;
                cart.created_at = existing.created_at;
                cart.updated_at = next_updated_at(Some(existing.updated_at));
                id
            }
            // A first insert racing another for the same identity replaces it.
            (None, Some((id, created_at, updated_at))) => {
                cart.id = Some(id);
                cart.created_at = created_at;
                cart.updated_at = next_updated_at(Some(updated_at));
                id
            }
            (None, None) => {
                let id = CartId::generate();
                let now = next_updated_at(None);
                cart.id = Some(id);
                cart.created_at = now;
                cart.updated_at = now;
                id
            }
        };

        carts.insert(id, cart.clone());
        Ok(cart)
    }

    async fn delete_by_session(&self, session_id: &SessionId) -> Result<(), RepositoryError> {
        self.carts
            .write()
            .await
            .retain(|_, c| c.identity.session_id() != Some(session_id));
        Ok(())
    }
}
