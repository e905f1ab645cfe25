//! `PostgreSQL` cart store.
//!
//! Carts live in `storefront.cart` with their lines in a JSONB column. Sparse
//! unique indexes on `user_id` and `session_id` back the one-cart-per-identity
//! rule, and a check constraint requires exactly one of them. First inserts
//! upsert on those indexes, so racing first writes resolve last-write-wins.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::{debug, instrument};
use uuid::Uuid;

use async_trait::async_trait;
use bazaar_core::{Cart, CartId, CartIdentity, CartItem, SessionId, UserId};

use super::RepositoryError;
use crate::cart::store::{CartStore, next_updated_at};

/// Row shape of `storefront.cart`.
#[derive(Debug, sqlx::FromRow)]
struct CartRow {
    id: Uuid,
    user_id: Option<Uuid>,
    session_id: Option<String>,
    items: Json<Vec<CartItem>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CartRow> for Cart {
    type Error = RepositoryError;

    fn try_from(row: CartRow) -> Result<Self, Self::Error> {
        let identity = match (row.user_id, row.session_id) {
            (Some(user_id), None) => CartIdentity::User(UserId::new(user_id)),
            (None, Some(session_id)) => SessionId::parse(&session_id)
                .map(CartIdentity::Session)
                .ok_or_else(|| {
                    RepositoryError::DataCorruption(format!("cart {} has a blank session_id", row.id))
                })?,
            _ => {
                return Err(RepositoryError::DataCorruption(format!(
                    "cart {} must have exactly one of user_id or session_id",
                    row.id
                )));
            }
        };

        if let Some(line) = row.items.0.iter().find(|i| i.quantity == 0) {
            return Err(RepositoryError::DataCorruption(format!(
                "cart {} has a zero-quantity line for product {}",
                row.id, line.product_id
            )));
        }

        Ok(Self {
            id: Some(CartId::new(row.id)),
            identity,
            items: row.items.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Split an identity into the two nullable columns.
fn identity_columns(identity: &CartIdentity) -> (Option<Uuid>, Option<&str>) {
    match identity {
        CartIdentity::User(id) => (Some(id.as_uuid()), None),
        CartIdentity::Session(id) => (None, Some(id.as_str())),
    }
}

/// The partial unique index an identity's first insert can collide with.
const fn conflict_target(identity: &CartIdentity) -> &'static str {
    match identity {
        CartIdentity::User(_) => "(user_id) WHERE user_id IS NOT NULL",
        CartIdentity::Session(_) => "(session_id) WHERE session_id IS NOT NULL",
    }
}

fn map_unique_violation(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict("a cart already exists for this identity".to_owned());
    }
    RepositoryError::Database(e)
}

/// Cart store backed by `PostgreSQL`.
#[derive(Clone)]
pub struct PgCartStore {
    pool: PgPool,
}

impl PgCartStore {
    /// Create a new cart store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete session-bound carts not updated since `cutoff`.
    ///
    /// User carts are never touched. Returns the number of carts removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn purge_session_carts(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            DELETE FROM storefront.cart
            WHERE session_id IS NOT NULL AND updated_at < $1
            ",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        debug!(count = result.rows_affected(), "Purged stale session carts");
        Ok(result.rows_affected())
    }

    /// Insert a first cart for its identity.
    ///
    /// If a concurrent writer inserted one first, its items are overwritten and
    /// its id kept.
    async fn insert(&self, cart: Cart) -> Result<Cart, RepositoryError> {
        let id = CartId::generate();
        let now = next_updated_at(None);
        let (user_id, session_id) = identity_columns(&cart.identity);
        let conflict_target = conflict_target(&cart.identity);

        let query = format!(
            r"
            INSERT INTO storefront.cart AS cart (id, user_id, session_id, items, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT {conflict_target} DO UPDATE
            SET items = EXCLUDED.items,
                updated_at = GREATEST(EXCLUDED.updated_at, cart.updated_at + INTERVAL '1 microsecond')
            RETURNING id, user_id, session_id, items, created_at, updated_at
            "
        );

        let row = sqlx::query_as::<_, CartRow>(&query)
            .bind(id)
            .bind(user_id)
            .bind(session_id)
            .bind(Json(&cart.items))
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        debug!(cart_id = %row.id, upserted = row.id != id.as_uuid(), "Inserted cart");
        Cart::try_from(row)
    }

    async fn replace(&self, id: CartId, cart: Cart) -> Result<Cart, RepositoryError> {
        let (user_id, session_id) = identity_columns(&cart.identity);
        let stamp = next_updated_at(Some(cart.updated_at));

        let row = sqlx::query_as::<_, CartRow>(
            r"
            UPDATE storefront.cart
            SET user_id = $2,
                session_id = $3,
                items = $4,
                updated_at = GREATEST($5, updated_at + INTERVAL '1 microsecond')
            WHERE id = $1
            RETURNING id, user_id, session_id, items, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(user_id)
        .bind(session_id)
        .bind(Json(&cart.items))
        .bind(stamp)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        row.ok_or(RepositoryError::NotFound).and_then(Cart::try_from)
    }
}

#[async_trait]
impl CartStore for PgCartStore {
    #[instrument(skip(self))]
    async fn find_by_user(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        let row = sqlx::query_as::<_, CartRow>(
            r"
            SELECT id, user_id, session_id, items, created_at, updated_at
            FROM storefront.cart
            WHERE user_id = $1
            ",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Cart::try_from).transpose()
    }

    #[instrument(skip(self, session_id))]
    async fn find_by_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<Cart>, RepositoryError> {
        let row = sqlx::query_as::<_, CartRow>(
            r"
            SELECT id, user_id, session_id, items, created_at, updated_at
            FROM storefront.cart
            WHERE session_id = $1
            ",
        )
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Cart::try_from).transpose()
    }

    #[instrument(skip(self, cart), fields(cart_id = ?cart.id, lines = cart.items.len()))]
    async fn save(&self, cart: Cart) -> Result<Cart, RepositoryError> {
        match cart.id {
            Some(id) => self.replace(id, cart).await,
            None => self.insert(cart).await,
        }
    }

    #[instrument(skip(self, session_id))]
    async fn delete_by_session(&self, session_id: &SessionId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM storefront.cart WHERE session_id = $1")
            .bind(session_id.as_str())
            .execute(&self.pool)
            .await?;

        debug!(deleted = result.rows_affected(), "Deleted session cart");
        Ok(())
    }
}
