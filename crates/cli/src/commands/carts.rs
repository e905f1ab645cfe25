//! Cart maintenance commands.
//!
//! # Usage
//!
//! ```bash
//! # Delete guest carts untouched for 30 days
//! bazaar-cli carts purge-sessions --older-than-days 30
//! ```
//!
//! Carts of signed-in users are never purged.

use bazaar_storefront::db::{PgCartStore, RepositoryError};
use chrono::{TimeDelta, Utc};
use sqlx::PgPool;
use thiserror::Error;

/// Errors that can occur during cart maintenance.
#[derive(Debug, Error)]
pub enum CartsError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Purge failed: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Invalid age: {0} days")]
    InvalidAge(u32),
}

/// Delete session carts last updated more than `older_than_days` days ago.
///
/// Returns the number of carts deleted.
pub async fn purge_sessions(older_than_days: u32) -> Result<u64, CartsError> {
    if older_than_days == 0 {
        return Err(CartsError::InvalidAge(older_than_days));
    }
    let cutoff = Utc::now() - TimeDelta::days(i64::from(older_than_days));

    let database_url =
        super::database_url().ok_or(CartsError::MissingEnvVar("STOREFRONT_DATABASE_URL"))?;

    tracing::info!("Connecting to storefront database...");
    let pool = PgPool::connect(&database_url).await?;

    let store = PgCartStore::new(pool);
    let deleted = store.purge_session_carts(cutoff).await?;

    tracing::info!(deleted, %cutoff, "Purged session carts");
    Ok(deleted)
}
