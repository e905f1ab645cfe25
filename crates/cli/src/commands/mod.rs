//! CLI command implementations.

pub mod carts;
pub mod migrate;

/// Read the storefront database URL, falling back to `DATABASE_URL`.
fn database_url() -> Option<String> {
    dotenvy::dotenv().ok();
    std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
}
