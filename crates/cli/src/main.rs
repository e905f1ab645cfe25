//! Bazaar CLI - database migrations and cart maintenance.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! bazaar-cli migrate
//!
//! # Delete guest carts not updated in the last 30 days
//! bazaar-cli carts purge-sessions --older-than-days 30
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "bazaar-cli")]
#[command(author, version, about = "Bazaar CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Cart maintenance
    Carts {
        #[command(subcommand)]
        action: CartsAction,
    },
}

#[derive(Subcommand)]
enum CartsAction {
    /// Delete stale guest carts
    PurgeSessions {
        /// Delete session carts not updated for this many days
        #[arg(long, default_value_t = 30)]
        older_than_days: u32,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::Carts { action } => match action {
            CartsAction::PurgeSessions { older_than_days } => {
                commands::carts::purge_sessions(older_than_days).await?;
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_purge_sessions_args() {
        let cli = Cli::try_parse_from([
            "bazaar-cli",
            "carts",
            "purge-sessions",
            "--older-than-days",
            "14",
        ])
        .unwrap_or_else(|e| panic!("{e}"));

        assert!(matches!(
            cli.command,
            Commands::Carts {
                action: CartsAction::PurgeSessions { older_than_days: 14 }
            }
        ));
    }
}
