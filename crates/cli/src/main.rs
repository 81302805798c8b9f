//! Fresh Blooms CLI - Database migrations and operations tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! fb-cli migrate
//!
//! # Load or refresh the product catalog
//! fb-cli seed --file crates/cli/catalog.yaml
//!
//! # Reconcile a paid session whose webhook never arrived
//! fb-cli reconcile cs_test_a1b2c3
//!
//! # Show the order recorded for a session
//! fb-cli orders show cs_test_a1b2c3
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

use commands::CommandError;

#[derive(Parser)]
#[command(name = "fb-cli")]
#[command(author, version, about = "Fresh Blooms CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Upsert catalog products from a YAML file
    Seed {
        /// Path to the catalog file
        #[arg(short, long, default_value = "crates/cli/catalog.yaml")]
        file: String,
    },
    /// Resolve a checkout session from Stripe and reconcile it
    Reconcile {
        /// Stripe checkout session id (`cs_...`)
        session_id: String,
    },
    /// Inspect orders
    Orders {
        #[command(subcommand)]
        action: OrdersAction,
    },
}

#[derive(Subcommand)]
enum OrdersAction {
    /// Show the order for a checkout session
    Show {
        /// Stripe checkout session id (`cs_...`)
        session_id: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed { file } => commands::seed::run(&file).await?,
        Commands::Reconcile { session_id } => commands::reconcile::run(&session_id).await?,
        Commands::Orders { action } => match action {
            OrdersAction::Show { session_id } => commands::orders::show(&session_id).await?,
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
    fn test_parse_reconcile() {
        let cli = Cli::try_parse_from(["fb-cli", "reconcile", "cs_test_a1"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Reconcile { session_id }) if session_id == "cs_test_a1"
        ));
    }
}
