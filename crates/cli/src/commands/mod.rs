//! Subcommand implementations.

pub mod migrate;
pub mod orders;
pub mod reconcile;
pub mod seed;

use secrecy::SecretString;
use thiserror::Error;

use fresh_blooms_storefront::config::ConfigError;
use fresh_blooms_storefront::db::RepositoryError;
use fresh_blooms_storefront::services::{ReconcileError, ResolverError};
use fresh_blooms_storefront::stripe::StripeError;

/// Errors a command can fail with.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid catalog file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Catalog validation failed: {0}")]
    Catalog(String),

    #[error("Stripe error: {0}")]
    Stripe(#[from] StripeError),

    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolverError),

    #[error("Reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Output error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No order for session {0}")]
    OrderNotFound(String),
}

/// Storefront database URL from `STOREFRONT_DATABASE_URL`, falling back to
/// `DATABASE_URL`.
fn database_url() -> Result<SecretString, CommandError> {
    dotenvy::dotenv().ok();

    std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("STOREFRONT_DATABASE_URL"))
}

/// Print a value as pretty JSON on stdout.
fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CommandError> {
    let rendered = serde_json::to_string_pretty(value)?;
    #[allow(clippy::print_stdout)]
    {
        println!("{rendered}");
    }
    Ok(())
}
