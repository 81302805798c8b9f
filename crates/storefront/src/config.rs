//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STRIPE_SECRET_KEY` - Stripe API secret key (`sk_...` or restricted `rk_...`)
//!
//! ## Optional
//! - `STRIPE_WEBHOOK_SECRET` - Webhook signing secret (`whsec_...`). When unset,
//!   webhook signatures are NOT verified. Never deploy without it.
//! - `STOREFRONT_BASE_URL` - Public URL used for checkout redirects (default: `http://localhost:4242`)
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 4242)
//! - `STRIPE_API_BASE` - Stripe API origin (default: `https://api.stripe.com`)
//! - `CHECKOUT_CURRENCY` - ISO currency code for line items (default: inr)
//! - `PROVIDER_TIMEOUT_SECS` - Timeout for Stripe API calls (default: 10)
//! - `STORAGE_TIMEOUT_SECS` - Timeout for database work (default: 10)
//! - `DATABASE_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `LOG_FORMAT` - `json` for JSON logs, anything else for human-readable

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "your_",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "insert",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Maximum pool connections
    pub database_max_connections: u32,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL, used to build checkout success/cancel redirects
    pub base_url: Url,
    /// Stripe API configuration
    pub stripe: StripeConfig,
    /// Upper bound for the database part of a reconciliation
    pub storage_timeout: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Log output format
    pub log_format: LogFormat,
}

/// Stripe API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct StripeConfig {
    /// API secret key
    pub secret_key: SecretString,
    /// Webhook signing secret; `None` disables signature verification
    pub webhook_secret: Option<SecretString>,
    /// API origin, overridable for stripe-mock in local development
    pub api_base: Url,
    /// Lower-case ISO 4217 currency for checkout line items
    pub currency: String,
    /// Per-request timeout for outbound API calls
    pub timeout: Duration,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("api_base", &self.api_base.as_str())
            .field("currency", &self.currency)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, key prefix).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let database_max_connections = get_parsed_or_default("DATABASE_MAX_CONNECTIONS", 10)?;
        let host = get_parsed_or_default("STOREFRONT_HOST", IpAddr::from([127, 0, 0, 1]))?;
        let port = get_parsed_or_default("STOREFRONT_PORT", 4242)?;
        let base_url = parse_http_url(
            "STOREFRONT_BASE_URL",
            &get_env_or_default("STOREFRONT_BASE_URL", "http://localhost:4242"),
        )?;
        let storage_timeout =
            Duration::from_secs(get_parsed_or_default("STORAGE_TIMEOUT_SECS", 10)?);

        let stripe = StripeConfig::from_env()?;
        let log_format = match get_optional_env("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            base_url,
            stripe,
            storage_timeout,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            log_format,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl StripeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let secret_key = get_required_env("STRIPE_SECRET_KEY")?;
        validate_stripe_key(&secret_key, "STRIPE_SECRET_KEY", &["sk_", "rk_"])?;

        let webhook_secret = match get_optional_env("STRIPE_WEBHOOK_SECRET") {
            Some(value) if !value.trim().is_empty() => {
                validate_stripe_key(&value, "STRIPE_WEBHOOK_SECRET", &["whsec_"])?;
                Some(SecretString::from(value))
            }
            _ => None,
        };

        let api_base = parse_http_url(
            "STRIPE_API_BASE",
            &get_env_or_default("STRIPE_API_BASE", "https://api.stripe.com"),
        )?;
        let currency = get_env_or_default("CHECKOUT_CURRENCY", "inr").to_ascii_lowercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::InvalidEnvVar(
                "CHECKOUT_CURRENCY".to_string(),
                format!("expected a 3-letter ISO code, got {currency:?}"),
            ));
        }
        let timeout = Duration::from_secs(get_parsed_or_default("PROVIDER_TIMEOUT_SECS", 10)?);

        Ok(Self {
            secret_key: SecretString::from(secret_key),
            webhook_secret,
            api_base,
            currency,
            timeout,
        })
    }

    /// Whether inbound webhooks are signature-checked.
    #[must_use]
    pub const fn verifies_webhooks(&self) -> bool {
        self.webhook_secret.is_some()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, or use `default` when it is unset.
fn get_parsed_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

/// Parse an absolute http(s) URL.
fn parse_http_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected an http(s) URL with a host, got {raw}"),
        ));
    }
    Ok(url)
}

/// Reject placeholders and keys of the wrong kind.
fn validate_stripe_key(value: &str, var_name: &str, prefixes: &[&str]) -> Result<(), ConfigError> {
    let lower = value.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    if !prefixes.iter().any(|prefix| value.starts_with(prefix)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("expected a key starting with one of {prefixes:?}"),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn stripe_config(webhook_secret: Option<&str>) -> StripeConfig {
        StripeConfig {
            secret_key: SecretString::from("sk_test_51Hq9fGa8s7d6f5g4h3j2k1"),
            webhook_secret: webhook_secret.map(SecretString::from),
            api_base: Url::parse("https://api.stripe.com").unwrap(),
            currency: "inr".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_validate_stripe_key_placeholder() {
        let result = validate_stripe_key("sk_test_your-key-here", "STRIPE_SECRET_KEY", &["sk_"]);
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_stripe_key_wrong_prefix() {
        let result = validate_stripe_key("pk_live_9aK2mQ7", "STRIPE_SECRET_KEY", &["sk_", "rk_"]);
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_stripe_key_valid() {
        assert!(validate_stripe_key("rk_live_9aK2mQ7pLz", "STRIPE_SECRET_KEY", &["sk_", "rk_"]).is_ok());
        assert!(validate_stripe_key("whsec_3Jd8sKq0Zp", "STRIPE_WEBHOOK_SECRET", &["whsec_"]).is_ok());
    }

    #[test]
    fn test_parse_http_url() {
        assert!(parse_http_url("X", "https://blooms.example.in").is_ok());
        assert!(parse_http_url("X", "ftp://blooms.in").is_err());
        assert!(parse_http_url("X", "not a url").is_err());
    }

    #[test]
    fn test_verifies_webhooks() {
        assert!(stripe_config(Some("whsec_3Jd8sKq0Zp")).verifies_webhooks());
        assert!(!stripe_config(None).verifies_webhooks());
    }

    #[test]
    fn test_socket_addr() {
        let config = StorefrontConfig {
            database_url: SecretString::from("postgres://localhost/fresh_blooms"),
            database_max_connections: 10,
            host: "127.0.0.1".parse().unwrap(),
            port: 4242,
            base_url: Url::parse("http://localhost:4242").unwrap(),
            stripe: stripe_config(None),
            storage_timeout: Duration::from_secs(10),
            sentry_dsn: None,
            sentry_environment: None,
            log_format: LogFormat::Pretty,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 4242);
    }

    #[test]
    fn test_stripe_config_debug_redacts_secrets() {
        let config = stripe_config(Some("whsec_super_sensitive_value"));
        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("api.stripe.com"));
        assert!(debug_output.contains("inr"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("sk_test_51Hq9fGa8s7d6f5g4h3j2k1"));
        assert!(!debug_output.contains("whsec_super_sensitive_value"));
    }
}
