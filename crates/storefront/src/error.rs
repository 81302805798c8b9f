//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//! Error bodies are JSON: `{ "error": "<message>" }`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::{AuthError, InitiatorError, WebhookError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Checkout session creation failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] InitiatorError),

    /// Webhook delivery failed authentication.
    #[error("Webhook Error: {0}")]
    WebhookAuth(#[from] AuthError),

    /// Webhook event could not be processed; the provider will redeliver.
    #[error("Webhook processing error: {0}")]
    Webhook(#[from] WebhookError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Webhook(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Checkout(err) => match err {
                InitiatorError::EmptyCart
                | InitiatorError::InvalidItem(_)
                | InitiatorError::InvalidEmail(_) => StatusCode::BAD_REQUEST,
                InitiatorError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
                InitiatorError::Provider(_) => StatusCode::BAD_GATEWAY,
            },
            Self::WebhookAuth(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Whether this error is reported to Sentry.
    fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, "Client error");
        }

        let status = self.status();

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Database(_) | Self::Webhook(_) | Self::Internal(_) => {
                "Internal server error".to_string()
            }
            Self::Checkout(err) => match err {
                InitiatorError::Transient(_) => {
                    "Payment provider unavailable, please try again".to_string()
                }
                InitiatorError::Provider(_) => "Could not start checkout".to_string(),
                client => client.to_string(),
            },
            Self::WebhookAuth(err) => format!("Webhook Error: {err}"),
            Self::NotFound(what) => format!("Not found: {what}"),
            Self::BadRequest(reason) => reason.clone(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Add a breadcrumb to the current Sentry scope.
///
/// Breadcrumbs appear in Sentry error reports to show what led up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("webhook", "Event received", Some(&[("event_type", "checkout.session.completed")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
