//! Webhook event authentication.
//!
//! Stripe signs every delivery with the endpoint's signing secret and sends
//! `Stripe-Signature: t=<unix seconds>,v1=<hex hmac>[,v1=...]`. The signed
//! message is `"{t}.{raw body}"`, so verification must run on the exact bytes
//! received, before any JSON parsing.
//!
//! Without a signing secret the body is parsed as-is. That mode exists for
//! local development against the Stripe CLI only and must never be used in
//! production: anyone who can reach `/webhook` can then mark orders paid.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{instrument, warn};

type HmacSha256 = Hmac<Sha256>;

/// Event type that triggers reconciliation.
pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

/// Maximum age of a signed timestamp, in seconds.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Allowed clock skew for timestamps from the future, in seconds.
const FUTURE_SKEW_SECS: i64 = 60;

/// Errors that reject a webhook delivery.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Signature missing, malformed, stale, or not matching the body.
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(&'static str),

    /// The (authentic) body is not a Stripe event.
    #[error("malformed webhook event: {0}")]
    Malformed(String),
}

/// An authenticated webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    /// Stripe's event id (`evt_...`), when present.
    pub id: Option<String>,
    pub kind: EventKind,
}

/// The event kinds the storefront distinguishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A customer finished paying.
    CheckoutSessionCompleted(CompletedSession),
    /// Anything else. Acknowledged and ignored.
    Unhandled {
        /// Stripe's `type` field.
        event_type: String,
    },
}

impl EventKind {
    /// Stripe's `type` string for this event.
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            Self::CheckoutSessionCompleted(_) => CHECKOUT_SESSION_COMPLETED,
            Self::Unhandled { event_type } => event_type,
        }
    }
}

/// The session object carried by `checkout.session.completed`.
///
/// Only the id is trusted downstream; the session is re-fetched from the API
/// so line items and totals come from Stripe, not from the payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompletedSession {
    pub id: String,
    pub amount_total: Option<i64>,
    pub customer_email: Option<String>,
    pub payment_status: Option<String>,
}

#[derive(Deserialize)]
struct RawEvent {
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

/// Verifies and parses webhook deliveries.
#[derive(Clone)]
pub struct WebhookAuthenticator {
    secret: Option<SecretString>,
    tolerance_secs: i64,
}

impl std::fmt::Debug for WebhookAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookAuthenticator")
            .field("verifies", &self.secret.is_some())
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl WebhookAuthenticator {
    /// Create an authenticator. `None` disables signature checks.
    #[must_use]
    pub const fn new(secret: Option<SecretString>) -> Self {
        Self {
            secret,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Override the replay window.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Whether deliveries are signature-checked.
    #[must_use]
    pub const fn verifies(&self) -> bool {
        self.secret.is_some()
    }

    /// Authenticate a delivery against the current time.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidSignature` if verification is enabled and
    /// fails, or `AuthError::Malformed` if the body is not an event.
    pub fn authenticate(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookEvent, AuthError> {
        self.authenticate_at(raw_body, signature_header, chrono::Utc::now().timestamp())
    }

    /// Authenticate a delivery as of `now` (unix seconds).
    ///
    /// # Errors
    ///
    /// See [`WebhookAuthenticator::authenticate`].
    #[instrument(skip(self, raw_body, signature_header), fields(body_len = raw_body.len()))]
    pub fn authenticate_at(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
        now: i64,
    ) -> Result<WebhookEvent, AuthError> {
        match &self.secret {
            Some(secret) => {
                let header = signature_header
                    .ok_or(AuthError::InvalidSignature("missing Stripe-Signature header"))?;
                verify_signature(raw_body, header, secret, now, self.tolerance_secs)?;
            }
            None => warn!("STRIPE_WEBHOOK_SECRET not set, accepting unsigned webhook"),
        }

        parse_event(raw_body)
    }
}

/// Check a `Stripe-Signature` header against the raw body.
fn verify_signature(
    raw_body: &[u8],
    header: &str,
    secret: &SecretString,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), AuthError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = Some(value),
            "v1" => signatures.push(value),
            // v0 and unknown schemes are ignored
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(AuthError::InvalidSignature("no timestamp in header"))?;
    if signatures.is_empty() {
        return Err(AuthError::InvalidSignature("no v1 signature in header"));
    }

    let signed_at: i64 = timestamp
        .parse()
        .map_err(|_| AuthError::InvalidSignature("timestamp is not an integer"))?;
    let age = now.saturating_sub(signed_at);
    if age > tolerance_secs {
        warn!(age, tolerance_secs, "Stripe webhook rejected: timestamp too old");
        return Err(AuthError::InvalidSignature("timestamp outside tolerance"));
    }
    if age < -FUTURE_SKEW_SECS {
        warn!(age, "Stripe webhook rejected: timestamp in the future");
        return Err(AuthError::InvalidSignature("timestamp in the future"));
    }

    let mac = signed_payload_mac(secret, timestamp, raw_body)?;

    // Constant-time comparison against each candidate; hex of the wrong
    // length or alphabet simply never matches.
    let matched = signatures.iter().any(|candidate| {
        hex::decode(candidate).is_ok_and(|bytes| mac.clone().verify_slice(&bytes).is_ok())
    });

    if matched {
        Ok(())
    } else {
        Err(AuthError::InvalidSignature("signature mismatch"))
    }
}

fn signed_payload_mac(
    secret: &SecretString,
    timestamp: &str,
    raw_body: &[u8],
) -> Result<HmacSha256, AuthError> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| AuthError::InvalidSignature("unusable signing secret"))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(raw_body);
    Ok(mac)
}

/// Build a `Stripe-Signature` header value for `raw_body`.
///
/// Mirrors what Stripe sends; used to sign test deliveries.
///
/// # Errors
///
/// Returns `AuthError::InvalidSignature` if the secret cannot key an HMAC.
pub fn signature_header(
    secret: &SecretString,
    timestamp: i64,
    raw_body: &[u8],
) -> Result<String, AuthError> {
    let timestamp = timestamp.to_string();
    let mac = signed_payload_mac(secret, &timestamp, raw_body)?;
    Ok(format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

fn parse_event(raw_body: &[u8]) -> Result<WebhookEvent, AuthError> {
    let raw: RawEvent =
        serde_json::from_slice(raw_body).map_err(|e| AuthError::Malformed(e.to_string()))?;

    let kind = match raw.event_type.as_str() {
        CHECKOUT_SESSION_COMPLETED => {
            let session: CompletedSession = serde_json::from_value(raw.data.object)
                .map_err(|e| AuthError::Malformed(format!("checkout session: {e}")))?;
            EventKind::CheckoutSessionCompleted(session)
        }
        _ => EventKind::Unhandled {
            event_type: raw.event_type,
        },
    };

    Ok(WebhookEvent { id: raw.id, kind })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_4eC39HqLyjWDarjtT1zdp7dc";
    const NOW: i64 = 1_760_000_000;

    fn completed_body() -> Vec<u8> {
        br#"{
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_test_a1",
                "object": "checkout.session",
                "amount_total": 99800,
                "customer_email": "asha@example.com",
                "payment_status": "paid"
            } }
        }"#
        .to_vec()
    }

    fn signed() -> WebhookAuthenticator {
        WebhookAuthenticator::new(Some(SecretString::from(SECRET)))
    }

    fn header_for(body: &[u8], timestamp: i64) -> String {
        signature_header(&SecretString::from(SECRET), timestamp, body).unwrap()
    }

    #[test]
    fn test_valid_signature_parses_completed_session() {
        let body = completed_body();
        let event = signed()
            .authenticate_at(&body, Some(&header_for(&body, NOW)), NOW)
            .unwrap();

        assert_eq!(event.id.as_deref(), Some("evt_1"));
        let EventKind::CheckoutSessionCompleted(session) = event.kind else {
            panic!("expected a completed session");
        };
        assert_eq!(session.id, "cs_test_a1");
        assert_eq!(session.amount_total, Some(99_800));
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let body = completed_body();
        let header = header_for(&body, NOW);
        let tampered = String::from_utf8(body).unwrap().replace("99800", "100");

        let result = signed().authenticate_at(tampered.as_bytes(), Some(&header), NOW);
        assert_eq!(result, Err(AuthError::InvalidSignature("signature mismatch")));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let body = completed_body();
        let header =
            signature_header(&SecretString::from("whsec_other"), NOW, &body).unwrap();
        assert!(matches!(
            signed().authenticate_at(&body, Some(&header), NOW),
            Err(AuthError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_missing_or_malformed_header_is_rejected() {
        let body = completed_body();
        for header in [None, Some(""), Some("t=abc,v1=00"), Some("v1=00"), Some("t=1760000000")] {
            assert!(
                matches!(
                    signed().authenticate_at(&body, header, NOW),
                    Err(AuthError::InvalidSignature(_))
                ),
                "header {header:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_non_hex_signature_is_rejected() {
        let body = completed_body();
        let header = format!("t={NOW},v1=not-hex");
        assert_eq!(
            signed().authenticate_at(&body, Some(&header), NOW),
            Err(AuthError::InvalidSignature("signature mismatch"))
        );
    }

    #[test]
    fn test_any_matching_v1_is_accepted() {
        let body = completed_body();
        let valid = header_for(&body, NOW);
        let (_, good_sig) = valid.split_once(",v1=").unwrap();
        let header = format!("t={NOW},v1={},v1={good_sig},v0=ignored", "0".repeat(64));

        assert!(signed().authenticate_at(&body, Some(&header), NOW).is_ok());
    }

    #[test]
    fn test_stale_and_future_timestamps_are_rejected() {
        let body = completed_body();
        let stale = header_for(&body, NOW - DEFAULT_TOLERANCE_SECS - 1);
        let future = header_for(&body, NOW + FUTURE_SKEW_SECS + 1);
        let skewed = header_for(&body, NOW + 30);

        assert_eq!(
            signed().authenticate_at(&body, Some(&stale), NOW),
            Err(AuthError::InvalidSignature("timestamp outside tolerance"))
        );
        assert_eq!(
            signed().authenticate_at(&body, Some(&future), NOW),
            Err(AuthError::InvalidSignature("timestamp in the future"))
        );
        assert!(signed().authenticate_at(&body, Some(&skewed), NOW).is_ok());
    }

    #[test]
    fn test_custom_tolerance() {
        let body = completed_body();
        let header = header_for(&body, NOW - 100);
        let strict = signed().with_tolerance(60);
        assert!(strict.authenticate_at(&body, Some(&header), NOW).is_err());
    }

    #[test]
    fn test_unsigned_mode_parses_without_header() {
        let authenticator = WebhookAuthenticator::new(None);
        assert!(!authenticator.verifies());

        let event = authenticator
            .authenticate_at(&completed_body(), None, NOW)
            .unwrap();
        assert!(matches!(event.kind, EventKind::CheckoutSessionCompleted(_)));
    }

    #[test]
    fn test_unhandled_event_type() {
        let body = br#"{"id":"evt_2","type":"payment_intent.created","data":{"object":{"id":"pi_1"}}}"#;
        let event = WebhookAuthenticator::new(None)
            .authenticate_at(body, None, NOW)
            .unwrap();
        assert_eq!(
            event.kind,
            EventKind::Unhandled {
                event_type: "payment_intent.created".to_string()
            }
        );
        assert_eq!(event.kind.event_type(), "payment_intent.created");
    }

    #[test]
    fn test_malformed_bodies() {
        let authenticator = WebhookAuthenticator::new(None);
        assert!(matches!(
            authenticator.authenticate_at(b"not json", None, NOW),
            Err(AuthError::Malformed(_))
        ));

        let no_session_id =
            br#"{"type":"checkout.session.completed","data":{"object":{"amount_total":1}}}"#;
        assert!(matches!(
            authenticator.authenticate_at(no_session_id, None, NOW),
            Err(AuthError::Malformed(_))
        ));
    }

    #[test]
    fn test_signature_checked_before_parsing() {
        let garbage = b"not json";
        assert!(matches!(
            signed().authenticate_at(garbage, Some("t=1,v1=00"), NOW),
            Err(AuthError::InvalidSignature(_))
        ));
    }
}
