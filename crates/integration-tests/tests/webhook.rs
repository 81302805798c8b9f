//! Webhook authentication and dispatch, end to end without the network.

#![allow(clippy::unwrap_used)]

use chrono::Utc;
use url::Url;

use fresh_blooms_core::{OrderStatus, Paise, ProductId};
use fresh_blooms_integration_tests::fixtures::{
    STORAGE_TIMEOUT, WEBHOOK_SECRET, cart_item, catalog, completed_event, event_of_type,
    linked_line, paid_session, sign, webhook_secret,
};
use fresh_blooms_integration_tests::{FakeGateway, MemoryStore, ResolveFault};
use fresh_blooms_storefront::services::{
    AuthError, CheckoutInitiator, ReconciliationEngine, WebhookAuthenticator, WebhookError,
    WebhookOutcome, WebhookProcessor, signature_header,
};
use secrecy::SecretString;

struct Harness {
    gateway: FakeGateway,
    store: MemoryStore,
    authenticator: WebhookAuthenticator,
    processor: WebhookProcessor<FakeGateway, MemoryStore>,
}

impl Harness {
    fn new() -> Self {
        let gateway = FakeGateway::new();
        let store = MemoryStore::with_products(catalog());
        Self {
            authenticator: WebhookAuthenticator::new(Some(webhook_secret())),
            processor: WebhookProcessor::new(
                gateway.clone(),
                ReconciliationEngine::new(store.clone(), STORAGE_TIMEOUT),
            ),
            gateway,
            store,
        }
    }

    /// Authenticate then process, the way the route does.
    async fn deliver(&self, body: &[u8], signature: Option<&str>) -> Result<WebhookOutcome, DeliveryError> {
        let event = self
            .authenticator
            .authenticate(body, signature)
            .map_err(DeliveryError::Rejected)?;
        self.processor
            .process(event)
            .await
            .map_err(DeliveryError::Failed)
    }
}

#[derive(Debug)]
enum DeliveryError {
    Rejected(AuthError),
    Failed(WebhookError),
}

#[tokio::test]
async fn test_rose_bouquet_checkout_to_paid_order() {
    let h = Harness::new();
    let initiator = CheckoutInitiator::new(
        h.gateway.clone(),
        h.store.clone(),
        Url::parse("http://localhost:4242").unwrap(),
        "inr".to_string(),
    );

    let created = initiator
        .create_session(&[cart_item(7, "Rose Bouquet", 49_900, 2)], None)
        .await
        .unwrap();
    let pending = h.store.order_by_session(&created.session_id).await.unwrap();
    assert_eq!(pending.status, OrderStatus::Pending);
    assert_eq!(pending.total_amount_paise, Paise::new(99_800));

    let body = completed_event(&created.session_id);
    let signature = sign(&body).unwrap();
    let outcome = h.deliver(&body, Some(&signature)).await.unwrap();
    assert!(matches!(outcome, WebhookOutcome::Reconciled(_)));

    let orders = h.store.orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].id, pending.id);
    assert_eq!(orders[0].status, OrderStatus::Paid);
    assert_eq!(orders[0].total_amount_paise, Paise::new(99_800));

    let items = h.store.items(pending.id).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_id, Some(ProductId::new(7)));
    assert_eq!(items[0].quantity, 2);
    assert_eq!(items[0].unit_price_paise, Paise::new(49_900));
    assert_eq!(h.store.stock(ProductId::new(7)).await, Some(10));
}

#[tokio::test]
async fn test_double_delivery_yields_one_order_and_one_item_set() {
    let h = Harness::new();
    h.gateway
        .insert_session(paid_session(
            "cs_test_dup",
            vec![
                linked_line("li_1", 7, "Rose Bouquet", 49_900, 1),
                linked_line("li_2", 1, "Sunflower Bunch", 29_900, 2),
            ],
        ))
        .await;

    let body = completed_event("cs_test_dup");
    let signature = sign(&body).unwrap();
    h.deliver(&body, Some(&signature)).await.unwrap();
    let second = h.deliver(&body, Some(&signature)).await.unwrap();

    let WebhookOutcome::Reconciled(replay) = second else {
        panic!("expected a reconciliation, got {second:?}");
    };
    assert!(replay.is_replay());

    let orders = h.store.orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Paid);
    assert_eq!(h.store.all_items().await.len(), 2);
    assert_eq!(h.store.stock(ProductId::new(7)).await, Some(11));
    assert_eq!(h.store.stock(ProductId::new(1)).await, Some(23));
}

#[tokio::test]
async fn test_tampered_body_is_rejected_before_resolution() {
    let h = Harness::new();
    h.gateway
        .insert_session(paid_session(
            "cs_test_real",
            vec![linked_line("li_1", 7, "Rose Bouquet", 49_900, 1)],
        ))
        .await;

    let signed_body = completed_event("cs_test_real");
    let signature = sign(&signed_body).unwrap();
    let tampered = completed_event("cs_test_forged");

    let err = h.deliver(&tampered, Some(&signature)).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Rejected(AuthError::InvalidSignature(_))));
    assert_eq!(h.gateway.resolve_calls().await, 0);
    assert!(h.store.orders().await.is_empty());
}

#[tokio::test]
async fn test_wrong_secret_and_missing_header_are_rejected() {
    let h = Harness::new();
    let body = completed_event("cs_test_any");

    let forged = signature_header(
        &SecretString::from("whsec_attacker_guess"),
        Utc::now().timestamp(),
        &body,
    )
    .unwrap();
    assert!(matches!(
        h.deliver(&body, Some(&forged)).await,
        Err(DeliveryError::Rejected(AuthError::InvalidSignature(_)))
    ));
    assert!(matches!(
        h.deliver(&body, None).await,
        Err(DeliveryError::Rejected(AuthError::InvalidSignature(_)))
    ));

    // Rejection does not depend on the claimed event type.
    let other = event_of_type("payment_intent.succeeded");
    assert!(matches!(
        h.deliver(&other, Some(&forged)).await,
        Err(DeliveryError::Rejected(AuthError::InvalidSignature(_)))
    ));
    assert_eq!(h.gateway.resolve_calls().await, 0);
}

#[tokio::test]
async fn test_stale_signature_is_rejected() {
    let h = Harness::new();
    let body = completed_event("cs_test_old");
    let stale = signature_header(
        &SecretString::from(WEBHOOK_SECRET),
        Utc::now().timestamp() - 3_600,
        &body,
    )
    .unwrap();

    let err = h.deliver(&body, Some(&stale)).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Rejected(AuthError::InvalidSignature(_))));
}

#[tokio::test]
async fn test_other_event_types_are_acknowledged_untouched() {
    let h = Harness::new();
    let body = event_of_type("payment_intent.created");
    let signature = sign(&body).unwrap();

    let outcome = h.deliver(&body, Some(&signature)).await.unwrap();

    assert_eq!(
        outcome,
        WebhookOutcome::Ignored {
            event_type: "payment_intent.created".to_string()
        }
    );
    assert_eq!(h.gateway.resolve_calls().await, 0);
    assert!(h.store.orders().await.is_empty());
}

#[tokio::test]
async fn test_unknown_session_is_acknowledged() {
    let h = Harness::new();
    let body = completed_event("cs_test_missing");
    let signature = sign(&body).unwrap();

    let outcome = h.deliver(&body, Some(&signature)).await.unwrap();

    assert_eq!(
        outcome,
        WebhookOutcome::SessionNotFound {
            session_id: "cs_test_missing".to_string()
        }
    );
    assert!(h.store.orders().await.is_empty());
}

#[tokio::test]
async fn test_transient_resolution_failure_is_retried_by_redelivery() {
    let h = Harness::new();
    h.gateway
        .insert_session(paid_session(
            "cs_test_flaky",
            vec![linked_line("li_1", 3, "Tulip Mix", 19_900, 5)],
        ))
        .await;
    h.gateway
        .fail_resolve("cs_test_flaky", ResolveFault::Unavailable)
        .await;

    let body = completed_event("cs_test_flaky");
    let signature = sign(&body).unwrap();

    let err = h.deliver(&body, Some(&signature)).await.unwrap_err();
    let DeliveryError::Failed(WebhookError::Resolve { session_id, source }) = err else {
        panic!("expected a resolve failure, got {err:?}");
    };
    assert_eq!(session_id, "cs_test_flaky");
    assert!(source.is_retryable());
    assert!(h.store.orders().await.is_empty());

    h.gateway.heal_resolve("cs_test_flaky").await;
    h.deliver(&body, Some(&signature)).await.unwrap();
    assert_eq!(h.store.stock(ProductId::new(3)).await, Some(25));
}

#[tokio::test]
async fn test_not_found_fault_is_not_retried() {
    let h = Harness::new();
    h.gateway
        .fail_resolve("cs_test_gone", ResolveFault::NotFound)
        .await;
    let body = completed_event("cs_test_gone");
    let signature = sign(&body).unwrap();

    let outcome = h.deliver(&body, Some(&signature)).await.unwrap();
    assert!(matches!(outcome, WebhookOutcome::SessionNotFound { .. }));
}

#[tokio::test]
async fn test_unsigned_deliveries_accepted_without_secret() {
    let gateway = FakeGateway::new();
    let store = MemoryStore::with_products(catalog());
    gateway
        .insert_session(paid_session(
            "cs_test_local",
            vec![linked_line("li_1", 7, "Rose Bouquet", 49_900, 1)],
        ))
        .await;
    let authenticator = WebhookAuthenticator::new(None);
    let processor = WebhookProcessor::new(
        gateway,
        ReconciliationEngine::new(store.clone(), STORAGE_TIMEOUT),
    );

    let event = authenticator
        .authenticate(&completed_event("cs_test_local"), None)
        .unwrap();
    processor.process(event).await.unwrap();

    assert_eq!(store.orders().await.len(), 1);
}
