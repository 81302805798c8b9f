//! Reconciliation engine guarantees, against the in-memory store.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use fresh_blooms_core::{OrderStatus, Paise, ProductId};
use fresh_blooms_integration_tests::fixtures::{
    BUYER_EMAIL, STORAGE_TIMEOUT, catalog, linked_line, paid_session, product, unlinked_line,
};
use fresh_blooms_integration_tests::{Faults, MemoryStore};
use fresh_blooms_storefront::db::OrderStore;
use fresh_blooms_storefront::models::{NewPendingOrder, UpsertOutcome};
use fresh_blooms_storefront::services::reconcile::UNKNOWN_PRODUCT_NAME;
use fresh_blooms_storefront::services::{ReconcileError, ReconciliationEngine};

fn engine(store: &MemoryStore) -> ReconciliationEngine<MemoryStore> {
    ReconciliationEngine::new(store.clone(), STORAGE_TIMEOUT)
}

const ROSES: ProductId = ProductId::new(7);
const TULIPS: ProductId = ProductId::new(3);
const SUNFLOWERS: ProductId = ProductId::new(1);

#[tokio::test]
async fn test_creates_paid_order_when_no_pending_row() {
    let store = MemoryStore::with_products(catalog());
    let session = paid_session(
        "cs_test_new",
        vec![linked_line("li_1", 7, "Rose Bouquet", 49_900, 2)],
    );

    let result = engine(&store).reconcile(&session).await.unwrap();
    assert_eq!(result.order, UpsertOutcome::Created);
    assert_eq!(result.items_recorded, 1);

    let order = store.order_by_session("cs_test_new").await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.total_amount_paise, Paise::new(99_800));
    assert_eq!(order.customer_email.as_deref(), Some(BUYER_EMAIL));
    assert_eq!(store.orders().await.len(), 1);
}

#[tokio::test]
async fn test_promotes_pending_order_and_keeps_its_email() {
    let store = MemoryStore::with_products(catalog());
    let pending_id = store
        .insert_pending_order(&NewPendingOrder {
            stripe_session_id: "cs_test_pending",
            customer_email: Some("first@example.in"),
            total: Paise::new(59_800),
        })
        .await
        .unwrap()
        .unwrap();

    let session = paid_session(
        "cs_test_pending",
        vec![linked_line("li_1", 1, "Sunflower Bunch", 29_900, 2)],
    );
    let result = engine(&store).reconcile(&session).await.unwrap();

    assert_eq!(result.order, UpsertOutcome::Promoted);
    assert_eq!(result.order_id, pending_id);

    let orders = store.orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Paid);
    assert_eq!(orders[0].total_amount_paise, Paise::new(59_800));
    assert_eq!(orders[0].customer_email.as_deref(), Some("first@example.in"));
}

#[tokio::test]
async fn test_provider_total_replaces_pending_total() {
    let store = MemoryStore::with_products(catalog());
    store
        .insert_pending_order(&NewPendingOrder {
            stripe_session_id: "cs_test_discount",
            customer_email: None,
            total: Paise::new(49_900),
        })
        .await
        .unwrap();

    let mut session = paid_session(
        "cs_test_discount",
        vec![linked_line("li_1", 7, "Rose Bouquet", 49_900, 1)],
    );
    session.amount_total = Paise::new(44_910);
    engine(&store).reconcile(&session).await.unwrap();

    let order = store.order_by_session("cs_test_discount").await.unwrap();
    assert_eq!(order.total_amount_paise, Paise::new(44_910));
    assert_eq!(order.customer_email.as_deref(), Some(BUYER_EMAIL));
}

#[tokio::test]
async fn test_same_session_twice_records_items_once() {
    let store = MemoryStore::with_products(catalog());
    let session = paid_session(
        "cs_test_twice",
        vec![
            linked_line("li_1", 7, "Rose Bouquet", 49_900, 2),
            linked_line("li_2", 3, "Tulip Mix", 19_900, 1),
            unlinked_line("li_3", Some("Gift wrap"), 5_000, 1),
        ],
    );
    let engine = engine(&store);

    let first = engine.reconcile(&session).await.unwrap();
    assert_eq!(first.items_recorded, 3);
    assert!(!first.is_replay());

    let second = engine.reconcile(&session).await.unwrap();
    assert_eq!(second.order, UpsertOutcome::Promoted);
    assert_eq!(second.order_id, first.order_id);
    assert_eq!(second.items_recorded, 0);
    assert_eq!(second.items_skipped, 3);
    assert!(second.stock_adjustments.is_empty());
    assert!(second.is_replay());

    assert_eq!(store.orders().await.len(), 1);
    assert_eq!(store.all_items().await.len(), 3);
    assert_eq!(store.stock(ROSES).await, Some(10));
    assert_eq!(store.stock(TULIPS).await, Some(29));
}

#[tokio::test]
async fn test_stock_is_clamped_at_zero() {
    let store = MemoryStore::with_products([product(7, "Rose Bouquet", 49_900, 3)]);
    let engine = engine(&store);

    // S = 3, quantities 2, 2, 5: max(0, 3 - 9) = 0
    for (session_id, qty) in [("cs_a", 2), ("cs_b", 2), ("cs_c", 5)] {
        let session = paid_session(
            session_id,
            vec![linked_line("li_1", 7, "Rose Bouquet", 49_900, qty)],
        );
        engine.reconcile(&session).await.unwrap();
    }

    assert_eq!(store.stock(ROSES).await, Some(0));
    assert_eq!(store.all_items().await.len(), 3);
}

#[tokio::test]
async fn test_stock_follows_sum_of_quantities_while_positive() {
    let store = MemoryStore::with_products([product(1, "Sunflower Bunch", 29_900, 25)]);
    let engine = engine(&store);

    let quantities = [1_u32, 4, 3, 7];
    for (i, qty) in quantities.iter().enumerate() {
        let session = paid_session(
            &format!("cs_seq_{i}"),
            vec![linked_line("li_1", 1, "Sunflower Bunch", 29_900, *qty)],
        );
        let result = engine.reconcile(&session).await.unwrap();
        assert_eq!(result.stock_adjustments.len(), 1);
    }

    let sold: u32 = quantities.iter().sum();
    assert_eq!(
        store.stock(SUNFLOWERS).await,
        Some(25 - i32::try_from(sold).unwrap())
    );
}

#[tokio::test]
async fn test_unlinked_line_is_recorded_without_touching_stock() {
    let store = MemoryStore::with_products(catalog());
    let session = paid_session(
        "cs_test_unlinked",
        vec![unlinked_line("li_1", Some("Seasonal Surprise"), 39_900, 2)],
    );

    let result = engine(&store).reconcile(&session).await.unwrap();
    assert_eq!(result.unlinked_items, 1);
    assert!(result.stock_adjustments.is_empty());

    let items = store.items(result.order_id).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_id, None);
    assert_eq!(items[0].product_name, "Seasonal Surprise");
    assert_eq!(items[0].unit_price_paise, Paise::new(39_900));
    assert_eq!(items[0].quantity, 2);

    for product in catalog() {
        assert_eq!(store.stock(product.id).await, Some(product.stock));
    }
}

#[tokio::test]
async fn test_unknown_catalog_id_is_recorded_unlinked() {
    let store = MemoryStore::with_products(catalog());
    let session = paid_session(
        "cs_test_deleted_product",
        vec![linked_line("li_1", 99, "Discontinued Lilies", 59_900, 1)],
    );

    let result = engine(&store).reconcile(&session).await.unwrap();
    assert_eq!(result.unlinked_items, 1);

    let items = store.items(result.order_id).await;
    assert_eq!(items[0].product_id, None);
    assert_eq!(items[0].product_name, "Discontinued Lilies");
}

#[tokio::test]
async fn test_name_snapshot_falls_back_to_catalog_then_unknown() {
    let store = MemoryStore::with_products(catalog());
    let mut nameless_linked = linked_line("li_1", 3, "ignored", 19_900, 1);
    nameless_linked.description = None;
    nameless_linked.product_name = None;
    let session = paid_session(
        "cs_test_names",
        vec![nameless_linked, unlinked_line("li_2", None, 1_000, 1)],
    );

    let result = engine(&store).reconcile(&session).await.unwrap();
    let items = store.items(result.order_id).await;

    let linked = items.iter().find(|i| i.line_item_ref == "li_1").unwrap();
    assert_eq!(linked.product_name, "Tulip Mix");
    let unlinked = items.iter().find(|i| i.line_item_ref == "li_2").unwrap();
    assert_eq!(unlinked.product_name, UNKNOWN_PRODUCT_NAME);
}

#[tokio::test]
async fn test_fault_on_second_item_leaves_nothing_behind() {
    let store = MemoryStore::with_products(catalog());
    store
        .insert_pending_order(&NewPendingOrder {
            stripe_session_id: "cs_test_fault",
            customer_email: None,
            total: Paise::new(99_600),
        })
        .await
        .unwrap();
    store
        .set_faults(Faults {
            item_insert_at: Some(2),
            ..Faults::default()
        })
        .await;

    let session = paid_session(
        "cs_test_fault",
        vec![
            linked_line("li_1", 7, "Rose Bouquet", 49_900, 1),
            linked_line("li_2", 3, "Tulip Mix", 19_900, 1),
            linked_line("li_3", 1, "Sunflower Bunch", 29_900, 1),
        ],
    );
    let engine = engine(&store);

    let err = engine.reconcile(&session).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Storage(_)));

    let order = store.order_by_session("cs_test_fault").await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(store.all_items().await.is_empty());
    for product in catalog() {
        assert_eq!(store.stock(product.id).await, Some(product.stock));
    }

    // Redelivery after the fault clears applies everything exactly once.
    store.clear_faults().await;
    let result = engine.reconcile(&session).await.unwrap();
    assert_eq!(result.items_recorded, 3);
    assert_eq!(store.stock(ROSES).await, Some(11));
    assert_eq!(store.stock(TULIPS).await, Some(29));
    assert_eq!(store.stock(SUNFLOWERS).await, Some(24));
}

#[tokio::test]
async fn test_failed_commit_leaves_nothing_behind() {
    let store = MemoryStore::with_products(catalog());
    store
        .set_faults(Faults {
            commit: true,
            ..Faults::default()
        })
        .await;

    let session = paid_session(
        "cs_test_commit",
        vec![linked_line("li_1", 7, "Rose Bouquet", 49_900, 1)],
    );
    let err = engine(&store).reconcile(&session).await.unwrap_err();

    assert!(matches!(err, ReconcileError::Storage(_)));
    assert!(store.orders().await.is_empty());
    assert_eq!(store.stock(ROSES).await, Some(12));
}

#[tokio::test]
async fn test_timeout_rolls_back() {
    let store = MemoryStore::with_products(catalog());
    store
        .set_faults(Faults {
            upsert_delay: Some(Duration::from_millis(500)),
            ..Faults::default()
        })
        .await;
    let engine = ReconciliationEngine::new(store.clone(), Duration::from_millis(50));

    let session = paid_session(
        "cs_test_slow",
        vec![linked_line("li_1", 7, "Rose Bouquet", 49_900, 1)],
    );
    let err = engine.reconcile(&session).await.unwrap_err();

    assert!(matches!(err, ReconcileError::Timeout(d) if d == Duration::from_millis(50)));
    assert!(store.orders().await.is_empty());
    assert_eq!(store.stock(ROSES).await, Some(12));
}

#[tokio::test]
async fn test_new_line_items_on_redelivery_are_added() {
    let store = MemoryStore::with_products(catalog());
    let engine = engine(&store);

    let partial = paid_session(
        "cs_test_grow",
        vec![linked_line("li_1", 7, "Rose Bouquet", 49_900, 1)],
    );
    engine.reconcile(&partial).await.unwrap();

    let full = paid_session(
        "cs_test_grow",
        vec![
            linked_line("li_1", 7, "Rose Bouquet", 49_900, 1),
            linked_line("li_2", 3, "Tulip Mix", 19_900, 2),
        ],
    );
    let result = engine.reconcile(&full).await.unwrap();

    assert_eq!(result.items_recorded, 1);
    assert_eq!(result.items_skipped, 1);
    assert_eq!(store.stock(ROSES).await, Some(11));
    assert_eq!(store.stock(TULIPS).await, Some(28));
}

#[tokio::test]
async fn test_concurrent_deliveries_apply_once() {
    let store = MemoryStore::with_products(catalog());
    let engine = engine(&store);
    let session = paid_session(
        "cs_test_race",
        vec![linked_line("li_1", 7, "Rose Bouquet", 49_900, 4)],
    );

    let (a, b) = tokio::join!(engine.reconcile(&session), engine.reconcile(&session));
    let recorded = a.unwrap().items_recorded + b.unwrap().items_recorded;

    assert_eq!(recorded, 1);
    assert_eq!(store.all_items().await.len(), 1);
    assert_eq!(store.stock(ROSES).await, Some(8));
}
