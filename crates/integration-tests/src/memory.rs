//! In-memory order store.
//!
//! Enforces the same rules as the SQL schema: one order per session id, one
//! item per `(order_id, line_item_ref)`, stock clamped at zero. A transaction
//! holds the store lock until it commits or is dropped and works on a copy of
//! the state, so an uncommitted transaction leaves nothing behind.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use fresh_blooms_core::{OrderId, OrderItemId, OrderStatus, ProductId};
use fresh_blooms_storefront::db::{OrderStore, OrderTransaction, RepositoryError};
use fresh_blooms_storefront::models::{
    NewOrderItem, NewPendingOrder, Order, OrderItem, PaidOrder, Product, UpsertOutcome,
    UpsertedOrder,
};

/// Storage faults to inject.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Fail the n-th item insert (1-based) of every transaction.
    pub item_insert_at: Option<usize>,
    /// Fail every pending-order insert.
    pub pending_insert: bool,
    /// Fail every commit.
    pub commit: bool,
    /// Sleep this long before the order upsert.
    pub upsert_delay: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
struct State {
    products: BTreeMap<ProductId, Product>,
    orders: Vec<Order>,
    items: Vec<OrderItem>,
    next_order_id: i32,
    next_item_id: i32,
}

impl State {
    fn order_by_session(&self, session_id: &str) -> Option<&Order> {
        self.orders
            .iter()
            .find(|order| order.stripe_session_id == session_id)
    }

    fn next_order_id(&mut self) -> OrderId {
        self.next_order_id += 1;
        OrderId::new(self.next_order_id)
    }

    fn next_item_id(&mut self) -> OrderItemId {
        self.next_item_id += 1;
        OrderItemId::new(self.next_item_id)
    }
}

/// An [`OrderStore`] backed by process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryStore {
    /// A store holding `products`.
    #[must_use]
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let state = State {
            products: products.into_iter().map(|p| (p.id, p)).collect(),
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            faults: Arc::default(),
        }
    }

    /// Replace the injected faults.
    pub async fn set_faults(&self, faults: Faults) {
        *self.faults.lock().await = faults;
    }

    /// Remove every injected fault.
    pub async fn clear_faults(&self) {
        self.set_faults(Faults::default()).await;
    }

    /// All committed orders.
    pub async fn orders(&self) -> Vec<Order> {
        self.state.lock().await.orders.clone()
    }

    /// The committed order for a session.
    pub async fn order_by_session(&self, session_id: &str) -> Option<Order> {
        self.state.lock().await.order_by_session(session_id).cloned()
    }

    /// Committed items of one order.
    pub async fn items(&self, order_id: OrderId) -> Vec<OrderItem> {
        self.state
            .lock()
            .await
            .items
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect()
    }

    /// All committed items.
    pub async fn all_items(&self) -> Vec<OrderItem> {
        self.state.lock().await.items.clone()
    }

    /// Committed stock of a product.
    pub async fn stock(&self, id: ProductId) -> Option<i32> {
        self.state.lock().await.products.get(&id).map(|p| p.stock)
    }
}

fn injected(what: &str) -> RepositoryError {
    RepositoryError::Database(sqlx::Error::Protocol(format!("injected fault: {what}")))
}

impl OrderStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction, RepositoryError> {
        let faults = self.faults.lock().await.clone();
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = (*guard).clone();
        Ok(MemoryTransaction {
            guard,
            working,
            faults,
            item_inserts: 0,
        })
    }

    async fn insert_pending_order(
        &self,
        order: &NewPendingOrder<'_>,
    ) -> Result<Option<OrderId>, RepositoryError> {
        if self.faults.lock().await.pending_insert {
            return Err(injected("pending insert"));
        }

        let mut state = self.state.lock().await;
        if state.order_by_session(order.stripe_session_id).is_some() {
            return Ok(None);
        }

        let id = state.next_order_id();
        state.orders.push(Order {
            id,
            stripe_session_id: order.stripe_session_id.to_string(),
            customer_email: order.customer_email.map(str::to_string),
            total_amount_paise: order.total,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        });
        Ok(Some(id))
    }
}

/// A [`MemoryStore`] transaction. Dropping it discards every write.
#[derive(Debug)]
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<State>,
    working: State,
    faults: Faults,
    item_inserts: usize,
}

impl OrderTransaction for MemoryTransaction {
    async fn upsert_paid_order(
        &mut self,
        order: &PaidOrder<'_>,
    ) -> Result<UpsertedOrder, RepositoryError> {
        if let Some(delay) = self.faults.upsert_delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(existing) = self
            .working
            .orders
            .iter_mut()
            .find(|o| o.stripe_session_id == order.stripe_session_id)
        {
            existing.status = OrderStatus::Paid;
            existing.total_amount_paise = order.total;
            if existing.customer_email.is_none() {
                existing.customer_email = order.customer_email.map(str::to_string);
            }
            return Ok(UpsertedOrder {
                id: existing.id,
                outcome: UpsertOutcome::Promoted,
            });
        }

        let id = self.working.next_order_id();
        self.working.orders.push(Order {
            id,
            stripe_session_id: order.stripe_session_id.to_string(),
            customer_email: order.customer_email.map(str::to_string),
            total_amount_paise: order.total,
            status: OrderStatus::Paid,
            created_at: Utc::now(),
        });
        Ok(UpsertedOrder {
            id,
            outcome: UpsertOutcome::Created,
        })
    }

    async fn product_name(&mut self, id: ProductId) -> Result<Option<String>, RepositoryError> {
        Ok(self.working.products.get(&id).map(|p| p.name.clone()))
    }

    async fn insert_order_item(
        &mut self,
        item: &NewOrderItem<'_>,
    ) -> Result<Option<OrderItemId>, RepositoryError> {
        self.item_inserts += 1;
        if self.faults.item_insert_at == Some(self.item_inserts) {
            return Err(injected("item insert"));
        }

        if let Some(product_id) = item.product_id
            && !self.working.products.contains_key(&product_id)
        {
            return Err(RepositoryError::Conflict(format!(
                "order_items.product_id {product_id} has no product"
            )));
        }

        if self
            .working
            .items
            .iter()
            .any(|i| i.order_id == item.order_id && i.line_item_ref == item.line_item_ref)
        {
            return Ok(None);
        }

        let quantity = i32::try_from(item.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!("quantity {} out of range", item.quantity))
        })?;

        let id = self.working.next_item_id();
        self.working.items.push(OrderItem {
            id,
            order_id: item.order_id,
            product_id: item.product_id,
            product_name: item.product_name.to_string(),
            unit_price_paise: item.unit_price,
            quantity,
            line_item_ref: item.line_item_ref.to_string(),
        });
        Ok(Some(id))
    }

    async fn decrement_stock(
        &mut self,
        id: ProductId,
        quantity: u32,
    ) -> Result<i32, RepositoryError> {
        let product = self
            .working
            .products
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        let quantity = i64::from(quantity);
        let remaining = (i64::from(product.stock) - quantity).max(0);
        product.stock = i32::try_from(remaining).unwrap_or(i32::MAX);
        Ok(product.stock)
    }

    async fn commit(mut self) -> Result<(), RepositoryError> {
        if self.faults.commit {
            return Err(injected("commit"));
        }
        *self.guard = self.working;
        Ok(())
    }
}

