//! A local HTTP server speaking the subset of the Stripe API the storefront
//! calls.
//!
//! Sessions created through `POST /v1/checkout/sessions` get one line item
//! per form line, with the product metadata echoed back. Line item pages are
//! served `page_size` at a time regardless of the requested limit, so
//! pagination can be exercised with a handful of items.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use url::Url;

use crate::serve;

/// A recorded `POST /v1/checkout/sessions`.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub idempotency_key: Option<String>,
    pub authorization: Option<String>,
    pub form: Vec<(String, String)>,
}

impl CreateRequest {
    /// First value of a form field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug)]
struct StripeState {
    next_session: u32,
    page_size: usize,
    sessions: HashMap<String, Value>,
    line_items: HashMap<String, Vec<Value>>,
    creates: Vec<CreateRequest>,
    cursors: Vec<Option<String>>,
    fail_status: Option<StatusCode>,
}

type Shared = Arc<Mutex<StripeState>>;

/// Handle to a running fake Stripe API.
#[derive(Debug, Clone)]
pub struct FakeStripe {
    addr: SocketAddr,
    state: Shared,
}

impl FakeStripe {
    /// Start a server that serves `page_size` line items per page.
    ///
    /// # Errors
    ///
    /// Returns an error if no local port can be bound.
    pub async fn start(page_size: usize) -> std::io::Result<Self> {
        let state = Arc::new(Mutex::new(StripeState {
            next_session: 0,
            page_size: page_size.max(1),
            sessions: HashMap::new(),
            line_items: HashMap::new(),
            creates: Vec::new(),
            cursors: Vec::new(),
            fail_status: None,
        }));

        let router = Router::new()
            .route("/v1/checkout/sessions", post(create_session))
            .route("/v1/checkout/sessions/{id}", get(retrieve_session))
            .route("/v1/checkout/sessions/{id}/line_items", get(list_line_items))
            .with_state(Arc::clone(&state));

        let addr = serve(router).await?;
        Ok(Self { addr, state })
    }

    /// Origin to use as `StripeConfig::api_base`.
    ///
    /// # Errors
    ///
    /// Never in practice; the address always forms a valid URL.
    pub fn api_base(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!("http://{}", self.addr))
    }

    /// Register a session with the given line items.
    pub async fn insert_session(&self, session: Value, line_items: Vec<Value>) {
        let id = session["id"].as_str().unwrap_or_default().to_string();
        let mut state = self.state.lock().await;
        state.sessions.insert(id.clone(), session);
        state.line_items.insert(id, line_items);
    }

    /// Mark a created session as paid.
    pub async fn complete(&self, session_id: &str) {
        if let Some(session) = self.state.lock().await.sessions.get_mut(session_id) {
            session["payment_status"] = json!("paid");
            session["status"] = json!("complete");
        }
    }

    /// Answer every request with `status` until [`FakeStripe::recover`].
    pub async fn fail_with(&self, status: StatusCode) {
        self.state.lock().await.fail_status = Some(status);
    }

    /// Stop failing requests.
    pub async fn recover(&self) {
        self.state.lock().await.fail_status = None;
    }

    /// Session creation requests received so far.
    pub async fn creates(&self) -> Vec<CreateRequest> {
        self.state.lock().await.creates.clone()
    }

    /// `starting_after` of every line item page request, in order.
    pub async fn cursors(&self) -> Vec<Option<String>> {
        self.state.lock().await.cursors.clone()
    }
}

/// A Stripe `checkout.session` object.
#[must_use]
pub fn session_json(id: &str, amount_total: i64, email: Option<&str>, payment_status: &str) -> Value {
    json!({
        "id": id,
        "object": "checkout.session",
        "url": format!("https://checkout.stripe.com/c/pay/{id}"),
        "amount_total": amount_total,
        "currency": "inr",
        "customer_email": email,
        "customer_details": email.map(|e| json!({ "email": e })),
        "payment_status": payment_status,
        "status": "open"
    })
}

/// A Stripe `item` object with its product expanded.
///
/// `product_id` lands in the product metadata when given.
#[must_use]
pub fn line_item_json(
    id: &str,
    name: &str,
    unit_amount: i64,
    quantity: u64,
    product_id: Option<&str>,
) -> Value {
    let metadata = product_id.map_or_else(|| json!({}), |pid| json!({ "product_id": pid }));
    json!({
        "id": id,
        "object": "item",
        "description": name,
        "quantity": quantity,
        "amount_subtotal": unit_amount * i64::try_from(quantity).unwrap_or(i64::MAX),
        "currency": "inr",
        "price": {
            "id": format!("price_{id}"),
            "unit_amount": unit_amount,
            "product": {
                "id": format!("prod_{id}"),
                "object": "product",
                "name": name,
                "metadata": metadata
            }
        }
    })
}

fn stripe_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "type": "invalid_request_error",
                "message": message
            }
        })),
    )
        .into_response()
}

fn failure(state: &StripeState) -> Option<Response> {
    state.fail_status.map(|status| {
        let mut response = stripe_error(status, "injected failure");
        if status == StatusCode::TOO_MANY_REQUESTS {
            response
                .headers_mut()
                .insert("Retry-After", axum::http::HeaderValue::from_static("2"));
        }
        response
    })
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn create_session(
    State(state): State<Shared>,
    headers: HeaderMap,
    Form(form): Form<Vec<(String, String)>>,
) -> Response {
    let mut state = state.lock().await;
    if let Some(response) = failure(&state) {
        return response;
    }

    state.creates.push(CreateRequest {
        idempotency_key: header(&headers, "idempotency-key"),
        authorization: header(&headers, "authorization"),
        form: form.clone(),
    });

    let fields: HashMap<&str, &str> = form
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    state.next_session += 1;
    let session_id = format!("cs_test_http_{}", state.next_session);

    let mut line_items = Vec::new();
    let mut amount_total = 0_i64;
    for index in 0.. {
        let prefix = format!("line_items[{index}]");
        let Some(quantity) = fields
            .get(format!("{prefix}[quantity]").as_str())
            .and_then(|q| q.parse::<u64>().ok())
        else {
            break;
        };
        let unit_amount = fields
            .get(format!("{prefix}[price_data][unit_amount]").as_str())
            .and_then(|a| a.parse::<i64>().ok())
            .unwrap_or_default();
        let name = fields
            .get(format!("{prefix}[price_data][product_data][name]").as_str())
            .copied()
            .unwrap_or_default();
        let product_id = fields
            .get(format!("{prefix}[price_data][product_data][metadata][product_id]").as_str())
            .copied();

        amount_total += unit_amount * i64::try_from(quantity).unwrap_or(i64::MAX);
        line_items.push(line_item_json(
            &format!("li_{session_id}_{index}"),
            name,
            unit_amount,
            quantity,
            product_id,
        ));
    }

    let session = session_json(
        &session_id,
        amount_total,
        fields.get("customer_email").copied(),
        "unpaid",
    );
    state.sessions.insert(session_id.clone(), session.clone());
    state.line_items.insert(session_id, line_items);

    Json(session).into_response()
}

async fn retrieve_session(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    let state = state.lock().await;
    if let Some(response) = failure(&state) {
        return response;
    }

    match state.sessions.get(&id) {
        Some(session) => Json(session.clone()).into_response(),
        None => stripe_error(
            StatusCode::NOT_FOUND,
            &format!("No such checkout.session: '{id}'"),
        ),
    }
}

async fn list_line_items(
    State(state): State<Shared>,
    Path(id): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    let mut state = state.lock().await;
    if let Some(response) = failure(&state) {
        return response;
    }

    let cursor = query
        .iter()
        .find(|(k, _)| k == "starting_after")
        .map(|(_, v)| v.clone());
    state.cursors.push(cursor.clone());

    let Some(items) = state.line_items.get(&id) else {
        return stripe_error(
            StatusCode::NOT_FOUND,
            &format!("No such checkout.session: '{id}'"),
        );
    };

    let start = cursor
        .and_then(|after| items.iter().position(|item| item["id"] == after.as_str()))
        .map_or(0, |position| position + 1);
    let page: Vec<Value> = items
        .iter()
        .skip(start)
        .take(state.page_size)
        .cloned()
        .collect();
    let has_more = start + page.len() < items.len();

    Json(json!({
        "object": "list",
        "url": format!("/v1/checkout/sessions/{id}/line_items"),
        "data": page,
        "has_more": has_more
    }))
    .into_response()
}
