//! Remote store contract and its PostgREST-style HTTP client.
//!
//! The register talks to the marketplace backend through [`RemoteStore`] and
//! [`AnalyticsSink`]. [`RestRemote`] implements both over `reqwest`; tests use
//! the in-memory fake in [`memory`].

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{PosError, PosResult};
use crate::models::{CommittedOrder, LineSnapshot, OrderStatus, Payment, Product, SyncQueueEntry};
use crate::receipt_renderer::ReceiptSettings;

/// Default timeout for REST requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// Product row as stored remotely (`products` table).
#[derive(Debug, Clone, Deserialize)]
pub struct ProductRow {
    pub id: String,
    pub title: String,
    pub price: Decimal,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.title,
            price: row.price.max(Decimal::ZERO),
            category: row.category.unwrap_or_default(),
            stock: row.stock.unwrap_or(0).max(0),
            sku: row.sku,
            barcode: row.barcode,
            image_url: row.image_url,
        }
    }
}

/// Insert payload for the `orders` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderHeader {
    pub order_number: String,
    pub seller_id: String,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub cashier_name: String,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub discount_percentage: Decimal,
    pub total: Decimal,
    pub status: String,
}

impl From<&CommittedOrder> for OrderHeader {
    fn from(order: &CommittedOrder) -> Self {
        Self {
            order_number: order.order_number.clone(),
            seller_id: order.seller_id.clone(),
            customer_id: None,
            customer_name: order.customer_name.clone(),
            cashier_name: order.cashier.clone(),
            subtotal: order.subtotal,
            discount_amount: Decimal::ZERO,
            discount_percentage: Decimal::ZERO,
            total: order.total,
            status: match order.status {
                OrderStatus::Completed => "completed".to_string(),
                OrderStatus::Pending => "pending".to_string(),
            },
        }
    }
}

/// What the remote store echoes back for a created order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteOrder {
    pub id: String,
    pub order_number: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemRow {
    pub order_id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub discount_amount: Decimal,
    pub discount_percentage: Decimal,
    pub total: Decimal,
}

impl OrderItemRow {
    pub fn new(order_id: &str, line: &LineSnapshot) -> Self {
        Self {
            order_id: order_id.to_string(),
            product_id: line.product_id.clone(),
            product_name: line.name.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            discount_amount: line.discount_amount,
            discount_percentage: line.discount_percentage,
            total: line.total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRow {
    pub order_id: String,
    pub payment_method: String,
    pub amount: Decimal,
}

impl PaymentRow {
    pub fn new(order_id: &str, payment: &Payment) -> Self {
        Self {
            order_id: order_id.to_string(),
            payment_method: payment.method.as_str().to_string(),
            amount: payment.amount,
        }
    }
}

/// Row replayed into the remote `sync_queue` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueRow {
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub data: Value,
    pub synced: bool,
}

impl From<&SyncQueueEntry> for SyncQueueRow {
    fn from(entry: &SyncQueueEntry) -> Self {
        Self {
            entity_type: entry.entity_type.clone(),
            entity_id: entry.entity_id.clone(),
            action: entry.action.as_str().to_string(),
            data: entry.payload.clone(),
            synced: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub contact_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptSnapshot {
    pub order_id: String,
    pub seller_id: String,
    pub customer_id: Option<String>,
    pub payload: Value,
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list_active_products_for_seller(&self, seller_id: &str) -> PosResult<Vec<Product>>;
    async fn create_order(&self, header: &OrderHeader) -> PosResult<RemoteOrder>;
    async fn create_order_items(&self, items: &[OrderItemRow]) -> PosResult<()>;
    async fn create_payments(&self, payments: &[PaymentRow]) -> PosResult<()>;
    async fn insert_sync_queue_row(&self, row: &SyncQueueRow) -> PosResult<()>;
    async fn get_receipt_settings(&self, seller_id: &str) -> PosResult<Option<ReceiptSettings>>;
    async fn get_profile(&self, seller_id: &str) -> PosResult<Option<Profile>>;
    async fn upsert_receipt_settings(
        &self,
        seller_id: &str,
        settings: &ReceiptSettings,
    ) -> PosResult<()>;
    async fn insert_receipt_snapshot(&self, snapshot: &ReceiptSnapshot) -> PosResult<()>;
    /// Cheap reachability probe used by the connectivity monitor.
    async fn health_check(&self) -> PosResult<()>;
}

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record_cart_add(&self, product_id: &str, user_id: Option<&str>) -> PosResult<()>;
}

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the backend URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes and a trailing `/rest/v1` segment
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    if url.ends_with("/rest/v1") {
        url.truncate(url.len() - "/rest/v1".len());
    }
    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_transport_error(base: &str, err: reqwest::Error, timeout: Duration) -> PosError {
    if err.is_timeout() {
        return PosError::Timeout(timeout.as_millis() as u64);
    }
    if err.is_connect() {
        return PosError::Network(format!("Cannot reach backend at {base}"));
    }
    if err.is_builder() {
        return PosError::Config(format!("Invalid backend URL: {base}"));
    }
    PosError::Network(format!("Network error communicating with {base}: {err}"))
}

fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "API key is invalid or expired".to_string(),
        403 => "Not authorized for this seller".to_string(),
        404 => "Backend endpoint not found".to_string(),
        409 => "Row already exists".to_string(),
        s if s >= 500 => format!("Backend server error (HTTP {s})"),
        s => format!("Unexpected response from backend (HTTP {s})"),
    }
}

/// Build the error for a non-success response, preserving the backend's
/// message and details when the body is JSON.
fn rejection(status: StatusCode, body_text: &str) -> PosError {
    let trimmed = body_text.trim();
    let message = match serde_json::from_str::<Value>(trimmed) {
        Ok(json) => {
            let message = json
                .get("message")
                .or_else(|| json.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| status_error(status));
            match json.get("details").filter(|d| !d.is_null()) {
                Some(details) => format!("{message}: {details}"),
                None => message,
            }
        }
        Err(_) if !trimmed.is_empty() => format!("{}: {trimmed}", status_error(status)),
        Err(_) => status_error(status),
    };
    PosError::Remote {
        status: status.as_u16(),
        message,
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RestRemote {
    client: Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
    timeout: Duration,
}

impl RestRemote {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> PosResult<Self> {
        let base_url = normalize_base_url(base_url);
        if api_key.trim().is_empty() {
            return Err(PosError::Config("backend API key is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PosError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            api_key: api_key.trim().to_string(),
            access_token: None,
            timeout,
        })
    }

    /// Use the signed-in user's token instead of the anonymous key for the
    /// bearer header.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
            .header("Content-Type", "application/json")
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        self.request(method, &format!("/rest/v1/{table}"))
    }

    async fn send(&self, req: RequestBuilder) -> PosResult<Value> {
        let resp = req
            .send()
            .await
            .map_err(|e| map_transport_error(&self.base_url, e, self.timeout))?;
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(rejection(status, &body_text));
        }
        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body_text)?)
    }

    async fn insert<T: Serialize + ?Sized>(&self, table: &str, rows: &T) -> PosResult<Value> {
        let req = self
            .table(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(rows);
        self.send(req).await
    }

    /// Fetch at most one row from a filtered select.
    async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> PosResult<Option<T>> {
        let req = self.table(Method::GET, table).query(query).query(&[("limit", "1")]);
        let value = self.send(req).await?;
        let first = match value {
            Value::Array(mut rows) if !rows.is_empty() => rows.swap_remove(0),
            _ => return Ok(None),
        };
        Ok(Some(serde_json::from_value(first)?))
    }
}

#[async_trait]
impl RemoteStore for RestRemote {
    async fn list_active_products_for_seller(&self, seller_id: &str) -> PosResult<Vec<Product>> {
        let req = self.table(Method::GET, "products").query(&[
            ("select", "*".to_string()),
            ("status", "eq.active".to_string()),
            ("user_id", format!("eq.{seller_id}")),
        ]);
        let value = self.send(req).await?;
        let rows: Vec<ProductRow> = match value {
            Value::Null => Vec::new(),
            other => serde_json::from_value(other)?,
        };
        debug!(seller_id, count = rows.len(), "Fetched active products");
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn create_order(&self, header: &OrderHeader) -> PosResult<RemoteOrder> {
        let value = self.insert("orders", &[header]).await?;
        let row = match value {
            Value::Array(mut rows) if !rows.is_empty() => rows.swap_remove(0),
            other @ Value::Object(_) => other,
            _ => {
                return Err(PosError::Remote {
                    status: 200,
                    message: "order insert returned no row".to_string(),
                })
            }
        };
        let order: RemoteOrder = serde_json::from_value(row)?;
        info!(order_id = %order.id, order_number = %order.order_number, "Order header created");
        Ok(order)
    }

    async fn create_order_items(&self, items: &[OrderItemRow]) -> PosResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.insert("order_items", items).await.map(|_| ())
    }

    async fn create_payments(&self, payments: &[PaymentRow]) -> PosResult<()> {
        if payments.is_empty() {
            return Ok(());
        }
        self.insert("payments", payments).await.map(|_| ())
    }

    async fn insert_sync_queue_row(&self, row: &SyncQueueRow) -> PosResult<()> {
        self.insert("sync_queue", &[row]).await.map(|_| ())
    }

    async fn get_receipt_settings(&self, seller_id: &str) -> PosResult<Option<ReceiptSettings>> {
        self.select_one(
            "receipt_settings",
            &[
                ("select", "*".to_string()),
                ("profile_id", format!("eq.{seller_id}")),
            ],
        )
        .await
    }

    async fn get_profile(&self, seller_id: &str) -> PosResult<Option<Profile>> {
        self.select_one(
            "profiles",
            &[
                (
                    "select",
                    "full_name,username,avatar_url,contact_number".to_string(),
                ),
                ("id", format!("eq.{seller_id}")),
            ],
        )
        .await
    }

    async fn upsert_receipt_settings(
        &self,
        seller_id: &str,
        settings: &ReceiptSettings,
    ) -> PosResult<()> {
        let mut row = serde_json::to_value(settings)?;
        if let Value::Object(ref mut map) = row {
            map.insert("profile_id".to_string(), Value::String(seller_id.to_string()));
        }
        let req = self
            .table(Method::POST, "receipt_settings")
            .query(&[("on_conflict", "profile_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[row]);
        self.send(req).await.map(|_| ())
    }

    async fn insert_receipt_snapshot(&self, snapshot: &ReceiptSnapshot) -> PosResult<()> {
        self.insert("receipt_snapshots", &[snapshot]).await.map(|_| ())
    }

    async fn health_check(&self) -> PosResult<()> {
        let start = Instant::now();
        let req = self.request(Method::GET, "/rest/v1/");
        let resp = req
            .send()
            .await
            .map_err(|e| map_transport_error(&self.base_url, e, self.timeout))?;
        let status = resp.status();
        // Any HTTP answer below 500 proves the backend is reachable.
        if status.is_server_error() {
            return Err(rejection(status, ""));
        }
        debug!(
            latency_ms = start.elapsed().as_millis() as u64,
            status = status.as_u16(),
            "Health check passed"
        );
        Ok(())
    }
}

#[async_trait]
impl AnalyticsSink for RestRemote {
    async fn record_cart_add(&self, product_id: &str, user_id: Option<&str>) -> PosResult<()> {
        let row = serde_json::json!([{ "product_id": product_id, "user_id": user_id }]);
        let req = self
            .table(Method::POST, "product_cart_adds")
            .header("Prefer", "return=minimal")
            .json(&row);
        self.send(req).await.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// In-memory fake
// ---------------------------------------------------------------------------

#[cfg(test)]
pub mod memory {
    //! Recording fake with per-operation failure injection.

    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Op {
        ListProducts,
        CreateOrder,
        CreateItems,
        CreatePayments,
        InsertSyncRow,
        GetReceiptSettings,
        GetProfile,
        UpsertReceiptSettings,
        InsertSnapshot,
        Health,
        CartAdd,
    }

    #[derive(Default)]
    pub struct MemoryRemote {
        pub products: Mutex<Vec<Product>>,
        pub orders: Mutex<Vec<OrderHeader>>,
        pub items: Mutex<Vec<OrderItemRow>>,
        pub payments: Mutex<Vec<PaymentRow>>,
        pub sync_rows: Mutex<Vec<SyncQueueRow>>,
        pub receipt_settings: Mutex<Option<ReceiptSettings>>,
        pub upserted_settings: Mutex<Vec<ReceiptSettings>>,
        pub profile: Mutex<Option<Profile>>,
        pub snapshots: Mutex<Vec<ReceiptSnapshot>>,
        pub cart_adds: Mutex<Vec<(String, Option<String>)>>,
        failing: Mutex<HashSet<Op>>,
        /// Entity ids whose sync replay should be rejected.
        failing_entities: Mutex<HashSet<String>>,
        pub offline: AtomicBool,
        /// Delay applied to `create_order` to exercise timeouts.
        pub create_order_delay: Mutex<Option<Duration>>,
        next_id: AtomicU64,
    }

    impl MemoryRemote {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail(&self, op: Op) {
            self.failing.lock().unwrap().insert(op);
        }

        pub fn heal(&self, op: Op) {
            self.failing.lock().unwrap().remove(&op);
        }

        pub fn fail_entity(&self, entity_id: &str) {
            self.failing_entities
                .lock()
                .unwrap()
                .insert(entity_id.to_string());
        }

        pub fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        fn check(&self, op: Op) -> PosResult<()> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(PosError::Network("connection refused".to_string()));
            }
            if self.failing.lock().unwrap().contains(&op) {
                return Err(PosError::Remote {
                    status: 500,
                    message: format!("injected failure for {op:?}"),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteStore for MemoryRemote {
        async fn list_active_products_for_seller(&self, _seller_id: &str) -> PosResult<Vec<Product>> {
            self.check(Op::ListProducts)?;
            Ok(self.products.lock().unwrap().clone())
        }

        async fn create_order(&self, header: &OrderHeader) -> PosResult<RemoteOrder> {
            let delay = *self.create_order_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.check(Op::CreateOrder)?;
            self.orders.lock().unwrap().push(header.clone());
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(RemoteOrder {
                id: format!("remote-{id}"),
                order_number: header.order_number.clone(),
                created_at: None,
            })
        }

        async fn create_order_items(&self, items: &[OrderItemRow]) -> PosResult<()> {
            self.check(Op::CreateItems)?;
            self.items.lock().unwrap().extend_from_slice(items);
            Ok(())
        }

        async fn create_payments(&self, payments: &[PaymentRow]) -> PosResult<()> {
            self.check(Op::CreatePayments)?;
            self.payments.lock().unwrap().extend_from_slice(payments);
            Ok(())
        }

        async fn insert_sync_queue_row(&self, row: &SyncQueueRow) -> PosResult<()> {
            self.check(Op::InsertSyncRow)?;
            if self.failing_entities.lock().unwrap().contains(&row.entity_id) {
                return Err(PosError::Remote {
                    status: 400,
                    message: format!("rejected {}", row.entity_id),
                });
            }
            self.sync_rows.lock().unwrap().push(row.clone());
            Ok(())
        }

        async fn get_receipt_settings(&self, _seller_id: &str) -> PosResult<Option<ReceiptSettings>> {
            self.check(Op::GetReceiptSettings)?;
            Ok(self.receipt_settings.lock().unwrap().clone())
        }

        async fn get_profile(&self, _seller_id: &str) -> PosResult<Option<Profile>> {
            self.check(Op::GetProfile)?;
            Ok(self.profile.lock().unwrap().clone())
        }

        async fn upsert_receipt_settings(
            &self,
            _seller_id: &str,
            settings: &ReceiptSettings,
        ) -> PosResult<()> {
            self.check(Op::UpsertReceiptSettings)?;
            self.upserted_settings.lock().unwrap().push(settings.clone());
            Ok(())
        }

        async fn insert_receipt_snapshot(&self, snapshot: &ReceiptSnapshot) -> PosResult<()> {
            self.check(Op::InsertSnapshot)?;
            self.snapshots.lock().unwrap().push(snapshot.clone());
            Ok(())
        }

        async fn health_check(&self) -> PosResult<()> {
            self.check(Op::Health)
        }
    }

    #[async_trait]
    impl AnalyticsSink for MemoryRemote {
        async fn record_cart_add(&self, product_id: &str, user_id: Option<&str>) -> PosResult<()> {
            self.check(Op::CartAdd)?;
            self.cart_adds
                .lock()
                .unwrap()
                .push((product_id.to_string(), user_id.map(str::to_string)));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_base_urls() {
        assert_eq!(
            normalize_base_url("abc.supabase.co/"),
            "https://abc.supabase.co"
        );
        assert_eq!(
            normalize_base_url("https://abc.supabase.co/rest/v1/"),
            "https://abc.supabase.co"
        );
        assert_eq!(normalize_base_url("localhost:54321"), "http://localhost:54321");
        assert_eq!(
            normalize_base_url("  http://127.0.0.1:8000//  "),
            "http://127.0.0.1:8000"
        );
    }

    #[test]
    fn rejection_prefers_backend_message() {
        let err = rejection(
            StatusCode::CONFLICT,
            r#"{"message":"duplicate key","details":"Key (order_number) exists"}"#,
        );
        match err {
            PosError::Remote { status, message } => {
                assert_eq!(status, 409);
                assert_eq!(message, "duplicate key: \"Key (order_number) exists\"");
            }
            other => panic!("unexpected {other:?}"),
        }

        match rejection(StatusCode::BAD_GATEWAY, "") {
            PosError::Remote { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "Backend server error (HTTP 502)");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn product_rows_map_to_products() {
        let row: ProductRow = serde_json::from_value(serde_json::json!({
            "id": "p-1",
            "title": "Sugar 1kg",
            "price": 2.5,
            "category": null,
            "stock": -3,
            "status": "active"
        }))
        .unwrap();
        let product = Product::from(row);
        assert_eq!(product.name, "Sugar 1kg");
        assert_eq!(product.category, "");
        assert_eq!(product.stock, 0);
        assert_eq!(product.price, Decimal::new(25, 1));
    }

    #[test]
    fn rejects_empty_api_key() {
        assert!(matches!(
            RestRemote::new("https://abc.supabase.co", "  ", DEFAULT_TIMEOUT),
            Err(PosError::Config(_))
        ));
        let remote = RestRemote::new("abc.supabase.co/", "anon", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(remote.base_url(), "https://abc.supabase.co");
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_connectivity_error() {
        let remote =
            RestRemote::new("http://127.0.0.1:9", "anon", Duration::from_millis(500)).unwrap();
        let err = remote.health_check().await.unwrap_err();
        assert!(err.is_connectivity(), "{err:?}");
    }
}
