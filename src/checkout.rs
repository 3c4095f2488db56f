//! Order commit pipeline.
//!
//! Online, a committed order is written as header, then items, then
//! payments. The header is the point of no return: if it fails (or times
//! out) the order goes to the offline queue instead; if a later write fails
//! the outcome is a [`CommitOutcome::PartialFailure`] naming the remote order
//! and is not retried. Offline, the whole order becomes one queue entry.
//! Either way a receipt is rendered and attached to the outcome.

use chrono::Utc;
use serde_json::json;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::branding::{cache_branding, cached_branding, resolve_branding};
use crate::connectivity::ConnectivityMonitor;
use crate::db::OfflineStore;
use crate::error::{CommitStage, PosError, PosResult};
use crate::models::{CommittedOrder, NewSyncEntry, SyncAction};
use crate::receipt_renderer::{render_html, OrderReceiptDoc, ReceiptDocument, ReceiptSettings};
use crate::remote::{OrderHeader, OrderItemRow, PaymentRow, ReceiptSnapshot, RemoteStore};

pub const ORDER_ENTITY: &str = "order";

static LAST_ORDER_MILLIS: AtomicI64 = AtomicI64::new(0);

/// `ORD-<unix millis>`, strictly increasing within the process even when
/// two orders land in the same millisecond.
pub fn next_order_number() -> String {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_ORDER_MILLIS.load(Ordering::SeqCst);
    loop {
        let next = now.max(last + 1);
        match LAST_ORDER_MILLIS.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return format!("ORD-{next}"),
            Err(actual) => last = actual,
        }
    }
}

/// A draft frozen for commit. Produced by `PosSession::begin_checkout`.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutTicket {
    pub draft_id: String,
    pub order: CommittedOrder,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub settings: ReceiptSettings,
    pub document: ReceiptDocument,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// Header, items and payments all written remotely.
    Remote {
        order_id: String,
        order: CommittedOrder,
        receipt: Receipt,
    },
    /// Stored in the offline queue for later replay.
    Queued {
        queue_id: i64,
        order: CommittedOrder,
        receipt: Receipt,
    },
    /// The header exists remotely but a later write failed.
    PartialFailure {
        order_id: String,
        stage: CommitStage,
        message: String,
        order: CommittedOrder,
        receipt: Receipt,
    },
}

impl CommitOutcome {
    pub fn order(&self) -> &CommittedOrder {
        match self {
            CommitOutcome::Remote { order, .. }
            | CommitOutcome::Queued { order, .. }
            | CommitOutcome::PartialFailure { order, .. } => order,
        }
    }

    pub fn receipt(&self) -> &Receipt {
        match self {
            CommitOutcome::Remote { receipt, .. }
            | CommitOutcome::Queued { receipt, .. }
            | CommitOutcome::PartialFailure { receipt, .. } => receipt,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, CommitOutcome::Queued { .. })
    }

    /// The partial failure as an error value, for callers that report it.
    pub fn partial_error(&self) -> Option<PosError> {
        match self {
            CommitOutcome::PartialFailure {
                order_id,
                stage,
                message,
                ..
            } => Some(PosError::PartialCommit {
                order_id: order_id.clone(),
                stage: *stage,
                message: message.clone(),
            }),
            _ => None,
        }
    }
}

enum OnlineResult {
    Done { order_id: String },
    Partial { order_id: String, stage: CommitStage, message: String },
}

pub struct CheckoutPipeline {
    store: Arc<OfflineStore>,
    remote: Arc<dyn RemoteStore>,
    connectivity: Arc<ConnectivityMonitor>,
    request_timeout: Duration,
}

impl CheckoutPipeline {
    pub fn new(
        store: Arc<OfflineStore>,
        remote: Arc<dyn RemoteStore>,
        connectivity: Arc<ConnectivityMonitor>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            store,
            remote,
            connectivity,
            request_timeout,
        }
    }

    async fn bounded<T>(&self, fut: impl Future<Output = PosResult<T>>) -> PosResult<T> {
        match timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(PosError::Timeout(self.request_timeout.as_millis() as u64)),
        }
    }

    /// Persist the order online, or queue it. Only an offline-queue write
    /// failure is returned as an error; in that case nothing was saved.
    pub async fn commit(&self, ticket: &CheckoutTicket) -> PosResult<CommitOutcome> {
        let order = &ticket.order;

        if self.connectivity.is_online() {
            match self.commit_online(order).await {
                Ok(OnlineResult::Done { order_id }) => {
                    let settings = self.branding(order, true).await;
                    let receipt = build_receipt(settings, order);
                    self.write_snapshot(&order_id, order, &receipt.settings).await;
                    info!(
                        order_number = %order.order_number,
                        order_id = %order_id,
                        total = %order.total,
                        "Order committed"
                    );
                    return Ok(CommitOutcome::Remote {
                        order_id,
                        order: order.clone(),
                        receipt,
                    });
                }
                Ok(OnlineResult::Partial {
                    order_id,
                    stage,
                    message,
                }) => {
                    error!(
                        order_number = %order.order_number,
                        order_id = %order_id,
                        stage = %stage,
                        error = %message,
                        "Order partially committed"
                    );
                    let settings = self.branding(order, true).await;
                    return Ok(CommitOutcome::PartialFailure {
                        order_id,
                        stage,
                        message,
                        order: order.clone(),
                        receipt: build_receipt(settings, order),
                    });
                }
                Err(e) => {
                    warn!(
                        order_number = %order.order_number,
                        error = %e,
                        "Order header write failed; queueing order offline"
                    );
                    if e.is_connectivity() {
                        self.connectivity.observe(false);
                    }
                }
            }
        }

        let queue_id = self.store.enqueue(&offline_entry(order))?;
        let settings = self.branding(order, false).await;
        info!(
            order_number = %order.order_number,
            queue_id,
            total = %order.total,
            "Order saved offline; will sync when online"
        );
        Ok(CommitOutcome::Queued {
            queue_id,
            order: order.clone(),
            receipt: build_receipt(settings, order),
        })
    }

    /// Header, items, payments. `Err` only when the header was not written.
    async fn commit_online(&self, order: &CommittedOrder) -> PosResult<OnlineResult> {
        let header = OrderHeader::from(order);
        let remote_order = self.bounded(self.remote.create_order(&header)).await?;
        let order_id = remote_order.id;

        let items: Vec<OrderItemRow> = order
            .lines
            .iter()
            .map(|line| OrderItemRow::new(&order_id, line))
            .collect();
        if let Err(e) = self.bounded(self.remote.create_order_items(&items)).await {
            return Ok(OnlineResult::Partial {
                order_id,
                stage: CommitStage::Items,
                message: e.to_string(),
            });
        }

        let payments: Vec<PaymentRow> = order
            .payments
            .iter()
            .map(|p| PaymentRow::new(&order_id, p))
            .collect();
        if let Err(e) = self.bounded(self.remote.create_payments(&payments)).await {
            return Ok(OnlineResult::Partial {
                order_id,
                stage: CommitStage::Payments,
                message: e.to_string(),
            });
        }

        Ok(OnlineResult::Done { order_id })
    }

    /// Best-effort branding: live lookup when online (cached for later),
    /// otherwise or on a failed lookup the last cached value, otherwise
    /// defaults.
    async fn branding(&self, order: &CommittedOrder, online: bool) -> ReceiptSettings {
        let seller_id = &order.seller_id;
        if online {
            match timeout(
                self.request_timeout,
                resolve_branding(self.remote.as_ref(), seller_id),
            )
            .await
            {
                Ok(Some(settings)) => {
                    cache_branding(&self.store, seller_id, &settings);
                    return settings;
                }
                Ok(None) => debug!(seller_id = %seller_id, "Branding lookup failed; using cache"),
                Err(_) => warn!(seller_id = %seller_id, "Branding lookup timed out"),
            }
        }
        cached_branding(&self.store, seller_id).unwrap_or_default()
    }

    async fn write_snapshot(&self, order_id: &str, order: &CommittedOrder, settings: &ReceiptSettings) {
        let snapshot = ReceiptSnapshot {
            order_id: order_id.to_string(),
            seller_id: order.seller_id.clone(),
            customer_id: None,
            payload: json!({
                "order": OrderHeader::from(order),
                "items": order.lines.iter().map(|l| OrderItemRow::new(order_id, l)).collect::<Vec<_>>(),
                "payments": order.payments.iter().map(|p| PaymentRow::new(order_id, p)).collect::<Vec<_>>(),
                "settings": settings,
            }),
        };
        if let Err(e) = self.bounded(self.remote.insert_receipt_snapshot(&snapshot)).await {
            warn!(order_id, error = %e, "Receipt snapshot not saved");
        }
    }
}

fn offline_entry(order: &CommittedOrder) -> NewSyncEntry {
    NewSyncEntry {
        entity_type: ORDER_ENTITY.to_string(),
        entity_id: order.order_number.clone(),
        action: SyncAction::Create,
        payload: json!({
            "order": OrderHeader::from(order),
            "items": order.lines,
            "payments": order.payments,
        }),
    }
}

fn build_receipt(settings: ReceiptSettings, order: &CommittedOrder) -> Receipt {
    let document = ReceiptDocument::Order(OrderReceiptDoc::from(order));
    let html = render_html(&settings, &document);
    Receipt {
        settings,
        document,
        html,
    }
}
