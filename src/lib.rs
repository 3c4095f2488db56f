//! AfriPOS register core.
//!
//! Multi-tab cart, split tenders, offline-first order commit with a durable
//! local queue, and receipt rendering. [`Terminal`] wires the pieces together
//! for a running register; each module is usable on its own.

use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod branding;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod models;
pub mod money;
pub mod numpad;
pub mod payments;
pub mod receipt_renderer;
pub mod remote;
pub mod session;
pub mod sync;

pub use cart::{compute_order_total, OrderDraft, Register};
pub use checkout::{CheckoutPipeline, CheckoutTicket, CommitOutcome, Receipt};
pub use config::TerminalConfig;
pub use connectivity::{spawn_monitor, Connectivity, ConnectivityMonitor, MonitorSettings};
pub use db::OfflineStore;
pub use error::{CommitStage, PosError, PosResult};
pub use models::{CartLine, CommittedOrder, DiscountKind, Payment, PaymentMethod, Product};
pub use payments::{PaymentSession, PaymentState};
pub use remote::{AnalyticsSink, RemoteStore, RestRemote};
pub use session::{PosSession, UserContext};
pub use sync::{SyncReconciler, SyncStatus};

/// A running register: local store, remote client, connectivity monitor and
/// commit pipeline, plus the background monitor task.
pub struct Terminal {
    config: TerminalConfig,
    store: Arc<OfflineStore>,
    remote: Arc<RestRemote>,
    connectivity: Arc<ConnectivityMonitor>,
    reconciler: Arc<SyncReconciler>,
    pipeline: CheckoutPipeline,
    cancel: CancellationToken,
    monitor: Option<JoinHandle<()>>,
}

impl Terminal {
    /// Open the store under `data_dir`, resolve configuration and start the
    /// connectivity monitor. Must be called inside a Tokio runtime.
    pub fn start(data_dir: &Path, connection_string: Option<&str>) -> PosResult<Self> {
        let store = Arc::new(OfflineStore::new(data_dir));
        store.open()?;

        let config = TerminalConfig::load(&store, connection_string)?;
        if connection_string.is_some() {
            config.save(&store)?;
        }
        let remote = Arc::new(config.remote()?);

        let connectivity = Arc::new(ConnectivityMonitor::new(Connectivity::Online));
        let reconciler = Arc::new(SyncReconciler::new(store.clone(), remote.clone()));
        let pipeline = CheckoutPipeline::new(
            store.clone(),
            remote.clone(),
            connectivity.clone(),
            config.request_timeout,
        );

        let cancel = CancellationToken::new();
        let monitor = spawn_monitor(
            connectivity.clone(),
            remote.clone(),
            reconciler.clone(),
            config.monitor_settings(),
            cancel.clone(),
        );

        info!(
            version = env!("CARGO_PKG_VERSION"),
            seller_id = %config.seller_id,
            pending = store.pending_count().unwrap_or(0),
            "AfriPOS register started"
        );

        Ok(Self {
            config,
            store,
            remote,
            connectivity,
            reconciler,
            pipeline,
            cancel,
            monitor: Some(monitor),
        })
    }

    pub fn config(&self) -> &TerminalConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<OfflineStore> {
        &self.store
    }

    pub fn remote(&self) -> &Arc<RestRemote> {
        &self.remote
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    pub fn reconciler(&self) -> &Arc<SyncReconciler> {
        &self.reconciler
    }

    pub fn pipeline(&self) -> &CheckoutPipeline {
        &self.pipeline
    }

    /// A fresh session for the configured seller, reporting cart adds to the
    /// remote analytics table.
    pub fn new_session(&self, cashier_name: Option<&str>, user_id: Option<&str>) -> PosSession {
        let user = UserContext {
            seller_id: self.config.seller_id.clone(),
            cashier_name: cashier_name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or(&self.config.cashier_name)
                .to_string(),
            user_id: user_id.map(str::to_string),
        };
        let analytics: Arc<dyn AnalyticsSink> = self.remote.clone();
        PosSession::new(user, Some(analytics))
    }

    /// Stop the monitor and close the store.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.monitor.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Connectivity monitor task ended abnormally");
            }
        }
        self.store.close();
        info!("AfriPOS register stopped");
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
