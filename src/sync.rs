//! Offline queue reconciler.
//!
//! Replays unsynced queue entries to the remote `sync_queue` table one at a
//! time, oldest first. Each entry stands alone: a rejected entry is recorded
//! and skipped so the rest of the queue still drains. Entries already marked
//! synced are never replayed.

use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use crate::db::OfflineStore;
use crate::error::PosResult;
use crate::remote::{RemoteStore, SyncQueueRow};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub pending: u64,
    pub is_running: bool,
    pub last_sync: Option<String>,
}

pub struct SyncReconciler {
    store: Arc<OfflineStore>,
    remote: Arc<dyn RemoteStore>,
    is_running: Arc<AtomicBool>,
    last_sync: Arc<Mutex<Option<String>>>,
}

/// Clears the running flag when a drain finishes, including on early return.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncReconciler {
    pub fn new(store: Arc<OfflineStore>, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            remote,
            is_running: Arc::new(AtomicBool::new(false)),
            last_sync: Arc::new(Mutex::new(None)),
        }
    }

    pub fn store(&self) -> &Arc<OfflineStore> {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Replay every unsynced entry. Returns how many were delivered.
    ///
    /// A drain requested while another is in progress returns `Ok(0)`
    /// immediately; the running drain will pick up anything new it lists.
    pub async fn drain(&self) -> PosResult<usize> {
        if self
            .is_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Drain already running; skipping");
            return Ok(0);
        }
        let _guard = RunningGuard(&self.is_running);

        let entries = self.store.list_unsynced()?;
        if entries.is_empty() {
            return Ok(0);
        }
        info!(pending = entries.len(), "Draining offline queue");

        let mut synced = 0usize;
        for entry in &entries {
            let row = SyncQueueRow::from(entry);
            match self.remote.insert_sync_queue_row(&row).await {
                Ok(()) => match self.store.mark_synced(entry.id) {
                    Ok(_) => {
                        synced += 1;
                        debug!(queue_id = entry.id, entity_id = %entry.entity_id, "Queue entry synced");
                    }
                    Err(e) => {
                        // Delivered but not marked; it will be replayed next drain.
                        error!(queue_id = entry.id, error = %e, "Failed to mark queue entry synced");
                    }
                },
                Err(e) => {
                    warn!(
                        queue_id = entry.id,
                        entity_type = %entry.entity_type,
                        entity_id = %entry.entity_id,
                        attempts = entry.attempts + 1,
                        error = %e,
                        "Queue entry replay failed"
                    );
                    if let Err(record_err) = self.store.record_sync_failure(entry.id, &e.to_string()) {
                        error!(queue_id = entry.id, error = %record_err, "Failed to record sync failure");
                    }
                }
            }
        }

        if let Ok(mut guard) = self.last_sync.lock() {
            *guard = Some(Utc::now().to_rfc3339());
        }
        info!(synced, failed = entries.len() - synced, "Offline queue drain complete");
        Ok(synced)
    }

    pub fn status(&self) -> PosResult<SyncStatus> {
        Ok(SyncStatus {
            pending: self.store.pending_count()?,
            is_running: self.is_running(),
            last_sync: self.last_sync.lock().ok().and_then(|g| g.clone()),
        })
    }
}
