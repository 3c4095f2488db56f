//! Reachability tracking and the background monitor loop.
//!
//! Only the Offline→Online edge triggers a queue drain. Repeated "online"
//! reports while already online do nothing, so a flapping probe cannot
//! start redundant drains.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::remote::RemoteStore;
use crate::sync::SyncReconciler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    WentOnline,
    WentOffline,
}

pub struct ConnectivityMonitor {
    tx: watch::Sender<Connectivity>,
}

impl ConnectivityMonitor {
    pub fn new(initial: Connectivity) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn current(&self) -> Connectivity {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current() == Connectivity::Online
    }

    /// Receive every state change, e.g. to drive an online/offline badge.
    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }

    /// Feed a reachability observation. Returns the transition it caused,
    /// if any.
    pub fn observe(&self, online: bool) -> Option<Transition> {
        let next = if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        };
        let previous = self.tx.send_replace(next);
        match (previous, next) {
            (Connectivity::Offline, Connectivity::Online) => {
                info!("Network restored");
                Some(Transition::WentOnline)
            }
            (Connectivity::Online, Connectivity::Offline) => {
                warn!("Network lost; new orders will be queued locally");
                Some(Transition::WentOffline)
            }
            _ => None,
        }
    }

    /// Feed an observation and drain the queue when it restores
    /// connectivity. Returns the drained count when a drain ran.
    pub async fn report(&self, online: bool, reconciler: &SyncReconciler) -> Option<usize> {
        if self.observe(online) != Some(Transition::WentOnline) {
            return None;
        }
        match reconciler.drain().await {
            Ok(synced) => Some(synced),
            Err(e) => {
                warn!(error = %e, "Drain after reconnect failed");
                Some(0)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub probe_interval: Duration,
    /// Periodic drain while online, for entries left behind by failures.
    pub safety_net_interval: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(10),
            safety_net_interval: Duration::from_secs(60),
        }
    }
}

/// Spawn the monitor loop: probe the backend every `probe_interval`, feed
/// the result to `monitor`, and run the safety-net drain while online.
/// Stops when `cancel` fires.
pub fn spawn_monitor(
    monitor: Arc<ConnectivityMonitor>,
    remote: Arc<dyn RemoteStore>,
    reconciler: Arc<SyncReconciler>,
    settings: MonitorSettings,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            probe_ms = settings.probe_interval.as_millis() as u64,
            safety_net_ms = settings.safety_net_interval.as_millis() as u64,
            "Connectivity monitor started"
        );
        let mut probe = interval(settings.probe_interval);
        probe.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut safety_net = interval_at(
            Instant::now() + settings.safety_net_interval,
            settings.safety_net_interval,
        );
        safety_net.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Connectivity monitor stopped");
                    break;
                }
                _ = probe.tick() => {
                    let online = match remote.health_check().await {
                        Ok(()) => true,
                        Err(e) => {
                            debug!(error = %e, "Health probe failed");
                            false
                        }
                    };
                    if let Some(synced) = monitor.report(online, &reconciler).await {
                        info!(synced, "Reconnect drain finished");
                    }
                }
                _ = safety_net.tick() => {
                    if !monitor.is_online() {
                        continue;
                    }
                    match reconciler.store().pending_count() {
                        Ok(0) => {}
                        Ok(pending) => {
                            debug!(pending, "Safety-net drain");
                            if let Err(e) = reconciler.drain().await {
                                warn!(error = %e, "Safety-net drain failed");
                            }
                        }
                        Err(e) => warn!(error = %e, "Could not read pending count"),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::OfflineStore;
    use crate::models::{NewSyncEntry, SyncAction};
    use crate::remote::memory::MemoryRemote;
    use serde_json::json;

    fn enqueue(store: &OfflineStore, id: &str) {
        store
            .enqueue(&NewSyncEntry {
                entity_type: "order".to_string(),
                entity_id: id.to_string(),
                action: SyncAction::Create,
                payload: json!({}),
            })
            .expect("enqueue");
    }

    #[test]
    fn only_real_changes_are_transitions() {
        let monitor = ConnectivityMonitor::new(Connectivity::Online);
        assert_eq!(monitor.observe(true), None);
        assert_eq!(monitor.observe(false), Some(Transition::WentOffline));
        assert_eq!(monitor.observe(false), None);
        assert_eq!(monitor.observe(true), Some(Transition::WentOnline));
        assert!(monitor.is_online());
    }

    #[test]
    fn subscribers_see_state_changes() {
        let monitor = ConnectivityMonitor::new(Connectivity::Offline);
        let mut rx = monitor.subscribe();
        monitor.observe(true);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Connectivity::Online);
    }

    #[tokio::test]
    async fn drains_only_on_offline_to_online_edge() {
        let store = Arc::new(OfflineStore::open_in_memory().unwrap());
        let remote = Arc::new(MemoryRemote::new());
        let reconciler = SyncReconciler::new(store.clone(), remote.clone());
        let monitor = ConnectivityMonitor::new(Connectivity::Offline);

        enqueue(&store, "A");
        assert_eq!(monitor.report(false, &reconciler).await, None);
        assert_eq!(monitor.report(true, &reconciler).await, Some(1));

        enqueue(&store, "B");
        // Already online: no edge, no drain.
        assert_eq!(monitor.report(true, &reconciler).await, None);
        assert_eq!(store.pending_count().unwrap(), 1);
        assert_eq!(remote.sync_rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn monitor_loop_drains_after_backend_returns() {
        let store = Arc::new(OfflineStore::open_in_memory().unwrap());
        let remote = Arc::new(MemoryRemote::new());
        remote.set_offline(true);
        let reconciler = Arc::new(SyncReconciler::new(store.clone(), remote.clone()));
        let monitor = Arc::new(ConnectivityMonitor::new(Connectivity::Online));
        enqueue(&store, "A");

        let cancel = CancellationToken::new();
        let handle = spawn_monitor(
            monitor.clone(),
            remote.clone(),
            reconciler,
            MonitorSettings {
                probe_interval: Duration::from_millis(10),
                safety_net_interval: Duration::from_secs(3600),
            },
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(monitor.current(), Connectivity::Offline);
        assert_eq!(store.pending_count().unwrap(), 1);

        remote.set_offline(false);
        let mut drained = false;
        for _ in 0..200 {
            if store.pending_count().unwrap() == 0 {
                drained = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(drained, "queue was not drained after reconnect");
        assert!(monitor.is_online());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn safety_net_drains_leftovers_while_online() {
        let store = Arc::new(OfflineStore::open_in_memory().unwrap());
        let remote = Arc::new(MemoryRemote::new());
        let reconciler = Arc::new(SyncReconciler::new(store.clone(), remote.clone()));
        let monitor = Arc::new(ConnectivityMonitor::new(Connectivity::Online));
        enqueue(&store, "left-behind");

        let cancel = CancellationToken::new();
        let handle = spawn_monitor(
            monitor,
            remote.clone(),
            reconciler,
            MonitorSettings {
                probe_interval: Duration::from_secs(3600),
                safety_net_interval: Duration::from_millis(20),
            },
            cancel.clone(),
        );

        let mut drained = false;
        for _ in 0..200 {
            if store.pending_count().unwrap() == 0 {
                drained = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        handle.await.unwrap();
        assert!(drained);
    }
}
