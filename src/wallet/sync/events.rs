//! Notification fan-out for wallet synchronization.
//!
//! This module defines the notifications emitted by sync sessions and rescans, the listener trait
//! observers implement, and the `NotificationHub` that keeps the named registry of listeners.
//! Delivery is synchronous: every registered listener sees a notification before the producing
//! session moves on to its next event, so a slow listener only slows down the session that
//! produced the notification.

use crate::utils::{format_seconds, lock};
use crate::wallet::sync::progress_tracker::{
    AddressDiscoveryProgressReport, HeadersFetchProgressReport, HeadersRescanProgressReport,
    ProgressReport,
};
use crate::wallet::sync::strategies::StrategyKind;
use crate::wallet::{SyncError, WalletSyncError};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

/// Notifications delivered to sync progress listeners
#[derive(Debug, Clone, PartialEq)]
pub enum SyncNotification {
    /// A session started for the wallet.
    SyncStarted {
        wallet_id: i32,
        strategy: StrategyKind,
    },
    /// The connected peer count changed. `-1` means the count is not reported (trusted node).
    PeersChanged { wallet_id: i32, connected_peers: i32 },
    HeadersFetch(HeadersFetchProgressReport),
    AddressDiscovery(AddressDiscoveryProgressReport),
    HeadersRescan(HeadersRescanProgressReport),
    /// The wallet caught up with the network.
    SyncCompleted { wallet_id: i32 },
    /// The session ended because it was canceled or the process is shutting down.
    SyncCanceled { wallet_id: i32 },
    /// The session ended with an error.
    SyncEndedWithError { wallet_id: i32, error: SyncError },
}

impl SyncNotification {
    pub fn wallet_id(&self) -> i32 {
        match self {
            SyncNotification::SyncStarted { wallet_id, .. }
            | SyncNotification::PeersChanged { wallet_id, .. }
            | SyncNotification::SyncCompleted { wallet_id }
            | SyncNotification::SyncCanceled { wallet_id }
            | SyncNotification::SyncEndedWithError { wallet_id, .. } => *wallet_id,
            SyncNotification::HeadersFetch(report) => report.wallet_id,
            SyncNotification::AddressDiscovery(report) => report.wallet_id,
            SyncNotification::HeadersRescan(report) => report.wallet_id,
        }
    }
}

impl From<ProgressReport> for SyncNotification {
    fn from(report: ProgressReport) -> Self {
        match report {
            ProgressReport::HeadersFetch(r) => SyncNotification::HeadersFetch(r),
            ProgressReport::AddressDiscovery(r) => SyncNotification::AddressDiscovery(r),
            ProgressReport::HeadersRescan(r) => SyncNotification::HeadersRescan(r),
        }
    }
}

/// Trait for observing sync progress.
///
/// Implementors must return promptly; they run on the task of the session that produced the
/// notification.
pub trait SyncProgressListener: Send + Sync {
    /// Handle a sync notification.
    fn handle(&self, notification: &SyncNotification);

    /// Get the name of this listener for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Registry of named listeners.
#[derive(Default)]
pub struct NotificationHub {
    listeners: Mutex<HashMap<String, Arc<dyn SyncProgressListener>>>,
    show_logs: AtomicBool,
}

impl NotificationHub {
    /// Create a new, empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` under `id`. Fails without touching the registry if `id` is taken.
    pub fn add_listener(
        &self,
        id: &str,
        listener: Arc<dyn SyncProgressListener>,
    ) -> Result<(), WalletSyncError> {
        let mut listeners = lock(&self.listeners);
        if listeners.contains_key(id) {
            return Err(WalletSyncError::ListenerAlreadyExists(id.to_string()));
        }
        debug!("Registered sync listener {} ({})", id, listener.name());
        listeners.insert(id.to_string(), listener);
        Ok(())
    }

    /// Remove the listener registered under `id`, if any.
    pub fn remove_listener(&self, id: &str) {
        if lock(&self.listeners).remove(id).is_some() {
            debug!("Removed sync listener {}", id);
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Log every notification at info level from now on.
    pub fn enable_sync_logs(&self) {
        self.show_logs.store(true, Ordering::Relaxed);
    }

    /// Deliver `notification` to every listener.
    ///
    /// The registry lock is released before listeners run, so a listener may add or remove
    /// listeners while handling a notification.
    pub fn notify(&self, notification: &SyncNotification) {
        if self.show_logs.load(Ordering::Relaxed) {
            log_notification(notification);
        }

        let listeners: Vec<Arc<dyn SyncProgressListener>> =
            lock(&self.listeners).values().cloned().collect();
        for listener in listeners {
            listener.handle(notification);
        }
    }
}

fn log_notification(notification: &SyncNotification) {
    match notification {
        SyncNotification::SyncStarted {
            wallet_id,
            strategy,
        } => info!("Wallet {}: {:?} sync started", wallet_id, strategy),
        SyncNotification::PeersChanged {
            wallet_id,
            connected_peers,
        } => info!("Wallet {}: {} connected peers", wallet_id, connected_peers),
        SyncNotification::HeadersFetch(r) => info!(
            "Wallet {}: fetched {} headers (height {}), {}% done, {} left",
            r.wallet_id,
            r.fetched_headers_count,
            r.current_header_height,
            r.headers_fetch_progress,
            remaining(r.estimated_seconds_remaining)
        ),
        SyncNotification::AddressDiscovery(r) => info!(
            "Wallet {}: discovering addresses for {}, {}% done, {} left",
            r.wallet_id,
            format_seconds(r.elapsed_seconds),
            r.address_discovery_progress,
            remaining(r.estimated_seconds_remaining)
        ),
        SyncNotification::HeadersRescan(r) => info!(
            "Wallet {}: rescanned {} of {} headers, {}% done",
            r.wallet_id, r.current_rescan_height, r.total_headers_to_scan, r.rescan_progress
        ),
        SyncNotification::SyncCompleted { wallet_id } => info!("Wallet {}: synced", wallet_id),
        SyncNotification::SyncCanceled { wallet_id } => {
            info!("Wallet {}: sync canceled", wallet_id)
        }
        SyncNotification::SyncEndedWithError { wallet_id, error } => {
            error!("Wallet {}: {}", wallet_id, error)
        }
    }
}

fn remaining(estimate: Option<i64>) -> String {
    estimate.map(format_seconds).unwrap_or_else(|| "unknown".to_string())
}

/// Listener that records every notification, for tests and diagnostics.
#[derive(Default)]
pub struct RecordingListener {
    seen: Mutex<Vec<SyncNotification>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notifications(&self) -> Vec<SyncNotification> {
        lock(&self.seen).clone()
    }

    pub fn count(&self, predicate: impl Fn(&SyncNotification) -> bool) -> usize {
        lock(&self.seen).iter().filter(|n| predicate(n)).count()
    }
}

impl SyncProgressListener for RecordingListener {
    fn handle(&self, notification: &SyncNotification) {
        lock(&self.seen).push(notification.clone());
    }

    fn name(&self) -> &'static str {
        "RecordingListener"
    }
}
