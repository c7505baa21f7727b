//! Wallet Synchronization Module
//!
//! This module provides the engine that keeps each wallet synchronized with the network. It is
//! composed of several submodules, each responsible for a specific aspect of the sync process:
//!
//! - `session`: Starts, runs and cancels one sync session per wallet. It wires together the
//!   backend, the progress tracker and the notification hub.
//! - `events`: Defines the notifications observers receive and the hub that fans them out.
//! - `progress_tracker`: Folds backend events into progress reports with time estimates.
//! - `state`: The per-wallet sync record shared between the session task and pollers.
//! - `strategies`: Lightweight peer and trusted node strategies, plus session options.
//! - `rescan`: Header rescans sharing the session's cancellation discipline.
//!
//! Sessions and rescans run on their own tasks; every public operation returns promptly and
//! reports outcomes through the hub.

/// Notifications and the listener registry
pub mod events;
/// Tracks synchronization progress and estimates
pub mod progress_tracker;
/// Header rescans
pub mod rescan;
/// Sync session lifecycle
pub mod session;
/// Shared per-wallet sync state
pub mod state;
/// Sync strategies and options
pub mod strategies;

pub use events::{NotificationHub, RecordingListener, SyncNotification, SyncProgressListener};
pub use progress_tracker::{
	AddressDiscoveryProgressReport, HeadersFetchProgressReport, HeadersRescanProgressReport,
	ProgressReport, SyncProgressTracker,
};
pub use rescan::{cancel_rescan, start_rescan};
pub use session::{SyncEnvironment, cancel_sync, start_sync, sync_inactive_for_period};
pub use state::{SyncPhase, SyncSnapshot, SyncState};
pub use strategies::{StrategyKind, SyncOptions, SyncStrategy};
