//! Types shared between the sync engine and network backends

use tokio::sync::mpsc;

/// Events a backend emits while its run loop is active.
///
/// Events from one backend are consumed in emission order by the session that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// The number of connected peers changed by `delta`.
    PeersChanged { delta: i32 },
    /// Header download began; the best peer advertised `peer_initial_height` if known.
    HeadersFetchStarted { peer_initial_height: Option<i32> },
    /// Headers were fetched.
    HeadersFetched {
        /// Cumulative number of headers fetched by this run.
        fetched: i32,
        /// Height of the last fetched header.
        height: i32,
        /// Unix timestamp of the last fetched header.
        header_time: i64,
    },
    /// Address discovery began.
    DiscoveryStarted,
    /// Address discovery finished.
    DiscoveryCompleted,
    /// A header rescan began as part of the sync.
    RescanStarted,
    /// A batch of `scanned` heights was rescanned out of `total`.
    RescanProgress { scanned: i32, total: i32 },
    /// The wallet caught up with the network (`true`) or fell behind again (`false`).
    Synced { synced: bool },
}

/// A single item of a standalone rescan stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RescanProgress {
    /// Heights scanned in this batch.
    pub scanned: i32,
    /// Height of the main chain tip being scanned towards.
    pub total: i32,
}

/// Reason a cancel scope fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancellation {
    Canceled,
    DeadlineExceeded,
}

/// Errors reported by network backends and trusted node connectors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("invalid credentials")]
    InvalidAuth,

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend failure: {0}")]
    Failed(String),
}

impl From<Cancellation> for BackendError {
    fn from(reason: Cancellation) -> Self {
        match reason {
            Cancellation::Canceled => BackendError::Canceled,
            Cancellation::DeadlineExceeded => BackendError::DeadlineExceeded,
        }
    }
}

/// Sending half of a session's event channel, handed to the backend's run loop.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<NetworkEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NetworkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit an event. Returns `false` once the session stopped listening.
    pub fn emit(&self, event: NetworkEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}
