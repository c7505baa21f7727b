//! Network integration boundary.
//!
//! This module holds the capabilities the sync engine drives (backends and trusted node
//! connectors), the event types those backends emit, cooperative cancellation, the peer
//! quiescence barrier and peer address normalization. A scripted in-memory backend is provided
//! for demos and tests.

/// Peer and trusted node address normalization
pub mod address;
/// Backend and connector capabilities
pub mod backend;
/// Shutdown signal, cancel scopes and the run context handed to backends
pub mod context;
/// Peer quiescence barrier
pub mod peers;
/// Scripted in-memory backend
pub mod scripted;
/// Events, errors and the event sink
pub mod types;

pub use address::{AddressError, normalize_address, normalize_peer_addresses};
pub use backend::*;
pub use context::{CancelScope, RunContext, ShutdownSignal};
pub use peers::{PeerBarrier, PeerGuard};
pub use types::*;
