//! Multi-wallet synchronization engine.
//!
//! Keeps a set of independently keyed wallets synchronized with the network, either through
//! lightweight peer connections or through a trusted node, and reports fine-grained progress to
//! registered listeners. The transport itself is reached through the capabilities in
//! [`network`]; the engine drives and observes it.

pub mod config;
pub mod network;
pub mod utils;
pub mod wallet;

pub use config::{NetworkKind, NetworkParams, SyncConfig};
pub use wallet::sync::{
	SyncNotification, SyncOptions, SyncPhase, SyncProgressListener, SyncSnapshot, SyncStrategy,
};
pub use wallet::{MultiWalletController, PassphraseType, WalletHandle, WalletSyncError};
