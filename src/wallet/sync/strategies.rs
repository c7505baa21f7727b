use crate::network::TrustedNodeCredentials;

use serde::Serialize;
use std::time::Duration;

/// How a wallet reaches the network
#[derive(Debug, Clone)]
pub enum SyncStrategy {
	/// Sync from peer-to-peer connections.
	///
	/// `peer_addresses` is a `;`-separated list of persistent peers. When `None`, the list
	/// stored under the peer address config key is used, and an empty list means discover peers.
	LightweightPeers { peer_addresses: Option<String> },
	/// Sync through one authenticated trusted node.
	TrustedNode {
		address: String,
		credentials: TrustedNodeCredentials,
	},
}

impl SyncStrategy {
	pub fn lightweight() -> Self {
		SyncStrategy::LightweightPeers {
			peer_addresses: None,
		}
	}

	pub fn with_peers(peer_addresses: impl Into<String>) -> Self {
		SyncStrategy::LightweightPeers {
			peer_addresses: Some(peer_addresses.into()),
		}
	}

	pub fn trusted_node(address: impl Into<String>, credentials: TrustedNodeCredentials) -> Self {
		SyncStrategy::TrustedNode {
			address: address.into(),
			credentials,
		}
	}

	pub fn kind(&self) -> StrategyKind {
		match self {
			SyncStrategy::LightweightPeers { .. } => StrategyKind::LightweightPeers,
			SyncStrategy::TrustedNode { .. } => StrategyKind::TrustedNode,
		}
	}

	/// Get the name of this strategy
	pub fn name(&self) -> &'static str {
		match self {
			SyncStrategy::LightweightPeers { .. } => "lightweight peers",
			SyncStrategy::TrustedNode { .. } => "trusted node",
		}
	}
}

/// Strategy tag carried in notifications and snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StrategyKind {
	LightweightPeers,
	TrustedNode,
}

/// Options for one sync session
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
	/// End the session with a deadline error once this much time has passed.
	pub timeout: Option<Duration>,
}

impl SyncOptions {
	pub fn with_timeout(timeout: Duration) -> Self {
		Self {
			timeout: Some(timeout),
		}
	}
}
