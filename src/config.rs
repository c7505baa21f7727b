//! Network parameters, engine tuning and user-config keys.
//!
//! Defaults match the values the wallet has always used: 300 s blocks on main net, 120 s on the
//! test network, and a 60 s reconnection allowance when inactivity is reported with no peers.
//! Hosts that need different values can deserialize a [`SyncConfig`] from JSON; missing fields
//! fall back to the defaults.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const SPV_PERSISTENT_PEER_ADDRESSES_CONFIG_KEY: &str = "spv_peer_addresses";

/// Prefix of generated wallet names; user supplied names may not use it.
pub const RESERVED_WALLET_NAME_PREFIX: &str = "wallet-";

/// Supported networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
	MainNet,
	TestNet,
	SimNet,
}

impl NetworkKind {
	pub fn name(&self) -> &'static str {
		match self {
			NetworkKind::MainNet => "mainnet",
			NetworkKind::TestNet => "testnet3",
			NetworkKind::SimNet => "simnet",
		}
	}

	pub fn params(&self) -> NetworkParams {
		NetworkParams::for_network(*self)
	}
}

impl fmt::Display for NetworkKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for NetworkKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"mainnet" => Ok(NetworkKind::MainNet),
			"testnet" | "testnet3" => Ok(NetworkKind::TestNet),
			"simnet" => Ok(NetworkKind::SimNet),
			other => Err(format!("unsupported network type: {}", other)),
		}
	}
}

/// Per-network constants consumed by address normalization and progress estimation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
	pub kind: NetworkKind,
	/// Default P2P port appended to peer addresses without one.
	pub default_port: u16,
	/// Default JSON-RPC port appended to trusted node addresses without one.
	pub json_rpc_client_port: u16,
	/// Expected seconds between blocks.
	pub target_time_per_block: i64,
}

impl NetworkParams {
	pub fn for_network(kind: NetworkKind) -> Self {
		match kind {
			NetworkKind::MainNet => Self {
				kind,
				default_port: 9108,
				json_rpc_client_port: 9109,
				target_time_per_block: 300,
			},
			NetworkKind::TestNet => Self {
				kind,
				default_port: 19108,
				json_rpc_client_port: 19109,
				target_time_per_block: 120,
			},
			NetworkKind::SimNet => Self {
				kind,
				default_port: 18555,
				json_rpc_client_port: 19556,
				target_time_per_block: 1,
			},
		}
	}
}

/// Tuning for sync sessions and progress estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
	/// Added to reported inactivity when no peers are connected, to cover reconnection.
	pub inactivity_grace_seconds: i64,
	/// How often address discovery progress is re-published while the phase runs.
	#[serde(with = "duration_millis")]
	pub discovery_progress_interval: Duration,
	/// Weight of the newest sample in the discovery duration average, in `(0, 1]`.
	pub discovery_history_weight: f64,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			inactivity_grace_seconds: 60,
			discovery_progress_interval: Duration::from_secs(1),
			discovery_history_weight: 0.5,
		}
	}
}

impl SyncConfig {
	pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
		let mut config: SyncConfig = serde_json::from_str(json)?;
		config.discovery_history_weight = valid_history_weight(config.discovery_history_weight);
		if config.discovery_progress_interval.is_zero() {
			config.discovery_progress_interval = SyncConfig::default().discovery_progress_interval;
		}
		Ok(config)
	}
}

/// `weight` if it lies in `(0, 1]`, the default weight otherwise.
pub(crate) fn valid_history_weight(weight: f64) -> f64 {
	if weight > 0.0 && weight <= 1.0 {
		weight
	} else {
		SyncConfig::default().discovery_history_weight
	}
}

mod duration_millis {
	use serde::{Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u64(value.as_millis() as u64)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		Ok(Duration::from_millis(u64::deserialize(deserializer)?))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn network_constants() {
		assert_eq!(NetworkKind::MainNet.params().target_time_per_block, 300);
		assert_eq!(NetworkKind::TestNet.params().target_time_per_block, 120);
		assert_eq!(NetworkKind::MainNet.params().default_port, 9108);
		assert_eq!("testnet3".parse::<NetworkKind>(), Ok(NetworkKind::TestNet));
		assert!("regnet".parse::<NetworkKind>().is_err());
	}

	#[test]
	fn partial_json_keeps_defaults() {
		let config = SyncConfig::from_json_str(r#"{ "inactivity_grace_seconds": 30 }"#).unwrap();
		assert_eq!(config.inactivity_grace_seconds, 30);
		assert_eq!(config.discovery_progress_interval, Duration::from_secs(1));
		assert_eq!(config.discovery_history_weight, 0.5);
	}

	#[test]
	fn out_of_range_weight_is_replaced() {
		let config = SyncConfig::from_json_str(
			r#"{ "discovery_history_weight": 3.0, "discovery_progress_interval": 0 }"#,
		)
		.unwrap();
		assert_eq!(config.discovery_history_weight, 0.5);
		assert_eq!(config.discovery_progress_interval, Duration::from_secs(1));
	}
}
