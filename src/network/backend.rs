//! Capabilities the sync engine needs from the network layer.
//!
//! The engine never speaks a wire protocol itself. It asks a [`PeerNetworkConnector`] or a
//! [`TrustedNodeConnector`] for a [`NetworkBackend`], runs it, and folds the [`NetworkEvent`]s it
//! emits into progress reports.
//!
//! [`NetworkEvent`]: super::types::NetworkEvent

use super::context::{CancelScope, RunContext};
use super::types::{BackendError, RescanProgress};
use crate::config::NetworkParams;
use crate::wallet::Wallet;

use futures::stream::BoxStream;
use std::sync::Arc;

pub type RescanStream = BoxStream<'static, Result<RescanProgress, BackendError>>;

/// A synchronization backend attached to one wallet.
#[async_trait::async_trait]
pub trait NetworkBackend: Send + Sync {
	/// Configure the persistent peers to connect to. Empty means "discover peers".
	async fn connect(&self, persistent_peers: &[String]) -> Result<(), BackendError>;

	/// Run the synchronization loop until it fails or `ctx.cancel` fires.
	///
	/// A canceled loop must return [`BackendError::Canceled`] or
	/// [`BackendError::DeadlineExceeded`] matching the scope's reason.
	async fn run(&self, ctx: RunContext) -> Result<(), BackendError>;

	/// Stream rescan progress starting at `height`.
	async fn rescan_from_height(
		&self,
		height: i32,
		cancel: CancelScope,
	) -> Result<RescanStream, BackendError>;

	/// Get the name of this backend for logging and diagnostics.
	fn name(&self) -> &'static str;
}

/// Creates lightweight-peer backends.
pub trait PeerNetworkConnector: Send + Sync {
	fn create(&self, wallet: &Wallet, params: &NetworkParams) -> Arc<dyn NetworkBackend>;
}

/// An authenticated connection to a trusted node.
pub trait TrustedNodeClient: Send + Sync {
	/// Address the client is connected to.
	fn address(&self) -> &str;

	/// A backend that synchronizes a wallet through this client.
	fn network_backend(&self) -> Arc<dyn NetworkBackend>;
}

/// Opens trusted node connections.
#[async_trait::async_trait]
pub trait TrustedNodeConnector: Send + Sync {
	async fn connect(
		&self,
		params: &NetworkParams,
		address: &str,
		credentials: &TrustedNodeCredentials,
		cancel: &CancelScope,
	) -> Result<Arc<dyn TrustedNodeClient>, BackendError>;
}

/// Username, password and optional TLS certificate for a trusted node.
#[derive(Clone, Default)]
pub struct TrustedNodeCredentials {
	pub username: String,
	pub password: String,
	pub certificate: Option<Vec<u8>>,
}

impl std::fmt::Debug for TrustedNodeCredentials {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TrustedNodeCredentials")
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.field("certificate", &self.certificate.as_ref().map(Vec::len))
			.finish()
	}
}

/// The pair of connectors a controller draws backends from.
#[derive(Clone)]
pub struct NetworkConnectors {
	pub peers: Arc<dyn PeerNetworkConnector>,
	pub trusted_node: Arc<dyn TrustedNodeConnector>,
}
