//! In-memory backend that plays back a fixed script of network activity.
//!
//! Used by the demo binary and by tests in place of a real peer-to-peer or RPC transport.

use super::backend::{
	NetworkBackend, NetworkConnectors, PeerNetworkConnector, RescanStream, TrustedNodeClient,
	TrustedNodeConnector, TrustedNodeCredentials,
};
use super::context::{CancelScope, RunContext};
use super::peers::{PeerBarrier, PeerGuard};
use super::types::{BackendError, EventSink, NetworkEvent, RescanProgress};
use crate::config::NetworkParams;
use crate::utils::lock;
use crate::wallet::Wallet;

use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// One step of a scripted run.
#[derive(Debug, Clone)]
pub enum ScriptStep {
	ConnectPeers(usize),
	DisconnectPeers(usize),
	Emit(NetworkEvent),
	Sleep(Duration),
	/// End the run with an error.
	Fail(String),
	/// End the run successfully.
	Finish,
}

pub struct ScriptedBackend {
	script: Vec<ScriptStep>,
	rescan_batches: Vec<RescanProgress>,
	rescan_delay: Duration,
	rescan_failure: Option<(usize, String)>,
	disconnect_delay: Duration,
	persistent_peers: Mutex<Vec<String>>,
	runs: AtomicUsize,
}

impl ScriptedBackend {
	/// A backend that plays `script` and then stays connected until canceled.
	pub fn new(script: Vec<ScriptStep>) -> Self {
		Self {
			script,
			rescan_batches: Vec::new(),
			rescan_delay: Duration::ZERO,
			rescan_failure: None,
			disconnect_delay: Duration::ZERO,
			persistent_peers: Mutex::new(Vec::new()),
			runs: AtomicUsize::new(0),
		}
	}

	/// Connect two peers, fetch headers up to `tip`, discover addresses and report synced.
	pub fn full_sync(tip: i32, step: Duration) -> Self {
		let now = crate::utils::unix_now();
		let half = tip / 2;
		Self::new(vec![
			ScriptStep::ConnectPeers(2),
			ScriptStep::Emit(NetworkEvent::HeadersFetchStarted {
				peer_initial_height: Some(tip),
			}),
			ScriptStep::Sleep(step),
			ScriptStep::Emit(NetworkEvent::HeadersFetched {
				fetched: half,
				height: half,
				header_time: now - i64::from(tip - half) * 300,
			}),
			ScriptStep::Sleep(step),
			ScriptStep::Emit(NetworkEvent::HeadersFetched {
				fetched: tip,
				height: tip,
				header_time: now,
			}),
			ScriptStep::Emit(NetworkEvent::DiscoveryStarted),
			ScriptStep::Sleep(step),
			ScriptStep::Emit(NetworkEvent::DiscoveryCompleted),
			ScriptStep::Emit(NetworkEvent::RescanStarted),
			ScriptStep::Emit(NetworkEvent::RescanProgress {
				scanned: tip,
				total: tip,
			}),
			ScriptStep::Emit(NetworkEvent::Synced { synced: true }),
		])
	}

	/// Batches served by [`NetworkBackend::rescan_from_height`], one every `delay`.
	pub fn with_rescan(mut self, batches: Vec<RescanProgress>, delay: Duration) -> Self {
		self.rescan_batches = batches;
		self.rescan_delay = delay;
		self
	}

	/// Make the rescan stream yield an error after `after` batches.
	pub fn with_rescan_failure(mut self, after: usize, message: impl Into<String>) -> Self {
		self.rescan_failure = Some((after, message.into()));
		self
	}

	/// Keep peers connected for `delay` after the run loop returns.
	pub fn with_disconnect_delay(mut self, delay: Duration) -> Self {
		self.disconnect_delay = delay;
		self
	}

	pub fn persistent_peers(&self) -> Vec<String> {
		lock(&self.persistent_peers).clone()
	}

	/// Number of times the run loop was entered.
	pub fn runs(&self) -> usize {
		self.runs.load(Ordering::SeqCst)
	}

	async fn play(
		&self,
		events: &EventSink,
		peers: &PeerBarrier,
		guards: &mut Vec<PeerGuard>,
	) -> Result<(), BackendError> {
		for step in &self.script {
			match step {
				ScriptStep::ConnectPeers(count) => {
					for _ in 0..*count {
						guards.push(peers.connect());
					}
					events.emit(NetworkEvent::PeersChanged {
						delta: *count as i32,
					});
				}
				ScriptStep::DisconnectPeers(count) => {
					let count = (*count).min(guards.len());
					guards.truncate(guards.len() - count);
					events.emit(NetworkEvent::PeersChanged {
						delta: -(count as i32),
					});
				}
				ScriptStep::Emit(event) => {
					events.emit(event.clone());
				}
				ScriptStep::Sleep(duration) => tokio::time::sleep(*duration).await,
				ScriptStep::Fail(message) => return Err(BackendError::Failed(message.clone())),
				ScriptStep::Finish => return Ok(()),
			}
		}
		std::future::pending::<()>().await;
		Ok(())
	}
}

#[async_trait::async_trait]
impl NetworkBackend for ScriptedBackend {
	async fn connect(&self, persistent_peers: &[String]) -> Result<(), BackendError> {
		*lock(&self.persistent_peers) = persistent_peers.to_vec();
		Ok(())
	}

	async fn run(&self, ctx: RunContext) -> Result<(), BackendError> {
		let RunContext {
			cancel,
			events,
			peers,
		} = ctx;
		self.runs.fetch_add(1, Ordering::SeqCst);

		let mut guards = Vec::new();
		let outcome = tokio::select! {
			reason = cancel.cancelled() => Err(BackendError::from(reason)),
			result = self.play(&events, &peers, &mut guards) => result,
		};

		let remaining = guards.len() as i32;
		if remaining > 0 {
			if self.disconnect_delay.is_zero() {
				drop(guards);
			} else {
				let delay = self.disconnect_delay;
				tokio::spawn(async move {
					tokio::time::sleep(delay).await;
					drop(guards);
				});
			}
			events.emit(NetworkEvent::PeersChanged { delta: -remaining });
		}

		debug!("Scripted run loop ended: {:?}", outcome);
		outcome
	}

	async fn rescan_from_height(
		&self,
		height: i32,
		_cancel: CancelScope,
	) -> Result<RescanStream, BackendError> {
		debug!("Scripted rescan from height {}", height);

		let mut items: Vec<Result<RescanProgress, BackendError>> =
			self.rescan_batches.iter().copied().map(Ok).collect();
		if let Some((after, message)) = &self.rescan_failure {
			items.truncate(*after);
			items.push(Err(BackendError::Failed(message.clone())));
		}

		let delay = self.rescan_delay;
		let stream = futures::stream::iter(items).then(move |item| async move {
			tokio::time::sleep(delay).await;
			item
		});
		Ok(stream.boxed())
	}

	fn name(&self) -> &'static str {
		"ScriptedBackend"
	}
}

type BackendFactory = dyn Fn() -> ScriptedBackend + Send + Sync;

/// Connector handing out scripted backends for both sync strategies.
pub struct ScriptedConnector {
	factory: Box<BackendFactory>,
	created: Mutex<Vec<Arc<ScriptedBackend>>>,
	expected_password: Option<String>,
	trusted_node_connects: AtomicUsize,
}

impl ScriptedConnector {
	pub fn new(factory: impl Fn() -> ScriptedBackend + Send + Sync + 'static) -> Self {
		Self {
			factory: Box::new(factory),
			created: Mutex::new(Vec::new()),
			expected_password: None,
			trusted_node_connects: AtomicUsize::new(0),
		}
	}

	/// Reject trusted node connections whose password differs from `password`.
	pub fn with_password(mut self, password: impl Into<String>) -> Self {
		self.expected_password = Some(password.into());
		self
	}

	pub fn into_connectors(self: Arc<Self>) -> NetworkConnectors {
		NetworkConnectors {
			peers: self.clone(),
			trusted_node: self,
		}
	}

	/// Every backend created so far, oldest first.
	pub fn backends(&self) -> Vec<Arc<ScriptedBackend>> {
		lock(&self.created).clone()
	}

	pub fn last_backend(&self) -> Option<Arc<ScriptedBackend>> {
		lock(&self.created).last().cloned()
	}

	pub fn trusted_node_connects(&self) -> usize {
		self.trusted_node_connects.load(Ordering::SeqCst)
	}

	fn make_backend(&self) -> Arc<ScriptedBackend> {
		let backend = Arc::new((self.factory)());
		lock(&self.created).push(backend.clone());
		backend
	}
}

impl PeerNetworkConnector for ScriptedConnector {
	fn create(&self, wallet: &Wallet, params: &NetworkParams) -> Arc<dyn NetworkBackend> {
		debug!(
			"Creating scripted peer backend for wallet {} on {}",
			wallet.id, params.kind
		);
		self.make_backend()
	}
}

#[async_trait::async_trait]
impl TrustedNodeConnector for ScriptedConnector {
	async fn connect(
		&self,
		_params: &NetworkParams,
		address: &str,
		credentials: &TrustedNodeCredentials,
		cancel: &CancelScope,
	) -> Result<Arc<dyn TrustedNodeClient>, BackendError> {
		if let Some(reason) = cancel.state() {
			return Err(reason.into());
		}
		self.trusted_node_connects.fetch_add(1, Ordering::SeqCst);
		if let Some(expected) = &self.expected_password {
			if expected != &credentials.password {
				return Err(BackendError::InvalidAuth);
			}
		}
		Ok(Arc::new(ScriptedTrustedNodeClient {
			address: address.to_string(),
			backend: self.make_backend(),
		}))
	}
}

struct ScriptedTrustedNodeClient {
	address: String,
	backend: Arc<ScriptedBackend>,
}

impl TrustedNodeClient for ScriptedTrustedNodeClient {
	fn address(&self) -> &str {
		&self.address
	}

	fn network_backend(&self) -> Arc<dyn NetworkBackend> {
		self.backend.clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::network::context::ShutdownSignal;

	#[tokio::test]
	async fn plays_script_and_releases_peers_on_cancel() {
		let backend = ScriptedBackend::new(vec![
			ScriptStep::ConnectPeers(2),
			ScriptStep::Emit(NetworkEvent::DiscoveryStarted),
		]);
		let (events, mut rx) = EventSink::channel();
		let peers = PeerBarrier::new();
		let cancel = ShutdownSignal::new().child(None);

		let ctx = RunContext {
			cancel: cancel.clone(),
			events,
			peers: peers.clone(),
		};
		let run = tokio::spawn(async move { backend.run(ctx).await });

		assert_eq!(
			rx.recv().await,
			Some(NetworkEvent::PeersChanged { delta: 2 })
		);
		assert_eq!(rx.recv().await, Some(NetworkEvent::DiscoveryStarted));
		assert_eq!(peers.connected(), 2);

		cancel.cancel();
		assert_eq!(run.await.unwrap(), Err(BackendError::Canceled));
		assert_eq!(peers.connected(), 0);
		assert_eq!(
			rx.recv().await,
			Some(NetworkEvent::PeersChanged { delta: -2 })
		);
	}

	#[tokio::test]
	async fn failing_step_ends_run() {
		let backend = ScriptedBackend::new(vec![ScriptStep::Fail("boom".into())]);
		let (events, _rx) = EventSink::channel();
		let ctx = RunContext {
			cancel: CancelScope::detached(None),
			events,
			peers: PeerBarrier::new(),
		};
		assert_eq!(
			backend.run(ctx).await,
			Err(BackendError::Failed("boom".into()))
		);
		assert_eq!(backend.runs(), 1);
	}

	#[tokio::test]
	async fn rescan_stream_reports_failure() {
		let backend = ScriptedBackend::new(Vec::new())
			.with_rescan(
				vec![
					RescanProgress {
						scanned: 10,
						total: 30,
					},
					RescanProgress {
						scanned: 10,
						total: 30,
					},
				],
				Duration::ZERO,
			)
			.with_rescan_failure(1, "disk gone");

		let items: Vec<_> = backend
			.rescan_from_height(0, CancelScope::detached(None))
			.await
			.unwrap()
			.collect()
			.await;
		assert_eq!(items.len(), 2);
		assert!(items[0].is_ok());
		assert_eq!(items[1], Err(BackendError::Failed("disk gone".into())));
	}
}
