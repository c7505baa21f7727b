//! One synchronization attempt for one wallet.
//!
//! [`start_sync`] validates the request, reserves the wallet's session slot, acquires a backend
//! for the chosen strategy and spawns the session task. The task drives the backend's run loop,
//! folds its events into progress reports and tears the session down when the loop returns.
//! Outcomes reach callers only through the notification hub.

use crate::config::{NetworkParams, SPV_PERSISTENT_PEER_ADDRESSES_CONFIG_KEY, SyncConfig};
use crate::network::{
	BackendError, Cancellation, EventSink, NetworkBackend, NetworkConnectors, NetworkEvent,
	RunContext, ShutdownSignal, normalize_address, normalize_peer_addresses,
};
use crate::utils::unix_now;
use crate::wallet::repositories::{ConfigStore, WalletStore, read_config_value};
use crate::wallet::sync::events::{NotificationHub, SyncNotification};
use crate::wallet::sync::progress_tracker::{ProgressReport, SyncProgressTracker};
use crate::wallet::sync::state::{SessionReservation, SyncPhase};
use crate::wallet::sync::strategies::{StrategyKind, SyncOptions, SyncStrategy};
use crate::wallet::{SyncError, SyncErrorCode, WalletHandle, WalletSyncError};

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Shared collaborators of every session and rescan run by one controller
pub struct SyncEnvironment {
	pub params: NetworkParams,
	pub config: SyncConfig,
	pub connectors: NetworkConnectors,
	pub hub: Arc<NotificationHub>,
	pub shutdown: ShutdownSignal,
	pub wallet_store: Arc<dyn WalletStore>,
	pub config_store: Arc<dyn ConfigStore>,
}

/// Start synchronizing `wallet` with `strategy`.
///
/// Returns once the session task is running. Failures of the run itself are reported through the
/// hub as `SyncCanceled` or `SyncEndedWithError`.
pub async fn start_sync(
	env: &Arc<SyncEnvironment>,
	wallet: &Arc<WalletHandle>,
	strategy: SyncStrategy,
	options: SyncOptions,
) -> Result<(), WalletSyncError> {
	if !wallet.loader().is_open() {
		return Err(WalletSyncError::WalletNotLoaded);
	}
	if env.shutdown.is_triggered() {
		return Err(WalletSyncError::ShuttingDown);
	}

	let deadline = options.timeout.map(|timeout| Instant::now() + timeout);
	let scope = env.shutdown.child(deadline);
	let kind = strategy.kind();
	let reservation = wallet.sync_state().reserve_session(kind, scope)?;
	let generation = reservation.generation;

	// Peers are only checked once the slot is ours, so a busy wallet reports `AlreadySyncing`.
	let explicit_peers = match &strategy {
		SyncStrategy::LightweightPeers {
			peer_addresses: Some(list),
		} => match validated_peers(list, env.params.default_port) {
			Ok(peers) => Some(peers),
			Err(e) => {
				wallet.sync_state().release_session(generation);
				return Err(e);
			}
		},
		_ => None,
	};

	info!(
		"Wallet {}: starting {} sync",
		wallet.id(),
		strategy.name()
	);

	let backend = match acquire_backend(env, wallet, &strategy, explicit_peers, &reservation).await
	{
		Ok(backend) => backend,
		Err(e) => {
			warn!("Wallet {}: sync could not start: {}", wallet.id(), e);
			wallet.sync_state().release_session(generation);
			return Err(e);
		}
	};

	if !wallet.sync_state().attach_backend(generation, backend.clone()) {
		wallet.sync_state().release_session(generation);
		return Err(reservation
			.scope
			.state()
			.map(|reason| WalletSyncError::from(BackendError::from(reason)))
			.unwrap_or(WalletSyncError::Canceled));
	}
	wallet.loader().attach_backend(backend.clone());

	env.hub.notify(&SyncNotification::SyncStarted {
		wallet_id: wallet.id(),
		strategy: kind,
	});
	if kind == StrategyKind::TrustedNode {
		wallet.sync_state().set_peers_unreported(generation);
		env.hub.notify(&SyncNotification::PeersChanged {
			wallet_id: wallet.id(),
			connected_peers: -1,
		});
	}

	let session = SyncSession {
		tracker: SyncProgressTracker::new(
			wallet.id(),
			&env.params,
			&env.config,
			wallet.sync_state().expected_discovery_seconds(),
		),
		env: env.clone(),
		wallet: wallet.clone(),
		strategy: kind,
		reservation,
		completion_notified: false,
	};
	tokio::spawn(session.run(backend));

	Ok(())
}

/// Cancel the live session of `wallet` and wait until it is fully torn down.
///
/// Does nothing when no session is live, beyond waiting out the teardown of one that just ended.
pub async fn cancel_sync(wallet: &WalletHandle) {
	let Some(cancel) = wallet.sync_state().begin_cancel() else {
		// A session that ended on its own may still be tearing down.
		wallet.sync_state().session_finished().await;
		return;
	};

	info!("Wallet {}: canceling sync", wallet.id());
	cancel.scope.cancel();
	wallet.sync_state().detach_backend();
	wallet.loader().detach_backend();
	cancel.wait().await;
	debug!("Wallet {}: sync canceled, network quiescent", wallet.id());
}

/// Report a span of time during which the application was not progressing.
pub fn sync_inactive_for_period(wallet: &WalletHandle, seconds: i64) {
	if wallet.sync_state().report_inactivity(seconds) {
		debug!(
			"Wallet {}: reported {} seconds of inactivity",
			wallet.id(),
			seconds
		);
	} else {
		debug!(
			"Wallet {}: not syncing, ignoring reported inactivity",
			wallet.id()
		);
	}
}

/// Normalize an explicit peer list; an all-invalid non-empty list is an error.
fn validated_peers(list: &str, default_port: u16) -> Result<Vec<String>, WalletSyncError> {
	let peers = normalize_peer_addresses(list, default_port);
	if peers.is_empty() && !list.trim().is_empty() {
		return Err(WalletSyncError::InvalidPeers);
	}
	Ok(peers)
}

async fn acquire_backend(
	env: &SyncEnvironment,
	wallet: &WalletHandle,
	strategy: &SyncStrategy,
	explicit_peers: Option<Vec<String>>,
	reservation: &SessionReservation,
) -> Result<Arc<dyn NetworkBackend>, WalletSyncError> {
	match strategy {
		SyncStrategy::LightweightPeers { .. } => {
			let peers = match explicit_peers {
				Some(peers) => peers,
				None => {
					let stored: Option<String> = read_config_value(
						env.config_store.as_ref(),
						SPV_PERSISTENT_PEER_ADDRESSES_CONFIG_KEY,
					)
					.await?;
					match stored {
						Some(list) => validated_peers(&list, env.params.default_port)?,
						None => Vec::new(),
					}
				}
			};

			debug!(
				"Wallet {}: persistent peers {:?}",
				wallet.id(),
				peers
			);
			let backend = env.connectors.peers.create(&wallet.record(), &env.params);
			backend.connect(&peers).await?;
			Ok(backend)
		}
		SyncStrategy::TrustedNode {
			address,
			credentials,
		} => {
			let address = normalize_address(address, env.params.json_rpc_client_port)?;
			if let Some(client) = wallet.sync_state().cached_rpc_client() {
				if client.address() == address {
					debug!("Wallet {}: reusing trusted node client", wallet.id());
					return Ok(client.network_backend());
				}
			}

			let client = env
				.connectors
				.trusted_node
				.connect(&env.params, &address, credentials, &reservation.scope)
				.await
				.map_err(|e| match e {
					BackendError::InvalidAuth => WalletSyncError::InvalidCredentials,
					BackendError::Canceled => WalletSyncError::Canceled,
					BackendError::DeadlineExceeded => WalletSyncError::DeadlineExceeded,
					BackendError::Unavailable(reason) | BackendError::Failed(reason) => {
						WalletSyncError::Unavailable(reason)
					}
				})?;
			info!(
				"Wallet {}: connected to trusted node {}",
				wallet.id(),
				address
			);
			wallet.sync_state().cache_rpc_client(client.clone());
			Ok(client.network_backend())
		}
	}
}

/// State owned by a running session task
struct SyncSession {
	env: Arc<SyncEnvironment>,
	wallet: Arc<WalletHandle>,
	strategy: StrategyKind,
	reservation: SessionReservation,
	tracker: SyncProgressTracker,
	completion_notified: bool,
}

impl SyncSession {
	async fn run(mut self, backend: Arc<dyn NetworkBackend>) {
		let (sink, mut events) = EventSink::channel();
		let ctx = RunContext {
			cancel: self.reservation.scope.clone(),
			events: sink,
			peers: self.reservation.peers.clone(),
		};

		let interval = self
			.env
			.config
			.discovery_progress_interval
			.max(Duration::from_millis(10));
		let mut ticker = tokio::time::interval(interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		debug!(
			"Wallet {}: running {} backend",
			self.wallet.id(),
			backend.name()
		);
		let run = backend.run(ctx);
		tokio::pin!(run);

		let outcome = loop {
			tokio::select! {
				result = &mut run => break result,
				Some(event) = events.recv() => self.handle_event(event).await,
				Some(seconds) = self.reservation.inactivity.recv() => {
					let peers = self.wallet.sync_state().connected_peers();
					let total = self.tracker.add_inactive_time(seconds, peers);
					debug!("Wallet {}: {} seconds inactive in total", self.wallet.id(), total);
				}
				_ = ticker.tick() => {
					if let Some(report) = self.tracker.discovery_tick(unix_now()) {
						self.publish(report);
					}
				}
			}
		};

		// Everything the backend emitted before returning is still processed, in order.
		events.close();
		while let Some(event) = events.recv().await {
			self.handle_event(event).await;
		}

		self.finish(outcome).await;
	}

	async fn handle_event(&mut self, event: NetworkEvent) {
		let wallet_id = self.wallet.id();
		let generation = self.reservation.generation;
		let state = self.wallet.sync_state();

		match &event {
			NetworkEvent::PeersChanged { delta } if self.strategy == StrategyKind::LightweightPeers => {
				let connected_peers = state.apply_peer_delta(generation, *delta);
				self.env.hub.notify(&SyncNotification::PeersChanged {
					wallet_id,
					connected_peers,
				});
			}
			// Trusted nodes do not report peers.
			NetworkEvent::PeersChanged { .. } => {}
			NetworkEvent::HeadersFetchStarted { .. } | NetworkEvent::HeadersFetched { .. } => {
				state.advance_phase(generation, SyncPhase::FetchingHeaders)
			}
			NetworkEvent::DiscoveryStarted | NetworkEvent::DiscoveryCompleted => {
				state.advance_phase(generation, SyncPhase::DiscoveringAddresses)
			}
			NetworkEvent::RescanStarted | NetworkEvent::RescanProgress { .. } => {
				state.advance_phase(generation, SyncPhase::RescanningHeaders)
			}
			NetworkEvent::Synced { synced } => {
				if *synced {
					info!("Wallet {}: synced", wallet_id);
					self.completion_notified = true;
					self.env
						.hub
						.notify(&SyncNotification::SyncCompleted { wallet_id });
				}
				state.set_synced(generation, *synced);
			}
		}

		if let Some(report) = self.tracker.apply(&event, unix_now()) {
			self.publish(report);
		}

		if event == NetworkEvent::DiscoveryCompleted {
			self.discovery_completed().await;
		}
	}

	async fn discovery_completed(&self) {
		if let Some(spent) = self.tracker.discovery_time_spent() {
			self.wallet
				.sync_state()
				.record_discovery(spent, self.env.config.discovery_history_weight);
		}
		if let Err(e) = self
			.wallet
			.mark_accounts_discovered(self.env.wallet_store.as_ref())
			.await
		{
			error!(
				"Wallet {}: failed to persist account discovery: {}",
				self.wallet.id(),
				e
			);
		}
	}

	fn publish(&self, report: ProgressReport) {
		self.wallet.sync_state().record_report(&report);
		self.env.hub.notify(&report.into());
	}

	/// Tear the session down and report how it ended.
	async fn finish(self, outcome: Result<(), BackendError>) {
		let wallet_id = self.wallet.id();
		let generation = self.reservation.generation;

		// A fired scope explains the outcome better than whatever the backend returned.
		let notification = match (self.reservation.scope.state(), outcome) {
			(Some(Cancellation::Canceled), _) | (None, Err(BackendError::Canceled)) => {
				info!("Wallet {}: sync canceled", wallet_id);
				Some(SyncNotification::SyncCanceled { wallet_id })
			}
			(Some(Cancellation::DeadlineExceeded), _)
			| (None, Err(BackendError::DeadlineExceeded)) => Some(self.failed(SyncError {
				code: SyncErrorCode::DeadlineExceeded,
				cause: BackendError::DeadlineExceeded,
			})),
			(None, Err(cause)) => Some(self.failed(SyncError {
				code: SyncErrorCode::Unexpected,
				cause,
			})),
			(None, Ok(())) if !self.completion_notified => {
				info!("Wallet {}: backend finished", wallet_id);
				Some(SyncNotification::SyncCompleted { wallet_id })
			}
			(None, Ok(())) => None,
		};

		// The slot is only freed once every peer of this session has disconnected.
		self.reservation.peers.wait_quiescent().await;
		self.wallet.sync_state().release_session(generation);
		self.wallet.loader().detach_backend();

		if let Some(notification) = notification {
			self.env.hub.notify(&notification);
		}
		// Dropping the reservation releases callers waiting in `cancel_sync`.
		drop(self.reservation);
	}

	fn failed(&self, error: SyncError) -> SyncNotification {
		error!("Wallet {}: {}", self.wallet.id(), error);
		self.wallet
			.sync_state()
			.mark_errored(self.reservation.generation, error.clone());
		SyncNotification::SyncEndedWithError {
			wallet_id: self.wallet.id(),
			error,
		}
	}
}
