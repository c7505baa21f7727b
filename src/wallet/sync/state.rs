//! Per-wallet synchronization state.
//!
//! Everything a session shares with the outside world lives in [`SyncState`]: the cached trusted
//! node client, the attached backend, the connected peer count and the records of the live
//! session and rescan, all behind a single mutex. Pollers never touch those fields directly; they
//! read an immutable [`SyncSnapshot`] that is replaced as a whole on every change.

use crate::config::valid_history_weight;
use crate::network::{CancelScope, NetworkBackend, PeerBarrier, TrustedNodeClient};
use crate::utils::lock;
use crate::wallet::sync::progress_tracker::{
	AddressDiscoveryProgressReport, HeadersFetchProgressReport, HeadersRescanProgressReport,
	ProgressReport,
};
use crate::wallet::sync::strategies::StrategyKind;
use crate::wallet::{SyncError, WalletSyncError};

use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Phase of a wallet's synchronization.
///
/// The main phases only move forward within a session. `Canceling` and `Errored` hold until the
/// session record is discarded, after which the wallet is `Idle` again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SyncPhase {
	#[default]
	Idle,
	Connecting,
	FetchingHeaders,
	DiscoveringAddresses,
	RescanningHeaders,
	Synced,
	Canceling,
	Errored,
}

impl SyncPhase {
	fn rank(self) -> Option<u8> {
		match self {
			SyncPhase::Idle => Some(0),
			SyncPhase::Connecting => Some(1),
			SyncPhase::FetchingHeaders => Some(2),
			SyncPhase::DiscoveringAddresses => Some(3),
			SyncPhase::RescanningHeaders => Some(4),
			SyncPhase::Synced => Some(5),
			SyncPhase::Canceling | SyncPhase::Errored => None,
		}
	}

	/// The phase after moving towards `next`, which is never behind `self`.
	pub fn advance(self, next: SyncPhase) -> SyncPhase {
		match (self.rank(), next.rank()) {
			(None, _) => self,
			(Some(_), None) => next,
			(Some(current), Some(target)) if target > current => next,
			_ => self,
		}
	}
}

/// Point-in-time view of a wallet's synchronization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSnapshot {
	pub phase: SyncPhase,
	/// `-1` while syncing through a trusted node, which does not report peers.
	pub connected_peers: i32,
	pub strategy: Option<StrategyKind>,
	pub headers_fetch: Option<HeadersFetchProgressReport>,
	pub address_discovery: Option<AddressDiscoveryProgressReport>,
	pub headers_rescan: Option<HeadersRescanProgressReport>,
	pub synced: bool,
	pub rescanning: bool,
	/// Failure of the most recent session, kept after it ended.
	pub last_error: Option<SyncError>,
}

struct ActiveSession {
	generation: u64,
	scope: CancelScope,
	peers: PeerBarrier,
	inactivity: mpsc::UnboundedSender<i64>,
	done: watch::Receiver<bool>,
}

struct ActiveRescan {
	generation: u64,
	scope: CancelScope,
}

#[derive(Default)]
struct Inner {
	rpc_client: Option<Arc<dyn TrustedNodeClient>>,
	backend: Option<Arc<dyn NetworkBackend>>,
	connected_peers: i32,
	next_generation: u64,
	session: Option<ActiveSession>,
	/// Done signal of the most recent session, kept after its record is discarded.
	last_done: Option<watch::Receiver<bool>>,
	rescan: Option<ActiveRescan>,
	/// Weighted average of completed address discoveries, in seconds.
	discovery_history: Option<f64>,
}

/// A reserved session slot, handed to the task that runs the session.
///
/// Dropping it releases anyone waiting in [`SyncState::begin_cancel`]'s handle.
pub(crate) struct SessionReservation {
	pub generation: u64,
	pub scope: CancelScope,
	pub peers: PeerBarrier,
	pub inactivity: mpsc::UnboundedReceiver<i64>,
	done: watch::Sender<bool>,
}

impl Drop for SessionReservation {
	fn drop(&mut self) {
		self.done.send_replace(true);
	}
}

/// What a canceling caller needs to wait for the session to wind down.
pub(crate) struct SessionCancel {
	pub scope: CancelScope,
	pub peers: PeerBarrier,
	pub done: watch::Receiver<bool>,
}

impl SessionCancel {
	/// Wait for peers to disconnect, then for the session task to finish its teardown.
	pub async fn wait(mut self) {
		self.peers.wait_quiescent().await;
		// An error means the reservation is gone, which also means the task finished.
		let _ = self.done.wait_for(|done| *done).await;
	}
}

pub struct SyncState {
	wallet_id: i32,
	inner: Mutex<Inner>,
	snapshot: watch::Sender<SyncSnapshot>,
}

impl SyncState {
	pub fn new(wallet_id: i32) -> Self {
		let (snapshot, _) = watch::channel(SyncSnapshot::default());
		Self {
			wallet_id,
			inner: Mutex::new(Inner::default()),
			snapshot,
		}
	}

	pub fn snapshot(&self) -> SyncSnapshot {
		self.snapshot.borrow().clone()
	}

	pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
		self.snapshot.subscribe()
	}

	pub fn is_syncing(&self) -> bool {
		lock(&self.inner).session.is_some()
	}

	pub fn is_rescanning(&self) -> bool {
		lock(&self.inner).rescan.is_some()
	}

	pub fn is_synced(&self) -> bool {
		self.snapshot.borrow().synced
	}

	pub fn connected_peers(&self) -> i32 {
		lock(&self.inner).connected_peers
	}

	/// Claim the session slot for `strategy`.
	///
	/// Fails with `AlreadySyncing` while a session or rescan is live, or a backend is still
	/// attached.
	pub(crate) fn reserve_session(
		&self,
		strategy: StrategyKind,
		scope: CancelScope,
	) -> Result<SessionReservation, WalletSyncError> {
		let mut inner = lock(&self.inner);
		if inner.session.is_some() || inner.rescan.is_some() || inner.backend.is_some() {
			return Err(WalletSyncError::AlreadySyncing);
		}

		inner.next_generation += 1;
		let generation = inner.next_generation;
		let peers = PeerBarrier::new();
		let (inactivity_tx, inactivity_rx) = mpsc::unbounded_channel();
		let (done_tx, done_rx) = watch::channel(false);

		inner.last_done = Some(done_rx.clone());
		inner.session = Some(ActiveSession {
			generation,
			scope: scope.clone(),
			peers: peers.clone(),
			inactivity: inactivity_tx,
			done: done_rx,
		});
		inner.connected_peers = 0;
		self.snapshot.send_modify(|s| {
			s.phase = SyncPhase::Connecting;
			s.connected_peers = 0;
			s.strategy = Some(strategy);
			s.headers_fetch = None;
			s.address_discovery = None;
			s.synced = false;
			s.last_error = None;
		});
		debug!("Wallet {}: reserved session {}", self.wallet_id, generation);

		Ok(SessionReservation {
			generation,
			scope,
			peers,
			inactivity: inactivity_rx,
			done: done_tx,
		})
	}

	/// Discard the session record of `generation`, detaching its backend.
	pub(crate) fn release_session(&self, generation: u64) -> Option<Arc<dyn NetworkBackend>> {
		let mut inner = lock(&self.inner);
		if inner.session.as_ref().map(|s| s.generation) != Some(generation) {
			return None;
		}
		inner.session = None;
		inner.connected_peers = 0;
		let backend = inner.backend.take();
		self.snapshot.send_modify(|s| {
			s.phase = SyncPhase::Idle;
			s.connected_peers = 0;
			s.synced = false;
		});
		debug!("Wallet {}: released session {}", self.wallet_id, generation);
		backend
	}

	/// Attach `backend` to the session of `generation`. Fails if that session was canceled or
	/// replaced meanwhile.
	pub(crate) fn attach_backend(&self, generation: u64, backend: Arc<dyn NetworkBackend>) -> bool {
		let mut inner = lock(&self.inner);
		let live = inner
			.session
			.as_ref()
			.is_some_and(|s| s.generation == generation && !s.scope.is_cancelled());
		if live {
			inner.backend = Some(backend);
		}
		live
	}

	pub(crate) fn detach_backend(&self) -> Option<Arc<dyn NetworkBackend>> {
		lock(&self.inner).backend.take()
	}

	pub fn network_backend(&self) -> Option<Arc<dyn NetworkBackend>> {
		lock(&self.inner).backend.clone()
	}

	pub(crate) fn cached_rpc_client(&self) -> Option<Arc<dyn TrustedNodeClient>> {
		lock(&self.inner).rpc_client.clone()
	}

	pub(crate) fn cache_rpc_client(&self, client: Arc<dyn TrustedNodeClient>) {
		lock(&self.inner).rpc_client = Some(client);
	}

	/// Apply a peer count change and return the new count.
	pub(crate) fn apply_peer_delta(&self, generation: u64, delta: i32) -> i32 {
		let mut inner = lock(&self.inner);
		if !Self::owns(&inner, generation) {
			return inner.connected_peers;
		}
		inner.connected_peers = (inner.connected_peers.max(0) + delta).max(0);
		let peers = inner.connected_peers;
		self.snapshot.send_modify(|s| s.connected_peers = peers);
		peers
	}

	/// Mark the peer count as not reported, for trusted node sessions.
	pub(crate) fn set_peers_unreported(&self, generation: u64) {
		let mut inner = lock(&self.inner);
		if Self::owns(&inner, generation) {
			inner.connected_peers = -1;
			self.snapshot.send_modify(|s| s.connected_peers = -1);
		}
	}

	pub(crate) fn advance_phase(&self, generation: u64, phase: SyncPhase) {
		let inner = lock(&self.inner);
		if Self::owns(&inner, generation) {
			self.snapshot.send_if_modified(|s| {
				let next = s.phase.advance(phase);
				let changed = next != s.phase;
				s.phase = next;
				changed
			});
		}
	}

	pub(crate) fn set_synced(&self, generation: u64, synced: bool) {
		let inner = lock(&self.inner);
		if Self::owns(&inner, generation) {
			self.snapshot.send_modify(|s| {
				s.synced = synced;
				if synced {
					s.phase = s.phase.advance(SyncPhase::Synced);
				}
			});
		}
	}

	pub(crate) fn record_report(&self, report: &ProgressReport) {
		let _inner = lock(&self.inner);
		self.snapshot.send_modify(|s| match report {
			ProgressReport::HeadersFetch(r) => s.headers_fetch = Some(r.clone()),
			ProgressReport::AddressDiscovery(r) => s.address_discovery = Some(r.clone()),
			ProgressReport::HeadersRescan(r) => s.headers_rescan = Some(r.clone()),
		});
	}

	pub(crate) fn mark_errored(&self, generation: u64, error: SyncError) {
		let inner = lock(&self.inner);
		if Self::owns(&inner, generation) {
			self.snapshot.send_modify(|s| {
				s.phase = s.phase.advance(SyncPhase::Errored);
				s.last_error = Some(error);
			});
		}
	}

	/// Mark the live session as canceling and hand out what is needed to wait for it.
	pub(crate) fn begin_cancel(&self) -> Option<SessionCancel> {
		let inner = lock(&self.inner);
		let session = inner.session.as_ref()?;
		self.snapshot
			.send_modify(|s| s.phase = s.phase.advance(SyncPhase::Canceling));
		Some(SessionCancel {
			scope: session.scope.clone(),
			peers: session.peers.clone(),
			done: session.done.clone(),
		})
	}

	/// Resolves once the most recent session finished its teardown.
	pub(crate) async fn session_finished(&self) {
		let done = lock(&self.inner).last_done.clone();
		if let Some(mut done) = done {
			let _ = done.wait_for(|done| *done).await;
		}
	}

	/// Forward reported inactivity to the live session. Returns `false` without one.
	pub(crate) fn report_inactivity(&self, seconds: i64) -> bool {
		lock(&self.inner)
			.session
			.as_ref()
			.is_some_and(|s| s.inactivity.send(seconds).is_ok())
	}

	/// Expected address discovery duration from the wallet's history.
	pub fn expected_discovery_seconds(&self) -> Option<i64> {
		lock(&self.inner)
			.discovery_history
			.map(|average| average.round() as i64)
	}

	/// Fold a completed discovery into the weighted history.
	pub(crate) fn record_discovery(&self, seconds: i64, weight: f64) {
		let weight = valid_history_weight(weight);
		let mut inner = lock(&self.inner);
		let sample = seconds.max(1) as f64;
		inner.discovery_history = Some(match inner.discovery_history {
			Some(average) => weight * sample + (1.0 - weight) * average,
			None => sample,
		});
	}

	/// Claim the rescan slot. Requires an attached backend, which is returned.
	pub(crate) fn reserve_rescan(
		&self,
		scope: CancelScope,
	) -> Result<(u64, Arc<dyn NetworkBackend>), WalletSyncError> {
		let mut inner = lock(&self.inner);
		let backend = inner.backend.clone().ok_or(WalletSyncError::NotConnected)?;
		if inner.rescan.is_some() {
			return Err(WalletSyncError::AlreadyRescanning);
		}

		inner.next_generation += 1;
		let generation = inner.next_generation;
		inner.rescan = Some(ActiveRescan { generation, scope });
		self.snapshot.send_modify(|s| {
			s.rescanning = true;
			s.headers_rescan = None;
		});
		Ok((generation, backend))
	}

	pub(crate) fn release_rescan(&self, generation: u64) {
		let mut inner = lock(&self.inner);
		if inner.rescan.as_ref().map(|r| r.generation) == Some(generation) {
			inner.rescan = None;
			self.snapshot.send_modify(|s| s.rescanning = false);
		}
	}

	/// Fire the live rescan's scope, if any.
	pub(crate) fn cancel_rescan(&self) -> bool {
		match &lock(&self.inner).rescan {
			Some(rescan) => {
				rescan.scope.cancel();
				true
			}
			None => false,
		}
	}

	fn owns(inner: &Inner, generation: u64) -> bool {
		inner
			.session
			.as_ref()
			.is_some_and(|s| s.generation == generation)
	}
}
