use multiwallet_sync::network::scripted::{ScriptStep, ScriptedBackend, ScriptedConnector};
use multiwallet_sync::network::{
	BackendError, NetworkEvent, RescanProgress, TrustedNodeCredentials,
};
use multiwallet_sync::wallet::sync::{self, RecordingListener};
use multiwallet_sync::wallet::{MemoryConfigStore, MemoryWalletStore, SyncErrorCode, WalletStore};
use multiwallet_sync::{
	MultiWalletController, NetworkKind, PassphraseType, SyncConfig, SyncNotification,
	SyncOptions, SyncPhase, SyncStrategy, WalletSyncError,
};

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::{Instant, timeout};

const WAIT: Duration = Duration::from_secs(5);

struct Fixture {
	_dir: TempDir,
	controller: MultiWalletController,
	connector: Arc<ScriptedConnector>,
	store: Arc<MemoryWalletStore>,
	listener: Arc<RecordingListener>,
}

async fn fixture(factory: impl Fn() -> ScriptedBackend + Send + Sync + 'static) -> Fixture {
	fixture_with(ScriptedConnector::new(factory)).await
}

async fn fixture_with(connector: ScriptedConnector) -> Fixture {
	let dir = tempfile::tempdir().unwrap();
	let connector = Arc::new(connector);
	let store = Arc::new(MemoryWalletStore::new());
	let controller = MultiWalletController::new(
		dir.path(),
		NetworkKind::TestNet,
		store.clone(),
		Arc::new(MemoryConfigStore::new()),
		connector.clone().into_connectors(),
		SyncConfig::default(),
	)
	.await
	.unwrap();

	let listener = RecordingListener::new();
	controller
		.add_sync_progress_listener("recorder", listener.clone())
		.unwrap();

	Fixture {
		_dir: dir,
		controller,
		connector,
		store,
		listener,
	}
}

/// Connects `peers` peers, starts fetching headers and then idles until canceled.
fn connected(peers: usize, disconnect_delay: Duration) -> ScriptedBackend {
	ScriptedBackend::new(vec![
		ScriptStep::ConnectPeers(peers),
		ScriptStep::Emit(NetworkEvent::HeadersFetchStarted {
			peer_initial_height: Some(1000),
		}),
		ScriptStep::Emit(NetworkEvent::HeadersFetched {
			fetched: 100,
			height: 100,
			header_time: 1_700_000_000,
		}),
	])
	.with_disconnect_delay(disconnect_delay)
}

/// Fetches one batch of headers, pauses long enough for whole seconds to pass, then fetches more.
fn slow_fetch() -> ScriptedBackend {
	let header = |count: i32| NetworkEvent::HeadersFetched {
		fetched: count,
		height: count,
		header_time: 1_700_000_000,
	};
	ScriptedBackend::new(vec![
		ScriptStep::Emit(NetworkEvent::HeadersFetchStarted {
			peer_initial_height: Some(1000),
		}),
		ScriptStep::Emit(header(100)),
		ScriptStep::Sleep(Duration::from_millis(2200)),
		ScriptStep::Emit(header(200)),
	])
}

fn fetch_reports(listener: &RecordingListener, wallet_id: i32) -> Vec<(i32, i64)> {
	listener
		.notifications()
		.iter()
		.filter_map(|n| match n {
			SyncNotification::HeadersFetch(r) if r.wallet_id == wallet_id => {
				Some((r.fetched_headers_count, r.elapsed_seconds))
			}
			_ => None,
		})
		.collect()
}

async fn wait_for_phase(controller: &MultiWalletController, wallet_id: i32, phase: SyncPhase) {
	let mut updates = controller.subscribe_sync(wallet_id).unwrap();
	timeout(WAIT, updates.wait_for(|s| s.phase == phase))
		.await
		.expect("phase not reached in time")
		.unwrap();
}

async fn eventually(condition: impl Fn() -> bool) {
	let deadline = Instant::now() + WAIT;
	while !condition() {
		assert!(Instant::now() < deadline, "condition not met in time");
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_start_fails_and_keeps_running_session() {
	let f = fixture(|| connected(2, Duration::ZERO)).await;
	let wallet = f.controller.create_new_wallet(PassphraseType::Pin).await.unwrap();

	f.controller
		.start_sync(wallet.id(), SyncStrategy::lightweight(), SyncOptions::default())
		.await
		.unwrap();
	wait_for_phase(&f.controller, wallet.id(), SyncPhase::FetchingHeaders).await;

	let err = f
		.controller
		.start_sync(wallet.id(), SyncStrategy::lightweight(), SyncOptions::default())
		.await
		.unwrap_err();
	assert!(matches!(err, WalletSyncError::AlreadySyncing));

	let snapshot = f.controller.sync_snapshot(wallet.id()).unwrap();
	assert_eq!(snapshot.phase, SyncPhase::FetchingHeaders);
	assert!(f.controller.is_syncing(wallet.id()));
	assert_eq!(f.connector.backends().len(), 1);

	f.controller.cancel_sync(wallet.id()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn canceling_idle_wallet_is_a_no_op() {
	let f = fixture(|| connected(1, Duration::ZERO)).await;
	let wallet = f.controller.create_new_wallet(PassphraseType::Pin).await.unwrap();

	f.controller.cancel_sync(wallet.id()).await.unwrap();
	f.controller.cancel_sync(wallet.id()).await.unwrap();

	assert!(f.listener.notifications().is_empty());
	assert_eq!(f.controller.sync_snapshot(wallet.id()).unwrap().phase, SyncPhase::Idle);
	assert!(matches!(
		f.controller.cancel_sync(wallet.id() + 100).await,
		Err(WalletSyncError::NotExist(_))
	));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_waits_for_peers_and_returns_to_idle() {
	let delay = Duration::from_millis(100);
	let f = fixture(move || connected(3, delay)).await;
	let wallet = f.controller.create_new_wallet(PassphraseType::Pin).await.unwrap();

	f.controller
		.start_sync(wallet.id(), SyncStrategy::lightweight(), SyncOptions::default())
		.await
		.unwrap();
	wait_for_phase(&f.controller, wallet.id(), SyncPhase::FetchingHeaders).await;
	assert_eq!(f.controller.connected_peers(wallet.id()).unwrap(), 3);

	let started = Instant::now();
	f.controller.cancel_sync(wallet.id()).await.unwrap();
	assert!(started.elapsed() >= delay);

	let snapshot = f.controller.sync_snapshot(wallet.id()).unwrap();
	assert_eq!(snapshot.phase, SyncPhase::Idle);
	assert_eq!(snapshot.connected_peers, 0);
	assert!(!f.controller.is_syncing(wallet.id()));
	assert!(wallet.network_backend().is_none());
	assert!(wallet.loader().network_backend().is_none());
	assert_eq!(
		f.listener
			.count(|n| matches!(n, SyncNotification::SyncCanceled { .. })),
		1
	);

	// The slot is free again right away.
	f.controller
		.start_sync(wallet.id(), SyncStrategy::lightweight(), SyncOptions::default())
		.await
		.unwrap();
	f.controller.cancel_sync(wallet.id()).await.unwrap();
	assert_eq!(f.connector.backends().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_peer_entries_are_dropped() {
	let f = fixture(|| connected(1, Duration::ZERO)).await;
	let wallet = f
		.controller
		.restore_wallet(
			"2e347e236daa04faad881f1dc5dc3b8a9b4e8e4429e9d0728aad78ada199b66b",
			PassphraseType::Pin,
		)
		.await
		.unwrap();

	let err = f
		.controller
		.start_sync(
			wallet.id(),
			SyncStrategy::with_peers("bad-addr;also bad"),
			SyncOptions::default(),
		)
		.await
		.unwrap_err();
	assert!(matches!(err, WalletSyncError::InvalidPeers));
	assert!(!f.controller.is_syncing(wallet.id()));

	f.controller
		.start_sync(
			wallet.id(),
			SyncStrategy::with_peers("10.0.0.1:9108;bad-addr"),
			SyncOptions::default(),
		)
		.await
		.unwrap();
	let backend = f.connector.last_backend().unwrap();
	assert_eq!(backend.persistent_peers(), vec!["10.0.0.1:9108".to_string()]);

	f.controller.cancel_sync(wallet.id()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stored_peer_list_is_used_when_none_is_given() {
	let f = fixture(|| connected(1, Duration::ZERO)).await;
	let wallet = f.controller.create_new_wallet(PassphraseType::Pin).await.unwrap();
	f.controller
		.set_spv_persistent_peers("10.0.0.2;10.0.0.3:9000")
		.await
		.unwrap();

	f.controller
		.start_sync(wallet.id(), SyncStrategy::lightweight(), SyncOptions::default())
		.await
		.unwrap();
	let backend = f.connector.last_backend().unwrap();
	assert_eq!(
		backend.persistent_peers(),
		vec!["10.0.0.2:19108".to_string(), "10.0.0.3:9000".to_string()]
	);
	f.controller.cancel_sync(wallet.id()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_sync_reports_progress_and_persists_discovery() {
	let f = fixture(|| ScriptedBackend::full_sync(1000, Duration::from_millis(20))).await;
	let wallet = f
		.controller
		.restore_wallet(
			"2e347e236daa04faad881f1dc5dc3b8a9b4e8e4429e9d0728aad78ada199b66b",
			PassphraseType::Password,
		)
		.await
		.unwrap();
	assert!(!wallet.record().has_discovered_accounts);

	f.controller
		.start_sync(wallet.id(), SyncStrategy::lightweight(), SyncOptions::default())
		.await
		.unwrap();
	wait_for_phase(&f.controller, wallet.id(), SyncPhase::Synced).await;

	let notifications = f.listener.notifications();
	assert!(matches!(
		notifications.first(),
		Some(SyncNotification::SyncStarted { .. })
	));
	let fetched: Vec<i32> = notifications
		.iter()
		.filter_map(|n| match n {
			SyncNotification::HeadersFetch(r) => Some(r.fetched_headers_count),
			_ => None,
		})
		.collect();
	assert_eq!(fetched, vec![500, 1000]);
	assert!(notifications.iter().any(|n| matches!(
		n,
		SyncNotification::AddressDiscovery(r) if r.address_discovery_progress == 100
	)));
	assert_eq!(
		f.listener
			.count(|n| matches!(n, SyncNotification::SyncCompleted { .. })),
		1
	);
	assert_eq!(f.controller.synced_wallets_count(), 1);

	let stored = f.store.find_by_name(&wallet.name()).await.unwrap().unwrap();
	assert!(stored.has_discovered_accounts);
	assert!(wallet.record().has_discovered_accounts);
	assert!(wallet.sync_state().expected_discovery_seconds().is_some());

	f.controller.cancel_sync(wallet.id()).await.unwrap();
	assert_eq!(f.controller.synced_wallets_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_rescans_are_rejected() {
	let batches = vec![
		RescanProgress {
			scanned: 250,
			total: 1000,
		};
		4
	];
	let f = fixture(move || {
		connected(1, Duration::ZERO).with_rescan(batches.clone(), Duration::from_millis(30))
	})
	.await;
	let wallet = f.controller.create_new_wallet(PassphraseType::Pin).await.unwrap();

	assert!(matches!(
		f.controller.rescan(wallet.id()),
		Err(WalletSyncError::NotConnected)
	));

	f.controller
		.start_sync(wallet.id(), SyncStrategy::lightweight(), SyncOptions::default())
		.await
		.unwrap();
	f.controller.rescan(wallet.id()).unwrap();
	assert!(matches!(
		f.controller.rescan(wallet.id()),
		Err(WalletSyncError::AlreadyRescanning)
	));
	assert!(f.controller.is_rescanning(wallet.id()));

	let controller = &f.controller;
	eventually(|| !controller.is_rescanning(wallet.id())).await;

	let heights: Vec<i32> = f
		.listener
		.notifications()
		.iter()
		.filter_map(|n| match n {
			SyncNotification::HeadersRescan(r) => Some(r.current_rescan_height),
			_ => None,
		})
		.collect();
	assert_eq!(heights, vec![250, 500, 750, 1000, 1000]);
	let snapshot = f.controller.sync_snapshot(wallet.id()).unwrap();
	assert_eq!(snapshot.headers_rescan.unwrap().rescan_progress, 100);

	f.controller.cancel_sync(wallet.id()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_rescan_stream_ends_rescan() {
	let f = fixture(|| {
		connected(1, Duration::ZERO)
			.with_rescan(
				vec![
					RescanProgress {
						scanned: 10,
						total: 100,
					};
					3
				],
				Duration::ZERO,
			)
			.with_rescan_failure(1, "disk gone")
	})
	.await;
	let wallet = f.controller.create_new_wallet(PassphraseType::Pin).await.unwrap();
	f.controller
		.start_sync(wallet.id(), SyncStrategy::lightweight(), SyncOptions::default())
		.await
		.unwrap();

	f.controller.rescan(wallet.id()).unwrap();
	let controller = &f.controller;
	eventually(|| !controller.is_rescanning(wallet.id())).await;

	assert_eq!(
		f.listener
			.count(|n| matches!(n, SyncNotification::HeadersRescan(_))),
		1
	);
	f.controller.rescan(wallet.id()).unwrap();
	f.controller.cancel_rescan(wallet.id()).unwrap();
	f.controller.cancel_sync(wallet.id()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deadline_is_reported_as_error() {
	let f = fixture(|| connected(1, Duration::ZERO)).await;
	let wallet = f.controller.create_new_wallet(PassphraseType::Pin).await.unwrap();

	f.controller
		.start_sync(
			wallet.id(),
			SyncStrategy::lightweight(),
			SyncOptions::with_timeout(Duration::from_millis(50)),
		)
		.await
		.unwrap();

	let listener = f.listener.clone();
	eventually(|| {
		listener.count(|n| matches!(n, SyncNotification::SyncEndedWithError { .. })) == 1
	})
	.await;

	let error = f
		.listener
		.notifications()
		.into_iter()
		.find_map(|n| match n {
			SyncNotification::SyncEndedWithError { error, .. } => Some(error),
			_ => None,
		})
		.unwrap();
	assert_eq!(error.code, SyncErrorCode::DeadlineExceeded);
	assert_eq!(
		f.listener
			.count(|n| matches!(n, SyncNotification::SyncCanceled { .. })),
		0
	);

	let snapshot = f.controller.sync_snapshot(wallet.id()).unwrap();
	assert_eq!(snapshot.phase, SyncPhase::Idle);
	assert_eq!(snapshot.last_error, Some(error));
	assert!(!f.controller.is_syncing(wallet.id()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backend_failure_is_reported_once() {
	let f = fixture(|| {
		ScriptedBackend::new(vec![
			ScriptStep::ConnectPeers(1),
			ScriptStep::Fail("peer misbehaved".into()),
		])
	})
	.await;
	let wallet = f.controller.create_new_wallet(PassphraseType::Pin).await.unwrap();

	f.controller
		.start_sync(wallet.id(), SyncStrategy::lightweight(), SyncOptions::default())
		.await
		.unwrap();

	let listener = f.listener.clone();
	eventually(|| {
		listener.count(|n| matches!(n, SyncNotification::SyncEndedWithError { .. })) > 0
	})
	.await;
	assert!(!f.controller.is_syncing(wallet.id()));

	let errors: Vec<_> = f
		.listener
		.notifications()
		.into_iter()
		.filter_map(|n| match n {
			SyncNotification::SyncEndedWithError { error, .. } => Some(error),
			_ => None,
		})
		.collect();
	assert_eq!(errors.len(), 1);
	assert_eq!(errors[0].code, SyncErrorCode::Unexpected);
	assert_eq!(errors[0].cause, BackendError::Failed("peer misbehaved".into()));
	assert_eq!(f.connector.last_backend().unwrap().runs(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trusted_node_client_is_cached() {
	let f = fixture_with(
		ScriptedConnector::new(|| connected(0, Duration::ZERO)).with_password("secret"),
	)
	.await;
	let wallet = f.controller.create_new_wallet(PassphraseType::Pin).await.unwrap();
	let credentials = |password: &str| TrustedNodeCredentials {
		username: "user".into(),
		password: password.into(),
		certificate: None,
	};

	let err = f
		.controller
		.start_sync(
			wallet.id(),
			SyncStrategy::trusted_node("localhost", credentials("wrong")),
			SyncOptions::default(),
		)
		.await
		.unwrap_err();
	assert!(matches!(err, WalletSyncError::InvalidCredentials));
	assert!(!f.controller.is_syncing(wallet.id()));

	assert!(matches!(
		f.controller
			.start_sync(
				wallet.id(),
				SyncStrategy::trusted_node("not a host", credentials("secret")),
				SyncOptions::default(),
			)
			.await,
		Err(WalletSyncError::InvalidAddress(_))
	));

	f.controller
		.start_sync(
			wallet.id(),
			SyncStrategy::trusted_node("localhost", credentials("secret")),
			SyncOptions::default(),
		)
		.await
		.unwrap();
	assert_eq!(f.controller.connected_peers(wallet.id()).unwrap(), -1);
	assert!(f.listener.notifications().iter().any(|n| matches!(
		n,
		SyncNotification::PeersChanged {
			connected_peers: -1,
			..
		}
	)));
	f.controller.cancel_sync(wallet.id()).await.unwrap();

	f.controller
		.start_sync(
			wallet.id(),
			SyncStrategy::trusted_node("localhost:19109", credentials("secret")),
			SyncOptions::default(),
		)
		.await
		.unwrap();
	assert_eq!(f.connector.trusted_node_connects(), 2);
	f.controller.cancel_sync(wallet.id()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unopened_wallet_cannot_sync() {
	let dir = tempfile::tempdir().unwrap();
	let store = Arc::new(MemoryWalletStore::new());
	let connectors =
		Arc::new(ScriptedConnector::new(|| connected(1, Duration::ZERO))).into_connectors();

	let id = {
		let controller = MultiWalletController::new(
			dir.path(),
			NetworkKind::TestNet,
			store.clone(),
			Arc::new(MemoryConfigStore::new()),
			connectors.clone(),
			SyncConfig::default(),
		)
		.await
		.unwrap();
		controller
			.create_new_wallet(PassphraseType::Pin)
			.await
			.unwrap()
			.id()
	};

	let controller = MultiWalletController::new(
		dir.path(),
		NetworkKind::TestNet,
		store,
		Arc::new(MemoryConfigStore::new()),
		connectors,
		SyncConfig::default(),
	)
	.await
	.unwrap();
	assert!(matches!(
		controller
			.start_sync(id, SyncStrategy::lightweight(), SyncOptions::default())
			.await,
		Err(WalletSyncError::WalletNotLoaded)
	));

	controller.open_wallets().await.unwrap();
	controller
		.start_sync(id, SyncStrategy::lightweight(), SyncOptions::default())
		.await
		.unwrap();
	controller.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_cancels_every_session() {
	let delay = Duration::from_millis(100);
	let f = fixture(move || connected(2, delay)).await;
	let first = f.controller.create_new_wallet(PassphraseType::Pin).await.unwrap();
	let second = f.controller.create_new_wallet(PassphraseType::Pin).await.unwrap();

	for wallet in [&first, &second] {
		f.controller
			.start_sync(wallet.id(), SyncStrategy::lightweight(), SyncOptions::default())
			.await
			.unwrap();
		wait_for_phase(&f.controller, wallet.id(), SyncPhase::FetchingHeaders).await;
	}

	let started = Instant::now();
	f.controller.shutdown().await;
	assert!(started.elapsed() >= delay);

	for wallet in [&first, &second] {
		assert!(!f.controller.is_syncing(wallet.id()));
		assert_eq!(f.controller.connected_peers(wallet.id()).unwrap(), 0);
		assert!(!wallet.is_open());
	}
	let canceled: Vec<i32> = f
		.listener
		.notifications()
		.iter()
		.filter(|n| matches!(n, SyncNotification::SyncCanceled { .. }))
		.map(|n| n.wallet_id())
		.collect();
	assert_eq!(canceled.len(), 2);
	assert!(canceled.contains(&first.id()) && canceled.contains(&second.id()));

	assert!(matches!(
		f.controller
			.start_sync(first.id(), SyncStrategy::lightweight(), SyncOptions::default())
			.await,
		Err(WalletSyncError::ShuttingDown)
	));
	assert!(f.store.load_all().await.is_err());
	f.controller.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_listener_id_is_rejected() {
	let f = fixture(|| connected(1, Duration::ZERO)).await;
	let other = RecordingListener::new();

	assert!(matches!(
		f.controller.add_sync_progress_listener("recorder", other.clone()),
		Err(WalletSyncError::ListenerAlreadyExists(_))
	));
	f.controller.remove_sync_progress_listener("unknown");
	f.controller.remove_sync_progress_listener("recorder");
	f.controller
		.add_sync_progress_listener("recorder", other)
		.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn inactivity_counts_only_for_live_sessions() {
	let f = fixture(slow_fetch).await;
	let reported = f.controller.create_new_wallet(PassphraseType::Pin).await.unwrap();
	let untouched = f.controller.create_new_wallet(PassphraseType::Pin).await.unwrap();

	// Nobody is syncing yet, so this goes nowhere.
	f.controller.sync_inactive_for_period(1000);

	for wallet in [&reported, &untouched] {
		f.controller
			.start_sync(wallet.id(), SyncStrategy::lightweight(), SyncOptions::default())
			.await
			.unwrap();
	}
	let listener = f.listener.clone();
	let (a, b) = (reported.id(), untouched.id());
	eventually(|| fetch_reports(&listener, a).len() == 1 && fetch_reports(&listener, b).len() == 1)
		.await;

	// No peers are connected, so the grace period is added on top.
	assert_eq!(f.controller.connected_peers(a).unwrap(), 0);
	sync::sync_inactive_for_period(&reported, 30);

	eventually(|| fetch_reports(&listener, a).len() == 2 && fetch_reports(&listener, b).len() == 2)
		.await;

	// Over two seconds passed between the batches; the reported wallet has 90 s taken off.
	assert_eq!(fetch_reports(&listener, a)[1], (200, 1));
	let (count, elapsed) = fetch_reports(&listener, b)[1];
	assert_eq!(count, 200);
	assert!(elapsed >= 2, "idle report leaked into a later session: {}", elapsed);

	f.controller.cancel_all_syncs().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn busy_wallet_reports_already_syncing_before_peer_errors() {
	let f = fixture(|| connected(1, Duration::ZERO)).await;
	let wallet = f.controller.create_new_wallet(PassphraseType::Pin).await.unwrap();

	f.controller
		.start_sync(wallet.id(), SyncStrategy::lightweight(), SyncOptions::default())
		.await
		.unwrap();
	wait_for_phase(&f.controller, wallet.id(), SyncPhase::FetchingHeaders).await;

	let err = f
		.controller
		.start_sync(
			wallet.id(),
			SyncStrategy::with_peers("bad-addr"),
			SyncOptions::default(),
		)
		.await
		.unwrap_err();
	assert!(matches!(err, WalletSyncError::AlreadySyncing));
	assert!(f.controller.is_syncing(wallet.id()));
	assert_eq!(
		f.controller.sync_snapshot(wallet.id()).unwrap().phase,
		SyncPhase::FetchingHeaders
	);

	f.controller.cancel_sync(wallet.id()).await.unwrap();

	// Once idle, the same list is rejected for what it is and leaves nothing behind.
	let err = f
		.controller
		.start_sync(
			wallet.id(),
			SyncStrategy::with_peers("bad-addr"),
			SyncOptions::default(),
		)
		.await
		.unwrap_err();
	assert!(matches!(err, WalletSyncError::InvalidPeers));
	assert!(!f.controller.is_syncing(wallet.id()));
	assert_eq!(f.controller.sync_snapshot(wallet.id()).unwrap().phase, SyncPhase::Idle);
}
