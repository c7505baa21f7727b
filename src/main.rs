use multiwallet_sync::network::scripted::{ScriptedBackend, ScriptedConnector};
use multiwallet_sync::network::{RescanProgress, TrustedNodeCredentials};
use multiwallet_sync::wallet::{MemoryConfigStore, MemoryWalletStore};
use multiwallet_sync::{
	MultiWalletController, NetworkKind, PassphraseType, SyncConfig, SyncOptions, SyncPhase,
	SyncStrategy, WalletSyncError,
};

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	if let Err(e) = run().await {
		error!("Demo failed: {}", e);
	}
}

async fn run() -> Result<(), WalletSyncError> {
	info!("Starting multi-wallet sync demo");

	let connector = Arc::new(
		ScriptedConnector::new(|| {
			ScriptedBackend::full_sync(12_000, Duration::from_millis(300)).with_rescan(
				vec![
					RescanProgress {
						scanned: 4_000,
						total: 12_000,
					};
					3
				],
				Duration::from_millis(200),
			)
		})
		.with_password("demo"),
	);

	let root_dir = std::env::temp_dir().join("multiwallet-sync-demo");
	let controller = MultiWalletController::new(
		&root_dir,
		NetworkKind::TestNet,
		Arc::new(MemoryWalletStore::new()),
		Arc::new(MemoryConfigStore::new()),
		connector.into_connectors(),
		SyncConfig::default(),
	)
	.await?;
	controller.enable_sync_logs();

	let spv_wallet = controller.create_new_wallet(PassphraseType::Pin).await?;
	let rpc_wallet = controller
		.restore_wallet(
			&multiwallet_sync::wallet::generate_random_seed(),
			PassphraseType::Password,
		)
		.await?;
	info!(
		"Created wallets {} and {}",
		spv_wallet.name(),
		rpc_wallet.name()
	);

	controller
		.start_sync(
			spv_wallet.id(),
			SyncStrategy::with_peers("127.0.0.1;[::1]:19108"),
			SyncOptions::default(),
		)
		.await?;
	controller
		.start_sync(
			rpc_wallet.id(),
			SyncStrategy::trusted_node(
				"localhost",
				TrustedNodeCredentials {
					username: "demo".into(),
					password: "demo".into(),
					certificate: None,
				},
			),
			SyncOptions::with_timeout(Duration::from_secs(30)),
		)
		.await?;

	let mut updates = controller.subscribe_sync(spv_wallet.id())?;
	if updates
		.wait_for(|snapshot| snapshot.phase == SyncPhase::Synced)
		.await
		.is_err()
	{
		error!("Sync state channel closed");
	}
	info!("{} of {} wallets synced", controller.synced_wallets_count(), controller.opened_wallets_count());

	controller.rescan(spv_wallet.id())?;
	let mut updates = controller.subscribe_sync(spv_wallet.id())?;
	let _ = updates.wait_for(|snapshot| !snapshot.rescanning).await;

	controller.shutdown().await;
	Ok(())
}
