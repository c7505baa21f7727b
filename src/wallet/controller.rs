//! Multi-wallet controller.
//!
//! The controller owns every loaded wallet and mediates their lifecycle: loading at startup,
//! creation through a stage/commit protocol, opening, and synchronization. It also owns the
//! shutdown signal every session and rescan derives its cancel scope from, and tears all of them
//! down before closing the stores.

use crate::config::{
	NetworkKind, NetworkParams, RESERVED_WALLET_NAME_PREFIX,
	SPV_PERSISTENT_PEER_ADDRESSES_CONFIG_KEY, SyncConfig,
};
use crate::network::{NetworkConnectors, ShutdownSignal};
use crate::utils::lock;
use crate::wallet::loader::generate_random_seed;
use crate::wallet::repositories::{
	ConfigStore, WalletStore, read_config_value, save_config_value,
};
use crate::wallet::sync::{
	NotificationHub, SyncEnvironment, SyncOptions, SyncProgressListener, SyncSnapshot,
	SyncStrategy, cancel_rescan, cancel_sync, start_rescan, start_sync, sync_inactive_for_period,
};
use crate::wallet::{PassphraseType, Wallet, WalletHandle, WalletSyncError};

use futures::future::join_all;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Key material a new wallet is initialized from
enum WalletSecret {
	Seed(String),
	ExtendedPublicKey(String),
}

/// A wallet record saved provisionally during creation.
///
/// Deleted again unless [`StagedWallet::commit`] is called.
struct StagedWallet {
	store: Arc<dyn WalletStore>,
	record: Wallet,
	committed: bool,
}

impl StagedWallet {
	async fn stage(store: Arc<dyn WalletStore>, mut record: Wallet) -> Result<Self, WalletSyncError> {
		store.save(&mut record).await?;
		debug!("Staged wallet record {}", record.id);
		Ok(Self {
			store,
			record,
			committed: false,
		})
	}

	/// Give the staged record its final name and data directory.
	async fn finalize(&mut self, name: Option<&str>, root_dir: &Path) -> Result<(), WalletSyncError> {
		self.record.name = match name {
			Some(name) => name.to_string(),
			None => format!("{}{}", RESERVED_WALLET_NAME_PREFIX, self.record.id),
		};
		self.record.data_dir = root_dir.join(self.record.id.to_string());
		self.store.save(&mut self.record).await?;
		Ok(())
	}

	fn commit(mut self) -> Wallet {
		self.committed = true;
		self.record.clone()
	}

	async fn rollback(mut self) {
		self.committed = true;
		let id = self.record.id;
		if let Err(e) = self.store.delete(id).await {
			error!("Failed to roll back wallet record {}: {}", id, e);
		}
		if !self.record.data_dir.as_os_str().is_empty() {
			if let Err(e) = tokio::fs::remove_dir_all(&self.record.data_dir).await {
				if e.kind() != std::io::ErrorKind::NotFound {
					warn!("Failed to remove {:?}: {}", self.record.data_dir, e);
				}
			}
		}
		info!("Rolled back creation of wallet {}", id);
	}
}

impl Drop for StagedWallet {
	fn drop(&mut self) {
		if self.committed {
			return;
		}
		// Creation was abandoned mid-way; delete the record in the background.
		let store = self.store.clone();
		let id = self.record.id;
		if let Ok(runtime) = tokio::runtime::Handle::try_current() {
			runtime.spawn(async move {
				if let Err(e) = store.delete(id).await {
					error!("Failed to roll back wallet record {}: {}", id, e);
				}
			});
		}
	}
}

/// Owns all wallets of one data directory and their sync sessions
pub struct MultiWalletController {
	root_dir: PathBuf,
	env: Arc<SyncEnvironment>,
	wallets: Mutex<BTreeMap<i32, Arc<WalletHandle>>>,
}

impl MultiWalletController {
	/// Load every wallet record from `wallet_store` under `root_dir`.
	pub async fn new(
		root_dir: impl Into<PathBuf>,
		network: NetworkKind,
		wallet_store: Arc<dyn WalletStore>,
		config_store: Arc<dyn ConfigStore>,
		connectors: NetworkConnectors,
		config: SyncConfig,
	) -> Result<Self, WalletSyncError> {
		let root_dir = root_dir.into();
		tokio::fs::create_dir_all(&root_dir).await?;

		let wallets: BTreeMap<i32, Arc<WalletHandle>> = wallet_store
			.load_all()
			.await?
			.into_iter()
			.map(|record| (record.id, Arc::new(WalletHandle::new(record))))
			.collect();
		info!(
			"Loaded {} wallets from {:?} on {}",
			wallets.len(),
			root_dir,
			network
		);

		Ok(Self {
			root_dir,
			env: Arc::new(SyncEnvironment {
				params: network.params(),
				config,
				connectors,
				hub: Arc::new(NotificationHub::new()),
				shutdown: ShutdownSignal::new(),
				wallet_store,
				config_store,
			}),
			wallets: Mutex::new(wallets),
		})
	}

	pub fn network(&self) -> &NetworkParams {
		&self.env.params
	}

	pub fn root_dir(&self) -> &Path {
		&self.root_dir
	}

	/// Create a wallet from a freshly generated seed.
	pub async fn create_new_wallet(
		&self,
		passphrase_type: PassphraseType,
	) -> Result<Arc<WalletHandle>, WalletSyncError> {
		let seed = generate_random_seed();
		self.create_wallet(None, WalletSecret::Seed(seed), passphrase_type, true)
			.await
	}

	/// Restore a wallet from `seed`. Its accounts still have to be discovered.
	pub async fn restore_wallet(
		&self,
		seed: &str,
		passphrase_type: PassphraseType,
	) -> Result<Arc<WalletHandle>, WalletSyncError> {
		self.create_wallet(
			None,
			WalletSecret::Seed(seed.to_string()),
			passphrase_type,
			false,
		)
		.await
	}

	pub async fn create_watch_only_wallet(
		&self,
		name: &str,
		extended_public_key: &str,
	) -> Result<Arc<WalletHandle>, WalletSyncError> {
		self.create_wallet(
			Some(name),
			WalletSecret::ExtendedPublicKey(extended_public_key.to_string()),
			PassphraseType::Pin,
			false,
		)
		.await
	}

	/// Whether a wallet named `name` exists. Generated names are reserved.
	pub async fn wallet_name_exists(&self, name: &str) -> Result<bool, WalletSyncError> {
		if name.starts_with(RESERVED_WALLET_NAME_PREFIX) {
			return Err(WalletSyncError::ReservedName(name.to_string()));
		}
		Ok(self.env.wallet_store.find_by_name(name).await?.is_some())
	}

	async fn create_wallet(
		&self,
		name: Option<&str>,
		secret: WalletSecret,
		passphrase_type: PassphraseType,
		has_discovered_accounts: bool,
	) -> Result<Arc<WalletHandle>, WalletSyncError> {
		self.ensure_running()?;
		if let Some(name) = name {
			if self.wallet_name_exists(name).await? {
				return Err(WalletSyncError::WalletNameExists(name.to_string()));
			}
		}

		let mut record = Wallet::provisional(passphrase_type, has_discovered_accounts);
		record.is_watching_only = matches!(secret, WalletSecret::ExtendedPublicKey(_));

		let mut staged = StagedWallet::stage(self.env.wallet_store.clone(), record).await?;
		match self.initialize(&mut staged, name, &secret).await {
			Ok(handle) => {
				let record = staged.commit();
				lock(&self.wallets).insert(record.id, handle.clone());
				info!("Created wallet {} ({})", record.id, record.name);
				Ok(handle)
			}
			Err(e) => {
				warn!("Wallet creation failed: {}", e);
				staged.rollback().await;
				Err(e)
			}
		}
	}

	async fn initialize(
		&self,
		staged: &mut StagedWallet,
		name: Option<&str>,
		secret: &WalletSecret,
	) -> Result<Arc<WalletHandle>, WalletSyncError> {
		staged.finalize(name, &self.root_dir).await?;
		let handle = Arc::new(WalletHandle::new(staged.record.clone()));
		match secret {
			WalletSecret::Seed(seed) => handle.loader().create(seed).await?,
			WalletSecret::ExtendedPublicKey(key) => {
				handle.loader().create_watching_only(key).await?
			}
		}
		Ok(handle)
	}

	/// Open a loaded wallet.
	pub async fn open_wallet(&self, wallet_id: i32) -> Result<Arc<WalletHandle>, WalletSyncError> {
		self.ensure_running()?;
		let wallet = self.wallet_with_id(wallet_id)?;
		wallet.loader().open().await?;
		Ok(wallet)
	}

	/// Open every loaded wallet that is not open yet.
	pub async fn open_wallets(&self) -> Result<(), WalletSyncError> {
		self.ensure_running()?;
		for wallet in self.handles() {
			wallet.loader().open().await?;
		}
		Ok(())
	}

	pub fn get_wallet(&self, wallet_id: i32) -> Option<Arc<WalletHandle>> {
		lock(&self.wallets).get(&wallet_id).cloned()
	}

	pub fn wallet_with_id(&self, wallet_id: i32) -> Result<Arc<WalletHandle>, WalletSyncError> {
		self.get_wallet(wallet_id)
			.ok_or(WalletSyncError::NotExist(wallet_id))
	}

	/// IDs of all loaded wallets, ascending.
	pub fn wallet_ids(&self) -> Vec<i32> {
		lock(&self.wallets).keys().copied().collect()
	}

	pub fn loaded_wallets_count(&self) -> usize {
		lock(&self.wallets).len()
	}

	pub fn opened_wallets(&self) -> Vec<i32> {
		self.handles()
			.iter()
			.filter(|w| w.is_open())
			.map(|w| w.id())
			.collect()
	}

	pub fn opened_wallets_count(&self) -> usize {
		self.opened_wallets().len()
	}

	pub fn synced_wallets_count(&self) -> usize {
		self.handles()
			.iter()
			.filter(|w| w.is_open() && w.sync_state().is_synced())
			.count()
	}

	pub fn is_syncing(&self, wallet_id: i32) -> bool {
		self.get_wallet(wallet_id)
			.is_some_and(|w| w.sync_state().is_syncing())
	}

	pub fn is_rescanning(&self, wallet_id: i32) -> bool {
		self.get_wallet(wallet_id)
			.is_some_and(|w| w.sync_state().is_rescanning())
	}

	pub fn connected_peers(&self, wallet_id: i32) -> Result<i32, WalletSyncError> {
		Ok(self.wallet_with_id(wallet_id)?.sync_state().connected_peers())
	}

	pub fn sync_snapshot(&self, wallet_id: i32) -> Result<SyncSnapshot, WalletSyncError> {
		Ok(self.wallet_with_id(wallet_id)?.sync_state().snapshot())
	}

	/// Watch the sync snapshot of a wallet change over time.
	pub fn subscribe_sync(
		&self,
		wallet_id: i32,
	) -> Result<watch::Receiver<SyncSnapshot>, WalletSyncError> {
		Ok(self.wallet_with_id(wallet_id)?.sync_state().subscribe())
	}

	/// Start syncing a wallet. See [`start_sync`].
	pub async fn start_sync(
		&self,
		wallet_id: i32,
		strategy: SyncStrategy,
		options: SyncOptions,
	) -> Result<(), WalletSyncError> {
		self.ensure_running()?;
		let wallet = self.wallet_with_id(wallet_id)?;
		start_sync(&self.env, &wallet, strategy, options).await
	}

	/// Cancel a wallet's session and wait for the network to go quiet.
	pub async fn cancel_sync(&self, wallet_id: i32) -> Result<(), WalletSyncError> {
		let wallet = self.wallet_with_id(wallet_id)?;
		cancel_sync(&wallet).await;
		Ok(())
	}

	pub async fn cancel_all_syncs(&self) {
		let wallets = self.handles();
		join_all(wallets.iter().map(|wallet| cancel_sync(wallet))).await;
	}

	pub fn rescan(&self, wallet_id: i32) -> Result<(), WalletSyncError> {
		let wallet = self.wallet_with_id(wallet_id)?;
		start_rescan(&self.env, &wallet)
	}

	pub fn cancel_rescan(&self, wallet_id: i32) -> Result<(), WalletSyncError> {
		let wallet = self.wallet_with_id(wallet_id)?;
		cancel_rescan(&wallet);
		Ok(())
	}

	/// Report that the application was inactive for `seconds`; applies to every live session.
	pub fn sync_inactive_for_period(&self, seconds: i64) {
		for wallet in self.handles() {
			sync_inactive_for_period(&wallet, seconds);
		}
	}

	pub fn add_sync_progress_listener(
		&self,
		id: &str,
		listener: Arc<dyn SyncProgressListener>,
	) -> Result<(), WalletSyncError> {
		self.env.hub.add_listener(id, listener)
	}

	pub fn remove_sync_progress_listener(&self, id: &str) {
		self.env.hub.remove_listener(id);
	}

	pub fn enable_sync_logs(&self) {
		self.env.hub.enable_sync_logs();
	}

	pub async fn save_user_config_value<T: Serialize + Sync>(
		&self,
		key: &str,
		value: &T,
	) -> Result<(), WalletSyncError> {
		self.ensure_running()?;
		Ok(save_config_value(self.env.config_store.as_ref(), key, value).await?)
	}

	pub async fn read_user_config_value<T: DeserializeOwned>(
		&self,
		key: &str,
	) -> Result<Option<T>, WalletSyncError> {
		Ok(read_config_value(self.env.config_store.as_ref(), key).await?)
	}

	/// Store the `;`-separated persistent peers used when a sync names none.
	pub async fn set_spv_persistent_peers(&self, peers: &str) -> Result<(), WalletSyncError> {
		self.save_user_config_value(SPV_PERSISTENT_PEER_ADDRESSES_CONFIG_KEY, &peers)
			.await
	}

	pub fn is_shut_down(&self) -> bool {
		self.env.shutdown.is_triggered()
	}

	/// Cancel every session and rescan, close all wallets and the stores.
	///
	/// Only the first call does anything. Store close failures are logged.
	pub async fn shutdown(&self) {
		if !self.env.shutdown.trigger() {
			debug!("Shutdown already requested");
			return;
		}
		info!("Shutting down");

		let wallets = self.handles();
		join_all(wallets.iter().map(|wallet| async move {
			cancel_rescan(wallet);
			cancel_sync(wallet).await;
			wallet.loader().close();
		}))
		.await;

		if let Err(e) = self.env.wallet_store.close().await {
			error!("Failed to close wallet store: {}", e);
		}
		if let Err(e) = self.env.config_store.close().await {
			error!("Failed to close config store: {}", e);
		}
		info!("Shutdown complete");
	}

	fn ensure_running(&self) -> Result<(), WalletSyncError> {
		if self.env.shutdown.is_triggered() {
			return Err(WalletSyncError::ShuttingDown);
		}
		Ok(())
	}

	fn handles(&self) -> Vec<Arc<WalletHandle>> {
		lock(&self.wallets).values().cloned().collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::network::scripted::{ScriptedBackend, ScriptedConnector};
	use crate::wallet::repositories::{MemoryConfigStore, MemoryWalletStore};

	async fn controller(root: &Path, store: Arc<MemoryWalletStore>) -> MultiWalletController {
		let connector = Arc::new(ScriptedConnector::new(|| ScriptedBackend::new(Vec::new())));
		MultiWalletController::new(
			root,
			NetworkKind::TestNet,
			store,
			Arc::new(MemoryConfigStore::new()),
			connector.into_connectors(),
			SyncConfig::default(),
		)
		.await
		.unwrap()
	}

	#[tokio::test]
	async fn created_wallet_gets_generated_name_and_directory() {
		let dir = tempfile::tempdir().unwrap();
		let store = Arc::new(MemoryWalletStore::new());
		let controller = controller(dir.path(), store.clone()).await;

		let wallet = controller
			.create_new_wallet(PassphraseType::Password)
			.await
			.unwrap();
		let record = wallet.record();
		assert_eq!(record.name, format!("wallet-{}", record.id));
		assert_eq!(record.data_dir, dir.path().join(record.id.to_string()));
		assert!(record.has_discovered_accounts);
		assert!(wallet.is_open());
		assert!(record.data_dir.is_dir());

		assert_eq!(store.load_all().await.unwrap(), vec![record]);
		assert_eq!(controller.opened_wallets_count(), 1);
	}

	#[tokio::test]
	async fn invalid_seed_rolls_back_record() {
		let dir = tempfile::tempdir().unwrap();
		let store = Arc::new(MemoryWalletStore::new());
		let controller = controller(dir.path(), store.clone()).await;

		let err = controller
			.restore_wallet("not a seed", PassphraseType::Pin)
			.await
			.unwrap_err();
		assert!(matches!(err, WalletSyncError::InvalidSeed));
		assert!(store.load_all().await.unwrap().is_empty());
		assert_eq!(controller.loaded_wallets_count(), 0);
	}

	#[tokio::test]
	async fn watch_only_names_are_checked() {
		let dir = tempfile::tempdir().unwrap();
		let store = Arc::new(MemoryWalletStore::new());
		let controller = controller(dir.path(), store).await;
		let key = "tpubVpQL2nMcgTdHtNQ6HDvfpVLcQNG9ymHN5vSvu8qXNgwKmRfBWbU";

		assert!(matches!(
			controller.create_watch_only_wallet("wallet-7", key).await,
			Err(WalletSyncError::ReservedName(_))
		));

		let wallet = controller
			.create_watch_only_wallet("cold storage", key)
			.await
			.unwrap();
		assert!(wallet.record().is_watching_only);
		assert!(controller.wallet_name_exists("cold storage").await.unwrap());

		assert!(matches!(
			controller.create_watch_only_wallet("cold storage", key).await,
			Err(WalletSyncError::WalletNameExists(_))
		));
		assert_eq!(controller.loaded_wallets_count(), 1);
	}

	#[tokio::test]
	async fn wallets_are_loaded_at_startup() {
		let dir = tempfile::tempdir().unwrap();
		let store = Arc::new(MemoryWalletStore::new());
		let id = {
			let controller = controller(dir.path(), store.clone()).await;
			controller
				.create_new_wallet(PassphraseType::Pin)
				.await
				.unwrap()
				.id()
		};

		let controller = controller(dir.path(), store).await;
		assert_eq!(controller.wallet_ids(), vec![id]);
		assert_eq!(controller.opened_wallets_count(), 0);
		assert!(matches!(
			controller.open_wallet(id + 1).await,
			Err(WalletSyncError::NotExist(_))
		));
		controller.open_wallet(id).await.unwrap();
		assert_eq!(controller.opened_wallets(), vec![id]);
	}

	#[tokio::test]
	async fn operations_fail_after_shutdown() {
		let dir = tempfile::tempdir().unwrap();
		let store = Arc::new(MemoryWalletStore::new());
		let controller = controller(dir.path(), store).await;
		controller
			.save_user_config_value("always_sync", &true)
			.await
			.unwrap();

		controller.shutdown().await;
		controller.shutdown().await;
		assert!(controller.is_shut_down());
		assert!(matches!(
			controller.create_new_wallet(PassphraseType::Pin).await,
			Err(WalletSyncError::ShuttingDown)
		));
		assert!(matches!(
			controller.save_user_config_value("always_sync", &false).await,
			Err(WalletSyncError::ShuttingDown)
		));
	}
}
