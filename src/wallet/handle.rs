use crate::network::NetworkBackend;
use crate::utils::lock;
use crate::wallet::loader::WalletLoader;
use crate::wallet::repositories::{StoreError, WalletStore};
use crate::wallet::sync::SyncState;
use crate::wallet::Wallet;

use std::sync::{Arc, Mutex};
use tracing::info;

/// A loaded wallet: its record, its loader and its sync state
pub struct WalletHandle {
	record: Mutex<Wallet>,
	loader: WalletLoader,
	sync: SyncState,
}

impl WalletHandle {
	pub fn new(record: Wallet) -> Self {
		Self {
			loader: WalletLoader::new(record.data_dir.clone()),
			sync: SyncState::new(record.id),
			record: Mutex::new(record),
		}
	}

	pub fn id(&self) -> i32 {
		lock(&self.record).id
	}

	pub fn name(&self) -> String {
		lock(&self.record).name.clone()
	}

	/// Copy of the wallet's identity record.
	pub fn record(&self) -> Wallet {
		lock(&self.record).clone()
	}

	pub fn loader(&self) -> &WalletLoader {
		&self.loader
	}

	pub fn sync_state(&self) -> &SyncState {
		&self.sync
	}

	pub fn is_open(&self) -> bool {
		self.loader.is_open()
	}

	/// The wallet-facing handle of the attached backend.
	pub fn network_backend(&self) -> Option<Arc<dyn NetworkBackend>> {
		self.sync.network_backend()
	}

	/// Persist that account discovery finished for this wallet.
	pub(crate) async fn mark_accounts_discovered(
		&self,
		store: &dyn WalletStore,
	) -> Result<(), StoreError> {
		let mut record = self.record();
		if record.has_discovered_accounts {
			return Ok(());
		}
		record.has_discovered_accounts = true;
		store.save(&mut record).await?;
		*lock(&self.record) = record;
		info!("Wallet {}: account discovery complete", self.id());
		Ok(())
	}
}

impl std::fmt::Debug for WalletHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WalletHandle")
			.field("record", &self.record())
			.field("open", &self.is_open())
			.field("phase", &self.sync.snapshot().phase)
			.finish()
	}
}
