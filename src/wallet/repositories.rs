use crate::utils::lock;
use crate::wallet::Wallet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Errors from wallet and config stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("record {0} not found")]
	NotFound(i32),

	#[error("store is closed")]
	Closed,

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

/// Repository for wallet identity records
#[async_trait::async_trait]
pub trait WalletStore: Send + Sync {
	/// Insert or update `wallet`. A record with ID 0 gets a fresh ID written back into it.
	async fn save(&self, wallet: &mut Wallet) -> Result<(), StoreError>;
	/// All records ordered by ID.
	async fn load_all(&self) -> Result<Vec<Wallet>, StoreError>;
	async fn find_by_name(&self, name: &str) -> Result<Option<Wallet>, StoreError>;
	async fn delete(&self, id: i32) -> Result<(), StoreError>;
	async fn close(&self) -> Result<(), StoreError>;
}

/// Repository for user configuration values
#[async_trait::async_trait]
pub trait ConfigStore: Send + Sync {
	async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;
	async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError>;
	async fn close(&self) -> Result<(), StoreError>;
}

/// Read a typed config value; `None` when the key is unset.
pub async fn read_config_value<T: DeserializeOwned>(
	store: &dyn ConfigStore,
	key: &str,
) -> Result<Option<T>, StoreError> {
	match store.get(key).await? {
		Some(value) => Ok(Some(serde_json::from_value(value)?)),
		None => Ok(None),
	}
}

pub async fn save_config_value<T: Serialize + Sync>(
	store: &dyn ConfigStore,
	key: &str,
	value: &T,
) -> Result<(), StoreError> {
	store.set(key, serde_json::to_value(value)?).await
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct WalletIndex {
	next_id: i32,
	wallets: BTreeMap<i32, Wallet>,
}

impl WalletIndex {
	fn save(&mut self, wallet: &mut Wallet) {
		if wallet.id == 0 {
			self.next_id = self.next_id.max(self.wallets.keys().max().copied().unwrap_or(0)) + 1;
			wallet.id = self.next_id;
		}
		self.wallets.insert(wallet.id, wallet.clone());
	}

	fn find_by_name(&self, name: &str) -> Option<Wallet> {
		self.wallets.values().find(|w| w.name == name).cloned()
	}

	fn delete(&mut self, id: i32) -> Result<(), StoreError> {
		self.wallets
			.remove(&id)
			.map(|_| ())
			.ok_or(StoreError::NotFound(id))
	}
}

#[derive(Debug, Default)]
struct Guarded<T> {
	value: T,
	closed: bool,
}

impl<T> Guarded<T> {
	fn open(&mut self) -> Result<&mut T, StoreError> {
		if self.closed {
			return Err(StoreError::Closed);
		}
		Ok(&mut self.value)
	}
}

/// In-memory implementation of WalletStore
#[derive(Debug, Default)]
pub struct MemoryWalletStore {
	index: Mutex<Guarded<WalletIndex>>,
}

impl MemoryWalletStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait::async_trait]
impl WalletStore for MemoryWalletStore {
	async fn save(&self, wallet: &mut Wallet) -> Result<(), StoreError> {
		lock(&self.index).open()?.save(wallet);
		Ok(())
	}

	async fn load_all(&self) -> Result<Vec<Wallet>, StoreError> {
		Ok(lock(&self.index).open()?.wallets.values().cloned().collect())
	}

	async fn find_by_name(&self, name: &str) -> Result<Option<Wallet>, StoreError> {
		Ok(lock(&self.index).open()?.find_by_name(name))
	}

	async fn delete(&self, id: i32) -> Result<(), StoreError> {
		lock(&self.index).open()?.delete(id)
	}

	async fn close(&self) -> Result<(), StoreError> {
		lock(&self.index).closed = true;
		Ok(())
	}
}

/// File-based implementation of WalletStore, one JSON document per store
pub struct FileWalletStore {
	path: PathBuf,
	index: tokio::sync::Mutex<Guarded<WalletIndex>>,
}

impl FileWalletStore {
	pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();
		let index = read_document::<WalletIndex>(&path).await?.unwrap_or_default();
		info!(
			"Opened wallet store {:?} with {} records",
			path,
			index.wallets.len()
		);
		Ok(Self {
			path,
			index: tokio::sync::Mutex::new(Guarded {
				value: index,
				closed: false,
			}),
		})
	}
}

#[async_trait::async_trait]
impl WalletStore for FileWalletStore {
	async fn save(&self, wallet: &mut Wallet) -> Result<(), StoreError> {
		let mut guard = self.index.lock().await;
		let index = guard.open()?;
		let mut updated = index.clone();
		updated.save(wallet);
		write_document(&self.path, &updated).await?;
		*index = updated;
		Ok(())
	}

	async fn load_all(&self) -> Result<Vec<Wallet>, StoreError> {
		let mut guard = self.index.lock().await;
		Ok(guard.open()?.wallets.values().cloned().collect())
	}

	async fn find_by_name(&self, name: &str) -> Result<Option<Wallet>, StoreError> {
		let mut guard = self.index.lock().await;
		Ok(guard.open()?.find_by_name(name))
	}

	async fn delete(&self, id: i32) -> Result<(), StoreError> {
		let mut guard = self.index.lock().await;
		let index = guard.open()?;
		let mut updated = index.clone();
		updated.delete(id)?;
		write_document(&self.path, &updated).await?;
		*index = updated;
		Ok(())
	}

	async fn close(&self) -> Result<(), StoreError> {
		self.index.lock().await.closed = true;
		Ok(())
	}
}

type ConfigDocument = BTreeMap<String, serde_json::Value>;

/// In-memory implementation of ConfigStore
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
	values: Mutex<Guarded<ConfigDocument>>,
}

impl MemoryConfigStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait::async_trait]
impl ConfigStore for MemoryConfigStore {
	async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
		Ok(lock(&self.values).open()?.get(key).cloned())
	}

	async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
		lock(&self.values).open()?.insert(key.to_string(), value);
		Ok(())
	}

	async fn close(&self) -> Result<(), StoreError> {
		lock(&self.values).closed = true;
		Ok(())
	}
}

/// File-based implementation of ConfigStore
pub struct FileConfigStore {
	path: PathBuf,
	values: tokio::sync::Mutex<Guarded<ConfigDocument>>,
}

impl FileConfigStore {
	pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();
		let values = read_document::<ConfigDocument>(&path)
			.await?
			.unwrap_or_default();
		Ok(Self {
			path,
			values: tokio::sync::Mutex::new(Guarded {
				value: values,
				closed: false,
			}),
		})
	}
}

#[async_trait::async_trait]
impl ConfigStore for FileConfigStore {
	async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
		let mut guard = self.values.lock().await;
		Ok(guard.open()?.get(key).cloned())
	}

	async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
		let mut guard = self.values.lock().await;
		let values = guard.open()?;
		values.insert(key.to_string(), value);
		write_document(&self.path, &*values).await
	}

	async fn close(&self) -> Result<(), StoreError> {
		self.values.lock().await.closed = true;
		Ok(())
	}
}

async fn read_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
	match tokio::fs::read_to_string(path).await {
		Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(e.into()),
	}
}

/// Write via a temporary file and rename so a crash never leaves a torn document.
async fn write_document<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
	let content = serde_json::to_string_pretty(value)?;
	let tmp = path.with_extension("json.tmp");
	tokio::fs::write(&tmp, content).await?;
	tokio::fs::rename(&tmp, path).await?;
	debug!("Wrote {:?}", path);
	Ok(())
}
