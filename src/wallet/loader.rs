use crate::network::NetworkBackend;
use crate::utils::lock;
use crate::wallet::WalletSyncError;

use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Generate a fresh 32-byte wallet seed, hex encoded.
pub fn generate_random_seed() -> String {
	let mut seed = [0u8; 32];
	rand::rng().fill(&mut seed);
	hex::encode(seed)
}

/// Accepts a hex seed of 16 to 64 bytes or a mnemonic of at least 12 words.
pub fn validate_seed(seed: &str) -> Result<(), WalletSyncError> {
	let seed = seed.trim();
	if let Ok(bytes) = hex::decode(seed) {
		if (16..=64).contains(&bytes.len()) {
			return Ok(());
		}
	}

	let words: Vec<&str> = seed.split_whitespace().collect();
	if words.len() >= 12 && words.iter().all(|w| w.chars().all(|c| c.is_ascii_alphabetic())) {
		return Ok(());
	}
	Err(WalletSyncError::InvalidSeed)
}

pub fn validate_extended_public_key(key: &str) -> Result<(), WalletSyncError> {
	if key.len() >= 16 && key.chars().all(|c| c.is_ascii_alphanumeric()) {
		Ok(())
	} else {
		Err(WalletSyncError::InvalidExtendedPublicKey)
	}
}

/// Opens and closes the on-disk side of one wallet.
///
/// Also holds the loader-facing handle of the backend attached while the wallet syncs.
pub struct WalletLoader {
	data_dir: PathBuf,
	opened: AtomicBool,
	backend: Mutex<Option<Arc<dyn NetworkBackend>>>,
}

impl WalletLoader {
	pub fn new(data_dir: impl Into<PathBuf>) -> Self {
		Self {
			data_dir: data_dir.into(),
			opened: AtomicBool::new(false),
			backend: Mutex::new(None),
		}
	}

	pub fn data_dir(&self) -> &Path {
		&self.data_dir
	}

	pub fn is_open(&self) -> bool {
		self.opened.load(Ordering::SeqCst)
	}

	/// Initialize a new wallet from `seed` and leave it open.
	pub async fn create(&self, seed: &str) -> Result<(), WalletSyncError> {
		validate_seed(seed)?;
		self.initialize().await
	}

	/// Initialize a watch-only wallet from `extended_public_key` and leave it open.
	pub async fn create_watching_only(
		&self,
		extended_public_key: &str,
	) -> Result<(), WalletSyncError> {
		validate_extended_public_key(extended_public_key)?;
		self.initialize().await
	}

	/// Open an existing wallet. Opening an open wallet is a no-op.
	pub async fn open(&self) -> Result<(), WalletSyncError> {
		if self.is_open() {
			return Ok(());
		}
		let metadata = tokio::fs::metadata(&self.data_dir).await?;
		if !metadata.is_dir() {
			return Err(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("{:?} is not a wallet directory", self.data_dir),
			)
			.into());
		}
		self.opened.store(true, Ordering::SeqCst);
		info!("Opened wallet at {:?}", self.data_dir);
		Ok(())
	}

	pub fn close(&self) {
		if self.opened.swap(false, Ordering::SeqCst) {
			debug!("Closed wallet at {:?}", self.data_dir);
		}
	}

	pub fn network_backend(&self) -> Option<Arc<dyn NetworkBackend>> {
		lock(&self.backend).clone()
	}

	pub(crate) fn attach_backend(&self, backend: Arc<dyn NetworkBackend>) {
		*lock(&self.backend) = Some(backend);
	}

	pub(crate) fn detach_backend(&self) -> Option<Arc<dyn NetworkBackend>> {
		lock(&self.backend).take()
	}

	async fn initialize(&self) -> Result<(), WalletSyncError> {
		tokio::fs::create_dir_all(&self.data_dir).await?;
		self.opened.store(true, Ordering::SeqCst);
		debug!("Initialized wallet at {:?}", self.data_dir);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generated_seed_is_valid() {
		let seed = generate_random_seed();
		assert_eq!(seed.len(), 64);
		assert!(validate_seed(&seed).is_ok());
		assert_ne!(seed, generate_random_seed());
	}

	#[test]
	fn seed_validation() {
		let mnemonic = "abandon ability able about above absent absorb abstract absurd abuse access accident";
		assert!(validate_seed(mnemonic).is_ok());
		assert!(matches!(validate_seed("abc"), Err(WalletSyncError::InvalidSeed)));
		assert!(matches!(
			validate_seed("one two three"),
			Err(WalletSyncError::InvalidSeed)
		));
		assert!(matches!(validate_seed(""), Err(WalletSyncError::InvalidSeed)));
	}

	#[test]
	fn public_key_validation() {
		assert!(validate_extended_public_key("dpubZF4LSCdF9YKZfNzTVYhz4RBxsjYXqms8AQnMBHXZ8GUKoRSigG7kQnKiJt5pzk93Q8FxcdVBEkQZruSXduGtWnkwXzGnjbSovQ97dCxqaXc").is_ok());
		assert!(matches!(
			validate_extended_public_key("not a key"),
			Err(WalletSyncError::InvalidExtendedPublicKey)
		));
	}

	#[tokio::test]
	async fn create_then_reopen() {
		let dir = tempfile::tempdir().unwrap();
		let loader = WalletLoader::new(dir.path().join("1"));
		assert!(!loader.is_open());

		loader.create(&generate_random_seed()).await.unwrap();
		assert!(loader.is_open());
		loader.close();
		assert!(!loader.is_open());

		loader.open().await.unwrap();
		assert!(loader.is_open());
	}

	#[tokio::test]
	async fn opening_missing_directory_fails() {
		let dir = tempfile::tempdir().unwrap();
		let loader = WalletLoader::new(dir.path().join("missing"));
		assert!(matches!(loader.open().await, Err(WalletSyncError::Io(_))));
		assert!(!loader.is_open());
	}
}
