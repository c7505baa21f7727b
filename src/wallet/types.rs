use crate::network::{AddressError, BackendError};
use crate::wallet::repositories::StoreError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How the spending passphrase of a wallet is entered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassphraseType {
	#[default]
	Pin,
	Password,
}

/// Identity record of a wallet, as kept in the wallet store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
	/// Unique ID assigned by the store on first save; 0 until then.
	pub id: i32,
	pub name: String,
	pub data_dir: PathBuf,
	pub spending_passphrase_type: PassphraseType,
	/// Set once account discovery finished for this wallet.
	pub has_discovered_accounts: bool,
	#[serde(default)]
	pub is_watching_only: bool,
	pub created_at: DateTime<Utc>,
}

impl Wallet {
	/// A record that has not been saved yet.
	pub fn provisional(spending_passphrase_type: PassphraseType, has_discovered_accounts: bool) -> Self {
		Self {
			id: 0,
			name: String::new(),
			data_dir: PathBuf::new(),
			spending_passphrase_type,
			has_discovered_accounts,
			is_watching_only: false,
			created_at: Utc::now(),
		}
	}
}

/// Error codes attached to asynchronous sync failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncErrorCode {
	Unexpected,
	DeadlineExceeded,
}

/// A sync failure delivered to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncError {
	pub code: SyncErrorCode,
	pub cause: BackendError,
}

impl std::fmt::Display for SyncError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.code {
			SyncErrorCode::DeadlineExceeded => {
				write!(f, "synchronization deadline exceeded: {}", self.cause)
			}
			SyncErrorCode::Unexpected => write!(f, "synchronization failed: {}", self.cause),
		}
	}
}

/// Errors returned by the sync engine and the wallet controller
#[derive(Debug, thiserror::Error)]
pub enum WalletSyncError {
	#[error("sync already in progress")]
	AlreadySyncing,

	#[error("rescan already in progress")]
	AlreadyRescanning,

	#[error("wallet not loaded")]
	WalletNotLoaded,

	#[error("wallet {0} does not exist")]
	NotExist(i32),

	#[error("no valid peer addresses")]
	InvalidPeers,

	#[error("invalid address: {0}")]
	InvalidAddress(String),

	#[error("not connected to the network")]
	NotConnected,

	#[error("wallet name {0:?} uses a reserved prefix")]
	ReservedName(String),

	#[error("a wallet named {0:?} already exists")]
	WalletNameExists(String),

	#[error("sync progress listener {0:?} already exists")]
	ListenerAlreadyExists(String),

	#[error("invalid wallet seed")]
	InvalidSeed,

	#[error("invalid extended public key")]
	InvalidExtendedPublicKey,

	#[error("invalid credentials for trusted node")]
	InvalidCredentials,

	#[error("trusted node unavailable: {0}")]
	Unavailable(String),

	#[error("operation canceled")]
	Canceled,

	#[error("deadline exceeded")]
	DeadlineExceeded,

	#[error("shutting down")]
	ShuttingDown,

	#[error("unexpected backend error: {0}")]
	Unexpected(#[source] BackendError),

	#[error("store error: {0}")]
	Store(#[from] StoreError),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

impl From<AddressError> for WalletSyncError {
	fn from(e: AddressError) -> Self {
		WalletSyncError::InvalidAddress(e.to_string())
	}
}

impl From<BackendError> for WalletSyncError {
	fn from(e: BackendError) -> Self {
		match e {
			BackendError::Canceled => WalletSyncError::Canceled,
			BackendError::DeadlineExceeded => WalletSyncError::DeadlineExceeded,
			BackendError::InvalidAuth => WalletSyncError::InvalidCredentials,
			BackendError::Unavailable(reason) => WalletSyncError::Unavailable(reason),
			other => WalletSyncError::Unexpected(other),
		}
	}
}
