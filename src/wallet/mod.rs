pub mod controller;
pub mod handle;
pub mod loader;
pub mod repositories;
pub mod sync;
pub mod types;

pub use controller::MultiWalletController;
pub use handle::WalletHandle;
pub use loader::{WalletLoader, generate_random_seed};
pub use repositories::{
	ConfigStore, FileConfigStore, FileWalletStore, MemoryConfigStore, MemoryWalletStore,
	StoreError, WalletStore,
};
pub use types::*;
