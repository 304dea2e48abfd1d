//! Encrypted password vault.
//!
//! Items are encrypted with a random 256-bit master key. Once a master
//! password is set, that key is stored only wrapped under a KEK derived
//! from the password with PBKDF2. Unlocking places the unwrapped key in the
//! session area; locking removes it.

pub mod auth;
pub mod cipher;
pub mod error;
pub mod item;
pub mod keystore;
pub mod manager;
pub mod monitor;
pub mod session;
pub mod store;
pub mod strength;
pub mod transfer;

pub use auth::VaultStatus;
pub use cipher::VaultCipher;
pub use error::{VaultError, VaultResult};
pub use item::{ItemFilter, ItemKind, VaultItem};
pub use keystore::KeyStore;
pub use manager::{VaultManager, DEFAULT_LOCK_TIMEOUT_MINUTES};
pub use monitor::{AutoLockMonitor, LockEvent};
pub use session::Session;
pub use store::VaultStore;
pub use strength::{rate_password, Strength};
pub use transfer::{export_csv, import_csv};
