//! Persistence of the encrypted item list under the `vault` key.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::security::MasterKey;
use crate::storage::{keys, StorageArea};

use super::cipher::{decrypt_stored_with, VaultCipher};
use super::error::VaultResult;
use super::item::VaultItem;
use super::session::Session;

/// Serializes every write to the vault and to the key records.
pub type WriterLock = Arc<Mutex<()>>;

pub struct VaultStore {
    local: Arc<dyn StorageArea>,
    cipher: VaultCipher,
    writer: WriterLock,
}

impl VaultStore {
    pub fn new(local: Arc<dyn StorageArea>, cipher: VaultCipher, writer: WriterLock) -> Self {
        Self {
            local,
            cipher,
            writer,
        }
    }

    /// Strict load: corruption is an error.
    pub async fn load(&self, session: &Session) -> VaultResult<Vec<VaultItem>> {
        let stored = self.local.get(keys::VAULT).await?;
        let items = self.cipher.decrypt(session, stored.as_ref()).await?;
        Ok(migrate(items))
    }

    /// Lenient load for lookups: corruption reads as an empty vault.
    pub async fn load_or_empty(&self, session: &Session) -> VaultResult<Vec<VaultItem>> {
        let stored = self.local.get(keys::VAULT).await?;
        let items = self.cipher.decrypt_or_empty(session, stored.as_ref()).await?;
        Ok(migrate(items))
    }

    /// Strict load with `key` rather than the session key. Leaves the
    /// session untouched.
    pub(crate) async fn load_with(&self, key: &MasterKey) -> VaultResult<Vec<VaultItem>> {
        let stored = self.local.get(keys::VAULT).await?;
        Ok(migrate(decrypt_stored_with(key, stored.as_ref())?))
    }

    /// Replace the whole item list.
    pub async fn save(&self, session: &Session, items: &[VaultItem]) -> VaultResult<()> {
        let _guard = self.writer.lock().await;
        self.save_unlocked(session, items).await
    }

    /// Read-modify-write under the writer lock. Returns what `f` returns.
    pub async fn update<F, R>(&self, session: &Session, f: F) -> VaultResult<R>
    where
        F: FnOnce(&mut Vec<VaultItem>) -> R + Send,
        R: Send,
    {
        let _guard = self.writer.lock().await;
        let mut items = self.load(session).await?;
        let result = f(&mut items);
        self.save_unlocked(session, &items).await?;
        Ok(result)
    }

    /// Drop the stored vault blob.
    pub async fn clear(&self) -> VaultResult<()> {
        let _guard = self.writer.lock().await;
        self.local.remove(keys::VAULT).await?;
        debug!("Vault blob removed");
        Ok(())
    }

    /// Caller must hold the writer lock.
    pub(crate) async fn save_unlocked(&self, session: &Session, items: &[VaultItem]) -> VaultResult<()> {
        let sealed = self.cipher.encrypt(session, items).await?;
        self.local.set(keys::VAULT, sealed.to_storage_value()?).await?;
        debug!("Saved {} vault items", items.len());
        Ok(())
    }
}

fn migrate(items: Vec<VaultItem>) -> Vec<VaultItem> {
    items.into_iter().map(VaultItem::migrate).collect()
}
