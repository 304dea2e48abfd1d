//! Persistent master-key storage and password wrapping.
//!
//! Local area records:
//! - `pm_enc_key`: master key sealed under the password-derived KEK
//! - `pm_salt`: PBKDF2 salt for that KEK
//! - `pm_master_key`: legacy plaintext key, used only before a password exists
//!
//! The wrapped key and its salt are always written in a single `set_many`.
//! A wrapped key always wins over a legacy key and means "locked" until the
//! session holds the unwrapped copy.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::security::{derive_kek, open, seal, MasterKey, Salt, SealedPayload};
use crate::storage::{keys, StorageArea};

use super::error::{VaultError, VaultResult};
use super::session::Session;

pub struct KeyStore {
    local: Arc<dyn StorageArea>,
}

impl KeyStore {
    pub fn new(local: Arc<dyn StorageArea>) -> Self {
        Self { local }
    }

    /// True iff a wrapped master key is persisted.
    pub async fn is_configured(&self) -> VaultResult<bool> {
        Ok(present(self.local.get(keys::ENCRYPTED_KEY).await?).is_some())
    }

    /// Protect the vault with `password`.
    ///
    /// Wraps the session key when unlocked (password change), otherwise the
    /// legacy key, otherwise a freshly generated key. Fails with
    /// [`VaultError::Locked`] when a wrapped key exists but the session is
    /// locked, since the current key cannot be recovered without unlocking.
    pub async fn set_master_password(&self, session: &Session, password: &str) -> VaultResult<()> {
        if password.is_empty() {
            return Err(VaultError::EmptyPassword);
        }

        let key = match session.master_key().await? {
            Some(key) => key,
            None => {
                if self.is_configured().await? {
                    return Err(VaultError::Locked);
                }
                match self.legacy_key().await? {
                    Some(key) => {
                        debug!("Wrapping existing legacy master key");
                        key
                    }
                    None => {
                        debug!("Generating master key for first-time setup");
                        MasterKey::generate()
                    }
                }
            }
        };

        let entries = self.wrap(&key, password)?;
        self.local.set_many(entries).await?;
        self.local.remove(keys::MASTER_KEY).await?;
        session.store_master_key(&key).await?;

        info!("Master password configured");
        Ok(())
    }

    /// Try to unlock with `password`.
    ///
    /// Returns `Ok(false)` for a wrong password, a missing record, or any
    /// malformed or tampered record; the session is only written on success.
    /// `Err` is reserved for storage failures.
    pub async fn unlock(&self, session: &Session, password: &str) -> VaultResult<bool> {
        match self.unwrap_with(password).await {
            Ok(key) => {
                session.store_master_key(&key).await?;
                info!("Vault unlocked");
                Ok(true)
            }
            Err(VaultError::Storage(e)) => Err(VaultError::Storage(e)),
            Err(VaultError::InvalidPassword) | Err(VaultError::NotSetup) => Ok(false),
            Err(e) => {
                warn!("Unlock failed: {}", e);
                Ok(false)
            }
        }
    }

    /// Forget the session key. Idempotent.
    pub async fn lock(&self, session: &Session) -> VaultResult<()> {
        session.clear_master_key().await?;
        debug!("Session key cleared");
        Ok(())
    }

    /// The key that encrypts the vault right now.
    ///
    /// Before any password is set, a legacy key is provisioned on first use
    /// so the vault works without setup.
    pub async fn active_key(&self, session: &Session) -> VaultResult<MasterKey> {
        if let Some(key) = session.master_key().await? {
            return Ok(key);
        }

        if self.is_configured().await? {
            return Err(VaultError::Locked);
        }

        if let Some(key) = self.legacy_key().await? {
            return Ok(key);
        }

        let key = MasterKey::generate();
        self.local
            .set(keys::MASTER_KEY, key.to_storage_value()?)
            .await?;
        info!("Provisioned master key (no master password set yet)");
        Ok(key)
    }

    /// JSON Web Key of the active key, for the user's backup file.
    pub async fn export_key(&self, session: &Session) -> VaultResult<String> {
        let key = self.active_key(session).await?;
        Ok(serde_json::to_string(&key.to_jwk())?)
    }

    /// Recover the master key with `password` without touching any session.
    pub async fn unwrap_with(&self, password: &str) -> VaultResult<MasterKey> {
        let found = self
            .local
            .get_many(&[keys::ENCRYPTED_KEY, keys::SALT])
            .await?;

        let (Some(record), Some(salt)) = (
            found.get(keys::ENCRYPTED_KEY).filter(|v| !v.is_null()),
            found.get(keys::SALT).and_then(Value::as_str),
        ) else {
            return Err(VaultError::NotSetup);
        };

        let record = SealedPayload::from_storage_value(record)
            .ok_or_else(|| VaultError::Corrupted("wrapped key record is malformed".into()))?;
        let salt = Salt::from_base64(salt)?;

        let kek = derive_kek(password, &salt);
        let raw = open(kek.as_bytes(), &record).map_err(|_| VaultError::InvalidPassword)?;
        MasterKey::from_slice(&raw)
    }

    /// Storage entries that protect `key` with `password`: a fresh salt and
    /// the key sealed under the derived KEK with a fresh IV.
    pub(crate) fn wrap(&self, key: &MasterKey, password: &str) -> VaultResult<Vec<(String, Value)>> {
        let salt = Salt::generate();
        let kek = derive_kek(password, &salt);
        let record = seal(kek.as_bytes(), key.as_bytes())?;

        Ok(vec![
            (keys::ENCRYPTED_KEY.to_string(), record.to_storage_value()?),
            (keys::SALT.to_string(), Value::String(salt.to_base64())),
        ])
    }

    /// Destroy every persisted key record and the session key.
    pub async fn reset(&self, session: &Session) -> VaultResult<()> {
        self.local
            .remove_many(&[keys::ENCRYPTED_KEY, keys::SALT, keys::MASTER_KEY])
            .await?;
        session.clear_master_key().await?;
        warn!("All master key records destroyed");
        Ok(())
    }

    async fn legacy_key(&self) -> VaultResult<Option<MasterKey>> {
        match present(self.local.get(keys::MASTER_KEY).await?) {
            Some(value) => Ok(Some(MasterKey::from_storage_value(&value)?)),
            None => Ok(None),
        }
    }
}

fn present(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryArea;

    fn store() -> (KeyStore, Arc<MemoryArea>) {
        let local = Arc::new(MemoryArea::new());
        (KeyStore::new(local.clone()), local)
    }

    #[tokio::test]
    async fn test_not_configured_before_password() {
        let (key_store, _) = store();
        assert!(!key_store.is_configured().await.unwrap());
    }

    #[tokio::test]
    async fn test_first_setup_needs_no_prior_key() {
        let (key_store, local) = store();
        let session = Session::in_memory();

        key_store.set_master_password(&session, "hunter2").await.unwrap();

        assert!(key_store.is_configured().await.unwrap());
        assert!(session.has_master_key().await.unwrap());
        assert!(local.get(keys::SALT).await.unwrap().is_some());
        assert!(local.get(keys::MASTER_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_setup_wraps_existing_legacy_key() {
        let (key_store, local) = store();
        let session = Session::in_memory();

        let legacy = key_store.active_key(&session).await.unwrap();
        assert!(local.get(keys::MASTER_KEY).await.unwrap().is_some());

        key_store.set_master_password(&session, "hunter2").await.unwrap();
        key_store.lock(&session).await.unwrap();
        assert!(key_store.unlock(&session, "hunter2").await.unwrap());

        let active = key_store.active_key(&session).await.unwrap();
        assert_eq!(active.as_bytes(), legacy.as_bytes());
        assert!(local.get(keys::MASTER_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wrong_password_leaves_session_empty() {
        let (key_store, _) = store();
        let session = Session::in_memory();
        key_store.set_master_password(&session, "right").await.unwrap();
        key_store.lock(&session).await.unwrap();

        assert!(!key_store.unlock(&session, "wrong").await.unwrap());
        assert!(!session.has_master_key().await.unwrap());
        assert!(matches!(
            key_store.active_key(&session).await,
            Err(VaultError::Locked)
        ));
    }

    #[tokio::test]
    async fn test_unlock_without_record_is_false() {
        let (key_store, _) = store();
        let session = Session::in_memory();
        assert!(!key_store.unlock(&session, "anything").await.unwrap());
    }

    #[tokio::test]
    async fn test_tampered_record_is_false() {
        let (key_store, local) = store();
        let session = Session::in_memory();
        key_store.set_master_password(&session, "right").await.unwrap();
        key_store.lock(&session).await.unwrap();

        local
            .set(keys::ENCRYPTED_KEY, Value::String("{not json".into()))
            .await
            .unwrap();
        assert!(!key_store.unlock(&session, "right").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_password_while_locked_fails() {
        let (key_store, _) = store();
        let session = Session::in_memory();
        key_store.set_master_password(&session, "first").await.unwrap();
        key_store.lock(&session).await.unwrap();

        assert!(matches!(
            key_store.set_master_password(&session, "second").await,
            Err(VaultError::Locked)
        ));
    }

    #[tokio::test]
    async fn test_password_change_keeps_master_key() {
        let (key_store, _) = store();
        let session = Session::in_memory();
        key_store.set_master_password(&session, "first").await.unwrap();
        let before = key_store.active_key(&session).await.unwrap();

        key_store.set_master_password(&session, "second").await.unwrap();
        key_store.lock(&session).await.unwrap();

        assert!(!key_store.unlock(&session, "first").await.unwrap());
        assert!(key_store.unlock(&session, "second").await.unwrap());
        let after = key_store.active_key(&session).await.unwrap();
        assert_eq!(before.as_bytes(), after.as_bytes());
    }

    #[tokio::test]
    async fn test_empty_password_rejected() {
        let (key_store, _) = store();
        let session = Session::in_memory();
        assert!(matches!(
            key_store.set_master_password(&session, "").await,
            Err(VaultError::EmptyPassword)
        ));
        assert!(!key_store.is_configured().await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_is_idempotent() {
        let (key_store, _) = store();
        let session = Session::in_memory();
        key_store.lock(&session).await.unwrap();
        key_store.lock(&session).await.unwrap();
        assert!(!session.has_master_key().await.unwrap());
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let (key_store, _) = store();
        let first = Session::in_memory();
        let second = Session::in_memory();
        key_store.set_master_password(&first, "pw").await.unwrap();

        assert!(key_store.active_key(&first).await.is_ok());
        assert!(matches!(
            key_store.active_key(&second).await,
            Err(VaultError::Locked)
        ));
    }

    #[tokio::test]
    async fn test_export_key_requires_unlock() {
        let (key_store, _) = store();
        let session = Session::in_memory();
        key_store.set_master_password(&session, "pw").await.unwrap();

        let exported = key_store.export_key(&session).await.unwrap();
        assert!(exported.contains("\"kty\":\"oct\""));

        key_store.lock(&session).await.unwrap();
        assert!(matches!(
            key_store.export_key(&session).await,
            Err(VaultError::Locked)
        ));
    }

    #[tokio::test]
    async fn test_reset_returns_to_unconfigured() {
        let (key_store, _) = store();
        let session = Session::in_memory();
        key_store.set_master_password(&session, "pw").await.unwrap();
        key_store.reset(&session).await.unwrap();

        assert!(!key_store.is_configured().await.unwrap());
        assert!(!session.has_master_key().await.unwrap());
    }
}
