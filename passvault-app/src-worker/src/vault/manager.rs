//! VaultManager - lock/unlock lifecycle of the password vault.
//!
//! This module ties the key store, the vault cipher and the item store to
//! one browser session and handles:
//! - First-time setup of the master password
//! - Unlocking and locking, including logout
//! - Idle tracking and the auto-lock timeout
//! - Password change, master key rotation and factory reset
//!
//! The status is never cached: every call re-reads the key records and the
//! session key, so a lock performed through any handle is seen everywhere.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::security::MasterKey;
use crate::storage::{get_as, keys, set_as, StorageArea};

use super::auth::VaultStatus;
use super::cipher::{encrypt_with, VaultCipher};
use super::error::{VaultError, VaultResult};
use super::item::{new_id, VaultItem};
use super::keystore::KeyStore;
use super::session::Session;
use super::store::{VaultStore, WriterLock};

/// Idle timeout used until the user picks one.
pub const DEFAULT_LOCK_TIMEOUT_MINUTES: u32 = 10;

/// Written to the last-active record on logout so the next check locks.
const LOGGED_OUT_MARKER: i64 = 1;

pub struct VaultManager {
    local: Arc<dyn StorageArea>,
    session: Session,
    keys: Arc<KeyStore>,
    store: VaultStore,
    writer: WriterLock,
    default_timeout_minutes: u32,
}

impl VaultManager {
    pub fn new(local: Arc<dyn StorageArea>, session: Session) -> Self {
        let keys = Arc::new(KeyStore::new(local.clone()));
        let writer: WriterLock = Arc::new(Mutex::new(()));
        let store = VaultStore::new(local.clone(), VaultCipher::new(keys.clone()), writer.clone());

        Self {
            local,
            session,
            keys,
            store,
            writer,
            default_timeout_minutes: DEFAULT_LOCK_TIMEOUT_MINUTES,
        }
    }

    /// Override the idle timeout applied when none is stored.
    pub fn with_default_timeout(mut self, minutes: u32) -> Self {
        self.default_timeout_minutes = minutes;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn key_store(&self) -> &KeyStore {
        &self.keys
    }

    pub fn store(&self) -> &VaultStore {
        &self.store
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub async fn status(&self) -> VaultResult<VaultStatus> {
        if !self.keys.is_configured().await? {
            return Ok(VaultStatus::NotSetup);
        }
        if self.session.has_master_key().await? {
            Ok(VaultStatus::Unlocked)
        } else {
            Ok(VaultStatus::Locked)
        }
    }

    /// Set the master password and leave the vault unlocked.
    ///
    /// Items stored before setup stay readable: the key they were encrypted
    /// with becomes the wrapped master key.
    pub async fn setup(&self, password: &str) -> VaultResult<()> {
        let _guard = self.writer.lock().await;
        if self.keys.is_configured().await? {
            return Err(VaultError::Storage(
                "Master password already set. Use change_password() instead.".into(),
            ));
        }

        info!("Setting up master password");
        self.keys.set_master_password(&self.session, password).await?;
        self.touch(Utc::now()).await?;
        Ok(())
    }

    /// Returns `Ok(false)` for a wrong password; the vault stays locked.
    pub async fn unlock(&self, password: &str) -> VaultResult<bool> {
        let _guard = self.writer.lock().await;
        if !self.keys.unlock(&self.session, password).await? {
            warn!("Unlock attempt with wrong master password");
            return Ok(false);
        }
        self.touch(Utc::now()).await?;
        Ok(true)
    }

    pub async fn lock(&self) -> VaultResult<()> {
        let _guard = self.writer.lock().await;
        info!("Locking vault");
        self.keys.lock(&self.session).await
    }

    /// Lock and mark the session idle, so every other context locks on its
    /// next check as well.
    pub async fn logout(&self) -> VaultResult<()> {
        let _guard = self.writer.lock().await;
        self.keys.lock(&self.session).await?;
        self.local
            .set(keys::LAST_ACTIVE, Value::from(LOGGED_OUT_MARKER))
            .await?;
        info!("Logged out");
        Ok(())
    }

    /// Destroy the keys, the vault and every security record.
    pub async fn reset(&self) -> VaultResult<()> {
        let _guard = self.writer.lock().await;
        warn!("Resetting vault - all items will be lost!");
        self.keys.reset(&self.session).await?;
        self.local
            .remove_many(&[
                keys::VAULT,
                keys::LAST_ACTIVE,
                keys::LOCK_TIMEOUT,
                keys::USER_EMAIL,
            ])
            .await?;
        info!("Vault reset");
        Ok(())
    }

    // =========================================================================
    // Idle timeout
    // =========================================================================

    /// Note user activity. Ignored unless the vault is unlocked.
    pub async fn record_activity(&self, now: DateTime<Utc>) -> VaultResult<()> {
        if self.status().await? == VaultStatus::Unlocked {
            self.touch(now).await?;
        }
        Ok(())
    }

    /// Lock the vault if it has been idle longer than the timeout.
    ///
    /// Returns `true` when this call locked the vault. A timeout of zero
    /// disables auto-lock. The check itself is not activity.
    pub async fn check_auto_lock(&self, now: DateTime<Utc>) -> VaultResult<bool> {
        if self.expired_idle_ms(now).await?.is_none() {
            return Ok(false);
        }

        let _guard = self.writer.lock().await;
        // An unlock or activity may have landed while waiting for the lock.
        let Some(idle_ms) = self.expired_idle_ms(now).await? else {
            return Ok(false);
        };

        self.keys.lock(&self.session).await?;
        info!("Vault auto-locked after {} minutes idle", idle_ms / 60_000);
        Ok(true)
    }

    /// Idle time in milliseconds when it exceeds the timeout of an unlocked
    /// vault. A missing last-active record is initialised to `now`.
    async fn expired_idle_ms(&self, now: DateTime<Utc>) -> VaultResult<Option<i64>> {
        if self.status().await? != VaultStatus::Unlocked {
            return Ok(None);
        }

        let timeout = self.lock_timeout().await?;
        if timeout == 0 {
            return Ok(None);
        }

        let Some(last_active) = self.last_active().await? else {
            self.touch(now).await?;
            return Ok(None);
        };

        let idle_ms = now.timestamp_millis() - last_active;
        Ok((idle_ms > timeout_ms(timeout)).then_some(idle_ms))
    }

    /// Time left before auto-lock, for the countdown display.
    ///
    /// `None` while locked or when auto-lock is disabled.
    pub async fn time_until_lock(&self, now: DateTime<Utc>) -> VaultResult<Option<Duration>> {
        if self.status().await? != VaultStatus::Unlocked {
            return Ok(None);
        }
        let timeout = self.lock_timeout().await?;
        if timeout == 0 {
            return Ok(None);
        }

        let remaining_ms = match self.last_active().await? {
            Some(last_active) => last_active + timeout_ms(timeout) - now.timestamp_millis(),
            None => timeout_ms(timeout),
        };
        Ok(Some(Duration::from_millis(remaining_ms.max(0) as u64)))
    }

    /// Idle timeout in minutes; 0 means never.
    pub async fn lock_timeout(&self) -> VaultResult<u32> {
        let stored = self.local.get(keys::LOCK_TIMEOUT).await?;
        Ok(stored
            .as_ref()
            .and_then(parse_minutes)
            .unwrap_or(self.default_timeout_minutes))
    }

    pub async fn set_lock_timeout(&self, minutes: u32) -> VaultResult<()> {
        let _guard = self.writer.lock().await;
        self.local.set(keys::LOCK_TIMEOUT, Value::from(minutes)).await?;
        debug!("Lock timeout set to {} minutes", minutes);
        Ok(())
    }

    async fn last_active(&self) -> VaultResult<Option<i64>> {
        Ok(get_as::<i64>(self.local.as_ref(), keys::LAST_ACTIVE).await?)
    }

    async fn touch(&self, now: DateTime<Utc>) -> VaultResult<()> {
        self.local
            .set(keys::LAST_ACTIVE, Value::from(now.timestamp_millis()))
            .await?;
        Ok(())
    }

    // =========================================================================
    // Password management
    // =========================================================================

    /// Re-wrap the master key under `new_password`.
    ///
    /// Items are not re-encrypted; see [`rotate_master_key`](Self::rotate_master_key).
    pub async fn change_password(&self, current: &str, new_password: &str) -> VaultResult<()> {
        if new_password.is_empty() {
            return Err(VaultError::EmptyPassword);
        }
        let _guard = self.writer.lock().await;

        let key = self.keys.unwrap_with(current).await?;
        let entries = self.keys.wrap(&key, new_password)?;
        self.local.set_many(entries).await?;
        self.session_store(&key).await?;

        info!("Master password changed");
        Ok(())
    }

    /// Replace the master key itself and re-encrypt every item with it.
    ///
    /// The new vault blob, wrapped key and salt are written together. The
    /// session only changes once that write has succeeded.
    pub async fn rotate_master_key(&self, password: &str) -> VaultResult<()> {
        let _guard = self.writer.lock().await;

        let old_key = self.keys.unwrap_with(password).await?;
        let items = self.store.load_with(&old_key).await?;

        let new_key = MasterKey::generate();
        let sealed = encrypt_with(&new_key, &items)?;
        let mut entries = self.keys.wrap(&new_key, password)?;
        entries.push((keys::VAULT.to_string(), sealed.to_storage_value()?));

        self.local.set_many(entries).await?;
        self.session_store(&new_key).await?;
        self.touch(Utc::now()).await?;

        info!("Master key rotated, {} items re-encrypted", items.len());
        Ok(())
    }

    async fn session_store(&self, key: &MasterKey) -> VaultResult<()> {
        self.session.store_master_key(key).await
    }

    // =========================================================================
    // Account
    // =========================================================================

    pub async fn user_email(&self) -> VaultResult<Option<String>> {
        Ok(get_as::<String>(self.local.as_ref(), keys::USER_EMAIL).await?)
    }

    pub async fn set_user_email(&self, email: &str) -> VaultResult<()> {
        set_as(self.local.as_ref(), keys::USER_EMAIL, email).await?;
        Ok(())
    }

    /// JSON Web Key of the master key, for the user's backup file.
    pub async fn export_key(&self) -> VaultResult<String> {
        self.keys.export_key(&self.session).await
    }

    // =========================================================================
    // Items
    // =========================================================================

    pub async fn items(&self) -> VaultResult<Vec<VaultItem>> {
        self.store.load(&self.session).await
    }

    pub async fn items_or_empty(&self) -> VaultResult<Vec<VaultItem>> {
        self.store.load_or_empty(&self.session).await
    }

    /// Insert `item`, or replace the stored item with the same id.
    pub async fn upsert_item(&self, mut item: VaultItem) -> VaultResult<VaultItem> {
        if item.id.is_none() {
            item.id = Some(new_id());
        }
        let saved = item.clone();
        self.store
            .update(&self.session, move |items| {
                match items.iter_mut().find(|existing| existing.id == item.id) {
                    Some(existing) => *existing = item,
                    None => items.push(item),
                }
            })
            .await?;
        Ok(saved)
    }

    /// Returns whether an item was removed.
    pub async fn delete_item(&self, id: &str) -> VaultResult<bool> {
        let id = id.to_string();
        self.store
            .update(&self.session, move |items| {
                let before = items.len();
                items.retain(|item| item.id.as_deref() != Some(id.as_str()));
                items.len() != before
            })
            .await
    }

    pub async fn replace_items(&self, items: &[VaultItem]) -> VaultResult<()> {
        self.store.save(&self.session, items).await
    }

    /// Append imported items to the vault. Returns how many were added.
    pub async fn import_items(&self, imported: Vec<VaultItem>) -> VaultResult<usize> {
        let count = imported.len();
        self.store
            .update(&self.session, move |items| items.extend(imported))
            .await?;
        info!("Imported {} items", count);
        Ok(count)
    }
}

fn timeout_ms(minutes: u32) -> i64 {
    i64::from(minutes) * 60_000
}

/// Minutes may be stored as a number or as the string a settings form wrote.
fn parse_minutes(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
