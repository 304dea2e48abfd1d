//! Encryption of the item list under the active master key.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::security::{open, seal, MasterKey, SealedPayload};

use super::error::{VaultError, VaultResult};
use super::item::VaultItem;
use super::keystore::KeyStore;
use super::session::Session;

#[derive(Clone)]
pub struct VaultCipher {
    keys: Arc<KeyStore>,
}

impl VaultCipher {
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self { keys }
    }

    /// Seal `items` under the session's master key with a fresh IV.
    pub async fn encrypt(&self, session: &Session, items: &[VaultItem]) -> VaultResult<SealedPayload> {
        let key = self.keys.active_key(session).await?;
        encrypt_with(&key, items)
    }

    /// Strict decrypt of a stored vault value.
    ///
    /// An absent, null or empty value is an empty vault. A value that is not
    /// a sealed payload is accepted as a plaintext item array from before
    /// encryption existed, and ignored otherwise. Anything that looks sealed
    /// but does not open is [`VaultError::Corrupted`].
    pub async fn decrypt(&self, session: &Session, stored: Option<&Value>) -> VaultResult<Vec<VaultItem>> {
        let payload = match classify(stored)? {
            Stored::Empty => return Ok(Vec::new()),
            Stored::Plain(items) => return Ok(items),
            Stored::Sealed(payload) => payload,
        };

        let key = self.keys.active_key(session).await?;
        decrypt_with(&key, &payload)
    }

    /// Like [`decrypt`](Self::decrypt) but a corrupt vault reads as empty.
    ///
    /// For read-only lookups only; [`VaultError::Locked`] still propagates.
    pub async fn decrypt_or_empty(
        &self,
        session: &Session,
        stored: Option<&Value>,
    ) -> VaultResult<Vec<VaultItem>> {
        match self.decrypt(session, stored).await {
            Err(VaultError::Corrupted(reason)) => {
                warn!("Vault could not be decrypted, treating as empty: {}", reason);
                Ok(Vec::new())
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for VaultCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultCipher").finish_non_exhaustive()
    }
}

pub(crate) fn encrypt_with(key: &MasterKey, items: &[VaultItem]) -> VaultResult<SealedPayload> {
    let plaintext = serde_json::to_vec(items)?;
    seal(key.as_bytes(), &plaintext)
}

/// [`VaultCipher::decrypt`] with an explicit key instead of the session's.
pub(crate) fn decrypt_stored_with(
    key: &MasterKey,
    stored: Option<&Value>,
) -> VaultResult<Vec<VaultItem>> {
    match classify(stored)? {
        Stored::Empty => Ok(Vec::new()),
        Stored::Plain(items) => Ok(items),
        Stored::Sealed(payload) => decrypt_with(key, &payload),
    }
}

pub(crate) fn decrypt_with(key: &MasterKey, payload: &SealedPayload) -> VaultResult<Vec<VaultItem>> {
    let plaintext = open(key.as_bytes(), payload)?;
    serde_json::from_slice(&plaintext)
        .map_err(|e| VaultError::Corrupted(format!("vault is not an item list: {}", e)))
}

enum Stored {
    Empty,
    Plain(Vec<VaultItem>),
    Sealed(SealedPayload),
}

fn classify(stored: Option<&Value>) -> VaultResult<Stored> {
    let value = match stored {
        None | Some(Value::Null) => return Ok(Stored::Empty),
        Some(Value::String(raw)) if raw.is_empty() => return Ok(Stored::Empty),
        Some(Value::String(raw)) => serde_json::from_str::<Value>(raw)
            .map_err(|e| VaultError::Corrupted(format!("vault is not JSON: {}", e)))?,
        Some(other) => other.clone(),
    };

    if let Some(payload) = SealedPayload::from_storage_value(&value) {
        return Ok(Stored::Sealed(payload));
    }

    match value {
        Value::Array(_) => serde_json::from_value(value)
            .map(Stored::Plain)
            .map_err(|e| VaultError::Corrupted(format!("plaintext vault is malformed: {}", e))),
        _ => Ok(Stored::Empty),
    }
}
