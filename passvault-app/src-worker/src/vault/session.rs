//! Session-scoped unlock state.

use std::sync::Arc;

use crate::security::MasterKey;
use crate::storage::{keys, MemoryArea, StorageArea};

use super::error::VaultResult;

/// Handle to the storage area that lives exactly as long as the browser
/// session.
///
/// The presence of the session key in this area is the only source of truth
/// for "unlocked": nothing caches it, every call reads it again.
#[derive(Clone)]
pub struct Session {
    area: Arc<dyn StorageArea>,
}

impl Session {
    pub fn new(area: Arc<dyn StorageArea>) -> Self {
        Self { area }
    }

    /// A fresh, empty session backed by memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryArea::new()))
    }

    pub async fn master_key(&self) -> VaultResult<Option<MasterKey>> {
        match self.area.get(keys::SESSION_KEY).await? {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => Ok(Some(MasterKey::from_storage_value(&value)?)),
        }
    }

    pub async fn has_master_key(&self) -> VaultResult<bool> {
        Ok(!matches!(
            self.area.get(keys::SESSION_KEY).await?,
            None | Some(serde_json::Value::Null)
        ))
    }

    pub(crate) async fn store_master_key(&self, key: &MasterKey) -> VaultResult<()> {
        self.area
            .set(keys::SESSION_KEY, key.to_storage_value()?)
            .await?;
        Ok(())
    }

    pub(crate) async fn clear_master_key(&self) -> VaultResult<()> {
        self.area.remove(keys::SESSION_KEY).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}
