use thiserror::Error;

/// Failures of the key-value storage areas.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing file exists but is not a JSON object.
    #[error("Storage file is corrupted: {0}")]
    Corrupted(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

impl From<StorageError> for crate::vault::VaultError {
    fn from(err: StorageError) -> Self {
        crate::vault::VaultError::Storage(err.to_string())
    }
}

impl From<StorageError> for crate::error::PassVaultError {
    fn from(err: StorageError) -> Self {
        crate::error::PassVaultError::Storage(err.to_string())
    }
}
