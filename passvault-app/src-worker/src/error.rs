use thiserror::Error;

use crate::vault::VaultError;

#[derive(Error, Debug)]
pub enum PassVaultError {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("E-mail does not match the registered account")]
    EmailMismatch,
}

impl PassVaultError {
    /// True when the failure means "unlock first", never "data is bad".
    pub fn is_locked(&self) -> bool {
        matches!(self, PassVaultError::Vault(VaultError::Locked))
    }
}

impl From<reqwest::Error> for PassVaultError {
    fn from(err: reqwest::Error) -> Self {
        PassVaultError::Network(err.to_string())
    }
}

impl serde::Serialize for PassVaultError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PassVaultError>;
