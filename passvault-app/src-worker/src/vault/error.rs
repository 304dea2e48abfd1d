//! Vault-specific error types for key management and item encryption.
//!
//! The popup needs to tell "unlock first" apart from "the data is broken",
//! so these variants stay granular and serialize with a stable code.

use thiserror::Error;

/// Errors that can occur during vault operations.
#[derive(Error, Debug)]
pub enum VaultError {
    /// A wrapped master key exists but no session key is present.
    /// The UI must show the lock screen.
    #[error("Vault is locked")]
    Locked,

    /// The master password did not unwrap the stored key.
    #[error("Invalid master password")]
    InvalidPassword,

    /// A master password must contain at least one character.
    #[error("Master password must not be empty")]
    EmptyPassword,

    /// No master password has been configured.
    #[error("Vault not set up")]
    NotSetup,

    /// Stored data failed to parse or authenticate under the active key.
    #[error("Vault data is corrupted: {0}")]
    Corrupted(String),

    /// An error occurred in the encryption layer.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// The storage area rejected a read or write.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VaultError {
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::Locked => "LOCKED",
            VaultError::InvalidPassword => "INVALID_PASSWORD",
            VaultError::EmptyPassword => "EMPTY_PASSWORD",
            VaultError::NotSetup => "NOT_SETUP",
            VaultError::Corrupted(_) => "CORRUPTED",
            VaultError::Encryption(_) => "ENCRYPTION_ERROR",
            VaultError::Storage(_) => "STORAGE_ERROR",
            VaultError::Io(_) => "IO_ERROR",
            VaultError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

/// Result type alias for vault operations.
pub type VaultResult<T> = std::result::Result<T, VaultError>;

// ============================================================================
// Serialization for the popup message channel
// ============================================================================

impl serde::Serialize for VaultError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("VaultError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_error_serialization() {
        let err = VaultError::Locked;
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"code\":\"LOCKED\""));
        assert!(json.contains("Vault is locked"));
    }

    #[test]
    fn test_corrupted_carries_detail() {
        let err = VaultError::Corrupted("bad tag".into());
        assert_eq!(err.code(), "CORRUPTED");
        assert_eq!(err.to_string(), "Vault data is corrupted: bad tag");
    }
}
