//! Lock state of the vault.

use serde::{Deserialize, Serialize};

/// Represents the current state of the vault.
///
/// The vault transitions between these states:
/// - `NotSetup` → `Unlocked` (after the master password is set)
/// - `Unlocked` → `Locked` (explicit lock, logout or idle timeout)
/// - `Locked` → `Unlocked` (after a successful unlock)
///
/// `NotSetup` covers the bootstrap mode where items are encrypted with an
/// auto-provisioned key that no password protects yet.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum VaultStatus {
    /// No master password has been configured
    #[default]
    NotSetup,
    /// Wrapped key exists but no session key is present
    Locked,
    /// Session key present; items are readable
    Unlocked,
}

impl VaultStatus {
    pub fn is_locked(self) -> bool {
        self == Self::Locked
    }
}

impl std::fmt::Display for VaultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotSetup => write!(f, "NotSetup"),
            Self::Locked => write!(f, "Locked"),
            Self::Unlocked => write!(f, "Unlocked"),
        }
    }
}
