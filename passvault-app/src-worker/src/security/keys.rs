//! Key material: the vault master key, the password-derived KEK and the
//! PBKDF2 salt.

use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD as BASE64_URL};
use base64::Engine as _;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::vault::{VaultError, VaultResult};

/// Key size for AES-256 (bytes)
pub const KEY_SIZE: usize = 32;

/// Salt size in bytes (128 bits)
pub const SALT_SIZE: usize = 16;

/// The 256-bit key that encrypts the item list.
///
/// Zeroized on drop. Persisted only as a JSON Web Key, either wrapped
/// (never in plaintext once a password exists) or in the session area.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; KEY_SIZE],
}

impl MasterKey {
    /// Generate a fresh random master key.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::rng().fill_bytes(&mut key);
        Self { key }
    }

    /// Rebuild a key from raw bytes, e.g. after unwrapping.
    pub fn from_slice(slice: &[u8]) -> VaultResult<Self> {
        let key: [u8; KEY_SIZE] = slice.try_into().map_err(|_| {
            VaultError::Corrupted(format!(
                "master key must be {} bytes, got {}",
                KEY_SIZE,
                slice.len()
            ))
        })?;
        Ok(Self { key })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    pub fn to_jwk(&self) -> Jwk {
        Jwk {
            kty: "oct".to_string(),
            k: BASE64_URL.encode(self.key),
            alg: "A256GCM".to_string(),
            ext: true,
            key_ops: vec!["encrypt".to_string(), "decrypt".to_string()],
        }
    }

    pub fn from_jwk(jwk: &Jwk) -> VaultResult<Self> {
        if jwk.kty != "oct" {
            return Err(VaultError::Corrupted(format!(
                "unsupported key type {:?}",
                jwk.kty
            )));
        }
        let mut raw = BASE64_URL
            .decode(jwk.k.trim_end_matches('='))
            .map_err(|e| VaultError::Corrupted(format!("key is not base64url: {}", e)))?;
        let key = Self::from_slice(&raw);
        raw.zeroize();
        key
    }

    pub fn to_storage_value(&self) -> VaultResult<Value> {
        Ok(serde_json::to_value(self.to_jwk())?)
    }

    pub fn from_storage_value(value: &Value) -> VaultResult<Self> {
        let jwk: Jwk = match value {
            Value::String(raw) => serde_json::from_str(raw)?,
            other => serde_json::from_value(other.clone())?,
        };
        Self::from_jwk(&jwk)
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// JSON Web Key form of a symmetric key.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Jwk {
    pub kty: String,
    pub k: String,
    #[serde(default)]
    pub alg: String,
    #[serde(default)]
    pub ext: bool,
    #[serde(default)]
    pub key_ops: Vec<String>,
}

/// Key-encrypting key derived from the master password.
///
/// Only ever wraps and unwraps the [`MasterKey`].
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Kek {
    key: [u8; KEY_SIZE],
}

impl Kek {
    pub(crate) fn from_bytes(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for Kek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kek").field("key", &"[REDACTED]").finish()
    }
}

/// Random PBKDF2 salt, generated whenever a password is (re)set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    pub fn generate() -> Self {
        let mut salt = [0u8; SALT_SIZE];
        rand::rng().fill_bytes(&mut salt);
        Self(salt)
    }

    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    pub fn from_base64(encoded: &str) -> VaultResult<Self> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| VaultError::Corrupted(format!("salt is not base64: {}", e)))?;
        let salt: [u8; SALT_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            VaultError::Corrupted(format!(
                "Invalid salt size: expected {} bytes, got {}",
                SALT_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(salt))
    }
}
