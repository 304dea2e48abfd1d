use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::vault::{VaultError, VaultResult};

pub const NONCE_SIZE: usize = 12;

/// AES-256-GCM output as stored: base64 IV and base64 ciphertext+tag.
///
/// Used both for the wrapped master key and for the vault blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedPayload {
    pub iv: String,
    pub content: String,
}

impl SealedPayload {
    /// Storage form: the payload serialized to a JSON string.
    pub fn to_storage_value(&self) -> VaultResult<Value> {
        Ok(Value::String(serde_json::to_string(self)?))
    }

    /// Recognize a sealed payload in either its string or object form.
    ///
    /// Returns `None` for anything lacking a non-empty `iv` and `content`.
    pub fn from_storage_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(raw) => serde_json::from_str::<Value>(raw)
                .ok()
                .and_then(|inner| Self::from_object(&inner)),
            other => Self::from_object(other),
        }
    }

    fn from_object(value: &Value) -> Option<Self> {
        let iv = value.get("iv")?.as_str()?;
        let content = value.get("content")?.as_str()?;
        if iv.is_empty() || content.is_empty() {
            return None;
        }
        Some(Self {
            iv: iv.to_string(),
            content: content.to_string(),
        })
    }
}

/// Encrypt `plaintext` under `key` with a fresh random 96-bit nonce.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> VaultResult<SealedPayload> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| VaultError::Encryption(format!("Invalid key: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| VaultError::Encryption(format!("Encryption failed: {}", e)))?;

    Ok(SealedPayload {
        iv: BASE64.encode(nonce_bytes),
        content: BASE64.encode(ciphertext),
    })
}

/// Decrypt and authenticate a payload produced by [`seal`].
///
/// Malformed base64, a wrong-length IV, a wrong key and a tampered
/// ciphertext all surface as [`VaultError::Corrupted`].
pub fn open(key: &[u8; 32], payload: &SealedPayload) -> VaultResult<Vec<u8>> {
    let nonce_bytes = BASE64
        .decode(&payload.iv)
        .map_err(|e| VaultError::Corrupted(format!("iv is not base64: {}", e)))?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(VaultError::Corrupted(format!(
            "iv must be {} bytes, got {}",
            NONCE_SIZE,
            nonce_bytes.len()
        )));
    }
    let ciphertext = BASE64
        .decode(&payload.content)
        .map_err(|e| VaultError::Corrupted(format!("content is not base64: {}", e)))?;

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| VaultError::Encryption(format!("Invalid key: {}", e)))?;

    cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
        .map_err(|_| VaultError::Corrupted("authentication failed".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = [7u8; 32];
        let sealed = seal(&key, b"secret").unwrap();
        assert_eq!(open(&key, &sealed).unwrap(), b"secret");
    }

    #[test]
    fn test_seal_uses_fresh_nonce() {
        let key = [7u8; 32];
        let a = seal(&key, b"same").unwrap();
        let b = seal(&key, b"same").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.content, b.content);
    }

    #[test]
    fn test_open_with_wrong_key_is_corrupted() {
        let sealed = seal(&[1u8; 32], b"secret").unwrap();
        assert!(matches!(
            open(&[2u8; 32], &sealed),
            Err(VaultError::Corrupted(_))
        ));
    }

    #[test]
    fn test_open_rejects_short_iv() {
        let mut sealed = seal(&[1u8; 32], b"secret").unwrap();
        sealed.iv = BASE64.encode([0u8; 4]);
        assert!(matches!(
            open(&[1u8; 32], &sealed),
            Err(VaultError::Corrupted(_))
        ));
    }

    #[test]
    fn test_storage_value_forms() {
        let sealed = SealedPayload {
            iv: "aXY=".into(),
            content: "Y29udGVudA==".into(),
        };
        let stored = sealed.to_storage_value().unwrap();
        assert!(stored.is_string());
        assert_eq!(SealedPayload::from_storage_value(&stored), Some(sealed.clone()));

        let object = serde_json::to_value(&sealed).unwrap();
        assert_eq!(SealedPayload::from_storage_value(&object), Some(sealed));

        let legacy = serde_json::json!([{"site": "example.com"}]);
        assert_eq!(SealedPayload::from_storage_value(&legacy), None);
        let partial = serde_json::json!({"iv": "", "content": "x"});
        assert_eq!(SealedPayload::from_storage_value(&partial), None);
    }
}
