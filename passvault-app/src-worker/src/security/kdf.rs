//! Password-based key derivation for the key-encrypting key.
//!
//! PBKDF2-HMAC-SHA256 with a fixed work factor. The iteration count is part
//! of the stored format: changing it makes existing wrapped keys unreadable.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use super::keys::{Kek, Salt, KEY_SIZE};

/// PBKDF2 work factor.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Derive the KEK for `password` and `salt`.
///
/// Deterministic and infallible. Never log either argument or the result.
pub fn derive_kek(password: &str, salt: &Salt) -> Kek {
    let mut output = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(
        password.as_bytes(),
        salt.as_bytes(),
        PBKDF2_ITERATIONS,
        &mut output,
    );
    Kek::from_bytes(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_kek_deterministic() {
        let salt = Salt::from_bytes([1u8; 16]);
        let a = derive_kek("Tr0ub4dor!", &salt);
        let b = derive_kek("Tr0ub4dor!", &salt);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_derive_kek_different_passwords() {
        let salt = Salt::from_bytes([1u8; 16]);
        let a = derive_kek("correct horse", &salt);
        let b = derive_kek("battery staple", &salt);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_derive_kek_different_salts() {
        let a = derive_kek("same", &Salt::from_bytes([1u8; 16]));
        let b = derive_kek("same", &Salt::from_bytes([2u8; 16]));
        assert_ne!(a.as_bytes(), b.as_bytes());
    }
}
