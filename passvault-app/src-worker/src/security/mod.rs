mod crypto;
mod kdf;
mod keys;

pub use crypto::{open, seal, SealedPayload, NONCE_SIZE};
pub use kdf::{derive_kek, PBKDF2_ITERATIONS};
pub use keys::{Jwk, Kek, MasterKey, Salt, KEY_SIZE, SALT_SIZE};
