//! Names of the records kept in the storage areas.

/// Legacy unwrapped master key (JWK), present only before a password is set.
pub const MASTER_KEY: &str = "pm_master_key";
/// Master key wrapped under the password-derived KEK.
pub const ENCRYPTED_KEY: &str = "pm_enc_key";
/// PBKDF2 salt for the wrapped key.
pub const SALT: &str = "pm_salt";
/// Unlocked master key (JWK). Lives in the session area only.
pub const SESSION_KEY: &str = "pm_session_key";
/// Encrypted item list.
pub const VAULT: &str = "vault";
/// Idle timeout in minutes; 0 disables auto-lock.
pub const LOCK_TIMEOUT: &str = "security_lock_timeout";
/// Epoch milliseconds of the last user interaction.
pub const LAST_ACTIVE: &str = "security_last_active";
/// E-mail address verified during setup.
pub const USER_EMAIL: &str = "user_email";
