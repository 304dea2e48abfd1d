//! First-run setup: prove ownership of an e-mail address, then set the
//! master password.

mod verifier;

pub use verifier::{CodeVerifier, HttpCodeVerifier, Verification};

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{PassVaultError, Result};
use crate::vault::{VaultError, VaultManager};

/// Codes issued by the verification service expire after ten minutes.
pub const CODE_VALIDITY_MINUTES: i64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SetupState {
    AwaitingCode,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupSession {
    pub email: String,
    pub state: SetupState,
    pub created_at: DateTime<Utc>,
}

impl SetupSession {
    pub fn new(email: String, now: DateTime<Utc>) -> Self {
        Self {
            email,
            state: SetupState::AwaitingCode,
            created_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at) > TimeDelta::minutes(CODE_VALIDITY_MINUTES)
    }
}

pub struct SetupFlow {
    vault: Arc<VaultManager>,
    verifier: Arc<dyn CodeVerifier>,
    session: RwLock<Option<SetupSession>>,
}

impl SetupFlow {
    pub fn new(vault: Arc<VaultManager>, verifier: Arc<dyn CodeVerifier>) -> Self {
        Self {
            vault,
            verifier,
            session: RwLock::new(None),
        }
    }

    /// Mail a verification code to `email`. Replaces any earlier request.
    pub async fn request_code(&self, email: &str) -> Result<SetupSession> {
        let email = normalize_email(email)?;
        self.verifier.send_code(&email).await?;

        let session = SetupSession::new(email, Utc::now());
        *self.session.write().await = Some(session.clone());
        info!("Verification code sent");
        Ok(session)
    }

    /// Check `code` and, if it is valid, set the master password and record
    /// the account e-mail. Leaves the vault unlocked.
    pub async fn confirm(&self, email: &str, code: &str, password: &str) -> Result<()> {
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(VaultError::EmptyPassword.into());
        }

        let now = Utc::now();
        {
            let pending = self.session.read().await;
            match pending.as_ref() {
                Some(s) if s.email == email && s.state == SetupState::AwaitingCode => {
                    if s.is_expired(now) {
                        return Err(PassVaultError::Verification(
                            "Code expired. Request a new one.".into(),
                        ));
                    }
                }
                _ => {
                    return Err(PassVaultError::Verification(
                        "No code was requested for this e-mail".into(),
                    ))
                }
            }
        }

        // A rejected code keeps the request pending so the user can retype it.
        let verification = self.verifier.verify_code(&email, code.trim()).await?;
        if !verification.valid {
            warn!("Verification code rejected");
            return Err(PassVaultError::Verification(verification.message));
        }

        self.vault.setup(password).await?;
        self.vault.set_user_email(&email).await?;
        self.vault.record_activity(now).await?;
        self.set_state(SetupState::Completed).await;

        info!("Setup completed");
        Ok(())
    }

    pub async fn current(&self) -> Option<SetupSession> {
        self.session.read().await.clone()
    }

    pub async fn cancel(&self) {
        *self.session.write().await = None;
    }

    async fn set_state(&self, state: SetupState) {
        if let Some(session) = self.session.write().await.as_mut() {
            session.state = state;
        }
    }
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim();
    if !email.contains('@') {
        return Err(PassVaultError::InvalidInput("Invalid e-mail address".into()));
    }
    Ok(email.to_string())
}
