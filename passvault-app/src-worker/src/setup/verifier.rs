use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PassVaultError, Result};

/// Outcome of checking a one-time code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub valid: bool,
    #[serde(default)]
    pub message: String,
}

/// E-mail ownership check used before the master password is set.
#[async_trait]
pub trait CodeVerifier: Send + Sync {
    /// Ask the service to mail a fresh code to `email`.
    async fn send_code(&self, email: &str) -> Result<()>;

    /// Check `code` against the one last sent to `email`.
    async fn verify_code(&self, email: &str, code: &str) -> Result<Verification>;
}

/// [`CodeVerifier`] backed by the verification service's JSON API.
#[derive(Debug, Clone)]
pub struct HttpCodeVerifier {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct SendCodeBody<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct VerifyCodeBody<'a> {
    email: &'a str,
    code: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpCodeVerifier {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| PassVaultError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl CodeVerifier for HttpCodeVerifier {
    async fn send_code(&self, email: &str) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint("send-code"))
            .json(&SendCodeBody { email })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!("Verification code requested");
            return Ok(());
        }

        let body = response.text().await?;
        let reason = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or_else(|_| format!("verification service returned {status}"));
        Err(PassVaultError::Verification(reason))
    }

    async fn verify_code(&self, email: &str, code: &str) -> Result<Verification> {
        let response = self
            .client
            .post(self.endpoint("verify-code"))
            .json(&VerifyCodeBody { email, code })
            .send()
            .await?;

        // A rejected code comes back as 400 with the same body shape.
        let status = response.status();
        let body = response.text().await?;
        serde_json::from_str::<Verification>(&body).map_err(|_| {
            PassVaultError::Network(format!("unexpected reply from verification service ({status})"))
        })
    }
}
