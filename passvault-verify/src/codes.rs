use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use tokio::sync::Mutex;
use tracing::debug;

/// Outcome of checking a submitted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    Valid,
    Missing,
    Expired,
    Wrong,
}

struct PendingCode {
    code: String,
    expires_at: DateTime<Utc>,
}

/// One-time codes keyed by e-mail address.
///
/// Issuing a code replaces any earlier one for the same address. A code is
/// consumed by the first successful check; wrong guesses leave it in place.
pub struct CodeStore {
    ttl: TimeDelta,
    codes: Mutex<HashMap<String, PendingCode>>,
}

impl CodeStore {
    pub fn new(ttl: TimeDelta) -> Self {
        Self {
            ttl,
            codes: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    pub async fn issue(&self, email: &str, now: DateTime<Utc>) -> String {
        let code = generate_code();
        self.codes.lock().await.insert(
            email.to_string(),
            PendingCode {
                code: code.clone(),
                expires_at: now + self.ttl,
            },
        );
        code
    }

    pub async fn revoke(&self, email: &str) {
        self.codes.lock().await.remove(email);
    }

    pub async fn check(&self, email: &str, code: &str, now: DateTime<Utc>) -> CodeCheck {
        let mut codes = self.codes.lock().await;
        let Some(pending) = codes.get(email) else {
            return CodeCheck::Missing;
        };

        if now > pending.expires_at {
            codes.remove(email);
            return CodeCheck::Expired;
        }
        if pending.code != code {
            return CodeCheck::Wrong;
        }

        codes.remove(email);
        CodeCheck::Valid
    }

    /// Drop expired codes. Returns how many were removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut codes = self.codes.lock().await;
        let before = codes.len();
        codes.retain(|_, pending| now <= pending.expires_at);
        let removed = before - codes.len();
        if removed > 0 {
            debug!("Swept {} expired codes", removed);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.codes.lock().await.len()
    }
}

/// Six decimal digits, zero-padded.
pub fn generate_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000u32))
}
