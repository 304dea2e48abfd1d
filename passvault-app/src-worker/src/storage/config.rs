use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PassVaultError, Result};

const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// How often the background monitor enforces the idle timeout.
    pub lock_check_interval_secs: u64,
    /// Refresh rate of the "locking in Xm Ys" countdown.
    pub countdown_interval_secs: u64,
    /// Idle timeout used until the user picks one.
    pub default_lock_timeout_minutes: u32,
    /// Base URL of the e-mail verification service.
    pub verify_api_url: String,
    /// How long captured-but-unsaved credentials are offered for saving.
    pub pending_credentials_ttl_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            lock_check_interval_secs: 60,
            countdown_interval_secs: 1,
            default_lock_timeout_minutes: 10,
            verify_api_url: "http://localhost:3000".to_string(),
            pending_credentials_ttl_secs: 60,
        }
    }
}

impl AppSettings {
    pub fn lock_check_interval(&self) -> Duration {
        Duration::from_secs(self.lock_check_interval_secs)
    }

    pub fn countdown_interval(&self) -> Duration {
        Duration::from_secs(self.countdown_interval_secs)
    }

    pub fn pending_credentials_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_credentials_ttl_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.lock_check_interval_secs == 0 || self.countdown_interval_secs == 0 {
            return Err(PassVaultError::Config(
                "poll intervals must be at least one second".into(),
            ));
        }
        if self.verify_api_url.trim().is_empty() {
            return Err(PassVaultError::Config("verify_api_url is empty".into()));
        }
        Ok(())
    }
}

/// Platform data directory for the extension host, e.g. `~/.local/share/passvault`.
pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("passvault"))
        .ok_or_else(|| PassVaultError::Config("Could not determine data directory".into()))
}

fn get_settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SETTINGS_FILE)
}

pub fn load_settings(data_dir: &Path) -> Result<AppSettings> {
    let path = get_settings_path(data_dir);

    if !path.exists() {
        return Ok(AppSettings::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let settings: AppSettings = serde_json::from_str(&content)?;
    settings.validate()?;
    Ok(settings)
}

pub fn save_settings(data_dir: &Path, settings: &AppSettings) -> Result<()> {
    settings.validate()?;
    std::fs::create_dir_all(data_dir)?;
    let path = get_settings_path(data_dir);
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(&path, content)?;
    Ok(())
}
