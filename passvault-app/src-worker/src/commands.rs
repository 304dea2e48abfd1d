//! Popup commands.
//!
//! Each command is a thin async wrapper over [`AppState`] that the popup
//! transport calls by name. Errors serialize as display strings.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PassVaultError, Result};
use crate::setup::SetupSession;
use crate::state::AppState;
use crate::storage::{save_settings, AppSettings};
use crate::vault::item::site_for;
use crate::vault::{
    export_csv, import_csv, rate_password, ItemFilter, ItemKind, Strength, VaultError, VaultItem,
    VaultStatus,
};

// ============================================================================
// Vault Commands - authentication and lock state
// ============================================================================

/// Get the current vault status.
///
/// Returns whether the vault is:
/// - NotSetup: first-time user, needs the setup flow
/// - Locked: a master password exists and must be entered
/// - Unlocked: items are readable
pub async fn get_vault_status(state: &AppState) -> Result<VaultStatus> {
    Ok(state.vault.status().await?)
}

/// Step one of setup: mail a verification code.
pub async fn request_setup_code(state: &AppState, email: String) -> Result<SetupSession> {
    state.setup.request_code(&email).await
}

/// Step two of setup: check the code and set the master password.
pub async fn confirm_setup(
    state: &AppState,
    email: String,
    code: String,
    password: String,
) -> Result<()> {
    state.setup.confirm(&email, &code, &password).await
}

/// Unlock with the master password.
///
/// When an account e-mail is registered, `email` must match it.
pub async fn unlock_vault(state: &AppState, email: Option<String>, password: String) -> Result<()> {
    if let Some(saved) = state.vault.user_email().await? {
        let given = email.as_deref().map(str::trim).unwrap_or_default();
        if given != saved {
            warn!("Unlock attempt with a different e-mail");
            return Err(PassVaultError::EmailMismatch);
        }
    }

    if !state.vault.unlock(&password).await? {
        return Err(VaultError::InvalidPassword.into());
    }
    info!("Vault unlocked successfully");
    Ok(())
}

pub async fn lock_vault(state: &AppState) -> Result<()> {
    state.vault.lock().await?;
    info!("Vault locked successfully");
    Ok(())
}

/// Lock and make sure no other view stays unlocked.
pub async fn logout(state: &AppState) -> Result<()> {
    Ok(state.vault.logout().await?)
}

/// Destroy every key and item. The next status is `NotSetup`.
pub async fn reset_vault(state: &AppState) -> Result<()> {
    warn!("Resetting vault - all encrypted data will be lost!");
    state.setup.cancel().await;
    state.vault.reset().await?;
    Ok(())
}

pub async fn record_activity(state: &AppState) -> Result<()> {
    Ok(state.vault.record_activity(Utc::now()).await?)
}

pub async fn get_lock_timeout(state: &AppState) -> Result<u32> {
    Ok(state.vault.lock_timeout().await?)
}

pub async fn set_lock_timeout(state: &AppState, minutes: u32) -> Result<()> {
    Ok(state.vault.set_lock_timeout(minutes).await?)
}

/// Countdown shown while unlocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockCountdown {
    pub remaining_secs: u64,
    pub label: String,
}

/// `None` while locked or when auto-lock is off.
pub async fn get_lock_countdown(state: &AppState) -> Result<Option<LockCountdown>> {
    let remaining = state.vault.time_until_lock(Utc::now()).await?;
    Ok(remaining.map(|remaining| LockCountdown {
        remaining_secs: remaining.as_secs(),
        label: format_countdown(remaining),
    }))
}

/// `4m 05s`
pub fn format_countdown(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{}m {:02}s", secs / 60, secs % 60)
}

pub async fn change_master_password(
    state: &AppState,
    current: String,
    new_password: String,
) -> Result<()> {
    Ok(state.vault.change_password(&current, &new_password).await?)
}

pub async fn rotate_master_key(state: &AppState, password: String) -> Result<()> {
    Ok(state.vault.rotate_master_key(&password).await?)
}

/// JSON Web Key of the master key. Requires an unlocked vault.
pub async fn export_key(state: &AppState) -> Result<String> {
    Ok(state.vault.export_key().await?)
}

// ============================================================================
// Item Commands
// ============================================================================

pub async fn list_items(state: &AppState, filter: ItemFilter) -> Result<Vec<VaultItem>> {
    let items = state.vault.items().await?;
    let shown: Vec<VaultItem> = filter.apply(&items).into_iter().cloned().collect();
    debug!("Listing {} of {} items", shown.len(), items.len());
    Ok(shown)
}

/// Create or update an item. A name is required.
pub async fn save_item(state: &AppState, item: VaultItem) -> Result<VaultItem> {
    if item.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
        return Err(PassVaultError::InvalidInput("Name is required".into()));
    }
    let item = normalize_login(item);
    Ok(state.vault.upsert_item(item).await?)
}

pub async fn delete_item(state: &AppState, id: String) -> Result<bool> {
    Ok(state.vault.delete_item(&id).await?)
}

pub async fn export_items_csv(state: &AppState) -> Result<String> {
    let items = state.vault.items().await?;
    Ok(export_csv(&items)?)
}

/// Append the rows of a CSV backup. Returns the number imported.
pub async fn import_items_csv(state: &AppState, csv: String) -> Result<usize> {
    let imported = import_csv(&csv)?;
    Ok(state.vault.import_items(imported).await?)
}

pub fn check_password_strength(password: String) -> Option<Strength> {
    rate_password(&password)
}

/// Logins autofill by `site`; derive it from the URL the user typed.
fn normalize_login(mut item: VaultItem) -> VaultItem {
    if item.effective_kind() == ItemKind::Login {
        let name = item.name.clone().unwrap_or_default();
        item.site = Some(match item.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => site_for(url, &name),
            _ => name,
        });
    }
    item
}

// ============================================================================
// Settings Commands
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub email: Option<String>,
    pub status: VaultStatus,
}

pub async fn get_account_info(state: &AppState) -> Result<AccountInfo> {
    Ok(AccountInfo {
        email: state.vault.user_email().await?,
        status: state.vault.status().await?,
    })
}

pub async fn get_settings(state: &AppState) -> Result<AppSettings> {
    Ok(state.settings.read().await.clone())
}

/// Persist new settings. Interval changes apply after restart.
pub async fn update_settings(state: &AppState, settings: AppSettings) -> Result<()> {
    if let Some(dir) = &state.data_dir {
        save_settings(dir, &settings)?;
    }
    *state.settings.write().await = settings;
    info!("Settings updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::{CodeVerifier, Verification};
    use std::sync::Arc;

    struct AcceptAll;

    #[async_trait::async_trait]
    impl CodeVerifier for AcceptAll {
        async fn send_code(&self, _email: &str) -> Result<()> {
            Ok(())
        }

        async fn verify_code(&self, _email: &str, code: &str) -> Result<Verification> {
            Ok(Verification {
                valid: code == "111111",
                message: String::new(),
            })
        }
    }

    async fn configured() -> AppState {
        let state = AppState::in_memory(AppSettings::default(), Arc::new(AcceptAll));
        request_setup_code(&state, "me@example.com".into()).await.unwrap();
        confirm_setup(&state, "me@example.com".into(), "111111".into(), "pw".into())
            .await
            .unwrap();
        state
    }

    #[tokio::test]
    async fn test_unlock_checks_email() {
        let state = configured().await;
        lock_vault(&state).await.unwrap();

        let err = unlock_vault(&state, Some("other@example.com".into()), "pw".into())
            .await
            .unwrap_err();
        assert!(matches!(err, PassVaultError::EmailMismatch));

        let err = unlock_vault(&state, Some("me@example.com".into()), "bad".into())
            .await
            .unwrap_err();
        assert!(matches!(err, PassVaultError::Vault(VaultError::InvalidPassword)));

        unlock_vault(&state, Some(" me@example.com ".into()), "pw".into())
            .await
            .unwrap();
        assert_eq!(get_vault_status(&state).await.unwrap(), VaultStatus::Unlocked);
    }

    #[tokio::test]
    async fn test_save_item_derives_site_and_requires_name() {
        let state = configured().await;
        let mut item = VaultItem::login("GitHub", "octo", "pw", "");
        item.url = Some("https://www.github.com/login".into());
        item.site = None;

        let saved = save_item(&state, item).await.unwrap();
        assert_eq!(saved.site.as_deref(), Some("github.com"));

        let unnamed = VaultItem::note("  ", "x");
        assert!(save_item(&state, unnamed).await.is_err());
    }

    #[tokio::test]
    async fn test_list_items_filters() {
        let state = configured().await;
        save_item(&state, VaultItem::note("Wifi", "router")).await.unwrap();
        save_item(&state, VaultItem::login("Mail", "a", "p", "https://mail.example"))
            .await
            .unwrap();

        let notes = list_items(
            &state,
            ItemFilter {
                kind: Some(ItemKind::Note),
                text: String::new(),
            },
        )
        .await
        .unwrap();
        assert_eq!(notes.len(), 1);
    }

    #[tokio::test]
    async fn test_csv_import_export() {
        let state = configured().await;
        let count = import_items_csv(
            &state,
            "type,name,username,password,url\nlogin,A,u,p,https://a.example\n".into(),
        )
        .await
        .unwrap();
        assert_eq!(count, 1);

        let csv = export_items_csv(&state).await.unwrap();
        assert!(csv.contains("login,A,u,p,https://a.example,"));
    }

    #[tokio::test]
    async fn test_countdown_and_logout() {
        let state = configured().await;
        set_lock_timeout(&state, 5).await.unwrap();
        let countdown = get_lock_countdown(&state).await.unwrap().unwrap();
        assert!(countdown.remaining_secs <= 300);

        logout(&state).await.unwrap();
        assert!(get_lock_countdown(&state).await.unwrap().is_none());
        assert!(export_key(&state).await.unwrap_err().is_locked());
    }

    #[tokio::test]
    async fn test_reset_returns_to_setup() {
        let state = configured().await;
        reset_vault(&state).await.unwrap();
        let info = get_account_info(&state).await.unwrap();
        assert_eq!(info.status, VaultStatus::NotSetup);
        assert_eq!(info.email, None);
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(Duration::from_secs(245)), "4m 05s");
        assert_eq!(format_countdown(Duration::ZERO), "0m 00s");
    }

    #[tokio::test]
    async fn test_update_settings_persists() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::open(dir.path()).unwrap();
        let settings = AppSettings {
            default_lock_timeout_minutes: 3,
            ..AppSettings::default()
        };
        update_settings(&state, settings.clone()).await.unwrap();
        assert_eq!(get_settings(&state).await.unwrap(), settings);
        assert_eq!(crate::storage::load_settings(dir.path()).unwrap(), settings);
    }
}
