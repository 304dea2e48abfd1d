//! Background worker: answers content-script messages for autofill and
//! credential capture.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::vault::item::new_id;
use crate::vault::{ItemKind, VaultError, VaultItem, VaultManager, VaultResult};

/// `url` value of a [`Request::GetLogin`] that asks for payment cards.
pub const CARD_REQUEST: &str = "CARD_REQUEST";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    /// Logins matching the page, or every card for [`CARD_REQUEST`].
    GetLogin { url: String },
    CheckCredentialsExist { url: String, username: String },
    SaveCredentials {
        url: String,
        username: String,
        password: String,
    },
    /// Remember a submitted login form until the next page asks about it.
    CacheTempCredentials {
        url: String,
        username: String,
        password: String,
    },
    CheckPendingToSave { url: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Items(Vec<VaultItem>),
    Flag(bool),
    Cached { status: String },
    Pending(Option<PendingCredentials>),
}

/// Credentials captured from a submitted form, offered for saving once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCredentials {
    pub url: String,
    pub username: String,
    pub password: String,
    /// Capture time, epoch milliseconds.
    pub timestamp: i64,
}

pub struct BackgroundWorker {
    vault: Arc<VaultManager>,
    pending: RwLock<Option<PendingCredentials>>,
    pending_ttl: Duration,
}

impl BackgroundWorker {
    pub fn new(vault: Arc<VaultManager>, pending_ttl: Duration) -> Self {
        Self {
            vault,
            pending: RwLock::new(None),
            pending_ttl,
        }
    }

    pub async fn handle(&self, request: Request) -> Result<Response> {
        match request {
            Request::GetLogin { url } => Ok(Response::Items(self.get_login(&url).await?)),
            Request::CheckCredentialsExist { url, username } => Ok(Response::Flag(
                self.credentials_exist(&url, &username).await?,
            )),
            Request::SaveCredentials {
                url,
                username,
                password,
            } => {
                self.save_credentials(&url, &username, &password).await?;
                Ok(Response::Flag(true))
            }
            Request::CacheTempCredentials {
                url,
                username,
                password,
            } => {
                self.cache_credentials(url, username, password, Utc::now())
                    .await;
                Ok(Response::Cached {
                    status: "cached".to_string(),
                })
            }
            Request::CheckPendingToSave { url } => Ok(Response::Pending(
                self.take_pending(&url, Utc::now()).await,
            )),
        }
    }

    /// Decode a JSON message, handle it and encode the reply.
    pub async fn handle_json(&self, message: &str) -> Result<String> {
        let request: Request = serde_json::from_str(message)?;
        let response = self.handle(request).await?;
        Ok(serde_json::to_string(&response)?)
    }

    pub async fn get_login(&self, url: &str) -> Result<Vec<VaultItem>> {
        let Some(items) = self.lookup_items().await? else {
            return Ok(Vec::new());
        };

        if url == CARD_REQUEST {
            return Ok(items
                .into_iter()
                .filter(|item| item.effective_kind() == ItemKind::Card)
                .collect());
        }

        let Some(current) = hostname(url) else {
            return Ok(Vec::new());
        };

        Ok(items
            .into_iter()
            .filter(|item| item.effective_kind() == ItemKind::Login)
            .filter(|item| item_domain(item).is_some_and(|domain| hosts_overlap(&current, &domain)))
            .collect())
    }

    pub async fn credentials_exist(&self, url: &str, username: &str) -> Result<bool> {
        let Some(items) = self.lookup_items().await? else {
            return Ok(false);
        };
        let host = hostname(url).unwrap_or_else(|| url.to_lowercase());

        Ok(items.iter().any(|item| {
            item.username.as_deref() == Some(username)
                && item_domain(item).is_some_and(|domain| hosts_overlap(&host, &domain))
        }))
    }

    /// Store a login for the page, replacing one with the same site and
    /// username. Fails while locked.
    pub async fn save_credentials(&self, url: &str, username: &str, password: &str) -> Result<()> {
        let site = hostname(url).unwrap_or_else(|| url.to_string());
        let entry = VaultItem {
            id: Some(new_id()),
            kind: Some(ItemKind::Login),
            name: Some(site.clone()),
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            url: Some(url.to_string()),
            site: Some(site.clone()),
            ..VaultItem::default()
        };

        let username = username.to_string();
        let vault = &self.vault;
        vault
            .store()
            .update(vault.session(), move |items| {
                items.retain(|item| {
                    item.site.as_deref() != Some(site.as_str())
                        || item.username.as_deref() != Some(username.as_str())
                });
                items.push(entry);
            })
            .await?;

        info!("Saved captured credentials");
        Ok(())
    }

    pub async fn cache_credentials(
        &self,
        url: String,
        username: String,
        password: String,
        now: DateTime<Utc>,
    ) {
        *self.pending.write().await = Some(PendingCredentials {
            url,
            username,
            password,
            timestamp: now.timestamp_millis(),
        });
        debug!("Cached submitted credentials");
    }

    /// Hand out the cached credentials if they are fresh and belong to the
    /// same site as `url`. They are handed out at most once.
    pub async fn take_pending(&self, url: &str, now: DateTime<Utc>) -> Option<PendingCredentials> {
        let mut pending = self.pending.write().await;
        let cached = pending.as_ref()?;

        let age_ms = now.timestamp_millis() - cached.timestamp;
        if age_ms >= self.pending_ttl.as_millis() as i64 {
            return None;
        }

        let (Some(origin), Some(current)) = (hostname(&cached.url), hostname(url)) else {
            return None;
        };
        if !hosts_overlap(&current, &origin) {
            return None;
        }
        pending.take()
    }

    /// Items for a read-only lookup, or `None` while locked.
    async fn lookup_items(&self) -> VaultResult<Option<Vec<VaultItem>>> {
        match self.vault.items_or_empty().await {
            Ok(items) => Ok(Some(items)),
            Err(VaultError::Locked) => {
                debug!("Lookup while vault is locked");
                Ok(None)
            }
            Err(e) => {
                warn!("Vault lookup failed: {}", e);
                Err(e)
            }
        }
    }
}

fn hostname(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()?
        .host_str()
        .map(str::to_lowercase)
}

/// The domain an item autofills on: the host of its URL, the raw URL when
/// that does not parse, or else its legacy `site` field.
fn item_domain(item: &VaultItem) -> Option<String> {
    if let Some(url) = item.url.as_deref().filter(|url| !url.is_empty()) {
        return Some(hostname(url).unwrap_or_else(|| url.to_lowercase()));
    }
    item.site.as_deref().map(bare_site).filter(|site| !site.is_empty())
}

fn bare_site(site: &str) -> String {
    let site = site.to_lowercase();
    let without_scheme = site
        .strip_prefix("https://")
        .or_else(|| site.strip_prefix("http://"))
        .unwrap_or(&site);
    without_scheme
        .split('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Subdomains match their parent in either direction.
fn hosts_overlap(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a))
}
