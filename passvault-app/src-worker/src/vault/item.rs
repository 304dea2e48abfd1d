//! Vault entries: logins, payment cards and secure notes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Item category as stored in the `type` field.
///
/// Types written by other tools (a CSV import that kept `Login` verbatim,
/// for example) are held in `Other` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemKind {
    Login,
    Card,
    Note,
    Other(String),
}

impl ItemKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Login => "login",
            Self::Card => "card",
            Self::Note => "note",
            Self::Other(raw) => raw,
        }
    }

    /// The known kind this one stands for. Unrecognised types are logins.
    pub fn normalized(&self) -> ItemKind {
        match self {
            Self::Other(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "card" => Self::Card,
                "note" => Self::Note,
                _ => Self::Login,
            },
            known => known.clone(),
        }
    }
}

impl From<String> for ItemKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "login" => Self::Login,
            "card" => Self::Card,
            "note" => Self::Note,
            _ => Self::Other(raw),
        }
    }
}

impl From<ItemKind> for String {
    fn from(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One vault entry.
///
/// Every field is optional because entries written by older versions carry
/// only `site`/`username`/`password`. Fields this type does not know about
/// are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VaultItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ItemKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    // Login
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Hostname used for autofill matching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,

    // Card
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_holder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cvv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,

    // Note
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_content: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VaultItem {
    pub fn login(name: &str, username: &str, password: &str, url: &str) -> Self {
        Self {
            id: Some(new_id()),
            kind: Some(ItemKind::Login),
            name: Some(name.to_string()),
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            url: Some(url.to_string()),
            site: Some(site_for(url, name)),
            ..Self::default()
        }
    }

    pub fn card(name: &str, holder: &str, number: &str, expiry: &str, cvv: &str) -> Self {
        Self {
            id: Some(new_id()),
            kind: Some(ItemKind::Card),
            name: Some(name.to_string()),
            card_holder: Some(holder.to_string()),
            card_number: Some(number.to_string()),
            expiry: Some(expiry.to_string()),
            cvv: Some(cvv.to_string()),
            ..Self::default()
        }
    }

    pub fn note(name: &str, content: &str) -> Self {
        Self {
            id: Some(new_id()),
            kind: Some(ItemKind::Note),
            name: Some(name.to_string()),
            note_content: Some(content.to_string()),
            ..Self::default()
        }
    }

    /// Entries without a type, or with one this version does not know, are
    /// treated as logins.
    pub fn effective_kind(&self) -> ItemKind {
        self.kind
            .as_ref()
            .map_or(ItemKind::Login, ItemKind::normalized)
    }

    /// Upgrade an untyped legacy entry to a login, keeping its data.
    pub fn migrate(mut self) -> Self {
        if self.kind.is_none() {
            self.kind = Some(ItemKind::Login);
            if self.name.is_none() {
                self.name = Some(self.site.clone().unwrap_or_else(|| "Untitled".to_string()));
            }
            if self.url.is_none() {
                self.url = self.site.clone();
            }
        }
        self
    }

    /// Case-insensitive search over name, username and the card number or note.
    pub fn matches_text(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        let needle = needle.to_lowercase();
        let extra = self.card_number.as_ref().or(self.note_content.as_ref());
        [self.name.as_ref(), self.username.as_ref(), extra]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}

/// Popup list filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFilter {
    /// `None` shows every kind.
    pub kind: Option<ItemKind>,
    pub text: String,
}

impl ItemFilter {
    pub fn apply<'a>(&self, items: &'a [VaultItem]) -> Vec<&'a VaultItem> {
        items
            .iter()
            .filter(|item| {
                self.kind
                    .as_ref()
                    .map_or(true, |k| item.effective_kind() == k.normalized())
            })
            .filter(|item| item.matches_text(self.text.trim()))
            .collect()
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Autofill hostname for a login: the URL's host without `www.`, or the
/// display name when the URL does not parse.
pub fn site_for(url: &str, fallback: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serde_uses_extension_field_names() {
        let item = VaultItem {
            kind: Some(ItemKind::Card),
            card_holder: Some("A. Person".into()),
            note_content: None,
            ..VaultItem::default()
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value, json!({"type": "card", "cardHolder": "A. Person"}));
    }

    #[test]
    fn test_unknown_fields_survive_roundtrip() {
        let raw = json!({"type": "login", "name": "a", "favorite": true});
        let item: VaultItem = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(item.extra.get("favorite"), Some(&json!(true)));
        assert_eq!(serde_json::to_value(&item).unwrap(), raw);
    }

    #[test]
    fn test_unknown_type_is_kept_verbatim() {
        let raw = json!({"type": "Login", "name": "a", "password": "p"});
        let item: VaultItem = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(item.kind, Some(ItemKind::Other("Login".into())));
        assert_eq!(item.effective_kind(), ItemKind::Login);
        assert_eq!(serde_json::to_value(&item).unwrap(), raw);

        let odd: VaultItem = serde_json::from_value(json!({"type": "passkey"})).unwrap();
        assert_eq!(odd.effective_kind(), ItemKind::Login);
        let card: VaultItem = serde_json::from_value(json!({"type": " CARD "})).unwrap();
        assert_eq!(card.effective_kind(), ItemKind::Card);
    }

    #[test]
    fn test_migrate_legacy_entry() {
        let legacy: VaultItem = serde_json::from_value(json!({
            "id": "1", "site": "example.com", "username": "u", "password": "p"
        }))
        .unwrap();
        let item = legacy.migrate();
        assert_eq!(item.kind, Some(ItemKind::Login));
        assert_eq!(item.name.as_deref(), Some("example.com"));
        assert_eq!(item.url.as_deref(), Some("example.com"));
    }

    #[test]
    fn test_migrate_leaves_typed_items() {
        let note = VaultItem::note("n", "body");
        assert_eq!(note.clone().migrate(), note);
    }

    #[test]
    fn test_site_for_strips_www() {
        assert_eq!(site_for("https://www.github.com/login", "GitHub"), "github.com");
        assert_eq!(site_for("not a url", "GitHub"), "GitHub");
    }

    #[test]
    fn test_filter_by_kind_and_text() {
        let items = vec![
            VaultItem::login("Mail", "alice", "pw", "https://mail.example.com"),
            VaultItem::card("Bank", "Alice", "4111 1111 1111 1111", "12/30", "123"),
            VaultItem::note("Wifi", "router password"),
        ];

        let cards = ItemFilter { kind: Some(ItemKind::Card), text: String::new() };
        assert_eq!(cards.apply(&items).len(), 1);

        let alice = ItemFilter { kind: None, text: "ALICE".into() };
        assert_eq!(alice.apply(&items).len(), 1);

        let router = ItemFilter { kind: None, text: "router".into() };
        assert_eq!(router.apply(&items)[0].name.as_deref(), Some("Wifi"));
    }
}
