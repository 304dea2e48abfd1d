use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use passvault_app_lib::storage::{keys, FileArea, MemoryArea, StorageArea};
use passvault_app_lib::vault::{
    ItemKind, KeyStore, Session, VaultCipher, VaultError, VaultItem, VaultManager, VaultStatus,
};

fn login(name: &str) -> VaultItem {
    VaultItem {
        kind: Some(ItemKind::Login),
        name: Some(name.to_string()),
        ..VaultItem::default()
    }
}

#[tokio::test]
async fn test_lock_unlock_scenario() {
    let vault = VaultManager::new(Arc::new(MemoryArea::new()), Session::in_memory());
    vault.setup("Tr0ub4dor!").await.unwrap();

    let saved = vec![login("a")];
    vault.replace_items(&saved).await.unwrap();
    vault.lock().await.unwrap();

    assert!(matches!(vault.items().await, Err(VaultError::Locked)));

    assert!(vault.unlock("Tr0ub4dor!").await.unwrap());
    assert_eq!(vault.items().await.unwrap(), saved);

    vault.lock().await.unwrap();
    assert!(!vault.unlock("tr0ub4dor!").await.unwrap());
    assert_eq!(vault.status().await.unwrap(), VaultStatus::Locked);
    assert!(matches!(vault.items().await, Err(VaultError::Locked)));
}

#[tokio::test]
async fn test_configured_only_after_password() {
    let local = Arc::new(MemoryArea::new());
    let key_store = KeyStore::new(local.clone());
    let session = Session::in_memory();

    assert!(!key_store.is_configured().await.unwrap());
    key_store.set_master_password(&session, "pw").await.unwrap();
    assert!(key_store.is_configured().await.unwrap());
}

#[tokio::test]
async fn test_roundtrip_for_several_lists() {
    let key_store = Arc::new(KeyStore::new(Arc::new(MemoryArea::new())));
    let session = Session::in_memory();
    key_store.set_master_password(&session, "pw").await.unwrap();
    let cipher = VaultCipher::new(key_store);

    let lists = vec![
        Vec::new(),
        vec![login("a")],
        vec![
            VaultItem::card("Visa", "A B", "4111 1111 1111 1111", "12/29", "321"),
            VaultItem::note("Ünïcödé", "línea\nçà"),
            login("b"),
        ],
    ];
    for items in lists {
        let stored = cipher
            .encrypt(&session, &items)
            .await
            .unwrap()
            .to_storage_value()
            .unwrap();
        assert_eq!(cipher.decrypt(&session, Some(&stored)).await.unwrap(), items);
    }
}

#[tokio::test]
async fn test_idle_timeout_policy() {
    let vault = VaultManager::new(Arc::new(MemoryArea::new()), Session::in_memory());
    vault.setup("pw").await.unwrap();
    let start = Utc::now();
    vault.record_activity(start).await.unwrap();

    vault.set_lock_timeout(0).await.unwrap();
    assert!(!vault.check_auto_lock(start + TimeDelta::days(30)).await.unwrap());
    assert_eq!(vault.status().await.unwrap(), VaultStatus::Unlocked);

    vault.set_lock_timeout(1).await.unwrap();
    assert!(vault
        .check_auto_lock(start + TimeDelta::seconds(61))
        .await
        .unwrap());
    assert_eq!(vault.status().await.unwrap(), VaultStatus::Locked);
}

#[tokio::test]
async fn test_vault_survives_restart_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("local.json");

    {
        let local = Arc::new(FileArea::open(&path).unwrap());
        let vault = VaultManager::new(local, Session::in_memory());
        vault.setup("Tr0ub4dor!").await.unwrap();
        vault.replace_items(&[login("a")]).await.unwrap();
    }

    // A new process starts with an empty session area.
    let local = Arc::new(FileArea::open(&path).unwrap());
    assert!(local.get(keys::SESSION_KEY).await.unwrap().is_none());
    let vault = VaultManager::new(local, Session::in_memory());

    assert_eq!(vault.status().await.unwrap(), VaultStatus::Locked);
    assert!(vault.unlock("Tr0ub4dor!").await.unwrap());
    assert_eq!(vault.items().await.unwrap(), vec![login("a")]);
}
