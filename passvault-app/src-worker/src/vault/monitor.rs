use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

use super::manager::VaultManager;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockEvent {
    /// The idle timeout expired and the vault was locked.
    AutoLocked,
    /// Time left before the idle timeout, for the "locking in" display.
    Countdown { remaining: Duration },
}

/// Background enforcement of the idle timeout.
///
/// Runs two loops: a slow one that checks for expiry and a fast one that
/// publishes the countdown and checks as soon as it reaches zero.
pub struct AutoLockMonitor {
    check_interval: Duration,
    countdown_interval: Duration,
    running: Arc<RwLock<bool>>,
}

impl AutoLockMonitor {
    pub fn new(check_interval: Duration, countdown_interval: Duration) -> Self {
        Self {
            check_interval,
            countdown_interval,
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn start(&self, vault: Arc<VaultManager>, tx: mpsc::Sender<LockEvent>) {
        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Auto-lock monitor already running");
                return;
            }
            *running = true;
        }

        debug!(
            "Starting auto-lock monitor (check every {:?}, countdown every {:?})",
            self.check_interval, self.countdown_interval
        );

        let running = self.running.clone();
        let check_interval = self.check_interval;
        let checker_vault = vault.clone();
        let checker_tx = tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(check_interval).await;
                if !*running.read().await {
                    debug!("Auto-lock check loop stopping");
                    break;
                }

                if !check(&checker_vault, &checker_tx).await {
                    break;
                }
            }
        });

        let running = self.running.clone();
        let countdown_interval = self.countdown_interval;
        tokio::spawn(async move {
            loop {
                if !*running.read().await {
                    debug!("Auto-lock countdown loop stopping");
                    break;
                }

                match vault.time_until_lock(Utc::now()).await {
                    Ok(Some(remaining)) => {
                        if tx.send(LockEvent::Countdown { remaining }).await.is_err() {
                            error!("Failed to send countdown - receiver dropped");
                            break;
                        }
                        if remaining.is_zero() && !check(&vault, &tx).await {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => debug!("Could not compute time until lock: {}", e),
                }

                tokio::time::sleep(countdown_interval).await;
            }
        });
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

/// One expiry check. Returns `false` when the receiver is gone.
async fn check(vault: &VaultManager, tx: &mpsc::Sender<LockEvent>) -> bool {
    match vault.check_auto_lock(Utc::now()).await {
        Ok(true) => {
            info!("Idle timeout reached, vault locked");
            if tx.send(LockEvent::AutoLocked).await.is_err() {
                error!("Failed to send auto-lock event - receiver dropped");
                return false;
            }
        }
        Ok(false) => {}
        Err(e) => warn!("Auto-lock check failed: {}", e),
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{keys, MemoryArea, StorageArea};
    use crate::vault::{Session, VaultStatus};
    use chrono::TimeDelta;
    use serde_json::Value;

    async fn unlocked_vault() -> (Arc<VaultManager>, Arc<MemoryArea>) {
        let local = Arc::new(MemoryArea::new());
        let vault = Arc::new(VaultManager::new(local.clone(), Session::in_memory()));
        vault.setup("pw").await.unwrap();
        (vault, local)
    }

    async fn next_auto_lock(rx: &mut mpsc::Receiver<LockEvent>) -> bool {
        let wait = async {
            while let Some(event) = rx.recv().await {
                if event == LockEvent::AutoLocked {
                    return true;
                }
            }
            false
        };
        tokio::time::timeout(Duration::from_secs(2), wait)
            .await
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_locks_idle_vault() {
        let (vault, local) = unlocked_vault().await;
        let stale = (Utc::now() - TimeDelta::minutes(30)).timestamp_millis();
        local.set(keys::LAST_ACTIVE, Value::from(stale)).await.unwrap();

        let monitor = AutoLockMonitor::new(Duration::from_millis(10), Duration::from_secs(60));
        let (tx, mut rx) = mpsc::channel(16);
        monitor.start(vault.clone(), tx).await;

        assert!(next_auto_lock(&mut rx).await);
        assert_eq!(vault.status().await.unwrap(), VaultStatus::Locked);
        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_countdown_reports_remaining_time() {
        let (vault, _) = unlocked_vault().await;

        let monitor = AutoLockMonitor::new(Duration::from_secs(60), Duration::from_millis(10));
        let (tx, mut rx) = mpsc::channel(16);
        monitor.start(vault.clone(), tx).await;

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            LockEvent::Countdown { remaining } => {
                assert!(remaining > Duration::from_secs(9 * 60));
                assert!(remaining <= Duration::from_secs(10 * 60));
            }
            other => panic!("unexpected event {:?}", other),
        }
        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_countdown_at_zero_locks_immediately() {
        let (vault, local) = unlocked_vault().await;
        local.set(keys::LAST_ACTIVE, Value::from(1)).await.unwrap();

        let monitor = AutoLockMonitor::new(Duration::from_secs(60), Duration::from_millis(10));
        let (tx, mut rx) = mpsc::channel(16);
        monitor.start(vault.clone(), tx).await;

        assert!(next_auto_lock(&mut rx).await);
        assert_eq!(vault.status().await.unwrap(), VaultStatus::Locked);
        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_zero_timeout_never_fires() {
        let (vault, local) = unlocked_vault().await;
        vault.set_lock_timeout(0).await.unwrap();
        local.set(keys::LAST_ACTIVE, Value::from(1)).await.unwrap();

        let monitor = AutoLockMonitor::new(Duration::from_millis(5), Duration::from_millis(5));
        let (tx, mut rx) = mpsc::channel(16);
        monitor.start(vault.clone(), tx).await;

        let fired = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(fired.is_err());
        assert_eq!(vault.status().await.unwrap(), VaultStatus::Unlocked);
        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_start_twice_is_ignored() {
        let (vault, _) = unlocked_vault().await;
        let monitor = AutoLockMonitor::new(Duration::from_secs(60), Duration::from_secs(60));
        let (tx, _rx) = mpsc::channel(16);

        monitor.start(vault.clone(), tx.clone()).await;
        monitor.start(vault, tx).await;
        assert!(monitor.is_running().await);

        monitor.stop().await;
        assert!(!monitor.is_running().await);
    }
}
