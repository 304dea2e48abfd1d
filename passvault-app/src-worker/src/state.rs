use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::info;

use crate::error::Result;
use crate::setup::{CodeVerifier, HttpCodeVerifier, SetupFlow};
use crate::storage::{load_settings, AppSettings, FileArea, MemoryArea, StorageArea};
use crate::vault::{AutoLockMonitor, LockEvent, Session, VaultManager};
use crate::worker::BackgroundWorker;

/// File holding the persistent storage area inside the data directory.
pub const LOCAL_AREA_FILE: &str = "local.json";

/// Capacity of the lock event channel handed to the UI.
const LOCK_EVENT_BUFFER: usize = 32;

pub struct AppState {
    pub settings: Arc<RwLock<AppSettings>>,
    /// Where settings are persisted; `None` for in-memory state.
    pub data_dir: Option<PathBuf>,
    pub vault: Arc<VaultManager>,
    pub worker: Arc<BackgroundWorker>,
    pub setup: Arc<SetupFlow>,
    pub monitor: AutoLockMonitor,
}

impl AppState {
    pub fn new(
        settings: AppSettings,
        local: Arc<dyn StorageArea>,
        session: Session,
        verifier: Arc<dyn CodeVerifier>,
    ) -> Self {
        let vault = Arc::new(
            VaultManager::new(local, session)
                .with_default_timeout(settings.default_lock_timeout_minutes),
        );
        let worker = Arc::new(BackgroundWorker::new(
            vault.clone(),
            settings.pending_credentials_ttl(),
        ));
        let setup = Arc::new(SetupFlow::new(vault.clone(), verifier));
        let monitor = AutoLockMonitor::new(
            settings.lock_check_interval(),
            settings.countdown_interval(),
        );

        Self {
            settings: Arc::new(RwLock::new(settings)),
            data_dir: None,
            vault,
            worker,
            setup,
            monitor,
        }
    }

    /// State backed by `data_dir`: settings from `settings.json`, the
    /// persistent area from `local.json`, and a fresh session area.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let settings = load_settings(data_dir)?;
        let local = Arc::new(FileArea::open(data_dir.join(LOCAL_AREA_FILE))?);
        let verifier = Arc::new(HttpCodeVerifier::new(&settings.verify_api_url)?);

        info!("Opened data directory {:?}", data_dir);
        let mut state = Self::new(settings, local, Session::in_memory(), verifier);
        state.data_dir = Some(data_dir.to_path_buf());
        Ok(state)
    }

    /// Everything in memory; nothing touches disk.
    pub fn in_memory(settings: AppSettings, verifier: Arc<dyn CodeVerifier>) -> Self {
        Self::new(
            settings,
            Arc::new(MemoryArea::new()),
            Session::in_memory(),
            verifier,
        )
    }

    /// Start enforcing the idle timeout. Events arrive on the returned channel.
    pub async fn start_auto_lock(&self) -> mpsc::Receiver<LockEvent> {
        let (tx, rx) = mpsc::channel(LOCK_EVENT_BUFFER);
        self.monitor.start(self.vault.clone(), tx).await;
        rx
    }

    pub async fn shutdown(&self) {
        self.monitor.stop().await;
    }
}
