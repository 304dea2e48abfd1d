pub mod commands;
pub mod error;
pub mod security;
pub mod setup;
pub mod state;
pub mod storage;
pub mod vault;
pub mod worker;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{PassVaultError, Result};
pub use state::AppState;
pub use vault::LockEvent;

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the
/// default filter. Safe to call more than once.
pub fn init_tracing() {
    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "passvault_app=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if result.is_err() {
        warn!("Tracing subscriber already installed");
    }
}

/// Open the state in `data_dir`, report the vault status and start the
/// auto-lock monitor. Lock events are delivered on the returned channel.
pub async fn start(data_dir: &Path) -> Result<(Arc<AppState>, mpsc::Receiver<LockEvent>)> {
    info!("Starting PassVault...");

    let state = Arc::new(AppState::open(data_dir)?);
    let status = state.vault.status().await?;
    info!("Vault status: {}", status);

    let lock_events = state.start_auto_lock().await;
    Ok((state, lock_events))
}

/// [`start`] with the platform data directory.
pub async fn start_default() -> Result<(Arc<AppState>, mpsc::Receiver<LockEvent>)> {
    let data_dir = storage::default_data_dir()?;
    start(&data_dir).await
}
