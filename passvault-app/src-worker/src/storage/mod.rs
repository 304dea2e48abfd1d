mod area;
mod config;
mod error;
pub mod keys;

pub use area::{get_as, set_as, FileArea, MemoryArea, StorageArea};
pub use config::{default_data_dir, load_settings, save_settings, AppSettings};
pub use error::{StorageError, StorageResult};
