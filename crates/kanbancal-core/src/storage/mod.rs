mod config;
pub mod task_db;

pub use config::{Config, FrontendSection, SchedulerSection, TelegramSection};
pub use task_db::TaskDb;

use std::path::PathBuf;

/// Returns `~/.config/kanbancal[-dev]/` based on KANBANCAL_ENV.
///
/// Set KANBANCAL_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("KANBANCAL_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("kanbancal-dev")
    } else {
        base_dir.join("kanbancal")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
