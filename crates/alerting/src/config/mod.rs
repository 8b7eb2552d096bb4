mod loader;
mod schema;

use std::path::PathBuf;

pub use loader::{load_from_file, load_from_str, LoadError};
pub use schema::{AlertingConfig, AlertingSettings, DataSourceConfig};

pub const CONFIG_ENV: &str = "SENTINEL_ALERTING_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sentinel/alerting.yml";

pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
