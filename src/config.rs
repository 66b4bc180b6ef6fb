use std::path::PathBuf;

use tracing::debug;

use crate::pipeline_config::{ClassifierConfig, ConfigError};

/// Application-level constants
pub const APP_NAME: &str = "phytoscan";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Path to a JSON threshold override file.
pub const CONFIG_ENV_VAR: &str = "PHYTOSCAN_CONFIG";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "phytoscan=info,phytoscan_lib=info"
}

/// Override file named by `PHYTOSCAN_CONFIG`, if any.
pub fn config_path_from_env() -> Option<PathBuf> {
    std::env::var_os(CONFIG_ENV_VAR)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Load the classifier threshold table.
///
/// An explicit path wins over `PHYTOSCAN_CONFIG`; with neither, defaults apply.
pub fn load_classifier_config(explicit: Option<PathBuf>) -> Result<ClassifierConfig, ConfigError> {
    match explicit.or_else(config_path_from_env) {
        Some(path) => {
            debug!(path = %path.display(), "Loading classifier config");
            ClassifierConfig::from_json_file(&path)
        }
        None => Ok(ClassifierConfig::default()),
    }
}
