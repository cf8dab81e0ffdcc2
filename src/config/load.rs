use std::path::Path;

use crate::config::{ConfigError, ConfigFile};

fn get_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Loads a YAML or JSON settings file, chosen by extension.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed, holds an unknown key, or has
/// another extension.
pub fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    match get_extension(path).as_deref() {
        Some("yaml" | "yml") => Ok(serde_yaml::from_str(&std::fs::read_to_string(path)?)?),
        Some("json") => Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?),
        _ => Err(ConfigError::UnsupportedFileFormat {
            path: path.display().to_string(),
        }),
    }
}
