use std::path::Path;

use crate::error::ConfigError;

use super::{EngineConfig, ScenarioFile};

/// Loads and validates a scenario from `path`, dispatching on extension.
///
/// # Errors
///
/// Returns a `ConfigError` when the file cannot be read, parsed, or
/// validated.
pub fn load_scenario(path: &Path) -> Result<EngineConfig, ConfigError> {
    let file = load_scenario_file(path)?;
    EngineConfig::from_file(&file)
}

/// Reads the raw scenario tables without validating them.
///
/// # Errors
///
/// Returns a `ConfigError` when the file cannot be read or parsed.
pub fn load_scenario_file(path: &Path) -> Result<ScenarioFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|err| ConfigError::ReadScenario {
        path: path.to_path_buf(),
        source: err,
    })?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|err| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source: err,
        }),
        Some("json") => serde_json::from_str(&content).map_err(|err| ConfigError::ParseJson {
            path: path.to_path_buf(),
            source: err,
        }),
        Some(ext) => Err(ConfigError::UnsupportedExtension {
            ext: ext.to_owned(),
        }),
        None => Err(ConfigError::MissingExtension),
    }
}
