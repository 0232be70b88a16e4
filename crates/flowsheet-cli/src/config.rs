//! Configuration file loading for the CLI
//!
//! This module handles finding and loading TOML configuration files
//! from various locations (explicit path, local directory, system directory).

use std::{
    fs,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use log::{debug, info};
use thiserror::Error;

use flowsheet::{FlowsheetError, config::AppConfig};

/// Configuration-related errors for CLI
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse TOML configuration: {0}")]
    Parse(String),

    #[error("Missing configuration file: {0}")]
    MissingFile(PathBuf),
}

impl From<ConfigError> for FlowsheetError {
    fn from(err: ConfigError) -> Self {
        FlowsheetError::Config(err.to_string())
    }
}

/// Find and load configuration from various locations
///
/// Search order:
/// 1. Explicit path if provided
/// 2. Local project directory (flowsheet/config.toml)
/// 3. Platform-specific config directory
/// 4. Default config if none found
///
/// # Errors
///
/// Returns error if:
/// - Explicit path is provided but file doesn't exist
/// - Config file exists but cannot be parsed
pub fn load_config(explicit_path: Option<impl AsRef<Path>>) -> Result<AppConfig, FlowsheetError> {
    // 1. Try the explicitly provided path first if available
    if let Some(path) = explicit_path {
        let path = path.as_ref();
        info!(path = path.display().to_string(); "Loading configuration from explicit path");
        return load_config_file(path);
    }

    // 2. Try the local project directory
    let local_config = Path::new("flowsheet/config.toml");
    if local_config.exists() {
        info!(path = local_config.display().to_string(); "Loading configuration from local path");
        return load_config_file(local_config);
    }

    // 3. Try the platform-specific config directory
    if let Some(proj_dirs) = ProjectDirs::from("org", "flowsheet", "flowsheet") {
        let system_config = proj_dirs.config_dir().join("config.toml");

        if system_config.exists() {
            info!(path = system_config.display().to_string(); "Loading configuration from system path");
            return load_config_file(system_config);
        }

        debug!(path = system_config.display().to_string(); "System configuration file not found");
    } else {
        debug!("Could not determine platform-specific config directory");
    }

    // 4. If no config is found, return default config
    debug!("No configuration file found, using default configuration");
    Ok(AppConfig::default())
}

/// Load configuration from a TOML file
fn load_config_file(path: impl AsRef<Path>) -> Result<AppConfig, FlowsheetError> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ConfigError::MissingFile(path.to_path_buf()).into());
    }

    let content = fs::read_to_string(path)?;
    parse_config(&content).map_err(Into::into)
}

/// Parse configuration from TOML text.
fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use flowsheet::ChoiceMergePolicy;

    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(
            r#"
            [resolve]
            lenient = true
            choice_merge = "replace"
            analyses = ["north"]
            fields = ["R1", "R2"]

            [tables]
            known = ["venting", "flaring"]
            "#,
        )
        .expect("valid config");

        assert!(config.resolve().lenient());
        assert_eq!(config.resolve().choice_merge(), ChoiceMergePolicy::Replace);
        assert_eq!(config.resolve().analyses(), ["north"]);
        assert_eq!(config.resolve().fields(), ["R1", "R2"]);
        assert_eq!(config.tables().known(), ["venting", "flaring"]);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = parse_config("").expect("empty config");
        assert!(!config.resolve().lenient());
        assert_eq!(config.resolve().choice_merge(), ChoiceMergePolicy::ByName);
        assert!(config.tables().known().is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = parse_config("[resolve]\nchoice_merge = \"sideways\"").expect_err("bad policy");
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = parse_config("[resolve]\nstrict = true").expect_err("unknown key");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_explicit_missing_file() {
        let err = load_config(Some("/nonexistent/flowsheet.toml")).expect_err("missing");
        assert!(matches!(err, FlowsheetError::Config(_)));
    }
}
