use std::path::{Path, PathBuf};

use crate::config::schema::EngineConfig;
use crate::error::ConfigError;

/// Environment variable naming the config file when no path is given.
pub const CONFIG_ENV_VAR: &str = "HARVESTER_CONFIG";

/// Document format, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Json,
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content, ConfigFormat::from_path(path))
}

pub fn load_config_from_str(
    content: &str,
    format: ConfigFormat,
) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = if content.trim().is_empty() {
        EngineConfig::default()
    } else {
        match format {
            ConfigFormat::Json => serde_json::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
        }
    };

    validate_config(&config)?;

    Ok(config)
}

/// Picks the config file: the explicit path, then `HARVESTER_CONFIG`.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    std::env::var_os(CONFIG_ENV_VAR)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Loads the resolved config file, or the defaults when there is none.
pub fn load_or_default(explicit: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    match resolve_config_path(explicit) {
        Some(path) => {
            log::debug!("Loading configuration from {}", path.display());
            load_config(path)
        }
        None => {
            let config = EngineConfig::default();
            validate_config(&config)?;
            Ok(config)
        }
    }
}

fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    let invalid = |message: &str| ConfigError::Validation {
        message: message.to_string(),
    };

    if config.tick_interval_secs == 0 {
        return Err(invalid("tick_interval_secs must be greater than 0"));
    }
    if config.recent_executions == 0 {
        return Err(invalid("recent_executions must be greater than 0"));
    }
    if config.event_capacity == 0 {
        return Err(invalid("event_capacity must be greater than 0"));
    }
    if config.defaults.timeout_ms == 0 {
        return Err(invalid("defaults.timeout_ms must be greater than 0"));
    }
    if config.defaults.max_payload_bytes == 0 {
        return Err(invalid("defaults.max_payload_bytes must be greater than 0"));
    }
    if config.data_directory.as_os_str().is_empty() {
        return Err(invalid("data_directory must not be empty"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::StoreBackend;
    use serial_test::serial;

    #[test]
    fn test_load_json_config() {
        let config_json = r#"
        {
            "data_directory": "/var/lib/harvester",
            "store_backend": "sqlite",
            "tick_interval_secs": 30,
            "defaults": { "delay_ms": 250 }
        }
        "#;

        let config = load_config_from_str(config_json, ConfigFormat::Json).unwrap();
        assert_eq!(config.data_directory, PathBuf::from("/var/lib/harvester"));
        assert_eq!(config.store_backend, StoreBackend::Sqlite);
        assert_eq!(config.tick_interval_secs, 30);
        assert_eq!(config.defaults.delay_ms, 250);
        assert_eq!(config.defaults.timeout_ms, 30_000);
    }

    #[test]
    fn test_load_yaml_config() {
        let config_yaml = r#"
data_directory: /srv/harvester
output_directory: /srv/artifacts
recent_executions: 25
defaults:
  timeout_ms: 5000
  retry_attempts: 1
"#;

        let config = load_config_from_str(config_yaml, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.output_directory(), PathBuf::from("/srv/artifacts"));
        assert_eq!(config.recent_executions, 25);
        assert_eq!(config.defaults.timeout_ms, 5_000);
        assert_eq!(config.defaults.retry_attempts, 1);
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = load_config_from_str("  ", ConfigFormat::Json).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_zero_tick_interval_rejected() {
        let result = load_config_from_str(r#"{"tick_interval_secs": 0}"#, ConfigFormat::Json);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = load_config_from_str("defaults:\n  timeout_ms: 0\n", ConfigFormat::Yaml);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let result = load_config_from_str("{ nope", ConfigFormat::Json);
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("engine.YAML")),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("engine.yml")),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("engine.json")),
            ConfigFormat::Json
        );
        assert_eq!(ConfigFormat::from_path(Path::new("engine")), ConfigFormat::Json);
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "event_capacity: 8\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.event_capacity, 8);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = load_config("/definitely/not/here.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    #[serial]
    fn test_resolve_prefers_explicit_path() {
        std::env::set_var(CONFIG_ENV_VAR, "/from/env.json");
        let resolved = resolve_config_path(Some(Path::new("/explicit.json")));
        std::env::remove_var(CONFIG_ENV_VAR);
        assert_eq!(resolved, Some(PathBuf::from("/explicit.json")));
    }

    #[test]
    #[serial]
    fn test_resolve_falls_back_to_env() {
        std::env::set_var(CONFIG_ENV_VAR, "/from/env.json");
        let resolved = resolve_config_path(None);
        std::env::remove_var(CONFIG_ENV_VAR);
        assert_eq!(resolved, Some(PathBuf::from("/from/env.json")));
    }

    #[test]
    #[serial]
    fn test_load_or_default_without_any_path() {
        std::env::remove_var(CONFIG_ENV_VAR);
        let config = load_or_default(None).unwrap();
        assert_eq!(config.tick_interval_secs, 60);
    }

    #[test]
    #[serial]
    fn test_load_or_default_reads_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"stop_timeout_secs": 9}"#).unwrap();

        std::env::set_var(CONFIG_ENV_VAR, &path);
        let config = load_or_default(None);
        std::env::remove_var(CONFIG_ENV_VAR);

        assert_eq!(config.unwrap().stop_timeout_secs, 9);
    }
}
