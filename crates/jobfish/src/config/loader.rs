use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Loads `path` if given and present; otherwise returns the defaults.
pub fn load_config_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Config, ConfigError> {
    match path {
        Some(p) if p.as_ref().exists() => load_config(p),
        Some(p) => {
            log::warn!(
                "Config file {} not found, using defaults",
                p.as_ref().display()
            );
            Ok(Config::default())
        }
        None => Ok(Config::default()),
    }
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let base_url = config.agent.base_url.as_str();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::Validation {
            message: format!(
                "agent.base_url must be an http(s) URL, got '{}'",
                crate::sanitize::redact_url_credentials(base_url)
            ),
        });
    }

    let orchestrator = &config.orchestrator;
    if orchestrator.max_concurrent_applies == 0 {
        return Err(ConfigError::Validation {
            message: "orchestrator.max_concurrent_applies must be at least 1".to_string(),
        });
    }

    let timeouts = [
        ("agent.connect_timeout_secs", config.agent.connect_timeout_secs),
        ("orchestrator.search_timeout_secs", orchestrator.search_timeout_secs),
        ("orchestrator.apply_ack_timeout_secs", orchestrator.apply_ack_timeout_secs),
        ("poller.interval_secs", config.poller.interval_secs),
        ("poller.status_timeout_secs", config.poller.status_timeout_secs),
    ];
    for (name, value) in timeouts {
        if value == 0 {
            return Err(ConfigError::Validation {
                message: format!("{} must be greater than 0", name),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_valid_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "agent": {
                "base_url": "http://localhost:9000",
                "api_key_env": "MY_AGENT_KEY",
                "proxy_enabled": false
            },
            "orchestrator": {
                "max_concurrent_applies": 2,
                "apply_ack_timeout_secs": 30
            },
            "poller": { "enabled": false, "status_timeout_secs": 5 },
            "server": { "port": 8080 },
            "logging": { "filter": "debug", "json": true }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.agent.base_url, "http://localhost:9000");
        assert_eq!(config.agent.api_key_env.as_deref(), Some("MY_AGENT_KEY"));
        assert!(!config.agent.proxy_enabled);
        assert_eq!(config.orchestrator.max_concurrent_applies, 2);
        assert_eq!(config.orchestrator.search_timeout_secs, 300);
        assert!(!config.poller.enabled);
        assert_eq!(config.poller.status_timeout_secs, 5);
        assert_eq!(config.server.port, 8080);
        assert!(config.logging.json);
    }

    #[test]
    fn test_minimal_config() {
        let config = load_config_from_str(r#"{"version": "1.0"}"#).unwrap();
        assert_eq!(config.orchestrator.max_concurrent_applies, 4);
    }

    #[test]
    fn test_unsupported_version() {
        let err = load_config_from_str(r#"{"version": "2.0"}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::SchemaValidation { .. } | ConfigError::Validation { .. }
        ));
    }

    #[test]
    fn test_schema_rejects_unknown_section() {
        let err = load_config_from_str(r#"{"version": "1.0", "ocr": {}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));
    }

    #[test]
    fn test_schema_rejects_wrong_type() {
        let err = load_config_from_str(
            r#"{"version": "1.0", "orchestrator": {"max_concurrent_applies": "four"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = load_config_from_str(
            r#"{"version": "1.0", "orchestrator": {"max_concurrent_applies": 0}}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::SchemaValidation { .. } | ConfigError::Validation { .. }
        ));
    }

    #[test]
    fn test_validate_config_checks_timeouts_and_url() {
        let mut config = Config::default();
        assert!(validate_config(&config).is_ok());

        config.orchestrator.apply_ack_timeout_secs = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("apply_ack_timeout_secs"));

        let mut config = Config::default();
        config.poller.status_timeout_secs = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("status_timeout_secs"));

        let mut config = Config::default();
        config.agent.base_url = "ftp://agent".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_json() {
        let err = load_config_from_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::ParseJson(_)));
    }

    #[test]
    fn test_load_from_file_and_missing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"version": "1.0", "server": {{"port": 9100}}}}"#).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.port, 9100);

        let err = load_config("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));

        let defaults = load_config_or_default(Some("/definitely/not/here.json")).unwrap();
        assert_eq!(defaults.server.port, 8000);
        let defaults = load_config_or_default(None::<&str>).unwrap();
        assert_eq!(defaults.version, "1.0");
    }
}
