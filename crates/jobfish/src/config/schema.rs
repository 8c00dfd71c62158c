use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            agent: AgentConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            database: DatabaseConfig::default(),
            poller: PollerConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Remote automation agent connection.
///
/// The API key is resolved from `api_key`, then `api_key_file`, then the
/// environment variable named by `api_key_env`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub proxy_enabled: bool,
}

fn default_agent_base_url() -> String {
    "https://agent.tinyfish.ai".to_string()
}

fn default_api_key_env() -> Option<String> {
    Some("TINYFISH_API_KEY".to_string())
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: default_agent_base_url(),
            api_key: None,
            api_key_file: None,
            api_key_env: default_api_key_env(),
            connect_timeout_secs: default_connect_timeout_secs(),
            proxy_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_concurrent_applies")]
    pub max_concurrent_applies: usize,
    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,
    /// Deadline for the agent to acknowledge an apply, not to finish it.
    #[serde(default = "default_apply_ack_timeout_secs")]
    pub apply_ack_timeout_secs: u64,
    #[serde(default = "default_autopilot_pause_ms")]
    pub autopilot_pause_ms: u64,
}

fn default_max_concurrent_applies() -> usize {
    4
}

fn default_search_timeout_secs() -> u64 {
    300
}

fn default_apply_ack_timeout_secs() -> u64 {
    120
}

fn default_autopilot_pause_ms() -> u64 {
    2000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_applies: default_max_concurrent_applies(),
            search_timeout_secs: default_search_timeout_secs(),
            apply_ack_timeout_secs: default_apply_ack_timeout_secs(),
            autopilot_pause_ms: default_autopilot_pause_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Defaults to `~/.jobfish/data/jobfish.db`; `DB_PATH` overrides both.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    /// Resolves the database location: `DB_PATH`, then the configured
    /// path, then the default under the home directory.
    pub fn resolve_path(&self) -> Option<PathBuf> {
        std::env::var_os("DB_PATH")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| self.path.clone())
            .or_else(crate::db::default_database_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    /// Deadline for one run-status request.
    #[serde(default = "default_status_timeout_secs")]
    pub status_timeout_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_status_timeout_secs() -> u64 {
    15
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_poll_interval_secs(),
            status_timeout_secs: default_status_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives. `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults_from_empty_object() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.agent.base_url, "https://agent.tinyfish.ai");
        assert_eq!(config.agent.api_key_env.as_deref(), Some("TINYFISH_API_KEY"));
        assert_eq!(config.orchestrator.max_concurrent_applies, 4);
        assert_eq!(config.orchestrator.apply_ack_timeout_secs, 120);
        assert!(config.poller.enabled);
        assert_eq!(config.poller.status_timeout_secs, 15);
        assert_eq!(config.server.port, 8000);
        assert!(!config.logging.json);
    }

    #[test]
    #[serial]
    fn test_db_path_env_override() {
        let config = DatabaseConfig {
            path: Some(PathBuf::from("/tmp/configured.db")),
        };

        std::env::remove_var("DB_PATH");
        assert_eq!(config.resolve_path(), Some(PathBuf::from("/tmp/configured.db")));

        std::env::set_var("DB_PATH", "/tmp/from-env.db");
        assert_eq!(config.resolve_path(), Some(PathBuf::from("/tmp/from-env.db")));
        std::env::remove_var("DB_PATH");
    }

    #[test]
    #[serial]
    fn test_db_path_default() {
        std::env::remove_var("DB_PATH");
        let path = DatabaseConfig::default().resolve_path().unwrap();
        assert!(path.ends_with("jobfish.db"));
    }
}
