//! Agent configuration file

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tank_client::ApiConfig;
use tank_uplink::UplinkConfig;
use tank_veeder::{DeviceConfig, PollingOptions};

/// Root of `tankd.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub device: DeviceConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub uplink: UplinkConfig,
    pub api: ApiConfig,
}

impl AgentConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: AgentConfig = toml::from_str(content)?;
        config.device.validate()?;
        Ok(config)
    }
}

/// `[polling]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_connect_retry_secs")]
    pub connect_retry_secs: u64,
    #[serde(default = "default_reconnect_wait_secs")]
    pub reconnect_wait_secs: u64,
}

fn default_period_secs() -> u64 {
    10
}

fn default_settle_ms() -> u64 {
    500
}

fn default_connect_retry_secs() -> u64 {
    60
}

fn default_reconnect_wait_secs() -> u64 {
    30
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            period_secs: default_period_secs(),
            settle_ms: default_settle_ms(),
            connect_retry_secs: default_connect_retry_secs(),
            reconnect_wait_secs: default_reconnect_wait_secs(),
        }
    }
}

impl From<&PollingConfig> for PollingOptions {
    fn from(config: &PollingConfig) -> Self {
        PollingOptions {
            period: Duration::from_secs(config.period_secs),
            settle_delay: Duration::from_millis(config.settle_ms),
            connect_retry_delay: Duration::from_secs(config.connect_retry_secs),
            reconnect_wait: Duration::from_secs(config.reconnect_wait_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tank_veeder::TransportConfig;

    #[test]
    fn test_example_config_parses() {
        let config = AgentConfig::from_toml(include_str!("../tankd.example.toml")).unwrap();
        assert_eq!(config.device.tank_id, 42);
        assert_eq!(config.device.password(), Some("123456"));
        match &config.device.transport {
            TransportConfig::Tcp(tcp) => {
                assert_eq!(tcp.host, "192.168.1.20");
                assert_eq!(tcp.port, 10001);
            }
            other => panic!("expected tcp transport, got {:?}", other),
        }
        assert_eq!(config.uplink.threshold, 6);
        assert_eq!(config.api.token.as_deref(), Some("change-me"));
        assert_eq!(PollingOptions::from(&config.polling), PollingOptions::default());
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AgentConfig::from_toml(
            r#"
            [device]
            tank_id = 7
            [device.transport]
            type = "mock"
            [api]
            base_url = "http://localhost:8080"
            "#,
        )
        .unwrap();
        assert!(matches!(config.device.transport, TransportConfig::Mock(_)));
        assert_eq!(config.uplink.max_retries, 10);
        assert_eq!(config.polling.period_secs, 10);
        assert_eq!(config.api.timeout_secs, 30);
    }

    #[test]
    fn test_bad_password_is_rejected() {
        let result = AgentConfig::from_toml(
            r#"
            [device]
            tank_id = 7
            password = "toolongpassword"
            [api]
            base_url = "http://localhost:8080"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_api_section_is_rejected() {
        assert!(AgentConfig::from_toml("[device]\ntank_id = 7").is_err());
    }

    #[test]
    fn test_load_reads_current_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tankd.toml");
        let write = |tank_id: i64| {
            std::fs::write(
                &path,
                format!("[device]\ntank_id = {tank_id}\n[api]\nbase_url = \"http://localhost:8080\"\n"),
            )
            .unwrap()
        };

        write(7);
        assert_eq!(AgentConfig::load(&path).unwrap().device.tank_id, 7);
        // A restart picks up edits made while the agent was running
        write(8);
        assert_eq!(AgentConfig::load(&path).unwrap().device.tank_id, 8);
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let err = AgentConfig::load(Path::new("/nonexistent/tankd.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/tankd.toml"));
    }
}
