use crate::reporter::HttpMode;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Http,
    Grpc,
}

impl std::str::FromStr for TransportKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "http" => Ok(Self::Http),
            "grpc" => Ok(Self::Grpc),
            other => anyhow::bail!("unknown transport: {other}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// `host:port` or a full URL of the server.
    #[serde(default = "default_server_address")]
    pub server_address: String,
    #[serde(default)]
    pub transport: TransportKind,
    /// Body encoding for the HTTP transport.
    #[serde(default)]
    pub http_mode: HttpMode,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    /// Worker pool size, i.e. report tasks in flight at once.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    /// Shared secret for the `HashSHA256` request signature.
    #[serde(default)]
    pub key: Option<String>,
}

fn default_server_address() -> String {
    "localhost:8080".to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_report_interval() -> u64 {
    10
}

fn default_rate_limit() -> usize {
    1
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_address: default_server_address(),
            transport: TransportKind::default(),
            http_mode: HttpMode::default(),
            poll_interval_secs: default_poll_interval(),
            report_interval_secs: default_report_interval(),
            rate_limit: default_rate_limit(),
            key: None,
        }
    }
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Overrides fields from `PULSEMON_*` environment variables.
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = lookup("PULSEMON_ADDRESS") {
            self.server_address = v;
        }
        if let Some(v) = lookup("PULSEMON_TRANSPORT") {
            self.transport = v.parse()?;
        }
        if let Some(v) = lookup("PULSEMON_POLL_INTERVAL") {
            self.poll_interval_secs = v.trim().parse()?;
        }
        if let Some(v) = lookup("PULSEMON_REPORT_INTERVAL") {
            self.report_interval_secs = v.trim().parse()?;
        }
        if let Some(v) = lookup("PULSEMON_RATE_LIMIT") {
            self.rate_limit = v.trim().parse()?;
        }
        if let Some(v) = lookup("PULSEMON_KEY") {
            self.key = Some(v).filter(|k| !k.is_empty());
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.server_address.trim().is_empty(),
            "server_address must not be empty"
        );
        anyhow::ensure!(self.poll_interval_secs > 0, "poll_interval_secs must be positive");
        anyhow::ensure!(
            self.report_interval_secs > 0,
            "report_interval_secs must be positive"
        );
        anyhow::ensure!(self.rate_limit > 0, "rate_limit must be positive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: AgentConfig = toml::from_str(r#"server_address = "metrics:9000""#).unwrap();
        assert_eq!(config.server_address, "metrics:9000");
        assert_eq!(config.transport, TransportKind::Http);
        assert_eq!(config.http_mode, HttpMode::Path);
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.report_interval_secs, 10);
        assert_eq!(config.rate_limit, 1);
        assert!(config.key.is_none());
    }

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(
            &path,
            "transport = \"grpc\"\nhttp_mode = \"json\"\nrate_limit = 4\nkey = \"k\"\n",
        )
        .unwrap();

        let config = AgentConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.transport, TransportKind::Grpc);
        assert_eq!(config.http_mode, HttpMode::Json);
        assert_eq!(config.rate_limit, 4);
        assert_eq!(config.key.as_deref(), Some("k"));
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("PULSEMON_ADDRESS", "10.0.0.1:8080"),
            ("PULSEMON_REPORT_INTERVAL", "30"),
            ("PULSEMON_RATE_LIMIT", "3"),
            ("PULSEMON_KEY", ""),
        ]
        .into_iter()
        .collect();

        let mut config = AgentConfig {
            key: Some("from-file".into()),
            ..AgentConfig::default()
        };
        config
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server_address, "10.0.0.1:8080");
        assert_eq!(config.report_interval_secs, 30);
        assert_eq!(config.rate_limit, 3);
        assert!(config.key.is_none());
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut config = AgentConfig::default();
        assert!(config
            .apply_overrides(|name| (name == "PULSEMON_TRANSPORT").then(|| "smtp".to_string()))
            .is_err());

        let config = AgentConfig {
            rate_limit: 0,
            ..AgentConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
