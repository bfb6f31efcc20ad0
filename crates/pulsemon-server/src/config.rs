use pulsemon_storage::StorageConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_address")]
    pub http_address: String,
    /// gRPC listener; the gRPC service is disabled when unset.
    #[serde(default)]
    pub grpc_address: Option<String>,
    /// Shared secret for `HashSHA256` request checks and response signing.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_http_address() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_address: default_http_address(),
            grpc_address: None,
            key: None,
            storage: StorageConfig::default(),
        }
    }
}

fn non_empty(v: String) -> Option<String> {
    Some(v).filter(|s| !s.trim().is_empty())
}

impl ServerConfig {
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
            self.http_address = v;
        }
        if let Some(v) = lookup("PULSEMON_GRPC_ADDRESS") {
            self.grpc_address = non_empty(v);
        }
        if let Some(v) = lookup("PULSEMON_KEY") {
            self.key = non_empty(v);
        }
        if let Some(v) = lookup("PULSEMON_STORE_INTERVAL") {
            self.storage.store_interval_secs = v.trim().parse()?;
        }
        if let Some(v) = lookup("PULSEMON_STORE_PATH") {
            self.storage.store_path = non_empty(v);
        }
        if let Some(v) = lookup("PULSEMON_RESTORE") {
            self.storage.restore = v.trim().parse()?;
        }
        if let Some(v) = lookup("PULSEMON_DATABASE_DSN") {
            self.storage.database_dsn = non_empty(v);
        }
        Ok(())
    }

    /// DSN with the password masked, for logs.
    pub fn redacted_dsn(&self) -> Option<String> {
        let dsn = self.storage.database_dsn.as_deref()?;
        let Some((scheme, rest)) = dsn.split_once("://") else {
            return Some(dsn.to_string());
        };
        match rest.split_once('@') {
            Some((credentials, host)) => {
                let user = credentials.split(':').next().unwrap_or_default();
                Some(format!("{scheme}://{user}:***@{host}"))
            }
            None => Some(dsn.to_string()),
        }
    }
}
