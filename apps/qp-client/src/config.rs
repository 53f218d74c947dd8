//! Client configuration.
//!
//! One `ClientConfig` is loaded (or created with defaults) at startup
//! and passed by reference to whatever needs it: there is no global
//! settings object. Unknown fields in the file are rejected rather
//! than silently ignored; missing fields get defaults and are written
//! back so the file always documents every knob.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub base_url: String,
    /// Liveness probe timeout while disconnected.
    pub ping_timeout_secs: u64,
    /// Timeout for every fetch/post request.
    pub request_timeout_secs: u64,
    /// Delay between liveness probes while disconnected.
    pub ping_interval_secs: u64,
    /// Delay between fetch cycles while connected.
    pub fetch_interval_secs: u64,
    /// Run the unmatched-key response sweep every Nth connected cycle.
    pub respond_every: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8600".into(),
            ping_timeout_secs: 2,
            request_timeout_secs: 5,
            ping_interval_secs: 5,
            fetch_interval_secs: 3,
            respond_every: 3,
        }
    }
}

impl ServerConfig {
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite file holding shared secrets and message plaintext; it
    /// must live on trusted local storage.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("quietpost.db") }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Diagnostic event log (JSON lines). `None` keeps events
    /// in memory only.
    pub path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { path: Some(PathBuf::from("quietpost-events.log")) }
    }
}

impl ClientConfig {
    /// Load the config file, creating it with defaults on first run.
    /// Defaults for newly added fields are written back.
    pub fn load_or_init(path: &Path) -> anyhow::Result<Self> {
        let config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        } else {
            Self::default()
        };
        let serialized = toml::to_string_pretty(&config).context("serializing config")?;
        std::fs::write(path, serialized)
            .with_context(|| format!("writing config {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn first_run_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("qp.toml");
        let config = ClientConfig::load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.server.respond_every, 3);

        // Second load round-trips.
        let reloaded = ClientConfig::load_or_init(&path).unwrap();
        assert_eq!(reloaded.server.base_url, config.server.base_url);
    }

    #[test]
    fn partial_file_gets_defaults_for_the_rest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("qp.toml");
        std::fs::write(&path, "[server]\nbase_url = \"http://relay.example:9\"\n").unwrap();
        let config = ClientConfig::load_or_init(&path).unwrap();
        assert_eq!(config.server.base_url, "http://relay.example:9");
        assert_eq!(config.server.fetch_interval_secs, 3);
        // Written back with all fields present.
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("fetch_interval_secs"));
    }
}
