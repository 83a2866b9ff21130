//! Listener configuration.
//!
//! Read from `$XDG_CONFIG_HOME/medlink/config.json` (falling back to
//! `~/.config/medlink/config.json`). Every field is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use medlink_realtime::{ManagerConfig, ReconnectConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Channel URLs to subscribe to.
    pub channels: Vec<String>,

    /// Endpoint that exchanges a refresh credential for an access credential.
    pub refresh_url: String,

    /// Credential file. Defaults to `credentials.json` beside the config.
    pub credentials_path: Option<PathBuf>,

    pub heartbeat_secs: u64,

    /// `0` disables the idle deadline.
    pub idle_timeout_secs: u64,

    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            refresh_url: "http://localhost:8000/api/token/refresh/".into(),
            credentials_path: None,
            heartbeat_secs: 30,
            idle_timeout_secs: 0,
            reconnect_base_ms: 3_000,
            reconnect_max_ms: 30_000,
        }
    }
}

impl ListenerConfig {
    /// Loads `path`, falling back to defaults if it is missing or invalid.
    pub fn load_from(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %path.display(), "config not readable ({e}), using defaults");
                return Self::default();
            }
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to parse config ({e}), using defaults");
                Self::default()
            }
        }
    }

    /// Credential file to use with a config loaded from `config_path`.
    pub fn credentials_path(&self, config_path: &Path) -> PathBuf {
        match &self.credentials_path {
            Some(p) => p.clone(),
            None => config_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("credentials.json"),
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(self.reconnect_base_ms),
                max_delay: Duration::from_millis(self.reconnect_max_ms),
                ..ReconnectConfig::default()
            },
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs.max(1)),
            ..ManagerConfig::default()
        }
    }
}

/// Default config file location.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(config_base_dir()?.join("medlink").join("config.json"))
}

fn config_base_dir() -> anyhow::Result<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(xdg));
    }

    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA")?;
        Ok(PathBuf::from(appdata))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME")?;
        Ok(PathBuf::from(home).join(".config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"channels":["wss://host/ws/feed"],"idle_timeout_secs":90}"#,
        )
        .unwrap();

        let config = ListenerConfig::load_from(&path);
        assert_eq!(config.channels, vec!["wss://host/ws/feed".to_string()]);
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(90)));
        assert_eq!(config.heartbeat_secs, 30);
        assert_eq!(config.reconnect_base_ms, 3_000);
    }

    #[test]
    fn missing_or_invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert_eq!(ListenerConfig::load_from(&missing), ListenerConfig::default());

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert_eq!(ListenerConfig::load_from(&broken), ListenerConfig::default());
    }

    #[test]
    fn credentials_default_beside_config() {
        let config = ListenerConfig::default();
        assert_eq!(
            config.credentials_path(Path::new("/etc/medlink/config.json")),
            PathBuf::from("/etc/medlink/credentials.json")
        );

        let explicit = ListenerConfig {
            credentials_path: Some("/tmp/creds.json".into()),
            ..ListenerConfig::default()
        };
        assert_eq!(
            explicit.credentials_path(Path::new("/etc/medlink/config.json")),
            PathBuf::from("/tmp/creds.json")
        );
    }

    #[test]
    fn manager_config_from_file_values() {
        let config = ListenerConfig {
            heartbeat_secs: 15,
            reconnect_base_ms: 500,
            reconnect_max_ms: 8_000,
            ..ListenerConfig::default()
        };
        let mc = config.manager_config();
        assert_eq!(mc.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(mc.reconnect.initial_delay, Duration::from_millis(500));
        assert_eq!(mc.reconnect.max_delay, Duration::from_secs(8));
        assert_eq!(mc.credential_param, "token");
        assert_eq!(config.idle_timeout(), None);
    }
}
