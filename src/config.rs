//! Configuration loader and validator for the notification hub.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub email: Email,
    #[serde(default)]
    pub analytics: Analytics,
    #[serde(default)]
    pub bell: Bell,
}

/// Server-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub bind_addr: String,
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
    /// Donation audit log; relative paths resolve against `data_dir`.
    #[serde(default = "default_audit_log")]
    pub audit_log: String,
}

/// Outgoing mail relay. An empty `relay_url` selects the log-only mailer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Email {
    #[serde(default)]
    pub relay_url: String,
    #[serde(default)]
    pub from: String,
}

/// Analytics sink used by clients. Empty disables tracking.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Analytics {
    #[serde(default)]
    pub track_url: String,
}

/// Unread-tally client settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bell {
    pub server_url: String,
    pub reconnect: bool,
    pub reconnect_base_ms: u64,
    pub max_backoff_seconds: u64,
}

impl Default for Bell {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3001".into(),
            reconnect: true,
            reconnect_base_ms: 500,
            max_backoff_seconds: 60,
        }
    }
}

fn default_feed_capacity() -> usize {
    256
}

fn default_audit_log() -> String {
    "audit.log".into()
}

impl App {
    /// Expand a leading `~/` in `data_dir`.
    pub fn resolved_data_dir(&self) -> String {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => match std::env::var("HOME") {
                Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
                Err(_) => self.data_dir.clone(),
            },
            None => self.data_dir.clone(),
        }
    }

    pub fn audit_log_path(&self) -> std::path::PathBuf {
        let p = Path::new(&self.audit_log);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            Path::new(&self.resolved_data_dir()).join(p)
        }
    }
}

impl Bell {
    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_seconds)
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.app.resolved_data_dir())
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.bind_addr.parse::<std::net::SocketAddr>().is_err() {
        return Err(ConfigError::Invalid("app.bind_addr must be a socket address"));
    }
    if cfg.app.feed_capacity == 0 {
        return Err(ConfigError::Invalid("app.feed_capacity must be > 0"));
    }
    if cfg.app.audit_log.trim().is_empty() {
        return Err(ConfigError::Invalid("app.audit_log must be non-empty"));
    }

    if !cfg.email.relay_url.trim().is_empty() && cfg.email.from.trim().is_empty() {
        return Err(ConfigError::Invalid("email.from must be set when email.relay_url is"));
    }

    if cfg.bell.server_url.trim().is_empty() {
        return Err(ConfigError::Invalid("bell.server_url must be non-empty"));
    }
    if cfg.bell.reconnect && cfg.bell.reconnect_base_ms == 0 {
        return Err(ConfigError::Invalid("bell.reconnect_base_ms must be > 0"));
    }

    Ok(())
}

/// Returns the sample YAML shipped with the service.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  bind_addr: "127.0.0.1:3001"
  feed_capacity: 256
  audit_log: "audit.log"

email:
  relay_url: ""
  from: "noreply@marketplace.example"

analytics:
  track_url: "http://127.0.0.1:3001/api/track"

bell:
  server_url: "http://127.0.0.1:3001"
  reconnect: true
  reconnect_base_ms: 500
  max_backoff_seconds: 60
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.feed_capacity, 256);
        assert!(cfg.bell.reconnect);
    }

    #[test]
    fn optional_sections_default() {
        let cfg: Config = serde_yaml::from_str(
            "app:\n  data_dir: ./data\n  bind_addr: 127.0.0.1:8080\n",
        )
        .unwrap();
        validate(&cfg).unwrap();
        assert!(cfg.email.relay_url.is_empty());
        assert_eq!(cfg.app.audit_log, "audit.log");
        assert_eq!(cfg.bell, Bell::default());
    }

    #[test]
    fn invalid_bind_addr() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.bind_addr = "localhost".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("bind_addr")), _ => panic!("wrong error") }
    }

    #[test]
    fn relay_requires_sender() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.email.relay_url = "http://relay.local/send".into();
        cfg.email.from = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("email.from")), _ => panic!("wrong error") }
    }

    #[test]
    fn invalid_feed_and_bell() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.feed_capacity = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.bell.reconnect_base_ms = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.bell.reconnect = false;
        cfg.bell.reconnect_base_ms = 0;
        validate(&cfg).unwrap();
    }

    #[test]
    fn audit_log_resolves_against_data_dir() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = "/srv/hub".into();
        assert_eq!(cfg.app.audit_log_path(), Path::new("/srv/hub/audit.log"));
        cfg.app.audit_log = "/var/log/donations.log".into();
        assert_eq!(cfg.app.audit_log_path(), Path::new("/var/log/donations.log"));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.bind_addr, "127.0.0.1:3001");
    }
}
