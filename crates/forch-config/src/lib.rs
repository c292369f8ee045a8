//! Configuration for the forch orchestrator.
//!
//! Two sources feed a running orchestrator:
//!
//! - **[`Settings`]**: runtime knobs merged by figment from built-in
//!   defaults, a TOML file and `FORCH_`-prefixed environment variables,
//!   then validated into a [`forch_core::OrchestratorConfig`].
//! - **Static Faucet config**: the `dps` YAML that Faucet itself loads,
//!   parsed into a [`forch_core::DpsConfig`] by [`load_dps`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use forch_api::IngestConfig;
use forch_core::{DpsConfig, EngineConfig, OrchestratorConfig};

/// File name looked up in the working directory and the platform config
/// directory.
pub const CONFIG_FILE: &str = "forch.toml";

/// Prefix for environment overrides, e.g. `FORCH_EVENT_SOCK`.
pub const ENV_PREFIX: &str = "FORCH_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("invalid Faucet config {}: {source}", path.display())]
    Faucet {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_owned(),
            reason: reason.into(),
        }
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// Flat settings table. Every key maps one-to-one onto an environment
/// variable: `event_sock` is `FORCH_EVENT_SOCK`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Faucet event socket.
    pub event_sock: PathBuf,
    /// Attempts to wait for the event socket to appear.
    pub connect_retries: u32,
    /// Pause between connect attempts, in milliseconds.
    pub connect_backoff_ms: u64,
    /// Port-down hold time. Zero disables debouncing.
    pub port_debounce_secs: u64,

    /// Faucet Prometheus endpoint.
    pub varz_url: String,
    pub varz_retries: u32,
    pub varz_retry_delay_ms: u64,

    /// Quiet period before a stack topology change is applied.
    pub coalesce_window_secs: u64,
    pub heartbeat_secs: u64,

    /// Packets per second above which a VLAN is reported as flooding.
    pub vlan_packet_rate_threshold: Option<f64>,
    pub vlan_metric: String,

    /// Faucet `dps` YAML.
    pub faucet_config: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            event_sock: PathBuf::from("/var/run/faucet/faucet.sock"),
            connect_retries: 10,
            connect_backoff_ms: 1000,
            port_debounce_secs: 5,
            varz_url: "http://localhost:9302/metrics".into(),
            varz_retries: 10,
            varz_retry_delay_ms: 1000,
            coalesce_window_secs: 2,
            heartbeat_secs: 1,
            vlan_packet_rate_threshold: None,
            vlan_metric: forch_core::config::DEFAULT_VLAN_METRIC.into(),
            faucet_config: PathBuf::from("/etc/faucet/faucet.yaml"),
        }
    }
}

impl Settings {
    /// Merge defaults, config files and environment.
    ///
    /// With `explicit` set, that file replaces `./forch.toml` and must
    /// exist. The platform config file is always merged first when present.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(config_path()));

        figment = match explicit {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::NotFound {
                        path: path.to_path_buf(),
                    });
                }
                figment.merge(Toml::file(path))
            }
            None => figment.merge(Toml::file(CONFIG_FILE)),
        };

        let settings: Self = figment.merge(Env::prefixed(ENV_PREFIX)).extract()?;
        Ok(settings)
    }

    /// Render as TOML, e.g. to show the effective configuration.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        if self.coalesce_window_secs == 0 {
            return Err(ConfigError::invalid(
                "coalesce_window_secs",
                "must be at least 1",
            ));
        }
        if let Some(threshold) = self.vlan_packet_rate_threshold {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(ConfigError::invalid(
                    "vlan_packet_rate_threshold",
                    format!("{threshold} is not a non-negative rate"),
                ));
            }
        }
        if self.vlan_metric.trim().is_empty() {
            return Err(ConfigError::invalid("vlan_metric", "must not be empty"));
        }

        Ok(EngineConfig {
            coalesce_window: Duration::from_secs(self.coalesce_window_secs),
            vlan_packet_rate_threshold: self.vlan_packet_rate_threshold,
            vlan_metric: self.vlan_metric.clone(),
        })
    }

    /// Validate and translate into the orchestrator's runtime config.
    pub fn to_orchestrator_config(&self) -> Result<OrchestratorConfig, ConfigError> {
        let varz_url = Url::parse(&self.varz_url)
            .map_err(|e| ConfigError::invalid("varz_url", e.to_string()))?;
        if !matches!(varz_url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "varz_url",
                format!("unsupported scheme '{}'", varz_url.scheme()),
            ));
        }
        if self.heartbeat_secs == 0 {
            return Err(ConfigError::invalid("heartbeat_secs", "must be at least 1"));
        }
        if self.event_sock.as_os_str().is_empty() {
            return Err(ConfigError::invalid("event_sock", "must not be empty"));
        }

        let mut ingest = IngestConfig::new(&self.event_sock);
        ingest.connect_retries = self.connect_retries;
        ingest.retry_backoff = Duration::from_millis(self.connect_backoff_ms);
        ingest.port_debounce = Duration::from_secs(self.port_debounce_secs);

        Ok(OrchestratorConfig {
            ingest,
            varz_url,
            varz_retries: self.varz_retries,
            varz_retry_delay: Duration::from_millis(self.varz_retry_delay_ms),
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs),
            engine: self.engine_config()?,
        })
    }
}

// ── Paths ───────────────────────────────────────────────────────────

/// Platform config file, e.g. `~/.config/forch/forch.toml` on Linux.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "faucetsdn", "forch").map_or_else(
        || PathBuf::from(CONFIG_FILE),
        |dirs| dirs.config_dir().join(CONFIG_FILE),
    )
}

// ── Faucet static config ────────────────────────────────────────────

/// Parse a Faucet `dps` YAML file.
pub fn load_dps(path: &Path) -> Result<DpsConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    parse_dps(&raw).map_err(|source| ConfigError::Faucet {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse Faucet `dps` YAML from a string. An empty document is an empty
/// fabric.
pub fn parse_dps(raw: &str) -> Result<DpsConfig, serde_yaml::Error> {
    if raw.trim().is_empty() {
        return Ok(DpsConfig::default());
    }
    serde_yaml::from_str(raw)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use figment::Jail;
    use forch_core::PortType;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_translate() {
        let config = Settings::default().to_orchestrator_config().unwrap();
        assert_eq!(config.varz_url.as_str(), "http://localhost:9302/metrics");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(config.ingest.port_debounce, Duration::from_secs(5));
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn file_then_env_precedence() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                event_sock = "/tmp/from-file.sock"
                heartbeat_secs = 3
                vlan_packet_rate_threshold = 250.0
                "#,
            )?;
            jail.set_env("FORCH_EVENT_SOCK", "/tmp/from-env.sock");

            let settings = Settings::load(None).map_err(|e| e.to_string())?;
            assert_eq!(settings.event_sock, PathBuf::from("/tmp/from-env.sock"));
            assert_eq!(settings.heartbeat_secs, 3);
            assert_eq!(settings.vlan_packet_rate_threshold, Some(250.0));
            assert_eq!(settings.varz_retries, 10);
            Ok(())
        });
    }

    #[test]
    fn explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = Settings::load(Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn explicit_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "varz_url = \"http://faucet:9302/metrics\"\n").unwrap();
        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.varz_url, "http://faucet:9302/metrics");
    }

    #[test]
    fn rejects_zero_heartbeat() {
        let settings = Settings {
            heartbeat_secs: 0,
            ..Settings::default()
        };
        let err = settings.to_orchestrator_config().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "heartbeat_secs"));
    }

    #[test]
    fn rejects_bad_varz_url() {
        for url in ["not a url", "ftp://faucet/metrics"] {
            let settings = Settings {
                varz_url: url.into(),
                ..Settings::default()
            };
            assert!(settings.to_orchestrator_config().is_err(), "{url}");
        }
    }

    #[test]
    fn rejects_negative_threshold() {
        let settings = Settings {
            vlan_packet_rate_threshold: Some(-1.0),
            ..Settings::default()
        };
        assert!(settings.engine_config().is_err());
    }

    #[test]
    fn toml_output_reloads() {
        let rendered = Settings::default().to_toml().unwrap();
        let back: Settings = toml::from_str(&rendered).unwrap();
        assert_eq!(back, Settings::default());
    }

    #[test]
    fn faucet_yaml_parses() {
        let yaml = r"
dps:
  sw1:
    dp_id: 1
    interfaces:
      1:
        stack: {dp: sw2, port: 1}
      10:
        native_vlan: 100
      28:
        lacp: 3
  sw2:
    dp_id: 2
    interfaces:
      1:
        stack: {dp: sw1, port: 1}
";
        let dps = parse_dps(yaml).unwrap();
        assert_eq!(dps.port_type("sw1", 1), Some(PortType::Stack));
        assert_eq!(dps.port_type("sw1", 10), Some(PortType::Access));
        assert_eq!(dps.port_type("sw1", 28), Some(PortType::Egress));
        assert_eq!(dps.switch_name_by_id(1), Some("sw1"));
    }

    #[test]
    fn empty_faucet_yaml_is_empty_fabric() {
        assert_eq!(parse_dps("  \n").unwrap(), DpsConfig::default());
    }

    #[test]
    fn unreadable_faucet_yaml_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faucet.yaml");
        std::fs::write(&path, "dps: [not, a, map]\n").unwrap();
        let err = load_dps(&path).unwrap_err();
        assert!(err.to_string().contains("faucet.yaml"), "{err}");
    }
}
