//! Harness configuration: defaults, then an optional TOML file, then
//! `BCAST_HARNESS_*` environment variables.
//!
//! Invalid environment values are ignored and the previous value kept.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `BCAST_HARNESS_BARRIER_ADDR` | 127.0.0.1:10000 | Start barrier listen address |
//! | `BCAST_HARNESS_SIGNAL_ADDR` | 127.0.0.1:11000 | Completion signal listen address |
//! | `BCAST_HARNESS_PROCESSES` | 3 | Participants per run |
//! | `BCAST_HARNESS_MESSAGES` | 100 | Messages each participant broadcasts |
//! | `BCAST_HARNESS_COMPLETION_TIMEOUT_MS` | 1000 | Bound on the completion wait |
//! | `BCAST_HARNESS_FAULT_CONCURRENCY` | 0 | Fault workers (0 disables injection) |
//! | `BCAST_HARNESS_FAULT_ATTEMPTS` | 0 | Successful injections per worker |
//! | `BCAST_HARNESS_LOG_LEVEL` | info | tracing filter directive |
//! | `BCAST_HARNESS_LOG_FORMAT` | pretty | `pretty` or `json` |

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fault::{FaultConfig, FaultError};
use crate::launch::ProtocolTuning;
use crate::netem::NetemProfile;
use crate::sweep::SweepGrid;
use crate::telemetry::LogConfig;
use crate::validate::{BroadcastKind, DEFAULT_BASE_PORT};

pub const ENV_PREFIX: &str = "BCAST_HARNESS_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required setting `{0}`")]
    Missing(&'static str),

    #[error("`{0}` is not a directory")]
    NotADirectory(PathBuf),

    #[error(transparent)]
    Fault(#[from] FaultError),
}

/// Everything one harness invocation needs.
///
/// Scalars come before tables so the struct renders as valid TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub processes: u32,
    pub messages: u64,
    pub broadcast: BroadcastKind,
    /// Path to the tested program's `run.sh`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runscript: Option<PathBuf>,
    pub logs_dir: PathBuf,
    /// Dependency file for causal runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<PathBuf>,
    pub barrier_addr: SocketAddr,
    pub signal_addr: SocketAddr,
    /// Hosts file port base; participant `i` gets `base_port + i`.
    pub base_port: u16,
    /// Bound on the start barrier. Unset waits indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barrier_timeout_ms: Option<u64>,
    pub completion_timeout_ms: u64,
    /// Time participants keep running after the completion wait.
    pub drain_grace_ms: u64,
    /// Pause between terminating participants and reading their output.
    pub settle_ms: u64,
    /// How long to wait for exit statuses after termination.
    pub exit_wait_ms: u64,
    /// Check delivery logs after each run.
    pub validate: bool,
    pub tuning: ProtocolTuning,
    pub fault: FaultConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub netem: Option<NetemProfile>,
    pub sweep: SweepGrid,
    pub log: LogConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            processes: 3,
            messages: 100,
            broadcast: BroadcastKind::Fifo,
            runscript: None,
            logs_dir: PathBuf::from("logs"),
            dependencies: None,
            barrier_addr: SocketAddr::from(([127, 0, 0, 1], 10000)),
            signal_addr: SocketAddr::from(([127, 0, 0, 1], 11000)),
            base_port: DEFAULT_BASE_PORT,
            barrier_timeout_ms: None,
            completion_timeout_ms: 1000,
            drain_grace_ms: 10_000,
            settle_ms: 3000,
            exit_wait_ms: 5000,
            validate: true,
            tuning: ProtocolTuning::default(),
            fault: FaultConfig::default(),
            netem: None,
            sweep: SweepGrid::default(),
            log: LogConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms)
    }

    pub fn barrier_timeout(&self) -> Option<Duration> {
        self.barrier_timeout_ms.map(Duration::from_millis)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn exit_wait(&self) -> Duration {
        Duration::from_millis(self.exit_wait_ms)
    }

    pub fn require_runscript(&self) -> Result<&Path, ConfigError> {
        self.runscript.as_deref().ok_or(ConfigError::Missing("runscript"))
    }

    /// Reject settings that would fail a run before anything is started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processes == 0 {
            return Err(ConfigError::Invalid("processes must be at least 1".into()));
        }
        if self.completion_timeout_ms == 0 {
            return Err(ConfigError::Invalid("completion_timeout_ms must be positive".into()));
        }
        if self.barrier_addr == self.signal_addr && self.barrier_addr.port() != 0 {
            return Err(ConfigError::Invalid(format!(
                "barrier and signal share address {}",
                self.barrier_addr
            )));
        }
        if !self.logs_dir.is_dir() {
            return Err(ConfigError::NotADirectory(self.logs_dir.clone()));
        }
        if self.broadcast == BroadcastKind::Causal && self.dependencies.is_none() {
            return Err(ConfigError::Missing("dependencies"));
        }
        self.fault.validate()?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, key)).ok()
}

/// Overwrite `slot` with the parsed env value, if present and valid.
fn apply_parsed<T: FromStr>(key: &str, slot: &mut T) {
    if let Some(parsed) = env_var(key).and_then(|v| v.trim().parse().ok()) {
        *slot = parsed;
    }
}

fn apply_env(config: &mut HarnessConfig) {
    apply_parsed("BARRIER_ADDR", &mut config.barrier_addr);
    apply_parsed("SIGNAL_ADDR", &mut config.signal_addr);
    apply_parsed("PROCESSES", &mut config.processes);
    apply_parsed("MESSAGES", &mut config.messages);
    apply_parsed("COMPLETION_TIMEOUT_MS", &mut config.completion_timeout_ms);
    apply_parsed("FAULT_CONCURRENCY", &mut config.fault.concurrency);
    apply_parsed("FAULT_ATTEMPTS", &mut config.fault.attempts);
    apply_parsed("LOG_FORMAT", &mut config.log.format);
    if let Some(level) = env_var("LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
        config.log.level = level;
    }
}

/// Parse a TOML document on top of the defaults.
pub fn from_toml(contents: &str, origin: &Path) -> Result<HarnessConfig, ConfigError> {
    toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: origin.to_path_buf(),
        source,
    })
}

/// Load defaults, overlay `path` if given, then overlay the environment.
pub fn load(path: Option<&Path>) -> Result<HarnessConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            from_toml(&contents, path)?
        }
        None => HarnessConfig::default(),
    };
    apply_env(&mut config);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::LogFormat;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "BCAST_HARNESS_BARRIER_ADDR",
        "BCAST_HARNESS_SIGNAL_ADDR",
        "BCAST_HARNESS_PROCESSES",
        "BCAST_HARNESS_MESSAGES",
        "BCAST_HARNESS_COMPLETION_TIMEOUT_MS",
        "BCAST_HARNESS_FAULT_CONCURRENCY",
        "BCAST_HARNESS_FAULT_ATTEMPTS",
        "BCAST_HARNESS_LOG_LEVEL",
        "BCAST_HARNESS_LOG_FORMAT",
    ];

    fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_default_run_shape() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load(None).unwrap();
        assert_eq!(cfg.barrier_addr.port(), 10000);
        assert_eq!(cfg.signal_addr.port(), 11000);
        assert_eq!(cfg.base_port, 11000);
        assert_eq!(cfg.completion_timeout(), Duration::from_secs(1));
        assert_eq!(cfg.drain_grace(), Duration::from_secs(10));
        assert_eq!(cfg.settle(), Duration::from_secs(3));
        assert!(!cfg.fault.is_enabled());
        assert_eq!(cfg.fault.jitter_min_ms, 50);
        assert_eq!(cfg.fault.jitter_max_ms, 500);
        assert_eq!(cfg.barrier_timeout(), None);
    }

    #[test]
    fn test_env_vars_override_file() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.toml");
        std::fs::write(&path, "processes = 4\nmessages = 10\n[fault]\nconcurrency = 1\n").unwrap();

        std::env::set_var("BCAST_HARNESS_PROCESSES", "7");
        std::env::set_var("BCAST_HARNESS_SIGNAL_ADDR", "127.0.0.1:12345");
        std::env::set_var("BCAST_HARNESS_LOG_FORMAT", "json");
        let cfg = load(Some(&path)).unwrap();
        assert_eq!(cfg.processes, 7);
        assert_eq!(cfg.messages, 10);
        assert_eq!(cfg.fault.concurrency, 1);
        assert_eq!(cfg.signal_addr.port(), 12345);
        assert_eq!(cfg.log.format, LogFormat::Json);
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_keeps_previous_value() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("BCAST_HARNESS_PROCESSES", "many");
        std::env::set_var("BCAST_HARNESS_BARRIER_ADDR", "nowhere");
        std::env::set_var("BCAST_HARNESS_LOG_FORMAT", "xml");
        let cfg = load(None).unwrap();
        assert_eq!(cfg.processes, 3);
        assert_eq!(cfg.barrier_addr.port(), 10000);
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        clear_env_vars();
    }

    #[test]
    fn test_bad_file_is_reported() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "processes = \"three\"\n").unwrap();
        assert!(matches!(load(Some(&path)), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            load(Some(&dir.path().join("absent.toml"))),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = HarnessConfig {
            logs_dir: dir.path().to_path_buf(),
            ..HarnessConfig::default()
        };
        assert!(cfg.validate().is_ok());

        cfg.fault.concurrency = 2;
        cfg.fault.attempts = 3;
        cfg.fault.weights = crate::fault::OperationWeights::new(0.5, 0.6, 0.0);
        assert!(matches!(cfg.validate(), Err(ConfigError::Fault(_))));

        let cfg = HarnessConfig {
            logs_dir: dir.path().join("missing"),
            ..HarnessConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::NotADirectory(_))));

        let cfg = HarnessConfig {
            logs_dir: dir.path().to_path_buf(),
            broadcast: BroadcastKind::Causal,
            ..HarnessConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Missing("dependencies"))));
    }

    #[test]
    fn test_rendered_toml_loads_back() {
        let cfg = HarnessConfig {
            runscript: Some(PathBuf::from("/opt/proto/run.sh")),
            ..HarnessConfig::default()
        };
        let text = cfg.to_toml().unwrap();
        let back = from_toml(&text, Path::new("rendered.toml")).unwrap();
        assert_eq!(back.runscript, cfg.runscript);
        assert_eq!(back.tuning, cfg.tuning);
        assert_eq!(back.sweep, cfg.sweep);
        assert_eq!(back.fault.weights, cfg.fault.weights);
    }
}
