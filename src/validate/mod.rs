//! Offline delivery-order checks over participant output logs.
//!
//! Each participant writes `procNN.output` with one `b`/`d` event per line.
//! [`FifoValidator`] checks per-sender order; [`CausalValidator`] also
//! checks that every delivery follows the messages it depends on.

mod causal;
mod dependencies;
mod event;
mod fifo;
mod verdict;

pub use causal::CausalValidator;
pub use dependencies::DependencyMap;
pub use event::{parse_line, parse_log, DeliveryLogEvent, LineParse, LogEntry, Seq};
pub use fifo::{check_fifo_log, FifoValidator};
pub use verdict::{ValidationSummary, ValidationVerdict, Violation, ViolationKind};

use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::participant::ParticipantId;

/// First port of the hosts file; participant `i` listens on `base + i`.
pub const DEFAULT_BASE_PORT: u16 = 11000;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("`{0}` is not a directory")]
    NotADirectory(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write temporary config: {0}")]
    TempFile(#[source] std::io::Error),

    #[error("Invalid dependency file: {0}")]
    Dependencies(String),

    #[error("Dependency file describes {actual} participants, run has {expected}")]
    DependencyMismatch { expected: u32, actual: u32 },

    #[error("Unknown broadcast type `{0}` (expected fifo or causal)")]
    UnknownKind(String),
}

/// Which ordering guarantee a run is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastKind {
    #[default]
    Fifo,
    Causal,
}

impl FromStr for BroadcastKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fifo" => Ok(Self::Fifo),
            "causal" | "lcausal" => Ok(Self::Causal),
            _ => Err(ValidationError::UnknownKind(s.to_string())),
        }
    }
}

impl std::fmt::Display for BroadcastKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fifo => f.write_str("fifo"),
            Self::Causal => f.write_str("causal"),
        }
    }
}

/// Shape of one run: how many participants, how many messages each
/// broadcasts, and where their logs land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    pub processes: u32,
    pub messages: u64,
    pub logs_dir: PathBuf,
    pub base_port: u16,
}

impl RunLayout {
    /// Fails if `logs_dir` is not an existing directory.
    pub fn new(
        processes: u32,
        messages: u64,
        logs_dir: impl Into<PathBuf>,
    ) -> Result<Self, ValidationError> {
        let logs_dir = logs_dir.into();
        if !logs_dir.is_dir() {
            return Err(ValidationError::NotADirectory(logs_dir));
        }
        Ok(Self {
            processes,
            messages,
            logs_dir,
            base_port: DEFAULT_BASE_PORT,
        })
    }

    pub fn with_base_port(mut self, base_port: u16) -> Self {
        self.base_port = base_port;
        self
    }

    pub fn log_path(&self, id: ParticipantId) -> PathBuf {
        id.output_path(&self.logs_dir)
    }

    /// `i localhost <base_port + i>` for every participant.
    pub fn hosts_contents(&self) -> String {
        ParticipantId::all(self.processes)
            .map(|id| format!("{} localhost {}\n", id, u32::from(self.base_port) + id.get()))
            .collect()
    }

    /// Read one participant's log. On failure the error comes back with the
    /// path so the caller can report it as a verdict.
    fn read_log(&self, id: ParticipantId) -> (PathBuf, std::io::Result<String>) {
        let path = self.log_path(id);
        let contents = std::fs::read_to_string(&path);
        (path, contents)
    }
}

/// Hosts and config files handed to every participant. Both are deleted
/// when this value is dropped.
#[derive(Debug)]
pub struct GeneratedConfig {
    hosts: NamedTempFile,
    config: NamedTempFile,
}

impl GeneratedConfig {
    fn create(hosts: &str, config: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            hosts: temp_file_with("hosts", hosts)?,
            config: temp_file_with("config", config)?,
        })
    }

    pub fn hosts_path(&self) -> &Path {
        self.hosts.path()
    }

    pub fn config_path(&self) -> &Path {
        self.config.path()
    }
}

fn temp_file_with(prefix: &str, contents: &str) -> Result<NamedTempFile, ValidationError> {
    let mut file = tempfile::Builder::new()
        .prefix(&format!("bcast-{}-", prefix))
        .tempfile()
        .map_err(ValidationError::TempFile)?;
    file.write_all(contents.as_bytes())
        .and_then(|()| file.flush())
        .map_err(ValidationError::TempFile)?;
    Ok(file)
}

/// Shared contract of the FIFO and causal checkers.
pub trait BroadcastValidation: Send + Sync {
    fn layout(&self) -> &RunLayout;

    fn kind(&self) -> BroadcastKind;

    /// Write the hosts and config files participants are launched with.
    fn generate_config(&self) -> Result<GeneratedConfig, ValidationError>;

    /// Check one participant's log. Ordering problems and unreadable logs
    /// are reported in the verdict.
    fn check_process(&self, id: ParticipantId) -> Result<ValidationVerdict, ValidationError>;

    /// Check every participant in id order. With `continue_on_error` false
    /// the walk stops at the first failing participant.
    fn check_all(&self, continue_on_error: bool) -> Result<ValidationSummary, ValidationError> {
        let mut summary = ValidationSummary::default();
        for id in ParticipantId::all(self.layout().processes) {
            let verdict = self.check_process(id)?;
            let failed = !verdict.passed();
            if let Some(violation) = &verdict.violation {
                tracing::warn!(participant = %id, kind = %self.kind(), "{}", violation);
            }
            summary.verdicts.push(verdict);
            if failed && !continue_on_error {
                summary.short_circuited = true;
                break;
            }
        }
        tracing::info!(
            kind = %self.kind(),
            checked = summary.verdicts.len(),
            passed = summary.passed(),
            "validation finished"
        );
        Ok(summary)
    }
}

/// Build the checker for `kind`. Causal checking needs the dependency map.
pub fn validator_for(
    kind: BroadcastKind,
    layout: RunLayout,
    dependencies: Option<DependencyMap>,
) -> Result<Box<dyn BroadcastValidation>, ValidationError> {
    match kind {
        BroadcastKind::Fifo => Ok(Box::new(FifoValidator::new(layout))),
        BroadcastKind::Causal => {
            let deps = dependencies.ok_or_else(|| {
                ValidationError::Dependencies("causal validation needs a dependency file".into())
            })?;
            Ok(Box::new(CausalValidator::new(layout, deps)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(
            RunLayout::new(3, 10, &file),
            Err(ValidationError::NotADirectory(_))
        ));
        assert!(RunLayout::new(3, 10, dir.path()).is_ok());
    }

    #[test]
    fn hosts_lines_use_base_port() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RunLayout::new(2, 1, dir.path()).unwrap().with_base_port(12000);
        assert_eq!(layout.hosts_contents(), "1 localhost 12001\n2 localhost 12002\n");
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("FIFO".parse::<BroadcastKind>().unwrap(), BroadcastKind::Fifo);
        assert_eq!("lcausal".parse::<BroadcastKind>().unwrap(), BroadcastKind::Causal);
        assert!("total".parse::<BroadcastKind>().is_err());
    }

    #[test]
    fn causal_without_dependencies_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RunLayout::new(2, 1, dir.path()).unwrap();
        assert!(validator_for(BroadcastKind::Causal, layout, None).is_err());
    }
}
