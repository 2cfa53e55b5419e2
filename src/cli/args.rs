// Copyright 2024-2026 bcast-harness Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared option parsing for the run, sweep and validate subcommands.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::HarnessConfig;
use crate::validate::BroadcastKind;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Missing value for {0}")]
    MissingValue(String),

    #[error("Invalid value `{value}` for {flag}")]
    InvalidValue { flag: String, value: String },

    #[error("Unknown argument: {0}")]
    Unknown(String),
}

/// Command-line overrides. Anything left `None` keeps the configured value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOptions {
    pub config_path: Option<PathBuf>,
    pub runscript: Option<PathBuf>,
    pub broadcast: Option<BroadcastKind>,
    pub logs_dir: Option<PathBuf>,
    pub processes: Option<u32>,
    pub messages: Option<u64>,
    pub dependencies: Option<PathBuf>,
    pub json: bool,
    pub fail_fast: bool,
}

impl CliOptions {
    /// Parse options following the subcommand name.
    pub fn parse(args: &[String]) -> Result<Self, ParseError> {
        let mut options = Self::default();
        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--json" => options.json = true,
                "--fail-fast" => options.fail_fast = true,
                "-c" | "--config" => options.config_path = Some(value(args, i)?.into()),
                "-r" | "--runscript" => options.runscript = Some(value(args, i)?.into()),
                "-l" | "--logs" => options.logs_dir = Some(value(args, i)?.into()),
                "-d" | "--dependencies" => options.dependencies = Some(value(args, i)?.into()),
                "-b" | "--broadcast" => options.broadcast = Some(parsed(args, i)?),
                "-p" | "--processes" => options.processes = Some(parsed(args, i)?),
                "-m" | "--messages" => options.messages = Some(parsed(args, i)?),
                _ => return Err(ParseError::Unknown(flag.to_string())),
            }
            i += if takes_value(flag) { 2 } else { 1 };
        }
        Ok(options)
    }

    pub fn apply(&self, config: &mut HarnessConfig) {
        if let Some(path) = &self.runscript {
            config.runscript = Some(path.clone());
        }
        if let Some(kind) = self.broadcast {
            config.broadcast = kind;
        }
        if let Some(dir) = &self.logs_dir {
            config.logs_dir = dir.clone();
        }
        if let Some(n) = self.processes {
            config.processes = n;
        }
        if let Some(m) = self.messages {
            config.messages = m;
        }
        if let Some(path) = &self.dependencies {
            config.dependencies = Some(path.clone());
        }
    }
}

fn takes_value(flag: &str) -> bool {
    !matches!(flag, "--json" | "--fail-fast")
}

fn value(args: &[String], i: usize) -> Result<&str, ParseError> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| ParseError::MissingValue(args[i].clone()))
}

fn parsed<T: std::str::FromStr>(args: &[String], i: usize) -> Result<T, ParseError> {
    let raw = value(args, i)?;
    raw.parse().map_err(|_| ParseError::InvalidValue {
        flag: args[i].clone(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_short_and_long_flags() {
        let opts = CliOptions::parse(&strings(&[
            "-r", "proto/run.sh", "--broadcast", "lcausal", "-l", "logs", "-p", "5", "--messages", "100", "--json",
        ]))
        .unwrap();
        assert_eq!(opts.runscript, Some(PathBuf::from("proto/run.sh")));
        assert_eq!(opts.broadcast, Some(BroadcastKind::Causal));
        assert_eq!(opts.processes, Some(5));
        assert_eq!(opts.messages, Some(100));
        assert!(opts.json);
        assert!(!opts.fail_fast);
    }

    #[test]
    fn reports_missing_and_invalid_values() {
        assert_eq!(
            CliOptions::parse(&strings(&["-p"])),
            Err(ParseError::MissingValue("-p".into()))
        );
        assert!(matches!(
            CliOptions::parse(&strings(&["-p", "five"])),
            Err(ParseError::InvalidValue { .. })
        ));
        assert_eq!(
            CliOptions::parse(&strings(&["--verbose"])),
            Err(ParseError::Unknown("--verbose".into()))
        );
    }

    #[test]
    fn overrides_only_given_fields() {
        let mut config = HarnessConfig::default();
        let opts = CliOptions {
            processes: Some(9),
            ..CliOptions::default()
        };
        opts.apply(&mut config);
        assert_eq!(config.processes, 9);
        assert_eq!(config.messages, HarnessConfig::default().messages);
    }
}
