// Copyright 2024-2026 bcast-harness Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommands for the harness binary.
//!
//! ## Usage
//!
//! ```bash
//! bcast-harness run -r ./proto/run.sh -b fifo -l ./logs -p 5 -m 100
//! bcast-harness sweep --config harness.toml
//! bcast-harness validate -b fifo -l ./logs -p 5 -m 100
//! bcast-harness membership 5 2 --output membership
//! bcast-harness config show
//! ```

pub mod args;
pub mod config_cmd;
pub mod membership_cmd;
pub mod run_cmd;
pub mod validate_cmd;

pub use args::{CliOptions, ParseError};

/// Run finished and every check passed.
pub const EXIT_SUCCESS: i32 = 0;
/// Run failed, timed out, or a log failed validation.
pub const EXIT_FAILURE: i32 = 1;
/// Configuration rejected before anything was started.
pub const EXIT_CONFIG: i32 = 2;

/// Load configuration for a subcommand and apply its command-line overrides.
pub fn load_config(options: &CliOptions) -> Result<crate::config::HarnessConfig, crate::config::ConfigError> {
    let mut config = crate::config::load(options.config_path.as_deref())?;
    options.apply(&mut config);
    Ok(config)
}

/// Install logging from configuration. Failures are reported, not fatal.
pub fn init_logging(config: &crate::config::HarnessConfig) {
    if let Err(e) = crate::telemetry::init_logging(&config.log) {
        eprintln!("Logging disabled: {}", e);
    }
}

/// Print a serializable value as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            EXIT_SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to render report: {}", e);
            EXIT_FAILURE
        }
    }
}
