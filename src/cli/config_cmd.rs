// Copyright 2024-2026 bcast-harness Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.

use super::{load_config, CliOptions, EXIT_CONFIG, EXIT_FAILURE, EXIT_SUCCESS};
use crate::config::HarnessConfig;

/// Print the effective configuration (file + env + flags) as TOML.
pub fn run_show(args: &[String]) -> i32 {
    let config = match CliOptions::parse(args).map_err(|e| e.to_string()).and_then(|o| {
        load_config(&o).map_err(|e| e.to_string())
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return EXIT_CONFIG;
        }
    };
    print_toml(&config)
}

/// Print built-in defaults as TOML, ignoring files and environment.
pub fn run_defaults() -> i32 {
    print_toml(&HarnessConfig::default())
}

/// Returns 0 if the effective configuration is usable, 2 otherwise.
pub fn run_validate(args: &[String]) -> i32 {
    let options = match CliOptions::parse(args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            return EXIT_CONFIG;
        }
    };
    let checked = load_config(&options).and_then(|config| {
        config.validate()?;
        config.sweep.validate()?;
        Ok(config)
    });
    match checked {
        Ok(config) => {
            if config.runscript.is_none() {
                eprintln!("WARNING: no runscript configured; only `validate` will work");
            }
            println!("Configuration is valid.");
            EXIT_SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            EXIT_CONFIG
        }
    }
}

fn print_toml(config: &HarnessConfig) -> i32 {
    match config.to_toml() {
        Ok(text) => {
            print!("{}", text);
            EXIT_SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            EXIT_FAILURE
        }
    }
}
