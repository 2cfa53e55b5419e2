// Copyright 2024-2026 bcast-harness Contributors
// SPDX-License-Identifier: Apache-2.0

//! `validate` subcommand: check existing delivery logs.

use super::{init_logging, load_config, print_json, CliOptions, EXIT_CONFIG, EXIT_FAILURE, EXIT_SUCCESS};
use crate::experiment::build_validator;

/// Returns 0 if every log passes, 1 on a violation, 2 on bad input.
pub fn run_validate(args: &[String]) -> i32 {
    let options = match CliOptions::parse(args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            return EXIT_CONFIG;
        }
    };
    let config = match load_config(&options) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return EXIT_CONFIG;
        }
    };
    init_logging(&config);

    let validator = match build_validator(&config) {
        Ok(validator) => validator,
        Err(e) => {
            eprintln!("{}", e);
            return EXIT_CONFIG;
        }
    };

    let summary = match validator.check_all(!options.fail_fast) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Validation could not complete: {}", e);
            return EXIT_FAILURE;
        }
    };

    if options.json {
        print_json(&summary);
    } else {
        for verdict in &summary.verdicts {
            match &verdict.violation {
                None => println!("Process {}: ok", verdict.participant),
                Some(violation) => println!("Process {}: {}", verdict.participant, violation),
            }
        }
    }

    if summary.passed() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    }
}
