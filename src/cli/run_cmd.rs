// Copyright 2024-2026 bcast-harness Contributors
// SPDX-License-Identifier: Apache-2.0

//! `run` and `sweep` subcommands.

use super::{init_logging, load_config, print_json, CliOptions, EXIT_CONFIG, EXIT_FAILURE, EXIT_SUCCESS};
use crate::experiment::{self, HarnessError};
use crate::netem::NetemGuard;
use crate::sweep;

fn exit_code_for(error: &HarnessError) -> i32 {
    if error.is_configuration() {
        EXIT_CONFIG
    } else {
        EXIT_FAILURE
    }
}

/// Run a single experiment with the configured tuning.
pub async fn run_single(args: &[String]) -> i32 {
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

    let netem = match config.netem.clone().map(NetemGuard::apply).transpose() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}", e);
            return EXIT_FAILURE;
        }
    };

    let result = experiment::run(&config, config.tuning).await;
    drop(netem);

    match result {
        Ok(report) => {
            if options.json {
                print_json(&report);
            } else {
                print_summary(&report);
            }
            if report.succeeded() {
                EXIT_SUCCESS
            } else {
                EXIT_FAILURE
            }
        }
        Err(e) => {
            eprintln!("Run failed: {}", e);
            exit_code_for(&e)
        }
    }
}

/// Run the configured parameter grid.
pub async fn run_sweep(args: &[String]) -> i32 {
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

    match sweep::run_sweep(&config).await {
        Ok(report) => {
            if options.json {
                return print_json(&report);
            }
            match &report.best.by_delivered {
                Some(best) => println!("Best delivered: {:.1} ({})", best.value, best.tuning),
                None => println!("Best delivered: none"),
            }
            match &report.best.by_finish {
                Some(best) => println!("Best finish time: {:.1} ms ({})", best.value, best.tuning),
                None => println!("Best finish time: none"),
            }
            EXIT_SUCCESS
        }
        Err(e) => {
            eprintln!("Sweep failed: {}", e);
            exit_code_for(&e)
        }
    }
}

fn print_summary(report: &experiment::ExperimentReport) {
    println!("Tuning: {}", report.tuning);
    for (id, ms) in &report.finish_times {
        println!("Process {} finished in {} ms", id, ms);
    }
    println!("Average time to finished broadcast: {}", report.average_finish);
    for (id, count) in &report.delivered {
        match count {
            Some(count) => println!("Process {} delivered {} messages", id, count),
            None => println!("Process {} reported no delivered count", id),
        }
    }
    if let Some(avg) = report.average_delivered() {
        println!("Average number of delivered messages: {:.1}", avg);
    }
    for (id, status) in &report.exit_statuses {
        println!(
            "Process {} exited with {}",
            id,
            status.as_deref().unwrap_or("no status (still running)")
        );
    }
    if let Some(validation) = &report.validation {
        for verdict in validation.failures() {
            if let Some(violation) = &verdict.violation {
                println!("{}", violation);
            }
        }
        println!(
            "Validation: {}",
            if validation.passed() { "passed" } else { "FAILED" }
        );
    }
}
