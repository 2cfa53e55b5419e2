//! bcast-harness entry point.
//!
//! ## CLI Subcommands
//!
//! - `bcast-harness run` - One experiment with the configured tuning
//! - `bcast-harness sweep` - Grid search over protocol tuning
//! - `bcast-harness validate` - Check existing delivery logs (exit 0/1/2)
//! - `bcast-harness membership N K` - Write a ring dependency file
//! - `bcast-harness config show|defaults|validate`

use std::process::ExitCode;

use bcast_harness::cli::{config_cmd, membership_cmd, run_cmd, validate_cmd, EXIT_CONFIG};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1).map(|s| s.as_str()) else {
        print_usage();
        return ExitCode::from(EXIT_CONFIG as u8);
    };
    let rest = args.get(2..).unwrap_or_default();

    let code = match command {
        "run" => run_cmd::run_single(rest).await,
        "sweep" => run_cmd::run_sweep(rest).await,
        "validate" => validate_cmd::run_validate(rest),
        "membership" => membership_cmd::run_membership(rest),
        "config" => {
            let subcommand = rest.first().map(|s| s.as_str()).unwrap_or("show");
            let options = rest.get(1..).unwrap_or_default();
            match subcommand {
                "show" => config_cmd::run_show(options),
                "defaults" => config_cmd::run_defaults(),
                "validate" => config_cmd::run_validate(options),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    EXIT_CONFIG
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = rest.first() {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            0
        }
        "version" | "--version" | "-V" => {
            println!("bcast-harness {}", env!("CARGO_PKG_VERSION"));
            0
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            EXIT_CONFIG
        }
    };
    ExitCode::from(code as u8)
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "bcast-harness - test harness for broadcast protocol implementations v{}

USAGE:
    bcast-harness <COMMAND> [OPTIONS]

COMMANDS:
    run          Launch participants once, inject faults, validate logs
    sweep        Run the tuning grid and report the best points
    validate     Check delivery logs already on disk
    membership   Write a ring dependency file for causal broadcast
    config       Show or validate configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

OPTIONS (run, sweep, validate, config):
    -c, --config FILE        Load configuration from a TOML file
    -r, --runscript PATH     Participant runscript (run.sh)
    -b, --broadcast KIND     fifo or causal
    -l, --logs DIR           Directory for delivery logs and captures
    -p, --processes N        Number of participants
    -m, --messages M         Messages broadcast by each participant
    -d, --dependencies FILE  Causal dependency file
    --json                   Print the report as JSON
    --fail-fast              Stop validation at the first failing log

ENVIRONMENT:
    BCAST_HARNESS_*      Override configuration keys (see `config show`)
    RUST_LOG             tracing filter, overrides the configured level

EXIT CODES:
    0  Success
    1  Run failed, did not finish, or a log failed validation
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "run" => {
            eprintln!(
                "bcast-harness run - Run one experiment

USAGE:
    bcast-harness run -r RUNSCRIPT [OPTIONS]

DESCRIPTION:
    Starts the start barrier and the completion signal, launches every
    participant through the runscript, waits for all of them to register,
    then injects STOP/CONT/TERM faults if fault.concurrency > 0. After the
    completion bound the remaining participants are terminated and every
    delivery log is validated.

    A [netem] table in the config applies traffic shaping on the loopback
    interface for the duration of the run.

EXAMPLES:
    bcast-harness run -r ./proto/run.sh -b fifo -l ./logs -p 5 -m 100
    bcast-harness run -c harness.toml --json
"
            );
        }
        "sweep" => {
            eprintln!(
                "bcast-harness sweep - Grid search over protocol tuning

USAGE:
    bcast-harness sweep -c FILE [OPTIONS]

DESCRIPTION:
    Runs every point of the [sweep] grid `repetitions` times and reports
    the point with the highest mean delivered count and the point with
    the lowest mean finish time.
"
            );
        }
        "validate" => {
            eprintln!(
                "bcast-harness validate - Check delivery logs

USAGE:
    bcast-harness validate -b KIND -l DIR -p N -m M [-d FILE] [--fail-fast]

DESCRIPTION:
    Reads procNN.output for every participant and checks FIFO or causal
    delivery order. Exit 0 if every log passes, 1 otherwise.
"
            );
        }
        "membership" => {
            eprintln!(
                "bcast-harness membership - Write a ring dependency file

USAGE:
    bcast-harness membership N K [--output PATH]

DESCRIPTION:
    Participant i depends on the K participants that follow it around
    the ring. Writes to ./membership unless --output is given.
"
            );
        }
        "config" => {
            eprintln!(
                "bcast-harness config - Manage configuration

USAGE:
    bcast-harness config <SUBCOMMAND> [OPTIONS]

SUBCOMMANDS:
    show       Print the effective configuration as TOML
    defaults   Print built-in defaults as TOML
    validate   Check the effective configuration (exit 0 or 2)
"
            );
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
        }
    }
}
