// Copyright 2024-2026 bcast-harness Contributors
// SPDX-License-Identifier: Apache-2.0

//! `membership` subcommand: write a ring dependency file.

use std::path::PathBuf;

use super::{EXIT_CONFIG, EXIT_FAILURE, EXIT_SUCCESS};
use crate::membership::ring_dependencies;

/// `membership <processes> <dependencies> [--output PATH]`
pub fn run_membership(args: &[String]) -> i32 {
    let (Some(n), Some(k)) = (
        args.first().and_then(|s| s.parse::<u32>().ok()),
        args.get(1).and_then(|s| s.parse::<u32>().ok()),
    ) else {
        eprintln!("Usage: bcast-harness membership <processes> <dependencies> [--output PATH]");
        return EXIT_CONFIG;
    };

    let output = match args.get(2).map(String::as_str) {
        None => PathBuf::from("membership"),
        Some("--output") | Some("-o") => match args.get(3) {
            Some(path) => PathBuf::from(path),
            None => {
                eprintln!("Missing value for --output");
                return EXIT_CONFIG;
            }
        },
        Some(other) => {
            eprintln!("Unknown argument: {}", other);
            return EXIT_CONFIG;
        }
    };

    let map = match ring_dependencies(n, k) {
        Ok(map) => map,
        Err(e) => {
            eprintln!("{}", e);
            return EXIT_CONFIG;
        }
    };
    if let Err(e) = map.write(&output) {
        eprintln!("{}", e);
        return EXIT_FAILURE;
    }
    print!("{}", map.body());
    EXIT_SUCCESS
}
