//! Runledger CLI binary.
//!
//! Command-line interface for running modules and delivering their results.

use clap::Parser;
use runledger::cli::{build_logging_config, execute, exit_code, Cli};
use runledger::logging::init_logging;
use std::process;
use tracing::error;

fn main() {
    let cli = Cli::parse();

    let logging_config = build_logging_config(&cli);
    if let Err(e) = init_logging(&logging_config) {
        eprintln!("failed to initialize logging: {e}");
        process::exit(1);
    }

    match execute(&cli.command) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
        }
        Err(e) => {
            error!("command failed: {e}");
            eprintln!("error: {e}");
            process::exit(exit_code(&e));
        }
    }
}
