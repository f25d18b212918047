//! Binary entry point for the relay daemon.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use relayd::cli::Args;

fn main() -> ExitCode {
    let args = Args::parse();
    match relayd::run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(launch_error) => {
            error!(error = %launch_error, "daemon failed");
            ExitCode::FAILURE
        }
    }
}
