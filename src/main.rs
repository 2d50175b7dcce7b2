//! dagplan - Dependency-aware task planning

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = dagplan::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
