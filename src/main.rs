//! memocache - maintenance binary for memocache stores.

use clap::Parser;
use std::process::ExitCode;

use memocache::cli::Commands;
use memocache::logging;

fn main() -> ExitCode {
    // Parse command line arguments
    let args = Commands::parse();

    // Initialize logging; the guard flushes the file writer on exit
    let _guard = match logging::init(args.verbose) {
        Ok((guard, _)) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match args.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
