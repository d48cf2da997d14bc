//! Command-line interface
//!
//! A single command: run one query against the local store and print the
//! run summary as JSON.

mod args;
mod commands;
mod errors;
mod io;

pub use args::Cli;
pub use commands::{run_batch, Config};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response, RowPrinter};

/// Parse arguments and run
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_batch(&cli)
}
