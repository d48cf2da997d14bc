//! batchread CLI entry point
//!
//! Parses nothing and opens nothing itself: everything is delegated to the
//! CLI module. Errors go to stderr and the process exits non-zero.

use batchread::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
