//! boxrun CLI entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use boxrun_cli::commands::{dispatch, Cli};
use boxrun_core::LogLevel;

fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over -v; logs go to stderr so container output stays clean.
    let level = LogLevel::from_verbosity(cli.verbose);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter())),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match dispatch(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
