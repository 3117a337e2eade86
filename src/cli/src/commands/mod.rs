//! CLI command definitions and dispatch.

mod digest;
mod rm;
mod run;

use std::path::PathBuf;

use boxrun_core::RuntimeConfig;
use clap::{ArgAction, Args, Parser, Subcommand};

/// boxrun - run a command in a container built from an image archive.
#[derive(Parser)]
#[command(name = "boxrun", version, about)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Run a command in a container built from an image archive
    Run(run::RunArgs),
    /// Print the digest `run` expects for an image archive
    Digest(digest::DigestArgs),
    /// Delete a reentrant container and its working directory
    Rm(rm::RmArgs),
}

/// Options locating the external runtime and working directories.
#[derive(Args, Debug, Clone)]
pub struct RuntimeArgs {
    /// Container runtime binary
    #[arg(long, default_value = boxrun_core::config::DEFAULT_RUNTIME_BINARY)]
    pub runtime: PathBuf,

    /// Argument passed to the runtime before the subcommand, can be repeated
    #[arg(long = "runtime-arg", allow_hyphen_values = true)]
    pub runtime_args: Vec<String>,

    /// Base directory for working directories [default: system temp dir]
    #[arg(long)]
    pub work_root: Option<PathBuf>,
}

impl RuntimeArgs {
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            binary: self.runtime.clone(),
            global_args: self.runtime_args.clone(),
        }
    }

    pub fn work_root(&self) -> PathBuf {
        self.work_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Dispatch a parsed CLI command, returning the process exit code.
pub fn dispatch(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    match cli.command {
        Command::Run(args) => run::execute(args),
        Command::Digest(args) => digest::execute(args),
        Command::Rm(args) => rm::execute(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_count() {
        let cli = Cli::try_parse_from(["boxrun", "-vv", "digest", "image.tar.gz"]).unwrap();
        assert_eq!(cli.verbose, 2);

        let cli = Cli::try_parse_from(["boxrun", "digest", "image.tar.gz"]).unwrap();
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_runtime_args() {
        let cli = Cli::try_parse_from([
            "boxrun",
            "rm",
            "ci",
            "--runtime",
            "/usr/local/bin/crun",
            "--runtime-arg",
            "--root",
            "--runtime-arg",
            "/run/user/1000/crun",
            "--work-root",
            "/var/tmp",
        ])
        .unwrap();

        let Command::Rm(args) = cli.command else {
            panic!("expected rm");
        };
        let runtime = args.runtime.runtime_config();
        assert_eq!(runtime.binary, PathBuf::from("/usr/local/bin/crun"));
        assert_eq!(runtime.global_args, vec!["--root", "/run/user/1000/crun"]);
        assert_eq!(args.runtime.work_root(), PathBuf::from("/var/tmp"));
    }

    #[test]
    fn test_runtime_defaults() {
        let cli = Cli::try_parse_from(["boxrun", "rm", "ci"]).unwrap();
        let Command::Rm(args) = cli.command else {
            panic!("expected rm");
        };
        assert_eq!(args.runtime.runtime, PathBuf::from("runc"));
        assert!(args.runtime.runtime_args.is_empty());
        assert_eq!(args.runtime.work_root(), std::env::temp_dir());
    }
}
