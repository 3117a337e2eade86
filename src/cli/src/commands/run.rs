//! `boxrun run` command - Validate, assemble, run and optionally export.

use std::path::PathBuf;

use boxrun_core::config::{OutputConfig, RunConfig, WorkDirMode};
use boxrun_runtime::{ExpectedDigest, LaunchRequest, Launcher};
use clap::Args;

use super::RuntimeArgs;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Image archive (tar.gz of a saved image)
    pub image: PathBuf,

    /// Expected sha256 of the decompressed archive, or `skip-sha256-validation`
    pub digest: String,

    /// Shell command to run in the container
    pub command: String,

    /// Container name (generated when omitted, required with --reentrant)
    #[arg(long)]
    pub name: Option<String>,

    /// Keep the working directory after the run
    #[arg(long, conflicts_with = "reentrant")]
    pub keep: bool,

    /// Reuse a named container and its working directory across invocations
    #[arg(long)]
    pub reentrant: bool,

    /// Share the host network namespace
    #[arg(long)]
    pub host_network: bool,

    /// Bind the current directory to /local-dir in the container
    #[arg(long)]
    pub bind_local_dir: bool,

    /// Allocate a terminal and connect stdin
    #[arg(short, long)]
    pub interactive: bool,

    /// Honour whiteout markers when applying layers
    #[arg(long)]
    pub apply_whiteouts: bool,

    /// Write the resulting root filesystem as a new image archive
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Repository tag recorded in the output image, can be repeated
    #[arg(short = 't', long = "tag", requires = "output")]
    pub tags: Vec<String>,

    /// Runtime config.json template to use instead of the built-in one
    #[arg(long)]
    pub config_template: Option<PathBuf>,

    #[command(flatten)]
    pub runtime: RuntimeArgs,
}

impl RunArgs {
    pub fn to_config(&self) -> RunConfig {
        let mode = if self.reentrant {
            WorkDirMode::Reentrant
        } else {
            WorkDirMode::Ephemeral { keep: self.keep }
        };

        RunConfig {
            name: self.name.clone(),
            mode,
            host_network: self.host_network,
            bind_local_dir: self.bind_local_dir,
            interactive: self.interactive,
            apply_whiteouts: self.apply_whiteouts,
            work_root: self.runtime.work_root(),
            config_template: self.config_template.clone(),
            runtime: self.runtime.runtime_config(),
            output: self.output.clone().map(|path| OutputConfig {
                path,
                repo_tags: self.tags.clone(),
            }),
        }
    }
}

pub fn execute(args: RunArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let request = LaunchRequest {
        image: args.image.clone(),
        expected_digest: args.digest.parse::<ExpectedDigest>()?,
        command: args.command.clone(),
    };
    let config = args.to_config();
    let keep = matches!(config.mode, WorkDirMode::Ephemeral { keep: true });

    let launcher = Launcher::with_runc(config);
    let outcome = launcher.launch(&request)?;

    if keep {
        if let Some(dir) = &outcome.retained_work_dir {
            eprintln!("Keeping working directory: {}", dir.display());
        }
    }
    if let Some(exported) = &outcome.exported {
        eprintln!("Wrote image {}", exported.path.display());
    }

    tracing::debug!(
        container = %outcome.name,
        phase = %outcome.phase,
        exit_code = outcome.exit_code,
        "Run finished"
    );
    Ok(outcome.exit_code)
}
