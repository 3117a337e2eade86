//! `boxrun rm` command - Delete a reentrant container.

use boxrun_core::config::{RunConfig, WorkDirMode};
use boxrun_runtime::Launcher;
use clap::Args;

use super::RuntimeArgs;

#[derive(Args, Debug)]
pub struct RmArgs {
    /// Container name
    pub name: String,

    #[command(flatten)]
    pub runtime: RuntimeArgs,
}

pub fn execute(args: RmArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = RunConfig {
        name: Some(args.name.clone()),
        mode: WorkDirMode::Reentrant,
        work_root: args.runtime.work_root(),
        runtime: args.runtime.runtime_config(),
        ..Default::default()
    };

    let existed = Launcher::with_runc(config).teardown(&args.name)?;
    if !existed {
        tracing::warn!(container = %args.name, "No such container, removed working directory only");
    }
    println!("{}", args.name);
    Ok(0)
}
