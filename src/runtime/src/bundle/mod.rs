//! Runtime bundle: the working directory and the runtime configuration
//! document the external runtime reads from it.

mod spec;
mod workdir;

pub use spec::{ProcessCommand, RuntimeSpec, SpecOptions, KEEP_ALIVE_SCRIPT, RUNTIME_CONFIG_FILE};
pub use workdir::{remove_dir, WorkDir, RUNTIME_LOG_FILE, WORK_DIR_PREFIX};
