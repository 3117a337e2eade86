//! Launcher - composes one invocation.
//!
//! Validates and assembles the image, writes the runtime configuration,
//! drives the lifecycle controller and, when requested, exports the
//! resulting root filesystem as a new image.

use std::path::{Path, PathBuf};

use boxrun_core::config::{RunConfig, WorkDirMode, GENERATED_NAME_LEN};
use boxrun_core::error::{BoxError, Result};

use crate::bundle::{remove_dir, RuntimeSpec, SpecOptions, WorkDir};
use crate::lifecycle::{LifecycleController, Phase, StartAction};
use crate::name::{generate_name, validate_name};
use crate::oci::{export_image, ExpectedDigest, ExportedImage, ImageAssembler, WhiteoutPolicy, ROOTFS_DIR};
use crate::runc::{ContainerRuntime, RuncCli};

/// One invocation's inputs besides the configuration.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Image archive (tar.gz)
    pub image: PathBuf,

    pub expected_digest: ExpectedDigest,

    /// Shell command run in the container
    pub command: String,
}

/// Result of a completed invocation.
#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    /// Container name used
    pub name: String,

    /// Exit code to surface to the caller
    pub exit_code: i32,

    /// Final lifecycle phase
    pub phase: Phase,

    /// Start decision of the reentrant path
    pub start: Option<StartAction>,

    /// Working directory left on disk, if any
    pub retained_work_dir: Option<PathBuf>,

    /// Output image, if one was requested
    pub exported: Option<ExportedImage>,
}

/// Runs images under a container runtime.
pub struct Launcher<R: ContainerRuntime> {
    config: RunConfig,
    runtime: R,
    assembler: ImageAssembler,
}

impl Launcher<RuncCli> {
    /// Launcher driving the runtime binary named in `config`.
    pub fn with_runc(config: RunConfig) -> Self {
        let runtime = RuncCli::new(&config.runtime);
        Self::new(config, runtime)
    }
}

impl<R: ContainerRuntime> Launcher<R> {
    pub fn new(config: RunConfig, runtime: R) -> Self {
        let whiteouts = if config.apply_whiteouts {
            WhiteoutPolicy::Apply
        } else {
            WhiteoutPolicy::Ignore
        };
        Self {
            config,
            runtime,
            assembler: ImageAssembler::new(whiteouts),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Run `request.command` in a container built from `request.image`.
    pub fn launch(&self, request: &LaunchRequest) -> Result<LaunchOutcome> {
        let name = self.container_name()?;
        tracing::info!(
            container = %name,
            image = %request.image.display(),
            mode = ?self.config.mode,
            "Launching container"
        );

        match self.config.mode {
            WorkDirMode::Ephemeral { keep } => self.launch_ephemeral(request, name, keep),
            WorkDirMode::Reentrant => self.launch_reentrant(request, name),
        }
    }

    /// Delete container `name` and remove its reentrant working directory.
    ///
    /// Returns whether the runtime knew the container.
    pub fn teardown(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        let existed = self.runtime.delete(name, true)?;
        let path = WorkDir::reentrant_path(&self.config.work_root, name);
        remove_dir(&path)?;

        tracing::info!(
            container = %name,
            existed,
            work_dir = %path.display(),
            "Tore down container"
        );
        Ok(existed)
    }

    fn container_name(&self) -> Result<String> {
        match &self.config.name {
            Some(name) => {
                validate_name(name)?;
                Ok(name.clone())
            }
            None if self.config.is_reentrant() => Err(BoxError::NameRequired),
            None => {
                let name = generate_name(GENERATED_NAME_LEN);
                tracing::info!(container = %name, "Using generated container name");
                Ok(name)
            }
        }
    }

    fn launch_ephemeral(&self, request: &LaunchRequest, name: String, keep: bool) -> Result<LaunchOutcome> {
        self.assembler.verify(&request.image, &request.expected_digest)?;

        let work_dir = WorkDir::ephemeral(&self.config.work_root, &name, keep)?;
        if keep {
            tracing::info!(path = %work_dir.path().display(), "Keeping working directory");
        }

        self.assembler.assemble(&request.image, work_dir.path())?;
        self.write_runtime_spec(work_dir.path(), &request.command)?;

        let mut controller = LifecycleController::new(&self.runtime, &name);
        let exit_code = controller.run_to_completion(work_dir.path(), self.config.interactive)?;
        let phase = controller.phase();

        let exported = self.export(&work_dir.rootfs())?;

        Ok(LaunchOutcome {
            name,
            exit_code,
            phase,
            start: None,
            retained_work_dir: work_dir.is_retained().then(|| work_dir.path().to_path_buf()),
            exported,
        })
    }

    fn launch_reentrant(&self, request: &LaunchRequest, name: String) -> Result<LaunchOutcome> {
        let work_path = WorkDir::reentrant_path(&self.config.work_root, &name);

        let mut controller = LifecycleController::new(&self.runtime, &name);
        let start = controller.ensure_running(|| self.prepare_reentrant(request, &name))?;
        let exit_code = controller.exec(&work_path, &request.command, self.config.interactive)?;
        let phase = controller.phase();

        let exported = self.export(&work_path.join(ROOTFS_DIR))?;

        Ok(LaunchOutcome {
            name,
            exit_code,
            phase,
            start: Some(start),
            retained_work_dir: Some(work_path),
            exported,
        })
    }

    /// Build the bundle of a reentrant container that does not exist yet.
    ///
    /// The image is validated and extracted only when no root filesystem is
    /// present. When assembly fails, a directory created here is removed
    /// again; in a reused directory only the partial rootfs is removed.
    fn prepare_reentrant(&self, request: &LaunchRequest, name: &str) -> Result<PathBuf> {
        let rootfs_ready = WorkDir::reentrant_path(&self.config.work_root, name)
            .join(ROOTFS_DIR)
            .is_dir();

        if !rootfs_ready {
            self.assembler.verify(&request.image, &request.expected_digest)?;
        }

        let work_dir = WorkDir::reentrant(&self.config.work_root, name)?;

        if rootfs_ready {
            tracing::info!(
                path = %work_dir.path().display(),
                "Root filesystem present, skipping extraction"
            );
        } else if let Err(e) = self.assembler.assemble(&request.image, work_dir.path()) {
            // A partial rootfs would be mistaken for a complete one next time.
            let leftover = if work_dir.was_created() {
                work_dir.path().to_path_buf()
            } else {
                work_dir.rootfs()
            };
            let cleanup = if work_dir.was_created() {
                work_dir.remove()
            } else {
                remove_dir(&leftover)
            };
            if let Err(cleanup) = cleanup {
                tracing::warn!(
                    path = %leftover.display(),
                    error = %cleanup,
                    "Failed to clean up after image assembly failed"
                );
            }
            return Err(e);
        }

        self.write_runtime_spec(work_dir.path(), &request.command)?;
        Ok(work_dir.path().to_path_buf())
    }

    fn write_runtime_spec(&self, dir: &Path, command: &str) -> Result<()> {
        let mut spec = RuntimeSpec::load_template(self.config.config_template.as_deref())?;
        spec.apply(&SpecOptions::from_config(&self.config, command)?)?;
        spec.write_to(dir)?;
        Ok(())
    }

    fn export(&self, rootfs: &Path) -> Result<Option<ExportedImage>> {
        match &self.config.output {
            Some(output) => export_image(rootfs, output).map(Some),
            None => Ok(None),
        }
    }
}
