//! boxrun runtime - image archive engine and container lifecycle.
//!
//! This crate assembles a root filesystem from an image archive, writes the
//! runtime bundle around it, drives an external runc-compatible runtime and
//! can package the resulting filesystem as a new image.

#![allow(clippy::result_large_err)]

pub mod bundle;
pub mod launcher;
pub mod lifecycle;
pub mod name;
pub mod oci;
pub mod runc;

// Re-export common types
pub use bundle::{RuntimeSpec, SpecOptions, WorkDir};
pub use launcher::{LaunchOutcome, LaunchRequest, Launcher};
pub use lifecycle::{LifecycleController, Phase, StartAction};
pub use name::{generate_name, validate_name};
pub use oci::{
    digest_of_decompressed_tar, export_image, AssembledImage, ExpectedDigest, ExportedImage,
    ImageAssembler, WhiteoutPolicy,
};
pub use runc::{ContainerRuntime, ContainerState, ContainerStatus, RuncCli};

/// boxrun runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
