//! boxrun Core - Foundational Types
//!
//! Error taxonomy and the immutable invocation configuration shared by the
//! runtime engine and the command line.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{LogLevel, OutputConfig, RunConfig, RuntimeConfig, WorkDirMode};
pub use error::{BoxError, Result};

/// boxrun version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
