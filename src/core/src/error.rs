use std::path::PathBuf;

use thiserror::Error;

/// boxrun error types
#[derive(Error, Debug)]
pub enum BoxError {
    /// Archive content does not hash to the expected digest
    #[error("Digest mismatch for {}: expected {expected}, got {actual}", .path.display())]
    DigestMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Expected digest is neither a sha256 hex string nor the skip sentinel
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    /// manifest.json must hold exactly one image entry
    #[error("Ambiguous manifest {}: expected 1 entry, found {count}", .path.display())]
    AmbiguousManifest { path: PathBuf, count: usize },

    /// Manifest references no layers
    #[error("Empty image: manifest {} lists no layers", .path.display())]
    EmptyImage { path: PathBuf },

    /// Manifest references a layer blob that is not in the archive
    #[error("Missing layer {layer}: {} does not exist", .path.display())]
    MissingLayer { layer: String, path: PathBuf },

    /// Tar entry of a type the extractor does not handle
    #[error("Unsupported tar entry type {entry_type} for {path}")]
    UnsupportedEntry { entry_type: String, path: String },

    /// Tar entry path escapes the extraction root
    #[error("Unsafe entry path: {0}")]
    UnsafeEntryPath(String),

    /// Deferred hard link could not be created after the stream was consumed
    #[error("Unresolved hard link {} -> {}: {reason}", .link.display(), .target.display())]
    UnresolvedHardLink {
        link: PathBuf,
        target: PathBuf,
        reason: String,
    },

    /// Archive encode/decode error
    #[error("Archive error: {0}")]
    ArchiveError(String),

    /// Runtime config template error
    #[error("Config template error: {0}")]
    ConfigTemplate(String),

    /// External runtime could not be invoked or reported a diagnostic
    #[error("Runtime error: {action} - {message}")]
    RuntimeError { action: String, message: String },

    /// External runtime exited with a non-zero code on a blocking step
    #[error("Runtime {action} exited with code {code}")]
    RuntimeFailed { action: String, code: i32 },

    /// Reentrant container exists but is not running
    #[error("Container {name} is in state '{status}', expected 'running'")]
    ContainerState { name: String, status: String },

    /// Reentrant mode was requested without a container name
    #[error("Reentrant mode requires a container name")]
    NameRequired,

    /// Container name unusable as a runtime ID or directory name
    #[error("Invalid container name: {0}")]
    InvalidName(String),

    /// Working directory error
    #[error("Working directory error: {0}")]
    WorkDirError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for BoxError {
    fn from(err: serde_json::Error) -> Self {
        BoxError::SerializationError(err.to_string())
    }
}

/// Result type alias for boxrun operations
pub type Result<T> = std::result::Result<T, BoxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_mismatch_display() {
        let error = BoxError::DigestMismatch {
            path: PathBuf::from("/images/alpine.tar.gz"),
            expected: "aaaa".to_string(),
            actual: "bbbb".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Digest mismatch for /images/alpine.tar.gz: expected aaaa, got bbbb"
        );
    }

    #[test]
    fn test_ambiguous_manifest_display() {
        let error = BoxError::AmbiguousManifest {
            path: PathBuf::from("manifest.json"),
            count: 2,
        };
        assert_eq!(
            error.to_string(),
            "Ambiguous manifest manifest.json: expected 1 entry, found 2"
        );
    }

    #[test]
    fn test_empty_image_display() {
        let error = BoxError::EmptyImage {
            path: PathBuf::from("manifest.json"),
        };
        assert_eq!(
            error.to_string(),
            "Empty image: manifest manifest.json lists no layers"
        );
    }

    #[test]
    fn test_unsupported_entry_display() {
        let error = BoxError::UnsupportedEntry {
            entry_type: "Fifo".to_string(),
            path: "dev/pipe".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Unsupported tar entry type Fifo for dev/pipe"
        );
    }

    #[test]
    fn test_unresolved_hard_link_display() {
        let error = BoxError::UnresolvedHardLink {
            link: PathBuf::from("/r/bin/b"),
            target: PathBuf::from("/r/bin/a"),
            reason: "No such file or directory".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Unresolved hard link /r/bin/b -> /r/bin/a: No such file or directory"
        );
    }

    #[test]
    fn test_runtime_failed_display() {
        let error = BoxError::RuntimeFailed {
            action: "run".to_string(),
            code: 2,
        };
        assert_eq!(error.to_string(), "Runtime run exited with code 2");
    }

    #[test]
    fn test_container_state_display() {
        let error = BoxError::ContainerState {
            name: "ci".to_string(),
            status: "stopped".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Container ci is in state 'stopped', expected 'running'"
        );
    }

    #[test]
    fn test_invalid_name_display() {
        let error = BoxError::InvalidName("a/b".to_string());
        assert_eq!(error.to_string(), "Invalid container name: a/b");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let box_error: BoxError = io_error.into();
        assert!(matches!(box_error, BoxError::IoError(_)));
        assert!(box_error.to_string().contains("file not found"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope");
        let box_error: BoxError = result.unwrap_err().into();
        assert!(matches!(box_error, BoxError::SerializationError(_)));
    }

    #[test]
    fn test_other_error_display() {
        let error = BoxError::Other("Unknown error occurred".to_string());
        assert_eq!(error.to_string(), "Unknown error occurred");
    }
}
