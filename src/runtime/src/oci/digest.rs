//! Content digests of tar.gz archives.
//!
//! The digest covers the decompressed tar stream, so recompressing identical
//! content at another gzip level leaves it unchanged.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::str::FromStr;

use boxrun_core::config::SKIP_DIGEST_SENTINEL;
use boxrun_core::error::{BoxError, Result};
use flate2::read::MultiGzDecoder;
use sha2::{Digest, Sha256};

/// Compute the lowercase hex SHA-256 of the decompressed content of a tar.gz file.
pub fn digest_of_decompressed_tar(archive_path: &Path) -> Result<String> {
    let file = File::open(archive_path).map_err(|e| {
        BoxError::ArchiveError(format!(
            "Failed to open archive for hashing {}: {}",
            archive_path.display(),
            e
        ))
    })?;

    let mut decoder = MultiGzDecoder::new(BufReader::new(file));
    let mut hasher = Sha256::new();
    io::copy(&mut decoder, &mut hasher).map_err(|e| {
        BoxError::ArchiveError(format!(
            "Failed to decompress {} for hashing: {}",
            archive_path.display(),
            e
        ))
    })?;

    Ok(hex::encode(hasher.finalize()))
}

/// Compute SHA256 digest of raw bytes.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Digest an inbound archive is expected to have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedDigest {
    /// Lowercase hex SHA-256 of the decompressed tar
    Sha256(String),
    /// Validation disabled through the sentinel value
    Skip,
}

impl ExpectedDigest {
    /// Hash `archive_path` and compare against the expectation.
    ///
    /// Returns the actual digest. With `Skip` the comparison is replaced by
    /// a warning carrying the actual value.
    pub fn verify(&self, archive_path: &Path) -> Result<String> {
        let actual = digest_of_decompressed_tar(archive_path)?;

        match self {
            ExpectedDigest::Skip => {
                tracing::warn!(
                    archive = %archive_path.display(),
                    actual = %actual,
                    "Continuing without digest validation ({})",
                    SKIP_DIGEST_SENTINEL
                );
            }
            ExpectedDigest::Sha256(expected) if *expected != actual => {
                return Err(BoxError::DigestMismatch {
                    path: archive_path.to_path_buf(),
                    expected: expected.clone(),
                    actual,
                });
            }
            ExpectedDigest::Sha256(_) => {
                tracing::info!(
                    archive = %archive_path.display(),
                    digest = %actual,
                    "Archive digest validated"
                );
            }
        }

        Ok(actual)
    }

    /// Whether validation is disabled.
    pub fn is_skip(&self) -> bool {
        matches!(self, ExpectedDigest::Skip)
    }
}

impl FromStr for ExpectedDigest {
    type Err = BoxError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == SKIP_DIGEST_SENTINEL {
            return Ok(ExpectedDigest::Skip);
        }

        let hex_part = s.strip_prefix("sha256:").unwrap_or(s);
        if hex_part.len() != 64 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(BoxError::InvalidDigest(format!(
                "expected 64 hex characters or '{}', got '{}'",
                SKIP_DIGEST_SENTINEL, s
            )));
        }

        Ok(ExpectedDigest::Sha256(hex_part.to_ascii_lowercase()))
    }
}

impl fmt::Display for ExpectedDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedDigest::Sha256(hex) => write!(f, "sha256:{}", hex),
            ExpectedDigest::Skip => write!(f, "{}", SKIP_DIGEST_SENTINEL),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    fn sample_tar() -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(7);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, "etc/alpine-release", &b"3.20.3\n"[..])
            .unwrap();
        builder.into_inner().unwrap()
    }

    fn write_gz(path: &Path, data: &[u8], level: Compression) {
        let mut encoder = GzEncoder::new(File::create(path).unwrap(), level);
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap();
    }

    #[test]
    fn test_digest_matches_decompressed_bytes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("layer.tar.gz");
        let tar = sample_tar();
        write_gz(&path, &tar, Compression::default());

        let digest = digest_of_decompressed_tar(&path).unwrap();

        assert_eq!(digest, sha256_bytes(&tar));
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_digest_invariant_to_compression_level() {
        let tmp = TempDir::new().unwrap();
        let fast = tmp.path().join("fast.tar.gz");
        let best = tmp.path().join("best.tar.gz");
        let tar = sample_tar();
        write_gz(&fast, &tar, Compression::fast());
        write_gz(&best, &tar, Compression::best());

        assert_ne!(std::fs::read(&fast).unwrap(), std::fs::read(&best).unwrap());
        assert_eq!(
            digest_of_decompressed_tar(&fast).unwrap(),
            digest_of_decompressed_tar(&best).unwrap()
        );
    }

    #[test]
    fn test_digest_covers_every_gzip_member() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("concatenated.tar.gz");
        let tar = sample_tar();
        let (head, tail) = tar.split_at(512);

        let mut bytes = Vec::new();
        for part in [head, tail] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(part).unwrap();
            bytes.extend(encoder.finish().unwrap());
        }
        std::fs::write(&path, bytes).unwrap();

        assert_eq!(digest_of_decompressed_tar(&path).unwrap(), sha256_bytes(&tar));
    }

    #[test]
    fn test_digest_rejects_non_gzip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plain.tar");
        std::fs::write(&path, sample_tar()).unwrap();

        assert!(digest_of_decompressed_tar(&path).is_err());
    }

    #[test]
    fn test_sha256_bytes() {
        assert_eq!(
            sha256_bytes(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_parse_expected_digest() {
        let hex = "2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824";
        let parsed: ExpectedDigest = hex.parse().unwrap();
        assert_eq!(parsed, ExpectedDigest::Sha256(hex.to_ascii_lowercase()));

        let prefixed: ExpectedDigest = format!("sha256:{}", hex.to_ascii_lowercase())
            .parse()
            .unwrap();
        assert_eq!(prefixed, parsed);

        let skip: ExpectedDigest = "skip-sha256-validation".parse().unwrap();
        assert!(skip.is_skip());
    }

    #[test]
    fn test_parse_expected_digest_invalid() {
        assert!(matches!(
            "abc".parse::<ExpectedDigest>(),
            Err(BoxError::InvalidDigest(_))
        ));
        assert!(matches!(
            "z".repeat(64).parse::<ExpectedDigest>(),
            Err(BoxError::InvalidDigest(_))
        ));
    }

    #[test]
    fn test_verify_mismatch_reports_both_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("image.tar.gz");
        write_gz(&path, &sample_tar(), Compression::default());
        let expected = ExpectedDigest::Sha256("0".repeat(64));

        match expected.verify(&path).unwrap_err() {
            BoxError::DigestMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, "0".repeat(64));
                assert_eq!(actual, sha256_bytes(&sample_tar()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_verify_skip_returns_actual() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("image.tar.gz");
        write_gz(&path, &sample_tar(), Compression::default());

        let actual = ExpectedDigest::Skip.verify(&path).unwrap();

        assert_eq!(actual, sha256_bytes(&sample_tar()));
    }
}
