//! Image archive engine.
//!
//! Inbound, an image archive is validated against its expected digest,
//! extracted, and its layers are applied in manifest order onto a root
//! filesystem. Outbound, a root filesystem is packaged back into a
//! single-layer archive with content-addressed blob names.
//!
//! # Archive layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  image.tar.gz                                 │
//! │  ├── manifest.json   [{Config, RepoTags,      │
//! │  │                     Layers}]               │
//! │  ├── <digest>.json   (image configuration)    │
//! │  └── <digest>.tar.gz (layers, bottom to top)  │
//! └──────────────────────────────────────────────┘
//! ```

pub mod archive;
pub mod digest;
mod export;
mod image;
pub mod manifest;

pub use archive::{ExtractStats, WhiteoutPolicy};
pub use digest::{digest_of_decompressed_tar, sha256_bytes, ExpectedDigest};
pub use export::{export_image, ExportedImage, DEFAULT_PATH_ENV};
pub use image::{AssembledImage, ImageAssembler, IMAGE_DIR, ROOTFS_DIR};
pub use manifest::{ManifestEntry, MANIFEST_FILE};
