//! Install Alpine package bodies onto a pluggable filesystem.
//!
//! A package body is a gzip-compressed tar stream. This crate walks it once,
//! installs each entry of the data section through a [`fs::PackageFs`]
//! capability, and returns an ordered manifest in which every regular file
//! carries its `Q1` SHA-1 checksum, the form `apk-tools` records in its
//! installed database.
//!
//! # Modules
//!
//! - [`checksum`] - `Q1` checksums and the checksumming file writer
//! - [`config`] - Installer options loaded from TOML
//! - [`entry`] - Archive entries and the installation manifest
//! - [`error`] - Installation error taxonomy
//! - [`fs`] - Filesystem capability trait with real and in-memory backends
//! - [`gate`] - APKv1.0 data-section detection
//! - [`policy`] - Per-entry installation decisions
//! - [`walker`] - Archive walking and the [`walker::Installer`] entry point

pub mod checksum;
pub mod config;
pub mod entry;
pub mod error;
pub mod fs;
pub mod gate;
pub mod policy;
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
pub mod walker;

pub use checksum::Checksum;
pub use config::InstallOptions;
pub use entry::{ArchiveEntry, EntryKind, InstallManifest, InstalledEntry};
pub use error::{InstallError, Result};
pub use fs::PackageFs;
pub use walker::{Installer, install_package};
