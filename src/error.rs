//! Error types for package installation.
//!
//! Every failure is fatal to the installation call. Each variant names the
//! entry (or stream position) that caused it so the caller can report where
//! the walk stopped.

use camino::Utf8PathBuf;
use std::fmt;
use thiserror::Error;

/// The filesystem operation that failed while installing an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsOperation {
    /// Creating or truncating a regular file.
    CreateFile,
    /// Writing content into an opened file.
    WriteContent,
    /// Creating a directory and its missing ancestors.
    CreateDirectory,
    /// Creating a symbolic link.
    CreateSymlink,
    /// Creating a hard link.
    CreateHardlink,
}

impl fmt::Display for FsOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::CreateFile => "create file",
            Self::WriteContent => "write content for",
            Self::CreateDirectory => "create directory",
            Self::CreateSymlink => "create symlink",
            Self::CreateHardlink => "create hard link",
        };
        f.write_str(label)
    }
}

/// Errors that abort an installation.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The gzip layer or the tar structure is corrupt, or reading from the
    /// decompressed stream failed.
    #[error("malformed package stream at {location}")]
    StreamFormat {
        /// Where in the stream the failure occurred.
        location: String,
        /// The underlying decoder or parser error.
        #[source]
        source: std::io::Error,
    },

    /// A filesystem capability call failed.
    #[error("failed to {operation} {path}")]
    Io {
        /// The operation that was attempted.
        operation: FsOperation,
        /// Archive-relative path of the entry being installed.
        path: Utf8PathBuf,
        /// The error reported by the filesystem.
        #[source]
        source: std::io::Error,
    },

    /// The archive holds an entry type outside directory, regular file,
    /// symlink, and hard link.
    #[error("unsupported entry type {type_code:#04x} ('{}') for {path}", type_char(.type_code))]
    UnsupportedEntry {
        /// Archive-relative path of the rejected entry.
        path: Utf8PathBuf,
        /// The raw tar type flag.
        type_code: u8,
    },

    /// The stream ended before an entry's declared size was read.
    #[error("short content for {path}: expected {expected} bytes, got {actual}")]
    ShortContent {
        /// Archive-relative path of the truncated entry.
        path: Utf8PathBuf,
        /// Size declared by the entry header.
        expected: u64,
        /// Bytes actually copied before the stream ran dry.
        actual: u64,
    },
}

impl InstallError {
    /// Build a [`InstallError::StreamFormat`] for a failure that is not tied
    /// to a specific entry.
    pub(crate) fn stream(location: impl Into<String>, source: std::io::Error) -> Self {
        Self::StreamFormat {
            location: location.into(),
            source,
        }
    }

    /// Build an [`InstallError::Io`] for `path`.
    pub(crate) fn io(
        operation: FsOperation,
        path: impl Into<Utf8PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

fn type_char(code: &u8) -> char {
    char::from(*code)
}

/// Result type alias using [`InstallError`].
pub type Result<T> = std::result::Result<T, InstallError>;
