//! Content checksums in the `apk-tools` `Q1` format.
//!
//! A checksum is the SHA-1 digest of a file's exact content, rendered as the
//! literal tag `Q1` followed by the standard padded base64 encoding of the
//! 20 digest bytes. [`write_checksummed`] produces one while streaming an
//! entry's content to disk, so each byte is read exactly once.

use crate::error::{FsOperation, InstallError, Result};
use crate::fs::PackageFs;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use camino::Utf8Path;
use sha1::{Digest, Sha1};
use std::fmt;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::str::FromStr;
use thiserror::Error;

/// Tag that prefixes every rendered checksum.
pub const CHECKSUM_TAG: &str = "Q1";

/// Attribute key under which `apk-tools` stores the rendered checksum.
pub const CHECKSUM_ATTRIBUTE_KEY: &str = "APK-TOOLS.checksum.SHA1";

/// Length of a SHA-1 digest in bytes.
const DIGEST_LEN: usize = 20;

/// A SHA-1 content digest.
///
/// # Examples
///
/// ```
/// use apk_install::checksum::Checksum;
///
/// let checksum = Checksum::of(b"hi");
/// assert_eq!(checksum.to_string(), "Q1witfkXg0JglCjW9RssWvTAveakI=");
/// assert_eq!("Q1witfkXg0JglCjW9RssWvTAveakI=".parse::<Checksum>().unwrap(), checksum);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; DIGEST_LEN]);

impl Checksum {
    /// Compute the checksum of `content`.
    #[must_use]
    pub fn of(content: &[u8]) -> Self {
        Self(Sha1::digest(content).into())
    }

    /// Return the raw digest bytes.
    #[must_use]
    pub const fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl From<[u8; DIGEST_LEN]> for Checksum {
    fn from(digest: [u8; DIGEST_LEN]) -> Self {
        Self(digest)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CHECKSUM_TAG}{}", STANDARD.encode(self.0))
    }
}

/// Errors arising from parsing a rendered checksum.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChecksumParseError {
    /// The value does not start with the `Q1` tag.
    #[error("checksum \"{value}\" does not start with Q1")]
    MissingTag {
        /// The rejected value.
        value: String,
    },

    /// The payload is not valid standard base64.
    #[error("invalid base64 in checksum: {reason}")]
    InvalidBase64 {
        /// Description of the decoding failure.
        reason: String,
    },

    /// The payload decodes to the wrong number of bytes.
    #[error("checksum digest must be 20 bytes, got {actual}")]
    WrongLength {
        /// Decoded length.
        actual: usize,
    },
}

impl FromStr for Checksum {
    type Err = ChecksumParseError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let payload = value
            .strip_prefix(CHECKSUM_TAG)
            .ok_or_else(|| ChecksumParseError::MissingTag {
                value: value.to_owned(),
            })?;
        let bytes = STANDARD
            .decode(payload)
            .map_err(|err| ChecksumParseError::InvalidBase64 {
                reason: err.to_string(),
            })?;
        let actual = bytes.len();
        let digest: [u8; DIGEST_LEN] = bytes
            .try_into()
            .map_err(|_| ChecksumParseError::WrongLength { actual })?;
        Ok(Self(digest))
    }
}

/// Create or truncate `path` with `mode` and copy exactly `size` bytes from
/// `reader` into it, returning the checksum of the copied bytes.
///
/// The file handle is dropped before returning, on success and on failure.
///
/// # Errors
///
/// Returns [`InstallError::Io`] if the file cannot be created or written,
/// [`InstallError::StreamFormat`] if reading fails, and
/// [`InstallError::ShortContent`] if `reader` ends, cleanly or with
/// [`ErrorKind::UnexpectedEof`], before `size` bytes.
pub fn write_checksummed<F, R>(
    fs: &F,
    path: &Utf8Path,
    mode: u32,
    size: u64,
    reader: &mut R,
    buffer_size: usize,
) -> Result<Checksum>
where
    F: PackageFs + ?Sized,
    R: Read + ?Sized,
{
    let mut file = fs
        .open_for_create(path, mode)
        .map_err(|err| InstallError::io(FsOperation::CreateFile, path, err))?;
    let mut hasher = Sha1::new();
    let mut source = BufReader::with_capacity(buffer_size.max(1), (&mut *reader).take(size));
    let mut copied: u64 = 0;

    loop {
        let data = match source.fill_buf() {
            Ok([]) => break,
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            // A gzip member cut short mid-entry surfaces here.
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(err) => {
                return Err(InstallError::stream(format!("content of {path}"), err));
            }
        };
        hasher.update(data);
        file.write_all(data)
            .map_err(|err| InstallError::io(FsOperation::WriteContent, path, err))?;
        let read = data.len();
        source.consume(read);
        copied += read as u64;
    }

    if copied < size {
        return Err(InstallError::ShortContent {
            path: path.to_owned(),
            expected: size,
            actual: copied,
        });
    }
    file.flush()
        .map_err(|err| InstallError::io(FsOperation::WriteContent, path, err))?;
    Ok(Checksum(hasher.finalize().into()))
}
