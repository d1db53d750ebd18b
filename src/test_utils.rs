//! Package body builders shared by unit and behaviour tests.
//!
//! Names are written into the header byte-for-byte, so trailing slashes and
//! leading dots survive exactly as a packager would emit them.

use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::{self, Write};
use tar::{Builder, EntryType, Header};

/// Builds a gzip-compressed tar package body entry by entry.
///
/// # Examples
///
/// ```
/// use apk_install::test_utils::PackageBuilder;
///
/// let body = PackageBuilder::new()
///     .file(".PKGINFO", b"pkgname = demo\n")
///     .dir("etc/")
///     .file("etc/motd", b"hi")
///     .finish();
/// assert!(!body.is_empty());
/// ```
pub struct PackageBuilder {
    builder: Builder<GzEncoder<Vec<u8>>>,
}

impl Default for PackageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[expect(
    clippy::expect_used,
    reason = "fixture builders fail loudly on in-memory I/O errors"
)]
impl PackageBuilder {
    /// Start an empty package body.
    #[must_use]
    pub fn new() -> Self {
        Self {
            builder: Builder::new(GzEncoder::new(Vec::new(), Compression::default())),
        }
    }

    /// Append a regular file with mode `0644`.
    #[must_use]
    pub fn file(self, name: &str, content: &[u8]) -> Self {
        self.file_with_mode(name, 0o644, content)
    }

    /// Append a regular file with `mode`.
    ///
    /// # Panics
    ///
    /// Panics if the in-memory encoder fails.
    #[must_use]
    pub fn file_with_mode(mut self, name: &str, mode: u32, content: &[u8]) -> Self {
        let header = entry_header(name, EntryType::Regular, mode, content.len() as u64);
        self.builder
            .append(&header, content)
            .expect("append file entry");
        self
    }

    /// Append a regular file preceded by a PAX extended header.
    ///
    /// # Panics
    ///
    /// Panics if the in-memory encoder fails.
    #[must_use]
    pub fn file_with_pax(mut self, name: &str, records: &[(&str, &str)], content: &[u8]) -> Self {
        self.builder
            .append_pax_extensions(records.iter().map(|(key, value)| (*key, value.as_bytes())))
            .expect("append PAX header");
        self.file(name, content)
    }

    /// Append a directory with mode `0755`.
    #[must_use]
    pub fn dir(self, name: &str) -> Self {
        self.dir_with_mode(name, 0o755)
    }

    /// Append a directory with `mode`.
    ///
    /// # Panics
    ///
    /// Panics if the in-memory encoder fails.
    #[must_use]
    pub fn dir_with_mode(mut self, name: &str, mode: u32) -> Self {
        let header = entry_header(name, EntryType::Directory, mode, 0);
        self.builder
            .append(&header, io::empty())
            .expect("append directory entry");
        self
    }

    /// Append a symlink at `name` pointing at `target`.
    #[must_use]
    pub fn symlink(self, name: &str, target: &str) -> Self {
        self.link(name, EntryType::Symlink, target)
    }

    /// Append a hard link at `name` to the earlier entry `target`.
    #[must_use]
    pub fn hardlink(self, name: &str, target: &str) -> Self {
        self.link(name, EntryType::Link, target)
    }

    /// Append an empty entry with the V7 NUL type flag, as old archivers
    /// wrote for both files and directories.
    ///
    /// # Panics
    ///
    /// Panics if the in-memory encoder fails.
    #[must_use]
    pub fn legacy_regular(mut self, name: &str) -> Self {
        let mut header = entry_header(name, EntryType::Regular, 0o755, 0);
        header.as_old_mut().linkflag = [0];
        header.set_cksum();
        self.builder
            .append(&header, io::empty())
            .expect("append legacy entry");
        self
    }

    /// Append an entry of any other type with no content.
    ///
    /// # Panics
    ///
    /// Panics if the in-memory encoder fails.
    #[must_use]
    pub fn special(mut self, name: &str, entry_type: EntryType) -> Self {
        let header = entry_header(name, entry_type, 0o644, 0);
        self.builder
            .append(&header, io::empty())
            .expect("append special entry");
        self
    }

    /// Finish the tar stream and the gzip member, returning the body.
    ///
    /// # Panics
    ///
    /// Panics if the in-memory encoder fails.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.builder
            .into_inner()
            .expect("finish tar stream")
            .finish()
            .expect("finish gzip member")
    }

    fn link(mut self, name: &str, entry_type: EntryType, target: &str) -> Self {
        let mut header = entry_header(name, entry_type, 0o777, 0);
        header.set_link_name(target).expect("set link name");
        header.set_cksum();
        self.builder
            .append(&header, io::empty())
            .expect("append link entry");
        self
    }
}

/// Build a body whose only entry declares `declared` bytes but carries just
/// `content`, with the gzip member ending right after it.
///
/// # Panics
///
/// Panics if the in-memory encoder fails.
#[must_use]
#[expect(
    clippy::expect_used,
    reason = "fixture builders fail loudly on in-memory I/O errors"
)]
pub fn truncated_package(name: &str, declared: u64, content: &[u8]) -> Vec<u8> {
    let header = entry_header(name, EntryType::Regular, 0o644, declared);
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(header.as_bytes()).expect("write header");
    encoder.write_all(content).expect("write content");
    encoder.finish().expect("finish gzip member")
}

fn entry_header(name: &str, entry_type: EntryType, mode: u32, size: u64) -> Header {
    let mut header = Header::new_gnu();
    header
        .as_old_mut()
        .name
        .iter_mut()
        .zip(name.bytes())
        .for_each(|(slot, byte)| *slot = byte);
    header.set_entry_type(entry_type);
    header.set_mode(mode);
    header.set_size(size);
    header.set_mtime(0);
    header.set_cksum();
    header
}
