//! Archive entries and the installation manifest.
//!
//! [`ArchiveEntry`] is the installer's view of one tar header.
//! [`InstalledEntry`] pairs an entry with its content checksum once it has
//! been installed, and [`InstallManifest`] keeps installed entries in archive
//! order.

use crate::checksum::{CHECKSUM_ATTRIBUTE_KEY, Checksum};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;
use std::fmt;

/// Permission bits applied to regular files (includes setuid, setgid, sticky).
const FILE_MODE_MASK: u32 = 0o7777;

/// Permission bits applied to directories.
const DIR_PERM_MASK: u32 = 0o777;

/// The kind of an archive entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// A directory.
    Directory,
    /// A regular file with content.
    Regular,
    /// A symbolic link.
    Symlink,
    /// A hard link to an earlier entry.
    Hardlink,
    /// Any other tar type flag, kept as its raw byte.
    Other(u8),
}

impl EntryKind {
    /// Return the raw tar type flag for this kind.
    #[must_use]
    pub const fn type_code(self) -> u8 {
        match self {
            Self::Directory => b'5',
            Self::Regular => b'0',
            Self::Symlink => b'2',
            Self::Hardlink => b'1',
            Self::Other(code) => code,
        }
    }
}

impl From<tar::EntryType> for EntryKind {
    fn from(entry_type: tar::EntryType) -> Self {
        match entry_type {
            tar::EntryType::Directory => Self::Directory,
            tar::EntryType::Regular => Self::Regular,
            tar::EntryType::Symlink => Self::Symlink,
            tar::EntryType::Link => Self::Hardlink,
            other => Self::Other(other.as_byte()),
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory => f.write_str("directory"),
            Self::Regular => f.write_str("regular file"),
            Self::Symlink => f.write_str("symlink"),
            Self::Hardlink => f.write_str("hard link"),
            Self::Other(code) => write!(f, "type {code:#04x}"),
        }
    }
}

/// One header read from the package archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Archive-relative path, exactly as stored.
    pub name: Utf8PathBuf,
    /// What the entry represents.
    pub kind: EntryKind,
    /// Mode bits from the header.
    pub mode: u32,
    /// Declared content size in bytes.
    pub size: u64,
    /// Link target for symlinks and hard links.
    pub link_target: Option<Utf8PathBuf>,
    /// PAX extended header records attached to the entry.
    pub pax_records: BTreeMap<String, String>,
}

impl ArchiveEntry {
    /// Create an entry with no link target and no PAX records.
    #[must_use]
    pub fn new(name: impl Into<Utf8PathBuf>, kind: EntryKind, mode: u32, size: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            mode,
            size,
            link_target: None,
            pax_records: BTreeMap::new(),
        }
    }

    /// Set the link target.
    #[must_use]
    pub fn with_link_target(mut self, target: impl Into<Utf8PathBuf>) -> Self {
        self.link_target = Some(target.into());
        self
    }

    /// Return the archive path as a [`Utf8Path`].
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.name
    }

    /// Mode used when creating a regular file.
    #[must_use]
    pub const fn file_mode(&self) -> u32 {
        self.mode & FILE_MODE_MASK
    }

    /// Permission bits used when creating a directory.
    #[must_use]
    pub const fn dir_perm(&self) -> u32 {
        self.mode & DIR_PERM_MASK
    }
}

/// An entry that was installed, with its content checksum when it is a
/// regular file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledEntry {
    /// The archive header that was installed.
    pub entry: ArchiveEntry,
    /// Checksum of the written content; present only for regular files.
    pub checksum: Option<Checksum>,
}

impl InstalledEntry {
    /// Return the archive path.
    #[must_use]
    pub fn name(&self) -> &Utf8Path {
        &self.entry.name
    }

    /// Return the entry kind.
    #[must_use]
    pub const fn kind(&self) -> EntryKind {
        self.entry.kind
    }

    /// Render the attribute map consumed by `apk-tools` style tooling: the
    /// entry's PAX records plus the checksum under
    /// [`CHECKSUM_ATTRIBUTE_KEY`].
    #[must_use]
    pub fn attributes(&self) -> BTreeMap<String, String> {
        let mut attributes = self.entry.pax_records.clone();
        if let Some(checksum) = &self.checksum {
            attributes.insert(CHECKSUM_ATTRIBUTE_KEY.to_owned(), checksum.to_string());
        }
        attributes
    }
}

/// Installed entries in the order they appeared in the archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallManifest {
    entries: Vec<InstalledEntry>,
}

impl InstallManifest {
    /// Create an empty manifest.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, entry: InstalledEntry) {
        self.entries.push(entry);
    }

    /// Return the number of installed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return whether nothing was installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the entry at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&InstalledEntry> {
        self.entries.get(index)
    }

    /// Return all entries as a slice.
    #[must_use]
    pub fn entries(&self) -> &[InstalledEntry] {
        &self.entries
    }

    /// Iterate over entries in archive order.
    pub fn iter(&self) -> std::slice::Iter<'_, InstalledEntry> {
        self.entries.iter()
    }

    /// Iterate over regular files only.
    pub fn regular_files(&self) -> impl Iterator<Item = &InstalledEntry> {
        self.entries
            .iter()
            .filter(|installed| installed.kind() == EntryKind::Regular)
    }

    /// Consume the manifest and return its entries.
    #[must_use]
    pub fn into_entries(self) -> Vec<InstalledEntry> {
        self.entries
    }
}

impl IntoIterator for InstallManifest {
    type Item = InstalledEntry;
    type IntoIter = std::vec::IntoIter<InstalledEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a InstallManifest {
    type Item = &'a InstalledEntry;
    type IntoIter = std::slice::Iter<'a, InstalledEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
