//! Per-entry installation policy.
//!
//! [`resolve_action`] looks at an entry and the current filesystem state and
//! decides what to do; [`Action::apply`] performs it. Keeping the two apart
//! lets the decision be inspected without side effects.

use crate::checksum::{Checksum, write_checksummed};
use crate::entry::{ArchiveEntry, EntryKind};
use crate::error::{FsOperation, InstallError, Result};
use crate::fs::{MAX_SYMLINK_HOPS, PackageFs};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::io::Read;

/// What to do with one archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// The directory path is already a symlink to a directory; leave it.
    KeepSymlinkedDirectory,
    /// Create the directory and any missing ancestors with `perm`.
    CreateDirectory {
        /// Permission bits for new directories.
        perm: u32,
    },
    /// Write the entry content to a new or truncated file.
    WriteFile {
        /// Mode for the created file.
        mode: u32,
    },
    /// Create a symlink whose content is `target`.
    Symlink {
        /// Link content.
        target: Utf8PathBuf,
    },
    /// Create a hard link to the earlier entry at `target`.
    Hardlink {
        /// Archive path of the existing file.
        target: Utf8PathBuf,
    },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeepSymlinkedDirectory => f.write_str("keep symlinked directory"),
            Self::CreateDirectory { perm } => write!(f, "create directory ({perm:04o})"),
            Self::WriteFile { mode } => write!(f, "write file ({mode:04o})"),
            Self::Symlink { target } => write!(f, "symlink -> {target}"),
            Self::Hardlink { target } => write!(f, "hard link -> {target}"),
        }
    }
}

impl Action {
    /// Perform the action for `entry`, reading file content from `content`.
    ///
    /// Returns the content checksum for [`Action::WriteFile`] and `None`
    /// otherwise. A failed symlink is an error; content is never copied in
    /// its place.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Io`] when the filesystem rejects the
    /// operation, or any error from [`write_checksummed`].
    pub fn apply<F, R>(
        &self,
        fs: &F,
        entry: &ArchiveEntry,
        content: &mut R,
        buffer_size: usize,
    ) -> Result<Option<Checksum>>
    where
        F: PackageFs + ?Sized,
        R: Read + ?Sized,
    {
        let path = entry.path();
        match self {
            Self::KeepSymlinkedDirectory => Ok(None),
            Self::CreateDirectory { perm } => fs
                .make_dir_all(path, *perm)
                .map(|()| None)
                .map_err(|err| InstallError::io(FsOperation::CreateDirectory, path, err)),
            Self::WriteFile { mode } => {
                write_checksummed(fs, path, *mode, entry.size, content, buffer_size).map(Some)
            }
            Self::Symlink { target } => fs
                .symlink(target, path)
                .map(|()| None)
                .map_err(|err| InstallError::io(FsOperation::CreateSymlink, path, err)),
            Self::Hardlink { target } => fs
                .hard_link(target, path)
                .map(|()| None)
                .map_err(|err| InstallError::io(FsOperation::CreateHardlink, path, err)),
        }
    }
}

/// Decide how to install `entry` given the current state of `fs`.
///
/// # Errors
///
/// Returns [`InstallError::UnsupportedEntry`] for entry kinds other than
/// directory, regular file, symlink, and hard link.
pub fn resolve_action<F>(fs: &F, entry: &ArchiveEntry) -> Result<Action>
where
    F: PackageFs + ?Sized,
{
    match entry.kind {
        EntryKind::Directory => {
            if is_symlinked_directory(fs, entry.path()) {
                Ok(Action::KeepSymlinkedDirectory)
            } else {
                Ok(Action::CreateDirectory {
                    perm: entry.dir_perm(),
                })
            }
        }
        EntryKind::Regular => Ok(Action::WriteFile {
            mode: entry.file_mode(),
        }),
        EntryKind::Symlink => Ok(Action::Symlink {
            target: entry.link_target.clone().unwrap_or_default(),
        }),
        EntryKind::Hardlink => Ok(Action::Hardlink {
            target: entry.link_target.clone().unwrap_or_default(),
        }),
        EntryKind::Other(type_code) => Err(InstallError::UnsupportedEntry {
            path: entry.name.clone(),
            type_code,
        }),
    }
}

/// Return whether `path` exists as a symlink whose target is a directory.
///
/// Chains of links are followed up to [`MAX_SYMLINK_HOPS`]. Lookup failures
/// at any step mean "no"; the caller then creates the directory and reports
/// whatever error that produces.
pub fn is_symlinked_directory<F>(fs: &F, path: &Utf8Path) -> bool
where
    F: PackageFs + ?Sized,
{
    if !fs.stat(path).is_ok_and(|meta| meta.is_symlink()) {
        return false;
    }
    let mut link = path.to_owned();
    for _ in 0..MAX_SYMLINK_HOPS {
        let Ok(target) = fs.read_link(&link) else {
            return false;
        };
        let destination = link_destination(&link, &target);
        match fs.stat(&destination) {
            Ok(meta) if meta.is_symlink() => link = destination,
            Ok(meta) => return meta.is_dir(),
            Err(_) => return false,
        }
    }
    false
}

/// Resolve a symlink's content relative to the directory holding the link.
fn link_destination(link: &Utf8Path, target: &Utf8Path) -> Utf8PathBuf {
    if target.is_absolute() {
        return target.to_owned();
    }
    link.parent()
        .map_or_else(|| target.to_owned(), |parent| parent.join(target))
}
