//! Filesystem capability consumed by the installer.
//!
//! The installer never touches the operating system directly. It drives a
//! [`PackageFs`] implementation that exposes exactly the six operations an
//! installation needs, against a rooted namespace where archive-relative
//! paths (with or without a leading `/`) resolve below the root.
//!
//! # Sub-modules
//!
//! - [`dir`] - [`dir::DirFs`], a real directory used as the root (unix only).
//! - [`memory`] - [`memory::MemFs`], an in-memory filesystem for tests and
//!   dry runs.

#[cfg(unix)]
pub mod dir;
pub mod memory;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use std::collections::VecDeque;
use std::io::{self, Write};

/// Symlink hops allowed while resolving one path, matching Linux `MAXSYMLINKS`.
pub const MAX_SYMLINK_HOPS: usize = 40;

/// A writable handle returned by [`PackageFs::open_for_create`].
pub type FileHandle = Box<dyn Write>;

/// The kind of object found at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// A directory.
    Directory,
    /// A regular file.
    Regular,
    /// A symbolic link (not followed).
    Symlink,
    /// Anything else the backing store can hold.
    Other,
}

/// Metadata reported by [`PackageFs::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    /// What the path refers to.
    pub kind: FileKind,
    /// Permission bits, including setuid, setgid, and sticky.
    pub mode: u32,
}

impl FileMeta {
    /// Return whether the path is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// Return whether the path is a symbolic link.
    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }
}

/// Filesystem operations used while installing a package.
///
/// Implementations interpret every path relative to their own root. Errors
/// are plain [`io::Error`] values; the installer attaches the entry name and
/// operation before surfacing them.
///
/// # Examples
///
/// ```
/// use apk_install::fs::PackageFs;
/// use apk_install::fs::memory::MemFs;
/// use camino::Utf8Path;
///
/// let fs = MemFs::new();
/// let path = Utf8Path::new("etc/apk");
/// fs.make_dir_all(path, 0o755).unwrap();
/// assert!(fs.stat(path).unwrap().is_dir());
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait PackageFs {
    /// Create or truncate the file at `path` for writing with `mode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory is missing or the file cannot
    /// be opened.
    fn open_for_create(&self, path: &Utf8Path, mode: u32) -> io::Result<FileHandle>;

    /// Return metadata for `path` without following a final symlink.
    ///
    /// # Errors
    ///
    /// Returns an [`io::ErrorKind::NotFound`] error if nothing exists at
    /// `path`.
    fn stat(&self, path: &Utf8Path) -> io::Result<FileMeta>;

    /// Return the target stored in the symlink at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` does not exist or is not a symlink.
    fn read_link(&self, path: &Utf8Path) -> io::Result<Utf8PathBuf>;

    /// Create `path` and any missing ancestors using `perm` for new
    /// directories.
    ///
    /// # Errors
    ///
    /// Returns an error if a component exists and is not a directory.
    fn make_dir_all(&self, path: &Utf8Path, perm: u32) -> io::Result<()>;

    /// Create a symlink at `path` whose content is `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` already exists or the backing store does
    /// not support symlinks.
    fn symlink(&self, target: &Utf8Path, path: &Utf8Path) -> io::Result<()>;

    /// Create a hard link at `path` to the existing file `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if `target` is missing or `path` already exists.
    fn hard_link(&self, target: &Utf8Path, path: &Utf8Path) -> io::Result<()>;
}

/// Refuse a path that a mutating operation would place outside the root.
///
/// Entry names never need `..`; symlink contents may still use it and are
/// clamped at the root during resolution.
pub(crate) fn reject_parent_dirs(path: &Utf8Path) -> io::Result<()> {
    if path
        .components()
        .any(|component| matches!(component, Utf8Component::ParentDir))
    {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{path} escapes the installation root"),
        ));
    }
    Ok(())
}

/// Split `path` into normal and parent components, dropping root and `.`.
pub(crate) fn segments(path: &Utf8Path) -> VecDeque<String> {
    path.components()
        .filter_map(|component| match component {
            Utf8Component::Normal(part) => Some(part.to_owned()),
            Utf8Component::ParentDir => Some("..".to_owned()),
            Utf8Component::RootDir | Utf8Component::CurDir | Utf8Component::Prefix(_) => None,
        })
        .collect()
}

pub(crate) fn too_many_links(path: &Utf8Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("too many levels of symbolic links resolving {path}"),
    )
}
