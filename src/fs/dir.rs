//! [`PackageFs`] backed by a real directory.
//!
//! Archive paths are resolved below the root one component at a time.
//! Symlinks met along the way are followed inside the root: absolute
//! contents restart at the root and `..` stops there, so neither an entry
//! name nor a link installed by an earlier entry can reach the host. Link
//! contents are still written verbatim, which is the layout an image root
//! expects.

use super::{
    FileHandle, FileKind, FileMeta, MAX_SYMLINK_HOPS, PackageFs, reject_parent_dirs, segments,
    too_many_links,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{self, DirBuilder, OpenOptions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};

/// A filesystem rooted at a host directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirFs {
    root: Utf8PathBuf,
}

impl DirFs {
    /// Use `root` as the top of the installation namespace.
    ///
    /// The directory is not created; it must exist before installing.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Return the root directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Map an archive path to its host location, following symlinks inside
    /// the root. The final component is followed only when `follow_last` is
    /// set.
    fn resolve(&self, path: &Utf8Path, follow_last: bool) -> io::Result<Utf8PathBuf> {
        let mut pending = segments(path);
        let mut current = Utf8PathBuf::new();
        let mut hops = 0;
        while let Some(part) = pending.pop_front() {
            if part == ".." {
                current.pop();
                continue;
            }
            let candidate = current.join(&part);
            let follow = follow_last || !pending.is_empty();
            if follow && self.is_link(&candidate) {
                hops += 1;
                if hops > MAX_SYMLINK_HOPS {
                    return Err(too_many_links(path));
                }
                let target = self.link_content(&candidate)?;
                if target.is_absolute() {
                    current.clear();
                }
                let mut next = segments(&target);
                next.extend(pending);
                pending = next;
            } else {
                current = candidate;
            }
        }
        Ok(self.root.join(current))
    }

    fn is_link(&self, relative: &Utf8Path) -> bool {
        fs::symlink_metadata(self.root.join(relative))
            .is_ok_and(|metadata| metadata.file_type().is_symlink())
    }

    fn link_content(&self, relative: &Utf8Path) -> io::Result<Utf8PathBuf> {
        read_utf8_link(&self.root.join(relative))
    }

    /// Resolve a path that is about to be written, refusing `..` in it.
    /// Leading and trailing `/` are ignored, so `lib/` names the link itself
    /// rather than what it points at.
    fn resolve_new(&self, path: &Utf8Path, follow_last: bool) -> io::Result<Utf8PathBuf> {
        reject_parent_dirs(path)?;
        self.resolve(path, follow_last)
    }
}

impl PackageFs for DirFs {
    fn open_for_create(&self, path: &Utf8Path, mode: u32) -> io::Result<FileHandle> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(self.resolve_new(path, true)?)?;
        Ok(Box::new(file))
    }

    fn stat(&self, path: &Utf8Path) -> io::Result<FileMeta> {
        let metadata = fs::symlink_metadata(self.resolve(path, false)?)?;
        let file_type = metadata.file_type();
        let kind = if file_type.is_symlink() {
            FileKind::Symlink
        } else if file_type.is_dir() {
            FileKind::Directory
        } else if file_type.is_file() {
            FileKind::Regular
        } else {
            FileKind::Other
        };
        Ok(FileMeta {
            kind,
            mode: metadata.permissions().mode() & 0o7777,
        })
    }

    fn read_link(&self, path: &Utf8Path) -> io::Result<Utf8PathBuf> {
        read_utf8_link(&self.resolve(path, false)?)
    }

    // New directories are still subject to the process umask.
    fn make_dir_all(&self, path: &Utf8Path, perm: u32) -> io::Result<()> {
        DirBuilder::new()
            .recursive(true)
            .mode(perm)
            .create(self.resolve_new(path, true)?)
    }

    fn symlink(&self, target: &Utf8Path, path: &Utf8Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, self.resolve_new(path, false)?)
    }

    fn hard_link(&self, target: &Utf8Path, path: &Utf8Path) -> io::Result<()> {
        fs::hard_link(
            self.resolve_new(target, true)?,
            self.resolve_new(path, false)?,
        )
    }
}

fn read_utf8_link(host: &Utf8Path) -> io::Result<Utf8PathBuf> {
    let target = fs::read_link(host)?;
    Utf8PathBuf::try_from(target)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
}
