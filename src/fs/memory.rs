//! In-memory [`PackageFs`] implementation.
//!
//! `MemFs` models directories, regular files, symlinks, and hard links in a
//! single map keyed by normalised path. Hard links share their content
//! buffer, and intermediate symlinks are followed the way a kernel would.
//! Every mutating call is recorded so tests can assert which operations the
//! installer issued.

use super::{
    FileHandle, FileKind, FileMeta, MAX_SYMLINK_HOPS, PackageFs, reject_parent_dirs, segments,
    too_many_links,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::rc::Rc;

/// Mode reported for the implicit root directory.
const ROOT_MODE: u32 = 0o755;

type Content = Rc<RefCell<Vec<u8>>>;

#[derive(Debug, Clone)]
enum Node {
    Dir { mode: u32 },
    File { mode: u32, data: Content },
    Symlink { target: Utf8PathBuf },
}

impl Node {
    fn meta(&self) -> FileMeta {
        match self {
            Self::Dir { mode } => FileMeta {
                kind: FileKind::Directory,
                mode: *mode,
            },
            Self::File { mode, .. } => FileMeta {
                kind: FileKind::Regular,
                mode: *mode,
            },
            Self::Symlink { .. } => FileMeta {
                kind: FileKind::Symlink,
                mode: 0o777,
            },
        }
    }
}

/// A mutating call received by [`MemFs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsCall {
    /// [`PackageFs::open_for_create`] was called for the path.
    OpenForCreate(Utf8PathBuf),
    /// [`PackageFs::make_dir_all`] was called for the path.
    MakeDirAll(Utf8PathBuf),
    /// [`PackageFs::symlink`] was called.
    Symlink {
        /// Link content.
        target: Utf8PathBuf,
        /// Where the link was requested.
        path: Utf8PathBuf,
    },
    /// [`PackageFs::hard_link`] was called.
    HardLink {
        /// Existing file being linked.
        target: Utf8PathBuf,
        /// Where the link was requested.
        path: Utf8PathBuf,
    },
}

/// An in-memory filesystem rooted at an implicit empty directory.
///
/// # Examples
///
/// ```
/// use apk_install::fs::PackageFs;
/// use apk_install::fs::memory::MemFs;
/// use camino::Utf8Path;
/// use std::io::Write;
///
/// let fs = MemFs::new();
/// fs.make_dir_all(Utf8Path::new("etc"), 0o755).unwrap();
/// let mut file = fs.open_for_create(Utf8Path::new("etc/motd"), 0o644).unwrap();
/// file.write_all(b"welcome").unwrap();
/// assert_eq!(fs.file_contents(Utf8Path::new("/etc/motd")), Some(b"welcome".to_vec()));
/// ```
#[derive(Debug)]
pub struct MemFs {
    nodes: RefCell<BTreeMap<Utf8PathBuf, Node>>,
    calls: RefCell<Vec<FsCall>>,
    symlinks_supported: bool,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    /// Create an empty filesystem that supports symlinks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: RefCell::new(BTreeMap::new()),
            calls: RefCell::new(Vec::new()),
            symlinks_supported: true,
        }
    }

    /// Create an empty filesystem whose [`PackageFs::symlink`] always fails
    /// with [`io::ErrorKind::Unsupported`].
    #[must_use]
    pub fn without_symlinks() -> Self {
        Self {
            symlinks_supported: false,
            ..Self::new()
        }
    }

    /// Return the content of the regular file at `path`, following symlinks.
    #[must_use]
    pub fn file_contents(&self, path: &Utf8Path) -> Option<Vec<u8>> {
        let nodes = self.nodes.borrow();
        let key = resolve(&nodes, path, true).ok()?;
        match nodes.get(&key) {
            Some(Node::File { data, .. }) => Some(data.borrow().clone()),
            _ => None,
        }
    }

    /// Return every path currently present, in sorted order.
    #[must_use]
    pub fn paths(&self) -> Vec<Utf8PathBuf> {
        self.nodes.borrow().keys().cloned().collect()
    }

    /// Return the mutating calls received so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<FsCall> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: FsCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl PackageFs for MemFs {
    fn open_for_create(&self, path: &Utf8Path, mode: u32) -> io::Result<FileHandle> {
        self.record(FsCall::OpenForCreate(path.to_owned()));
        reject_parent_dirs(path)?;
        let mut nodes = self.nodes.borrow_mut();
        let key = resolve(&nodes, path, true)?;
        require_parent_dir(&nodes, &key)?;
        if key.as_str().is_empty() {
            return Err(io::Error::from(io::ErrorKind::IsADirectory));
        }
        let data = match nodes.get(&key) {
            Some(Node::File { data, .. }) => {
                data.borrow_mut().clear();
                Rc::clone(data)
            }
            Some(_) => return Err(io::Error::from(io::ErrorKind::IsADirectory)),
            None => {
                let fresh = Content::default();
                nodes.insert(
                    key,
                    Node::File {
                        mode,
                        data: Rc::clone(&fresh),
                    },
                );
                fresh
            }
        };
        Ok(Box::new(MemFile { data }))
    }

    fn stat(&self, path: &Utf8Path) -> io::Result<FileMeta> {
        let nodes = self.nodes.borrow();
        let key = resolve(&nodes, path, false)?;
        if key.as_str().is_empty() {
            return Ok(FileMeta {
                kind: FileKind::Directory,
                mode: ROOT_MODE,
            });
        }
        nodes
            .get(&key)
            .map(Node::meta)
            .ok_or_else(|| not_found(path))
    }

    fn read_link(&self, path: &Utf8Path) -> io::Result<Utf8PathBuf> {
        let nodes = self.nodes.borrow();
        let key = resolve(&nodes, path, false)?;
        match nodes.get(&key) {
            Some(Node::Symlink { target }) => Ok(target.clone()),
            Some(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{path} is not a symlink"),
            )),
            None => Err(not_found(path)),
        }
    }

    fn make_dir_all(&self, path: &Utf8Path, perm: u32) -> io::Result<()> {
        self.record(FsCall::MakeDirAll(path.to_owned()));
        reject_parent_dirs(path)?;
        let mut nodes = self.nodes.borrow_mut();
        let key = resolve(&nodes, path, true)?;
        let mut current = Utf8PathBuf::new();
        for part in key.components() {
            current.push(part.as_str());
            match nodes.get(&current) {
                Some(Node::Dir { .. }) => {}
                Some(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{current} exists and is not a directory"),
                    ));
                }
                None => {
                    nodes.insert(current.clone(), Node::Dir { mode: perm });
                }
            }
        }
        Ok(())
    }

    fn symlink(&self, target: &Utf8Path, path: &Utf8Path) -> io::Result<()> {
        self.record(FsCall::Symlink {
            target: target.to_owned(),
            path: path.to_owned(),
        });
        if !self.symlinks_supported {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "symlinks are not supported",
            ));
        }
        reject_parent_dirs(path)?;
        let mut nodes = self.nodes.borrow_mut();
        let key = resolve(&nodes, path, false)?;
        insert_new(
            &mut nodes,
            key,
            Node::Symlink {
                target: target.to_owned(),
            },
        )
    }

    fn hard_link(&self, target: &Utf8Path, path: &Utf8Path) -> io::Result<()> {
        self.record(FsCall::HardLink {
            target: target.to_owned(),
            path: path.to_owned(),
        });
        reject_parent_dirs(target)?;
        reject_parent_dirs(path)?;
        let mut nodes = self.nodes.borrow_mut();
        let source = resolve(&nodes, target, true)?;
        let linked = match nodes.get(&source) {
            Some(node @ Node::File { .. }) => node.clone(),
            Some(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("cannot hard link {target}: not a regular file"),
                ));
            }
            None => return Err(not_found(target)),
        };
        let key = resolve(&nodes, path, false)?;
        insert_new(&mut nodes, key, linked)
    }
}

/// Writer over a shared content buffer.
struct MemFile {
    data: Content,
}

impl Write for MemFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn not_found(path: &Utf8Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{path} does not exist"))
}

/// Resolve `path` to a map key, following intermediate symlinks and, when
/// `follow_last` is set, a symlink in the final position.
fn resolve(
    nodes: &BTreeMap<Utf8PathBuf, Node>,
    path: &Utf8Path,
    follow_last: bool,
) -> io::Result<Utf8PathBuf> {
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
        match nodes.get(&candidate) {
            Some(Node::Symlink { target }) if follow => {
                hops += 1;
                if hops > MAX_SYMLINK_HOPS {
                    return Err(too_many_links(path));
                }
                if target.is_absolute() {
                    current.clear();
                }
                let mut next = segments(target);
                next.extend(pending);
                pending = next;
            }
            _ => current = candidate,
        }
    }
    Ok(current)
}

fn require_parent_dir(nodes: &BTreeMap<Utf8PathBuf, Node>, key: &Utf8Path) -> io::Result<()> {
    let parent = key.parent().unwrap_or_else(|| Utf8Path::new(""));
    if parent.as_str().is_empty() {
        return Ok(());
    }
    match nodes.get(parent) {
        Some(Node::Dir { .. }) => Ok(()),
        Some(_) => Err(io::Error::new(
            io::ErrorKind::NotADirectory,
            format!("{parent} is not a directory"),
        )),
        None => Err(not_found(parent)),
    }
}

fn insert_new(
    nodes: &mut BTreeMap<Utf8PathBuf, Node>,
    key: Utf8PathBuf,
    node: Node,
) -> io::Result<()> {
    require_parent_dir(nodes, &key)?;
    if key.as_str().is_empty() || nodes.contains_key(&key) {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{key} already exists"),
        ));
    }
    nodes.insert(key, node);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn fs() -> MemFs {
        let fs = MemFs::new();
        fs.make_dir_all(Utf8Path::new("usr/lib"), 0o755)
            .expect("mkdir usr/lib");
        fs
    }

    fn write(fs: &MemFs, path: &str, content: &[u8]) {
        let mut file = fs
            .open_for_create(Utf8Path::new(path), 0o644)
            .expect("open");
        file.write_all(content).expect("write");
    }

    #[rstest]
    fn make_dir_all_creates_ancestors(fs: MemFs) {
        let paths = fs.paths();
        assert_eq!(
            paths,
            vec![Utf8PathBuf::from("usr"), Utf8PathBuf::from("usr/lib")]
        );
        assert!(fs.stat(Utf8Path::new("/usr")).expect("stat").is_dir());
    }

    #[rstest]
    fn make_dir_all_rejects_file_component(fs: MemFs) {
        write(&fs, "usr/lib/libc.so", b"elf");
        let err = fs
            .make_dir_all(Utf8Path::new("usr/lib/libc.so/sub"), 0o755)
            .expect_err("file in the way");
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[rstest]
    fn open_for_create_truncates_existing(fs: MemFs) {
        write(&fs, "usr/lib/a", b"first content");
        write(&fs, "usr/lib/a", b"2nd");
        assert_eq!(
            fs.file_contents(Utf8Path::new("usr/lib/a")),
            Some(b"2nd".to_vec())
        );
    }

    #[rstest]
    fn open_for_create_requires_parent(fs: MemFs) {
        let err = fs
            .open_for_create(Utf8Path::new("etc/motd"), 0o644)
            .err()
            .expect("missing parent");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[rstest]
    fn stat_does_not_follow_final_symlink(fs: MemFs) {
        fs.symlink(Utf8Path::new("usr/lib"), Utf8Path::new("lib"))
            .expect("symlink");
        let meta = fs.stat(Utf8Path::new("lib")).expect("stat");
        assert!(meta.is_symlink());
        assert_eq!(
            fs.read_link(Utf8Path::new("lib")).expect("readlink"),
            Utf8PathBuf::from("usr/lib")
        );
    }

    #[rstest]
    fn intermediate_symlinks_are_followed(fs: MemFs) {
        fs.symlink(Utf8Path::new("/usr/lib"), Utf8Path::new("lib"))
            .expect("symlink");
        write(&fs, "lib/libz.so", b"zlib");
        assert_eq!(
            fs.file_contents(Utf8Path::new("usr/lib/libz.so")),
            Some(b"zlib".to_vec())
        );
    }

    #[rstest]
    fn relative_symlink_resolves_from_parent(fs: MemFs) {
        fs.make_dir_all(Utf8Path::new("usr/bin"), 0o755)
            .expect("mkdir");
        write(&fs, "usr/lib/tool", b"bin");
        fs.symlink(Utf8Path::new("../lib/tool"), Utf8Path::new("usr/bin/tool"))
            .expect("symlink");
        assert_eq!(
            fs.file_contents(Utf8Path::new("usr/bin/tool")),
            Some(b"bin".to_vec())
        );
    }

    #[rstest]
    fn symlink_loop_is_rejected(fs: MemFs) {
        fs.symlink(Utf8Path::new("b"), Utf8Path::new("a"))
            .expect("symlink a");
        fs.symlink(Utf8Path::new("a"), Utf8Path::new("b"))
            .expect("symlink b");
        let err = fs.stat(Utf8Path::new("a/x")).expect_err("loop");
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[rstest]
    fn hard_links_share_content(fs: MemFs) {
        write(&fs, "usr/lib/a", b"one");
        fs.hard_link(Utf8Path::new("usr/lib/a"), Utf8Path::new("usr/lib/b"))
            .expect("link");
        write(&fs, "usr/lib/a", b"two");
        assert_eq!(
            fs.file_contents(Utf8Path::new("usr/lib/b")),
            Some(b"two".to_vec())
        );
    }

    #[rstest]
    #[case::missing_target("usr/lib/missing", "usr/lib/b", io::ErrorKind::NotFound)]
    #[case::directory_target("usr", "usr/lib/b", io::ErrorKind::PermissionDenied)]
    fn hard_link_failures(
        fs: MemFs,
        #[case] target: &str,
        #[case] path: &str,
        #[case] kind: io::ErrorKind,
    ) {
        let err = fs
            .hard_link(Utf8Path::new(target), Utf8Path::new(path))
            .expect_err("link should fail");
        assert_eq!(err.kind(), kind);
    }

    #[rstest]
    fn symlink_refuses_existing_path(fs: MemFs) {
        let err = fs
            .symlink(Utf8Path::new("x"), Utf8Path::new("usr/lib"))
            .expect_err("exists");
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn unsupported_symlinks_fail() {
        let fs = MemFs::without_symlinks();
        let err = fs
            .symlink(Utf8Path::new("x"), Utf8Path::new("y"))
            .expect_err("unsupported");
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        assert_eq!(fs.calls().len(), 1);
    }

    #[rstest]
    #[case::create_file("../escape")]
    #[case::nested("usr/../../escape")]
    fn mutations_refuse_parent_components(fs: MemFs, #[case] path: &str) {
        let path = Utf8Path::new(path);
        let open = fs.open_for_create(path, 0o644).err().expect("open refused");
        let mkdir = fs.make_dir_all(path, 0o755).expect_err("mkdir refused");
        let link = fs
            .symlink(Utf8Path::new("usr"), path)
            .expect_err("symlink refused");
        for err in [open, mkdir, link] {
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        }
        assert_eq!(
            fs.paths(),
            vec![Utf8PathBuf::from("usr"), Utf8PathBuf::from("usr/lib")]
        );
    }

    #[rstest]
    fn read_link_rejects_non_links(fs: MemFs) {
        let err = fs.read_link(Utf8Path::new("usr")).expect_err("not a link");
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[rstest]
    fn records_mutating_calls(fs: MemFs) {
        assert_eq!(
            fs.calls(),
            vec![FsCall::MakeDirAll(Utf8PathBuf::from("usr/lib"))]
        );
    }
}
