//! Archive walking and installation.
//!
//! The walker decompresses the package body, reads tar entries one at a
//! time, and feeds each through the [`DataSectionGate`] and the entry
//! policy. Each entry is fully installed before the next header is read,
//! and the first error stops the walk without returning a manifest.

use crate::config::InstallOptions;
use crate::entry::{ArchiveEntry, EntryKind, InstallManifest, InstalledEntry};
use crate::error::{InstallError, Result};
use crate::fs::PackageFs;
use crate::gate::DataSectionGate;
use crate::policy::resolve_action;
use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::MultiGzDecoder;
use log::{debug, trace};
use std::collections::BTreeMap;
use std::io::Read;

/// Outcome of feeding one entry to an [`InstallWalk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The entry preceded the data section and was not installed.
    Skipped,
    /// The entry was installed and appended to the manifest.
    Installed,
}

/// State of one installation: the data-section latch and the manifest built
/// so far.
///
/// Entries must be fed in archive order. [`crate::walker::Installer`]
/// drives this from a tar stream; it is public so the sequencing can be
/// driven and inspected directly.
#[derive(Debug)]
pub struct InstallWalk<'fs, F: ?Sized> {
    fs: &'fs F,
    gate: DataSectionGate,
    buffer_size: usize,
    manifest: InstallManifest,
}

impl<'fs, F> InstallWalk<'fs, F>
where
    F: PackageFs + ?Sized,
{
    /// Start a walk over `fs` configured by `options`.
    #[must_use]
    pub fn new(fs: &'fs F, options: &InstallOptions) -> Self {
        let gate = if options.legacy_data_section {
            DataSectionGate::new()
        } else {
            DataSectionGate::open()
        };
        Self {
            fs,
            gate,
            buffer_size: options.copy_buffer_size,
            manifest: InstallManifest::new(),
        }
    }

    /// Return the data-section gate.
    #[must_use]
    pub const fn gate(&self) -> &DataSectionGate {
        &self.gate
    }

    /// Return the entries installed so far.
    #[must_use]
    pub const fn manifest(&self) -> &InstallManifest {
        &self.manifest
    }

    /// Install `entry`, reading any file content from `content`.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while resolving or applying the
    /// entry's action; the entry is not added to the manifest.
    pub fn step<R>(&mut self, entry: ArchiveEntry, content: &mut R) -> Result<Step>
    where
        R: Read + ?Sized,
    {
        let was_started = self.gate.has_started();
        if !self.gate.admit(entry.name.as_str()) {
            debug!("skipping {} before data section", entry.name);
            return Ok(Step::Skipped);
        }
        if !was_started {
            debug!("data section starts at {}", entry.name);
        }

        let action = resolve_action(self.fs, &entry)?;
        trace!("{}: {action}", entry.name);
        let checksum = action.apply(self.fs, &entry, content, self.buffer_size)?;
        self.manifest.push(InstalledEntry { entry, checksum });
        Ok(Step::Installed)
    }

    /// Finish the walk and return the manifest.
    #[must_use]
    pub fn finish(self) -> InstallManifest {
        self.manifest
    }
}

/// Installs gzip-compressed tar package bodies onto a [`PackageFs`].
///
/// # Examples
///
/// ```
/// use apk_install::fs::memory::MemFs;
/// use apk_install::walker::Installer;
/// use flate2::Compression;
/// use flate2::write::GzEncoder;
///
/// let mut header = tar::Header::new_gnu();
/// header.set_path("motd").unwrap();
/// header.set_entry_type(tar::EntryType::Regular);
/// header.set_size(2);
/// header.set_mode(0o644);
/// header.set_cksum();
/// let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
/// builder.append(&header, &b"hi"[..]).unwrap();
/// let body = builder.into_inner().unwrap().finish().unwrap();
///
/// let fs = MemFs::new();
/// let manifest = Installer::new(&fs).install(body.as_slice()).unwrap();
/// assert_eq!(manifest.len(), 1);
/// ```
#[derive(Debug)]
pub struct Installer<'fs, F: ?Sized> {
    fs: &'fs F,
    options: InstallOptions,
}

impl<'fs, F> Installer<'fs, F>
where
    F: PackageFs + ?Sized,
{
    /// Create an installer for `fs` with default options.
    #[must_use]
    pub fn new(fs: &'fs F) -> Self {
        Self::with_options(fs, InstallOptions::default())
    }

    /// Create an installer for `fs` with `options`.
    #[must_use]
    pub const fn with_options(fs: &'fs F, options: InstallOptions) -> Self {
        Self { fs, options }
    }

    /// Decompress `package` and install every entry in its data section.
    ///
    /// Returns the manifest of installed entries in archive order. Files
    /// created before a failure are left in place.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::StreamFormat`] for corrupt gzip or tar data,
    /// [`InstallError::UnsupportedEntry`] for device nodes, FIFOs and other
    /// unsupported entries, [`InstallError::ShortContent`] for truncated
    /// file content, and [`InstallError::Io`] for filesystem failures.
    pub fn install<R: Read>(&self, package: R) -> Result<InstallManifest> {
        let mut archive = tar::Archive::new(MultiGzDecoder::new(package));
        let mut walk = InstallWalk::new(self.fs, &self.options);
        let entries = archive
            .entries()
            .map_err(|err| InstallError::stream("archive start", err))?;

        for next in entries {
            let mut tar_entry = next.map_err(|err| {
                InstallError::stream(after_location(walk.manifest()), err)
            })?;
            let entry = read_header(&mut tar_entry)?;
            walk.step(entry, &mut tar_entry)?;
        }

        let manifest = walk.finish();
        debug!("installed {} entries", manifest.len());
        Ok(manifest)
    }
}

/// Install `package` onto `fs` with default options.
///
/// # Errors
///
/// See [`Installer::install`].
pub fn install_package<F, R>(fs: &F, package: R) -> Result<InstallManifest>
where
    F: PackageFs + ?Sized,
    R: Read,
{
    Installer::new(fs).install(package)
}

fn after_location(manifest: &InstallManifest) -> String {
    manifest.entries().last().map_or_else(
        || "first entry header".to_owned(),
        |last| format!("header after {}", last.name()),
    )
}

/// Convert a tar header into an [`ArchiveEntry`].
fn read_header<R: Read>(tar_entry: &mut tar::Entry<'_, R>) -> Result<ArchiveEntry> {
    let name = Utf8PathBuf::from(String::from_utf8_lossy(&tar_entry.path_bytes()).into_owned());
    let header = tar_entry.header();
    let kind = entry_kind(header, &name);
    let mode = header
        .mode()
        .map_err(|err| InstallError::stream(format!("mode of {name}"), err))?;
    let size = tar_entry.size();
    let link_target = tar_entry
        .link_name_bytes()
        .map(|bytes| Utf8PathBuf::from(String::from_utf8_lossy(&bytes).into_owned()));
    let pax_records = read_pax_records(tar_entry)
        .map_err(|err| InstallError::stream(format!("PAX records of {name}"), err))?;

    Ok(ArchiveEntry {
        name,
        kind,
        mode,
        size,
        link_target,
        pax_records,
    })
}

/// Legacy V7 archives mark regular files with a NUL type flag and
/// directories only by a trailing `/` on the name.
fn entry_kind(header: &tar::Header, name: &Utf8Path) -> EntryKind {
    let [flag] = header.as_old().linkflag;
    if flag == 0 && name.as_str().ends_with('/') {
        return EntryKind::Directory;
    }
    EntryKind::from(header.entry_type())
}

fn read_pax_records<R: Read>(
    tar_entry: &mut tar::Entry<'_, R>,
) -> std::io::Result<BTreeMap<String, String>> {
    let mut records = BTreeMap::new();
    let Some(extensions) = tar_entry.pax_extensions()? else {
        return Ok(records);
    };
    for extension in extensions {
        let record = extension?;
        records.insert(
            String::from_utf8_lossy(record.key_bytes()).into_owned(),
            String::from_utf8_lossy(record.value_bytes()).into_owned(),
        );
    }
    Ok(records)
}
