//! Data-section detection for APKv1.0 compatibility.
//!
//! `apk-tools` treats the first non-hidden file as the start of the data
//! section. Hidden top-level entries (a leading `.` and no `/`) that appear
//! before it are control files such as `.PKGINFO` and are not installed.

/// One-way latch marking the start of the data section.
///
/// # Examples
///
/// ```
/// use apk_install::gate::DataSectionGate;
///
/// let mut gate = DataSectionGate::new();
/// assert!(!gate.admit(".PKGINFO"));
/// assert!(gate.admit("usr/bin/tool"));
/// assert!(gate.admit(".hidden-after-start"));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataSectionGate {
    started: bool,
}

impl DataSectionGate {
    /// Create a gate that has not yet seen the data section.
    #[must_use]
    pub const fn new() -> Self {
        Self { started: false }
    }

    /// Create a gate that is already latched and never skips anything.
    #[must_use]
    pub const fn open() -> Self {
        Self { started: true }
    }

    /// Return whether the data section has started.
    #[must_use]
    pub const fn has_started(&self) -> bool {
        self.started
    }

    /// Decide whether the entry called `name` is installed.
    ///
    /// Returns `false` only for hidden top-level names seen before the data
    /// section. Any other name latches the gate and is admitted.
    pub fn admit(&mut self, name: &str) -> bool {
        if self.started {
            return true;
        }
        if is_hidden_top_level(name) {
            return false;
        }
        self.started = true;
        true
    }
}

fn is_hidden_top_level(name: &str) -> bool {
    name.starts_with('.') && !name.contains('/')
}
