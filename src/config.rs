//! Installer options loaded from TOML.
//!
//! Every field has a default, so an empty document (or no file at all) gives
//! the behaviour `apk-tools` expects. Unknown keys are rejected to catch
//! typos early.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use thiserror::Error;

/// Options that tune a single installation.
///
/// # Examples
///
/// ```
/// use apk_install::config::InstallOptions;
///
/// let options = InstallOptions::from_toml_str("copy_buffer_size = 4096").unwrap();
/// assert!(options.legacy_data_section);
/// assert_eq!(options.copy_buffer_size, 4096);
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct InstallOptions {
    /// Skip hidden top-level entries that precede the first real entry, as
    /// APKv1.0 packages require. Disable to install every entry.
    pub legacy_data_section: bool,
    /// Size of the buffer used when copying file content.
    pub copy_buffer_size: usize,
}

impl InstallOptions {
    const fn default_copy_buffer_size() -> usize {
        32 * 1024
    }

    /// Parse options from a TOML document and validate them.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
    /// [`ConfigError::InvalidBufferSize`] for a zero buffer size.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let options: Self = toml::from_str(source)?;
        options.validate()?;
        Ok(options)
    }

    /// Read and parse options from the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, otherwise
    /// the errors of [`Self::from_toml_str`].
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Check that the options are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBufferSize`] when `copy_buffer_size`
    /// is zero.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.copy_buffer_size == 0 {
            return Err(ConfigError::InvalidBufferSize);
        }
        Ok(())
    }
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            legacy_data_section: true,
            copy_buffer_size: Self::default_copy_buffer_size(),
        }
    }
}

/// Errors arising from loading [`InstallOptions`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The options file could not be read.
    #[error("failed to read options file {path}")]
    Read {
        /// Path of the options file.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid TOML or has unknown keys.
    #[error("invalid options: {0}")]
    Parse(#[from] toml::de::Error),

    /// `copy_buffer_size` was zero.
    #[error("copy_buffer_size must be greater than zero")]
    InvalidBufferSize,
}
