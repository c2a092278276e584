//! Storage root and the path rules shared by allocation and lookup.

use crate::error::{Error, Result};
use crate::token::{MAX_TOKEN_LENGTH, is_token_char};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Longest filename accepted, in bytes.
pub const MAX_FILENAME_LEN: usize = 255;

/// The directory under which every upload lives.
///
/// Always absolute and known to exist when constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRoot {
    path: PathBuf,
}

impl StorageRoot {
    /// Open the storage root at `path`, creating it if absent.
    ///
    /// Relative paths are resolved against the current directory.
    pub fn init<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::invalid_config("storage root path is empty"));
        }

        let path = std::path::absolute(path)?;
        fs::create_dir_all(&path)?;

        if !path.is_dir() {
            return Err(Error::invalid_config(format!(
                "storage root {} is not a directory",
                path.display()
            )));
        }

        info!(root = %path.display(), "storage root ready");
        Ok(Self { path })
    }

    /// Location used when no directory is configured.
    pub fn default_path() -> PathBuf {
        std::env::temp_dir().join("droplet")
    }

    /// Get the root directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Map a public `<token>/<filename>` pair back to its on-disk location.
    ///
    /// Does not touch the filesystem; the file may or may not exist.
    pub fn resolve(&self, token: &str, filename: &str) -> Result<PathBuf> {
        validate_token(token)?;
        validate_filename(filename)?;
        Ok(self.path.join(token).join(filename))
    }
}

/// Check that `name` is usable as a single file inside a token directory.
pub fn validate_filename(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_filename(name, "filename cannot be empty"));
    }

    if name.len() > MAX_FILENAME_LEN {
        return Err(Error::invalid_filename(
            name,
            format!("longer than {} bytes", MAX_FILENAME_LEN),
        ));
    }

    if name == "." || name == ".." {
        return Err(Error::invalid_filename(name, "reserved path component"));
    }

    if name.contains(['/', '\\', '\0']) {
        return Err(Error::invalid_filename(
            name,
            "must not contain path separators or NUL",
        ));
    }

    Ok(())
}

/// Check that `token` could have been produced by an allocator.
pub(crate) fn validate_token(token: &str) -> Result<()> {
    if token.is_empty() || token.len() > MAX_TOKEN_LENGTH {
        return Err(Error::invalid_token(
            token,
            format!("length must be between 1 and {}", MAX_TOKEN_LENGTH),
        ));
    }

    if !token.bytes().all(is_token_char) {
        return Err(Error::invalid_token(
            token,
            "only ASCII alphanumerics, '-' and '_' are allowed",
        ));
    }

    Ok(())
}
