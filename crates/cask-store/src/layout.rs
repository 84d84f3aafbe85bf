//! Deterministic mapping from addresses to filesystem paths.

use std::path::{Path, PathBuf};

use cask_hash::Address;

use crate::{CasError, Result};

/// Hex digits taken from the front of an address to name the bucket
/// directory.
pub(crate) const PREFIX_LEN: usize = 4;

/// Pure path arithmetic for a store root. Touches no filesystem state.
#[derive(Debug, Clone)]
pub(crate) struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding in-flight writer temp files. Shares the root's
    /// volume so placement is a rename, and is invisible to enumeration
    /// because "tmp" is not 4 hex digits.
    pub fn temp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Bucket directory for an address: `<root>/<first 4 hex digits>`.
    pub fn subdir(&self, address: &Address) -> PathBuf {
        let hex = address.to_text();
        self.root.join(&hex[..PREFIX_LEN])
    }

    /// File name of the base object: the remaining 36 hex digits.
    pub fn object_name(&self, address: &Address) -> String {
        address.to_text().split_off(PREFIX_LEN)
    }

    /// Canonical path of the base object.
    pub fn content_path(&self, address: &Address) -> PathBuf {
        self.subdir(address).join(self.object_name(address))
    }

    /// Canonical path of the `name`-encoded sibling.
    pub fn encoded_path(&self, address: &Address, name: &str) -> Result<PathBuf> {
        validate_encoding_name(name)?;
        let mut file = self.object_name(address);
        file.push('.');
        file.push_str(name);
        Ok(self.subdir(address).join(file))
    }
}

/// Encoding names become filename suffixes: non-empty, no `.`, no path
/// separators.
pub(crate) fn validate_encoding_name(name: &str) -> Result<()> {
    let ok = !name.is_empty() && !name.contains('.') && !name.chars().any(std::path::is_separator);
    if ok {
        Ok(())
    } else {
        Err(CasError::InvalidEncodingName {
            name: name.to_string(),
        })
    }
}
