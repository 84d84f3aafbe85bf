//! # cask-store
//!
//! Filesystem-backed content-addressable storage.
//!
//! Byte streams go in; each comes back out under a stable [`Address`] equal
//! to the SHA-1 digest of its bytes. Identical content is stored once, and
//! objects are read-only from the moment they become visible. Each object
//! may carry pre-encoded sibling files (gzip, deflate, or any custom
//! [`Encoding`]) so consumers that want the encoded form pay no encoding
//! cost at read time.
//!
//! ## Directory Layout
//!
//! ```text
//! <root>/
//! ├── tmp/                                   # in-flight writer temp files
//! ├── 0A4D/
//! │   ├── 55A8D778E5022FAB701977C5D840BBC486D0       # base object
//! │   └── 55A8D778E5022FAB701977C5D840BBC486D0.gzip  # encoded sibling
//! └── 4061/
//!     └── 3A45BC715AE4A34895CBDD6122E982FE3DF5
//! ```
//!
//! The first 4 hex digits of an address name the bucket directory (65 536
//! buckets), the remaining 36 name the file. Anything else under the root
//! is ignored.
//!
//! ## Concurrency
//!
//! Reads and enumeration are lock-free and rely on atomic filesystem
//! primitives. Placement (the writer's exists-check → rename → chmod
//! window) runs under an in-process upgradable read/write coordinator, as
//! does deletion. Open readers keep their view of an object even if it is
//! deleted underneath them.

mod encoding;
mod iter;
mod layout;
mod read;
mod write;

pub use cask_hash::{Address, Hasher, ParseAddressError};
pub use encoding::{Deflate, Encoding, FinishWrite, Gzip};
pub use iter::Addresses;
pub use read::{ReadOptions, ReadStream};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::layout::Layout;

/// Buffer size for all streaming copy loops.
pub(crate) const BUFFER_LEN: usize = 4096;

/// Errors surfaced by store operations.
#[derive(Error, Debug)]
pub enum CasError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid encoding name {name:?}")]
    InvalidEncodingName { name: String },

    #[error("object {address} is corrupt: content hashes to {actual}")]
    Corrupt { address: Address, actual: Address },

    #[error("write cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, CasError>;

/// Aggregate figures for a store, computed by walking the layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of base objects.
    pub object_count: u64,
    /// Total size of base objects in bytes (deduplicated).
    pub total_bytes: u64,
}

/// A content-addressable store rooted at a directory.
///
/// Cloning is cheap; clones share the placement coordinator.
#[derive(Debug, Clone)]
pub struct Store {
    layout: Layout,
    coordinator: Arc<RwLock<()>>,
    temp_seq: Arc<AtomicU64>,
}

impl Store {
    /// Open a store at `root`, creating the directory (and the temp
    /// directory beside the buckets) if missing.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let layout = Layout::new(root.as_ref().to_path_buf());
        fs::create_dir_all(layout.root())?;
        fs::create_dir_all(layout.temp_dir())?;
        Ok(Self {
            layout,
            coordinator: Arc::new(RwLock::new(())),
            temp_seq: Arc::new(AtomicU64::new(0)),
        })
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    /// Remove an object together with every encoded sibling.
    ///
    /// Returns `false` when nothing is stored under `address`. A failure
    /// partway through leaves the remaining files in place; the error is
    /// the underlying filesystem error and the call may be retried.
    #[instrument(skip(self), level = "debug")]
    pub fn delete(&self, address: &Address) -> Result<bool> {
        let subdir = self.layout.subdir(address);
        let stem = self.layout.object_name(address);

        let _write = self.coordinator.write();
        let entries = match fs::read_dir(&subdir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let mut removed = false;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !names_object(name, &stem) || !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            clear_read_only(&path)?;
            fs::remove_file(&path)?;
            removed = true;
        }
        if removed {
            debug!(%address, "object deleted");
        }
        // The bucket directory stays: a concurrent writer may be about to
        // place a sibling in it.
        Ok(removed)
    }

    /// Read an object fully into memory, re-deriving its address from the
    /// bytes. Returns `None` when absent and [`CasError::Corrupt`] when the
    /// stored bytes no longer hash to `address`.
    pub async fn read_verified(&self, address: &Address) -> Result<Option<Vec<u8>>> {
        let path = self.layout.content_path(address);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let actual = cask_hash::digest_bytes(&bytes);
        if actual != *address {
            return Err(CasError::Corrupt {
                address: *address,
                actual,
            });
        }
        Ok(Some(bytes))
    }

    /// Count base objects and their total size.
    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        for address in self.list() {
            let address = address?;
            if let Some(len) = self.try_len(&address, None) {
                stats.object_count += 1;
                stats.total_bytes += len;
            }
        }
        Ok(stats)
    }

    /// Best-effort removal of temp files left behind by crashed writers.
    ///
    /// Run this at startup, before writers are active: an in-flight
    /// writer's temp file is indistinguishable from an orphan.
    #[instrument(skip(self), level = "debug")]
    pub fn sweep_temp(&self) -> Result<u64> {
        let mut removed = 0u64;
        for entry in fs::read_dir(self.layout.temp_dir())? {
            let entry = entry?;
            if entry.file_type()?.is_file() && fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "swept orphaned temp files");
        }
        Ok(removed)
    }

    /// Canonical path for `address`, or for its `encoding`-named sibling.
    fn object_path(&self, address: &Address, encoding: Option<&str>) -> Result<PathBuf> {
        match encoding {
            None => Ok(self.layout.content_path(address)),
            Some(name) => self.layout.encoded_path(address, name),
        }
    }
}

/// True when `name` is the object's own file or one of its encoded
/// siblings. Stored hex may be either case.
fn names_object(name: &str, stem: &str) -> bool {
    let Some(head) = name.get(..stem.len()) else {
        return false;
    };
    if !head.eq_ignore_ascii_case(stem) {
        return false;
    }
    match name.as_bytes().get(stem.len()) {
        None => true,
        Some(b'.') => name.len() > stem.len() + 1,
        Some(_) => false,
    }
}

fn clear_read_only(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    if !perms.readonly() {
        return Ok(());
    }
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    fs::set_permissions(path, perms)
}

pub(crate) fn set_read_only(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    if perms.readonly() {
        return Ok(());
    }
    perms.set_readonly(true);
    fs::set_permissions(path, perms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_root_and_temp_dir() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("store");
        let store = Store::open(&root).unwrap();
        assert!(root.is_dir());
        assert!(root.join("tmp").is_dir());
        assert_eq!(store.root(), root);
    }

    #[test]
    fn delete_absent_is_false() {
        let temp = TempDir::new().unwrap();
        let store = Store::open(temp.path()).unwrap();
        let address = Address::parse("40613A45BC715AE4A34895CBDD6122E982FE3DF5").unwrap();
        assert!(!store.delete(&address).unwrap());
    }

    #[test]
    fn sweep_removes_orphans() {
        let temp = TempDir::new().unwrap();
        let store = Store::open(temp.path()).unwrap();
        fs::write(temp.path().join("tmp").join("1234-0.tmp"), b"dead").unwrap();
        fs::write(temp.path().join("tmp").join("1234-1.tmp"), b"dead").unwrap();
        assert_eq!(store.sweep_temp().unwrap(), 2);
        assert_eq!(store.sweep_temp().unwrap(), 0);
    }

    #[test]
    fn names_object_matches_base_and_siblings() {
        let stem = "55A8D778E5022FAB701977C5D840BBC486D0";
        assert!(names_object(stem, stem));
        assert!(names_object(&stem.to_lowercase(), stem));
        assert!(names_object(&format!("{stem}.gzip"), stem));
        assert!(!names_object(&format!("{stem}."), stem));
        assert!(!names_object(&stem[..35], stem));
        assert!(!names_object(&format!("{stem}0"), stem));
        assert!(!names_object("README", stem));
    }
}
