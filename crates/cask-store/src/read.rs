//! Existence checks, length queries, and open-for-read.

use std::fs;
use std::io;
use std::ops::{BitOr, BitOrAssign};
use std::pin::Pin;
use std::task::{Context, Poll};

use cask_hash::Address;
use tokio::io::{AsyncRead, ReadBuf};

use crate::{CasError, Result, Store};

/// Access-pattern hints for [`Store::try_open`].
///
/// Flags combine with `|`. `SEQUENTIAL` and `RANDOM_ACCESS` are mutually
/// exclusive in meaning; when both are set, `SEQUENTIAL` wins and no error
/// is raised. `ASYNCHRONOUS` states intent only; every [`ReadStream`] is
/// asynchronous by construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    bits: u8,
}

impl ReadOptions {
    pub const SEQUENTIAL: Self = Self { bits: 1 };
    pub const RANDOM_ACCESS: Self = Self { bits: 1 << 1 };
    pub const ASYNCHRONOUS: Self = Self { bits: 1 << 2 };

    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    pub const fn contains(self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }
}

impl BitOr for ReadOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            bits: self.bits | rhs.bits,
        }
    }
}

impl BitOrAssign for ReadOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.bits |= rhs.bits;
    }
}

/// An open, shared-read handle onto a stored object.
///
/// The handle pins the bytes that were visible when it was opened: a
/// concurrent [`Store::delete`] unlinks the name but cannot truncate or
/// alter what this stream reads.
#[derive(Debug)]
pub struct ReadStream {
    file: tokio::fs::File,
    len: u64,
}

impl ReadStream {
    /// Object size in bytes, from the metadata of the opened handle.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Convert into a blocking `std::fs::File` for callers that manage
    /// their own I/O.
    pub async fn into_std(self) -> std::fs::File {
        self.file.into_std().await
    }
}

impl AsyncRead for ReadStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}

impl Store {
    /// Whether an object (or its `encoding`-named sibling) is stored.
    ///
    /// Pure existence probe: takes no lock and never errors. An invalid
    /// encoding name or unreadable path reads as absent.
    pub fn contains(&self, address: &Address, encoding: Option<&str>) -> bool {
        self.object_path(address, encoding)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    /// Object size from filesystem metadata, `None` when absent.
    ///
    /// Content never written with the named encoding has no sibling and
    /// yields `None` like any other missing path.
    pub fn try_len(&self, address: &Address, encoding: Option<&str>) -> Option<u64> {
        let path = self.object_path(address, encoding).ok()?;
        let meta = fs::metadata(path).ok()?;
        meta.is_file().then(|| meta.len())
    }

    /// Atomically test for an object and open it for shared reading.
    ///
    /// `None` means not stored; that is never an error. Other open
    /// failures (permissions, exhausted descriptors) propagate as
    /// [`CasError::Io`].
    pub async fn try_open(
        &self,
        address: &Address,
        options: ReadOptions,
        encoding: Option<&str>,
    ) -> Result<Option<ReadStream>> {
        let path = self.object_path(address, encoding)?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CasError::Io(e)),
        };
        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Ok(None);
        }
        apply_scan_hint(&file, options);
        Ok(Some(ReadStream {
            file,
            len: meta.len(),
        }))
    }
}

/// Forward the caller's scan pattern to the kernel. Advisory only; a
/// refusal changes nothing observable.
pub(crate) fn apply_scan_hint(file: &tokio::fs::File, options: ReadOptions) {
    let sequential = options.contains(ReadOptions::SEQUENTIAL);
    let random = options.contains(ReadOptions::RANDOM_ACCESS);
    if !sequential && !random {
        return;
    }

    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;

        let advice = if sequential {
            libc::POSIX_FADV_SEQUENTIAL
        } else {
            libc::POSIX_FADV_RANDOM
        };
        unsafe {
            libc::posix_fadvise(file.as_raw_fd(), 0, 0, advice);
        }
    }

    #[cfg(target_os = "macos")]
    {
        use std::os::unix::io::AsRawFd;

        let readahead = i32::from(sequential);
        unsafe {
            libc::fcntl(file.as_raw_fd(), libc::F_RDAHEAD, readahead);
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        let _ = file;
    }
}
