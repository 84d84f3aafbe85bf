//! The streaming write protocol: hash-while-writing to a temp file, then
//! atomic placement and sibling materialization.

use std::fs;
use std::io::{self, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use cask_hash::{Address, Hasher};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::layout::validate_encoding_name;
use crate::read::{apply_scan_hint, ReadOptions};
use crate::{set_read_only, CasError, Encoding, Result, Store, BUFFER_LEN};

impl Store {
    /// Stream `src` into the store, returning the SHA-1 address of its
    /// bytes.
    ///
    /// The stream is hashed while it is copied to a temp file on the
    /// store's volume; the temp file is then renamed into its canonical
    /// path and marked read-only. Writing content that is already stored
    /// is a no-op that still returns the address. For each requested
    /// encoding, a pre-encoded sibling file is materialized next to the
    /// base object unless it already exists.
    ///
    /// Cancellation is observed between buffer exchanges in the streaming
    /// loop only; a cancelled write unlinks its temp file and leaves the
    /// store untouched. Sibling failures surface after the base object is
    /// durable and do not undo it.
    #[instrument(skip_all, level = "debug")]
    pub async fn write<R>(
        &self,
        src: R,
        cancel: &CancellationToken,
        encodings: &[&dyn Encoding],
    ) -> Result<Address>
    where
        R: AsyncRead + Unpin,
    {
        // Reject malformed encoding names before any I/O happens.
        for encoding in encodings {
            validate_encoding_name(encoding.name())?;
        }

        let temp = self.alloc_temp_path();
        let address = match self.stream_to_temp(src, cancel, &temp).await {
            Ok(address) => address,
            Err(e) => {
                let _ = fs::remove_file(&temp);
                return Err(e);
            }
        };

        let content_path = self.layout.content_path(&address);
        let placed = self
            .place_at(self.layout.subdir(&address), content_path.clone(), temp)
            .await?;
        if placed {
            debug!(%address, "object placed");
        } else {
            debug!(%address, "content already stored, temp file discarded");
        }

        for encoding in encodings {
            self.materialize_sibling(&address, &content_path, *encoding)
                .await?;
        }
        Ok(address)
    }

    /// Store an in-memory buffer. Convenience over [`Store::write`] with a
    /// never-cancelled token.
    pub async fn write_bytes(&self, bytes: &[u8], encodings: &[&dyn Encoding]) -> Result<Address> {
        self.write(bytes, &CancellationToken::new(), encodings).await
    }

    /// Store the contents of a file.
    pub async fn write_file<P: AsRef<Path>>(
        &self,
        path: P,
        encodings: &[&dyn Encoding],
    ) -> Result<Address> {
        let file = tokio::fs::File::open(path).await?;
        self.write(file, &CancellationToken::new(), encodings).await
    }

    /// Double-buffered hash-and-write loop. Each iteration overlaps the
    /// next read from `src` with the write of the previous buffer, feeding
    /// the digest in stream order, exactly once per byte.
    async fn stream_to_temp<R>(
        &self,
        mut src: R,
        cancel: &CancellationToken,
        temp: &Path,
    ) -> Result<Address>
    where
        R: AsyncRead + Unpin,
    {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(temp)
            .await?;
        apply_scan_hint(&file, ReadOptions::SEQUENTIAL);

        let mut hasher = Hasher::new();
        let mut front = vec![0u8; BUFFER_LEN];
        let mut back = vec![0u8; BUFFER_LEN];
        let mut pending = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(CasError::Cancelled);
            }
            let (read, written) = tokio::join!(
                src.read(&mut front),
                write_back_buffer(&mut file, &back[..pending])
            );
            written?;
            pending = 0;
            let n = read?;
            if n == 0 {
                // The last chunk went out with this iteration's write.
                break;
            }
            hasher.update(&front[..n]);
            mem::swap(&mut front, &mut back);
            pending = n;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(hasher.finalize())
    }

    /// Move a completed temp file to `target`, marking it read-only.
    ///
    /// The filesystem work runs on the blocking pool so the rename is a
    /// real suspension point for the async caller rather than a stall of
    /// its worker thread. Returns `false` when the target was already
    /// present and the temp file was discarded instead.
    async fn place_at(&self, subdir: PathBuf, target: PathBuf, temp: PathBuf) -> Result<bool> {
        let coordinator = Arc::clone(&self.coordinator);
        tokio::task::spawn_blocking(move || place_blocking(&coordinator, &subdir, &target, &temp))
            .await
            .map_err(io::Error::other)?
    }

    /// Materialize the `encoding` sibling of an already-placed base
    /// object, unless it exists.
    async fn materialize_sibling(
        &self,
        address: &Address,
        content_path: &Path,
        encoding: &dyn Encoding,
    ) -> Result<()> {
        let encoded_path = self.layout.encoded_path(address, encoding.name())?;
        if encoded_path.is_file() {
            return Ok(());
        }

        let temp = self.alloc_temp_path();
        if let Err(e) = self.encode_to_temp(content_path, &temp, encoding).await {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }
        let placed = self
            .place_at(self.layout.subdir(address), encoded_path, temp)
            .await?;
        if placed {
            debug!(%address, encoding = encoding.name(), "sibling placed");
        }
        Ok(())
    }

    /// Stream the base object through the encoder into a fresh temp file.
    async fn encode_to_temp(
        &self,
        content_path: &Path,
        temp: &Path,
        encoding: &dyn Encoding,
    ) -> Result<()> {
        let mut src = tokio::fs::File::open(content_path).await?;
        apply_scan_hint(&src, ReadOptions::SEQUENTIAL);
        let sink = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(temp)?;
        let mut encoder = encoding.encoder(Box::new(sink))?;

        let mut buf = vec![0u8; BUFFER_LEN];
        loop {
            let n = src.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            encoder.write_all(&buf[..n])?;
        }
        encoder.finish()?;
        Ok(())
    }

    /// A fresh path in the store's temp directory. Process id plus a
    /// process-wide counter keeps concurrent writers from colliding.
    fn alloc_temp_path(&self) -> PathBuf {
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        self.layout
            .temp_dir()
            .join(format!("{}-{seq}.tmp", std::process::id()))
    }
}

/// Blocking half of placement, shared by base objects and siblings.
///
/// Runs under the coordinator: the exists-check holds the upgradable read
/// section, the rename + read-only marking the write section. Of two
/// racing writers with identical content, one renames and the other
/// discards its temp file, either on the exists-check or on the rename
/// failing with the target present.
fn place_blocking(
    coordinator: &RwLock<()>,
    subdir: &Path,
    target: &Path,
    temp: &Path,
) -> Result<bool> {
    let read = coordinator.upgradable_read();
    if target.is_file() {
        drop(read);
        let _ = fs::remove_file(temp);
        return Ok(false);
    }

    let _write = RwLockUpgradableReadGuard::upgrade(read);
    fs::create_dir_all(subdir)?;
    if let Err(rename_err) = fs::rename(temp, target) {
        // Lost a cross-process race: another store instance placed the
        // same content between our check and the rename.
        let _ = fs::remove_file(temp);
        if !target.is_file() {
            return Err(rename_err.into());
        }
    }
    set_read_only(target)?;
    Ok(true)
}

async fn write_back_buffer(file: &mut tokio::fs::File, buf: &[u8]) -> std::io::Result<()> {
    if buf.is_empty() {
        return Ok(());
    }
    file.write_all(buf).await
}
