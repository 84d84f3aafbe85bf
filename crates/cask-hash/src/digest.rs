//! Streaming and one-shot SHA-1 digests.

use std::io::{self, Read};

use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::Address;

/// Buffer size for the one-shot digest loops.
const BUFFER_LEN: usize = 4096;

/// Streaming SHA-1 accumulator.
///
/// Feed chunks in stream order with [`Hasher::update`], then consume the
/// accumulator with [`Hasher::finalize`]. A `Hasher` belongs to one stream;
/// concurrent digests each use their own.
#[derive(Default)]
pub struct Hasher {
    inner: Sha1,
}

impl Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    pub fn finalize(self) -> Address {
        let bytes: [u8; Address::LEN] = self.inner.finalize().into();
        Address::from(bytes)
    }
}

/// One-shot digest of an in-memory buffer.
pub fn digest_bytes(bytes: &[u8]) -> Address {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// One-shot digest of a blocking reader, read to EOF.
///
/// I/O errors from the reader propagate untransformed.
pub fn digest_reader<R: Read>(mut reader: R) -> io::Result<Address> {
    let mut hasher = Hasher::new();
    let mut buf = [0u8; BUFFER_LEN];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Ok(hasher.finalize());
        }
        hasher.update(&buf[..n]);
    }
}

/// One-shot digest of an async stream, read to EOF.
///
/// Each call owns a fresh accumulator, so distinct streams may be digested
/// concurrently from any number of tasks.
pub async fn digest_stream<R: AsyncRead + Unpin>(mut stream: R) -> io::Result<Address> {
    let mut hasher = Hasher::new();
    let mut buf = [0u8; BUFFER_LEN];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(hasher.finalize());
        }
        hasher.update(&buf[..n]);
    }
}
