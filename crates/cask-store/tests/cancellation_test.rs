use std::fs;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use cask_store::{CasError, Store};
use tempfile::TempDir;
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::sync::CancellationToken;

/// Endless source that trips the cancel token once the writer has already
/// consumed a couple of buffers.
struct SelfCancellingSource {
    token: CancellationToken,
    chunks_served: usize,
}

impl AsyncRead for SelfCancellingSource {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.chunks_served >= 1 {
            self.token.cancel();
        }
        self.chunks_served += 1;
        let n = buf.remaining().min(4096);
        buf.put_slice(&vec![0xAB; n]);
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn cancellation_mid_stream_leaves_no_trace() {
    let temp = TempDir::new().unwrap();
    let store = Store::open(temp.path()).unwrap();

    let token = CancellationToken::new();
    let src = SelfCancellingSource {
        token: token.clone(),
        chunks_served: 0,
    };

    let err = store.write(src, &token, &[]).await.unwrap_err();
    assert!(matches!(err, CasError::Cancelled));

    assert_eq!(store.list().count(), 0);
    assert_eq!(
        fs::read_dir(temp.path().join("tmp")).unwrap().count(),
        0,
        "cancelled write must unlink its temp file"
    );
}

#[tokio::test]
async fn pre_cancelled_token_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let store = Store::open(temp.path()).unwrap();

    let token = CancellationToken::new();
    token.cancel();

    let err = store
        .write(&b"never stored"[..], &token, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, CasError::Cancelled));
    assert_eq!(store.list().count(), 0);
    assert_eq!(fs::read_dir(temp.path().join("tmp")).unwrap().count(), 0);
}

#[tokio::test]
async fn uncancelled_token_does_not_interfere() {
    let temp = TempDir::new().unwrap();
    let store = Store::open(temp.path()).unwrap();

    let token = CancellationToken::new();
    let address = store.write(&b"kept"[..], &token, &[]).await.unwrap();
    assert!(store.contains(&address, None));
}
