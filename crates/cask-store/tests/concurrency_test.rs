use std::fs;
use std::sync::Arc;

use cask_store::{ReadOptions, Store};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

const MIB: usize = 1024 * 1024;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_writes_place_one_object() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(Store::open(temp.path()).unwrap());

    let data: Arc<Vec<u8>> = Arc::new((0..10 * MIB).map(|i| (i % 251) as u8).collect());

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let store = Arc::clone(&store);
        let data = Arc::clone(&data);
        tasks.push(tokio::spawn(async move {
            store.write_bytes(&data, &[]).await.unwrap()
        }));
    }

    let mut addresses = Vec::new();
    for task in tasks {
        addresses.push(task.await.unwrap());
    }
    addresses.dedup();
    assert_eq!(addresses.len(), 1, "all writers must agree on the address");
    let address = addresses[0];

    let bucket = temp.path().join(&address.to_text()[..4]);
    assert_eq!(fs::read_dir(&bucket).unwrap().count(), 1);

    let object = bucket.join(&address.to_text()[4..]);
    let meta = fs::metadata(&object).unwrap();
    assert!(meta.permissions().readonly());
    assert_eq!(meta.len(), (10 * MIB) as u64);

    let listed: Vec<_> = store.list().map(|a| a.unwrap()).collect();
    assert_eq!(listed, vec![address]);

    // Losing writers discarded their temp files.
    assert_eq!(fs::read_dir(temp.path().join("tmp")).unwrap().count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_distinct_writes_all_land() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(Store::open(temp.path()).unwrap());

    let mut tasks = Vec::new();
    for i in 0u8..16 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            let data = vec![i; 32 * 1024];
            store.write_bytes(&data, &[]).await.unwrap()
        }));
    }

    let mut addresses = Vec::new();
    for task in tasks {
        addresses.push(task.await.unwrap());
    }
    addresses.sort();
    addresses.dedup();
    assert_eq!(addresses.len(), 16);

    let mut listed: Vec<_> = store.list().map(|a| a.unwrap()).collect();
    listed.sort();
    assert_eq!(listed, addresses);
}

#[tokio::test]
async fn open_reader_survives_delete() {
    let temp = TempDir::new().unwrap();
    let store = Store::open(temp.path()).unwrap();

    let data = vec![0x42u8; 256 * 1024];
    let address = store.write_bytes(&data, &[]).await.unwrap();

    let mut stream = store
        .try_open(&address, ReadOptions::SEQUENTIAL, None)
        .await
        .unwrap()
        .unwrap();

    assert!(store.delete(&address).unwrap());
    assert!(!store.contains(&address, None));

    // The handle opened before the delete still sees the original bytes.
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).await.unwrap();
    assert_eq!(bytes, data);
}

#[tokio::test]
async fn write_after_delete_restores_the_object() {
    let temp = TempDir::new().unwrap();
    let store = Store::open(temp.path()).unwrap();

    let first = store.write_bytes(b"phoenix", &[]).await.unwrap();
    assert!(store.delete(&first).unwrap());
    let second = store.write_bytes(b"phoenix", &[]).await.unwrap();
    assert_eq!(first, second);
    assert!(store.contains(&second, None));
    assert_eq!(store.try_len(&second, None), Some(7));
}
