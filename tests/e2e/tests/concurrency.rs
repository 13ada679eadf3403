//! Concurrent access tests
//!
//! Drives the router from many tasks at once:
//! - Parallel uploads spread across mounts
//! - Mount table changes while traffic is in flight
//! - Deadlines and cancellation


use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use common::*;
use futures::future::join_all;
use futures::stream;
use vfswitch::storage::{byte_stream, Storage};
use vfswitch::{CallContext, StorageError};

#[cfg(not(feature = "stress"))]
const TASKS: usize = 32;
#[cfg(feature = "stress")]
const TASKS: usize = 1024;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_uploads_across_mounts() -> Result<()> {
    let harness = TestHarness::new()?;

    let handles: Vec<_> = (0..TASKS)
        .map(|i| {
            let storage = harness.shared();
            tokio::spawn(async move {
                let dir = if i % 2 == 0 { "/home" } else { "" };
                let target = format!("{}/file_{:04}.txt", dir, i);
                let content = format!("content {}", i);
                storage
                    .upload(&CallContext::new(), &target, byte_stream(content))
                    .await
                    .map(|_| target)
            })
        })
        .collect();

    for handle in join_all(handles).await {
        handle??;
    }

    let ctx = harness.ctx();
    let home = harness.storage().list_folder(&ctx, "/home").await?;
    assert_eq!(home.len(), TASKS / 2);
    assert!(home.iter().all(|md| md.id.starts_with("home:")));

    // The root backend never saw /home, so only its own files are listed
    let root = harness.storage().list_folder(&ctx, "/").await?;
    assert_eq!(root.len(), TASKS - TASKS / 2);

    assert_file_content_str(harness.storage(), "/home/file_0000.txt", "content 0").await;
    assert_file_content_str(harness.storage(), "/file_0001.txt", "content 1").await;

    harness.cleanup()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads() -> Result<()> {
    let harness = TestHarness::new()?;
    let content = random_bytes(64 * 1024);
    harness.write("/home/shared.bin", &content).await?;
    let expected = content_hash(&content);

    let handles: Vec<_> = (0..TASKS)
        .map(|_| {
            let storage = harness.shared();
            tokio::spawn(async move {
                let ctx = CallContext::new();
                let stream = storage.download(&ctx, "/home/shared.bin").await?;
                vfswitch::storage::collect_bytes(&ctx, stream).await
            })
        })
        .collect();

    for handle in join_all(handles).await {
        let data = handle??;
        assert_eq!(content_hash(&data), expected);
    }

    harness.cleanup()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mount_changes_during_traffic() -> Result<()> {
    let harness = TestHarness::new()?;
    let storage = harness.shared();

    let reader = {
        let storage = harness.shared();
        tokio::spawn(async move {
            let ctx = CallContext::new();
            for _ in 0..200 {
                // The root mount stays put; /projects may or may not exist
                storage.get_metadata(&ctx, "/").await?;
                match storage.get_metadata(&ctx, "/projects").await {
                    Ok(_) | Err(StorageError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
                tokio::task::yield_now().await;
            }
            Ok::<_, StorageError>(())
        })
    };

    for round in 0..20 {
        let id = format!("projects{}", round);
        storage.add_mount(vfswitch::mount::MountTableEntry::new(
            "/projects",
            id.as_str(),
            "memory",
        ))?;
        tokio::task::yield_now().await;
        storage.remove_mount("/projects")?;
    }

    reader.await??;
    assert_eq!(storage.list_mounts().len(), 2);

    harness.cleanup()
}

#[tokio::test]
async fn test_in_flight_upload_survives_unmount() -> Result<()> {
    let harness = TestHarness::new()?;
    let mount = harness.storage().get_mount("/home")?;

    let (tx, rx) = futures::channel::mpsc::unbounded::<vfswitch::Result<Bytes>>();
    let upload = tokio::spawn({
        let mount = mount.clone();
        async move {
            mount
                .upload(&CallContext::new(), "/home/late.txt", Box::pin(rx))
                .await
        }
    });

    harness.storage().remove_mount("/home")?;
    tx.unbounded_send(Ok(Bytes::from_static(b"late")))
        .expect("upload task holds the receiver");
    drop(tx);

    upload.await??;
    // The detached mount still owns its backend
    assert_file_content_str(mount.as_ref(), "/home/late.txt", "late").await;
    assert_not_exists(harness.storage(), "/home/late.txt").await;

    harness.cleanup()
}

#[tokio::test]
async fn test_deadline_cancels_stalled_upload() -> Result<()> {
    let harness = TestHarness::new()?;
    let ctx = CallContext::with_deadline(Duration::from_millis(20));

    let stalled = Box::pin(stream::pending::<vfswitch::Result<Bytes>>());
    let res = tokio::time::timeout(
        Duration::from_secs(1),
        harness.storage().upload(&ctx, "/home/stalled.bin", stalled),
    )
    .await?;

    assert!(matches!(res, Err(StorageError::Cancelled)), "{:?}", res);
    assert_not_exists(harness.storage(), "/home/stalled.bin").await;

    harness.cleanup()
}

#[tokio::test]
async fn test_cancelled_context_fails_fast() -> Result<()> {
    let harness = TestHarness::new()?;
    harness.write("/home/a.txt", b"a").await?;

    let ctx = CallContext::new();
    ctx.cancel();
    let res = harness.storage().get_metadata(&ctx, "/home/a.txt").await;
    assert!(matches!(res, Err(StorageError::Cancelled)));

    // A child of a live context is independent of its siblings
    let parent = CallContext::new();
    let child = parent.child();
    child.cancel();
    assert!(harness
        .storage()
        .get_metadata(&parent, "/home/a.txt")
        .await
        .is_ok());

    harness.cleanup()
}

#[tokio::test]
async fn test_unique_names_do_not_collide() -> Result<()> {
    let harness = TestHarness::new()?;
    let names: Vec<String> = (0..8).map(|_| unique_name("/home/doc")).collect();

    let results = join_all(names.iter().map(|name| harness.write(name, name.as_bytes()))).await;
    assert!(results.iter().all(|r| r.is_ok()));

    for name in &names {
        assert_file_content_str(harness.storage(), name, name).await;
    }
    harness.cleanup()
}
