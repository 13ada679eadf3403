//! Revision and recycle bin tests through the router


use anyhow::Result;
use common::*;
use vfswitch::storage::{collect_bytes, Storage};
use vfswitch::StorageError;

#[tokio::test]
async fn test_revisions_kept_on_overwrite() -> Result<()> {
    let harness = TestHarness::new()?;
    let storage = harness.storage();
    let ctx = harness.ctx();

    harness.write("/home/doc.txt", b"v1").await?;
    harness.write("/home/doc.txt", b"v2").await?;
    harness.write("/home/doc.txt", b"v3").await?;

    let revisions = storage.list_revisions(&ctx, "/home/doc.txt").await?;
    assert_eq!(revisions.len(), 2);

    let oldest = &revisions[0];
    let stream = storage
        .download_revision(&ctx, "/home/doc.txt", &oldest.key)
        .await?;
    assert_eq!(&collect_bytes(&ctx, stream).await?[..], b"v1");

    storage
        .restore_revision(&ctx, "/home/doc.txt", &oldest.key)
        .await?;
    assert_file_content_str(storage, "/home/doc.txt", "v1").await;

    harness.cleanup()
}

#[tokio::test]
async fn test_revisions_by_identifier() -> Result<()> {
    let harness = TestHarness::new()?;
    let storage = harness.storage();
    let ctx = harness.ctx();

    harness.write("/home/doc.txt", b"first").await?;
    harness.write("/home/doc.txt", b"second").await?;
    let resource_id = id_of(storage, "/home/doc.txt").await;

    let revisions = storage.list_revisions(&ctx, &resource_id).await?;
    assert_eq!(revisions.len(), 1);

    harness.cleanup()
}

#[tokio::test]
async fn test_recycle_round_trip() -> Result<()> {
    let harness = TestHarness::new()?;
    let storage = harness.storage();
    let ctx = harness.ctx();

    storage.create_dir(&ctx, "/home/project").await?;
    harness.write("/home/project/a.txt", b"a").await?;
    let resource_id = id_of(storage, "/home/project/a.txt").await;

    storage.delete(&ctx, "/home/project").await?;
    assert_not_exists(storage, "/home/project/a.txt").await;

    let bin = storage.list_recycle(&ctx, "/home").await?;
    assert_eq!(bin.len(), 1);
    assert_eq!(bin[0].path, "/home/project");
    assert!(bin[0].restore_key.starts_with("home:"));

    storage
        .restore_recycle_entry(&ctx, &bin[0].restore_key)
        .await?;
    assert_file_content_str(storage, "/home/project/a.txt", "a").await;
    // Ids survive the trip through the recycle bin
    assert_eq!(
        storage.get_path_by_id(&ctx, &resource_id).await?,
        "/home/project/a.txt"
    );
    assert!(storage.list_recycle(&ctx, "/home").await?.is_empty());

    harness.cleanup()
}

#[tokio::test]
async fn test_recycle_is_per_mount() -> Result<()> {
    let harness = TestHarness::new()?;
    let storage = harness.storage();
    let ctx = harness.ctx();

    harness.write("/home/a", b"a").await?;
    harness.write("/b", b"b").await?;
    storage.delete(&ctx, "/home/a").await?;
    storage.delete(&ctx, "/b").await?;

    assert_eq!(storage.list_recycle(&ctx, "/home").await?.len(), 1);
    assert_eq!(storage.list_recycle(&ctx, "/").await?.len(), 1);

    storage.empty_recycle(&ctx, "/home").await?;
    assert!(storage.list_recycle(&ctx, "/home").await?.is_empty());
    assert_eq!(storage.list_recycle(&ctx, "/").await?.len(), 1);

    harness.cleanup()
}

#[tokio::test]
async fn test_restore_key_from_other_mount() -> Result<()> {
    let harness = TestHarness::new()?;
    let ctx = harness.ctx();

    let res = harness
        .storage()
        .restore_recycle_entry(&ctx, "nowhere:1")
        .await;
    assert!(matches!(res, Err(StorageError::MountNotFound(_))));

    let res = harness.storage().restore_recycle_entry(&ctx, "home:999").await;
    assert!(matches!(res, Err(StorageError::NotFound(_))));

    harness.cleanup()
}
