//! Wrapper chain tests
//!
//! Exercises the built-in wrappers through configured mounts:
//! - Chain ordering by priority
//! - Metadata cache coherence under writes
//! - Upload quota
//! - Access logging stays transparent


use anyhow::Result;
use common::*;
use vfswitch::storage::Storage;
use vfswitch::wrapper::call_order;
use vfswitch::{StatusCode, StorageError};

#[test]
fn test_chain_order_from_config() -> Result<()> {
    let harness = TestHarness::with_config(|builder| {
        builder.add_mount_with_wrappers(
            "/home",
            "home",
            vec![
                WrapperConfig::new(1, "cache"),
                WrapperConfig::new(2, "log"),
                WrapperConfig::new(1, "quota").with_options("max_file_size: 1MB"),
            ],
        )
    })?;

    let mount = harness.storage().get_mount("/home")?;
    // Highest priority is reached first; ties keep the later-declared one outside
    assert_eq!(call_order(&mount.entry().wrappers), vec!["log", "quota", "cache"]);

    harness.cleanup()
}

#[tokio::test]
async fn test_cache_sees_overwrites() -> Result<()> {
    let harness = TestHarness::with_config(|builder| {
        builder.add_mount_with_wrappers(
            "/home",
            "home",
            vec![WrapperConfig::new(1, "cache").with_options("ttl: 1h")],
        )
    })?;
    let storage = harness.storage();
    let ctx = harness.ctx();

    harness.write("/home/a.txt", b"short").await?;
    assert_eq!(storage.get_metadata(&ctx, "/home/a.txt").await?.size, 5);
    assert_dir_contains_exactly(storage, "/home", &["a.txt"]).await;

    harness.write("/home/a.txt", b"much longer").await?;
    harness.write("/home/b.txt", b"b").await?;
    assert_eq!(storage.get_metadata(&ctx, "/home/a.txt").await?.size, 11);
    assert_dir_contains_exactly(storage, "/home", &["a.txt", "b.txt"]).await;

    storage.delete(&ctx, "/home/a.txt").await?;
    assert_not_exists(storage, "/home/a.txt").await;
    assert_dir_contains_exactly(storage, "/home", &["b.txt"]).await;

    harness.cleanup()
}

#[tokio::test]
async fn test_cache_sees_recycle_restore() -> Result<()> {
    let harness = TestHarness::with_config(|builder| {
        builder.add_mount_with_wrappers(
            "/home",
            "home",
            vec![WrapperConfig::new(1, "cache").with_options("ttl: 1h")],
        )
    })?;
    let storage = harness.storage();
    let ctx = harness.ctx();

    harness.write("/home/a.txt", b"x").await?;
    storage.delete(&ctx, "/home/a.txt").await?;
    assert_dir_contains_exactly(storage, "/home", &[]).await;

    let bin = storage.list_recycle(&ctx, "/home").await?;
    storage
        .restore_recycle_entry(&ctx, &bin[0].restore_key)
        .await?;
    assert_dir_contains_exactly(storage, "/home", &["a.txt"]).await;

    harness.cleanup()
}

#[tokio::test]
async fn test_quota_rejects_large_upload() -> Result<()> {
    let harness = TestHarness::with_config(|builder| {
        builder.add_mount_with_wrappers(
            "/home",
            "home",
            vec![WrapperConfig::new(1, "quota").with_options("max_file_size: 1KB")],
        )
    })?;

    harness.write("/home/small.bin", &random_bytes(1024)).await?;

    let big = random_bytes(4096);
    let res = harness
        .storage()
        .upload(
            &harness.ctx(),
            "/home/big.bin",
            vfswitch::storage::byte_stream(big),
        )
        .await;
    assert!(matches!(res, Err(StorageError::QuotaExceeded(_))));
    assert_status(&res, StatusCode::StoragePermissionDenied);
    assert_not_exists(harness.storage(), "/home/big.bin").await;

    harness.cleanup()
}

#[tokio::test]
async fn test_full_chain_is_transparent() -> Result<()> {
    let harness = TestHarness::with_config(|builder| {
        builder.default_wrappers(vec![
            WrapperConfig::new(30, "log").with_options("slow_threshold: 1s"),
            WrapperConfig::new(20, "quota").with_options("max_file_size: 10MB"),
            WrapperConfig::new(10, "cache"),
        ])
        .add_memory_mount("/", "root")
        .add_memory_mount("/home", "home")
    })?;

    let content = random_bytes(256 * 1024);
    let name = format!("/home/{}", random_filename("blob"));
    harness.write(&name, &content).await?;

    let read_back = harness.read(&name).await?;
    assert_eq!(content_hash(&read_back), content_hash(&content));

    let resource_id = id_of(harness.storage(), &name).await;
    assert_eq!(
        harness
            .storage()
            .get_path_by_id(&harness.ctx(), &resource_id)
            .await?,
        name
    );

    harness.cleanup()
}
