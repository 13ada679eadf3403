//! Storage assertions for e2e tests
//!
//! Provides assertion functions for verifying state seen through the router.

use anyhow::Result;
use std::fmt::Debug;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use vfswitch::storage::{collect_bytes, Storage};
use vfswitch::{CallContext, StatusCode, StorageError};

/// Assert that a file exists at the given target
pub async fn assert_file_exists(storage: &dyn Storage, target: &str) {
    let md = storage
        .get_metadata(&CallContext::new(), target)
        .await
        .unwrap_or_else(|e| panic!("Expected file to exist at {}, got {}", target, e));
    assert!(md.is_file(), "Expected {} to be a file, got {:?}", target, md);
}

/// Assert that a directory exists at the given target
pub async fn assert_dir_exists(storage: &dyn Storage, target: &str) {
    let md = storage
        .get_metadata(&CallContext::new(), target)
        .await
        .unwrap_or_else(|e| panic!("Expected directory to exist at {}, got {}", target, e));
    assert!(md.is_dir(), "Expected {} to be a directory, got {:?}", target, md);
}

/// Assert that nothing exists at the given target
pub async fn assert_not_exists(storage: &dyn Storage, target: &str) {
    let res = storage.get_metadata(&CallContext::new(), target).await;
    assert!(
        matches!(res, Err(StorageError::NotFound(_))),
        "Expected {} to not exist, got {:?}",
        target,
        res
    );
}

/// Assert that a file has the expected content
pub async fn assert_file_content(storage: &dyn Storage, target: &str, expected: &[u8]) {
    let ctx = CallContext::new();
    let stream = storage
        .download(&ctx, target)
        .await
        .unwrap_or_else(|e| panic!("Failed to download {}: {}", target, e));
    let actual = collect_bytes(&ctx, stream)
        .await
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", target, e));
    assert_eq!(
        &actual[..],
        expected,
        "File content mismatch at {}\nExpected {} bytes, got {} bytes",
        target,
        expected.len(),
        actual.len()
    );
}

/// Assert that a file contains the expected text
pub async fn assert_file_content_str(storage: &dyn Storage, target: &str, expected: &str) {
    assert_file_content(storage, target, expected.as_bytes()).await;
}

/// Assert that a directory contains the expected entries (exact match, by name)
pub async fn assert_dir_contains_exactly(storage: &dyn Storage, target: &str, expected: &[&str]) {
    let entries = storage
        .list_folder(&CallContext::new(), target)
        .await
        .unwrap_or_else(|e| panic!("Failed to list {}: {}", target, e));
    let mut names: Vec<String> = entries
        .iter()
        .map(|md| md.path.rsplit('/').next().unwrap_or_default().to_string())
        .collect();
    names.sort();

    let mut expected_sorted: Vec<&str> = expected.to_vec();
    expected_sorted.sort();

    assert_eq!(
        names, expected_sorted,
        "Directory {} contents mismatch.\nExpected: {:?}\nGot: {:?}",
        target, expected_sorted, names
    );
}

/// Assert that a result failed with the given external status
pub fn assert_status<T: Debug>(result: &vfswitch::Result<T>, expected: StatusCode) {
    assert_eq!(
        vfswitch::error::status_of(result),
        expected,
        "Unexpected status for {:?}",
        result
    );
}

/// Retry an assertion until it succeeds or times out
pub async fn assert_eventually<F, E>(f: F, timeout_duration: Duration) -> Result<()>
where
    F: Fn() -> Result<(), E>,
    E: std::fmt::Debug,
{
    let poll_interval = Duration::from_millis(10);
    let mut last_error = None;

    timeout(timeout_duration, async {
        loop {
            match f() {
                Ok(()) => return Ok::<_, anyhow::Error>(()),
                Err(e) => {
                    last_error = Some(format!("{:?}", e));
                    sleep(poll_interval).await;
                }
            }
        }
    })
    .await
    .map_err(|_| {
        anyhow::anyhow!(
            "Assertion did not succeed within {:?}. Last error: {:?}",
            timeout_duration,
            last_error
        )
    })??;

    Ok(())
}

/// Generate random bytes of the specified size
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate a random filename with the given prefix
pub fn random_filename(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

/// Non-cryptographic content fingerprint
pub fn content_hash(data: &[u8]) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
