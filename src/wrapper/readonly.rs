//! Read-only guard
//!
//! Rejects every mutating operation with `PermissionDenied` before it
//! reaches the next link. Reads pass straight through. Installed
//! outermost on mounts with `read_only: true`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::context::CallContext;
use crate::error::{Result, StorageError};
use crate::storage::{ByteStream, Metadata, Operation, RecycleEntry, Revision, Storage};

/// Wrapper refusing all writes
pub struct ReadOnly {
    inner: Arc<dyn Storage>,
}

impl ReadOnly {
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        Self { inner }
    }

    fn deny(&self, op: Operation, target: &str) -> StorageError {
        debug!(op = %op, resource = target, "rejected on read-only mount");
        StorageError::PermissionDenied(format!("{} on read-only mount: {}", op, target))
    }
}

#[async_trait]
impl Storage for ReadOnly {
    async fn create_dir(&self, _ctx: &CallContext, path: &str) -> Result<()> {
        Err(self.deny(Operation::CreateDir, path))
    }

    async fn delete(&self, _ctx: &CallContext, path: &str) -> Result<()> {
        Err(self.deny(Operation::Delete, path))
    }

    async fn move_entry(&self, _ctx: &CallContext, from: &str, _to: &str) -> Result<()> {
        Err(self.deny(Operation::Move, from))
    }

    async fn get_metadata(&self, ctx: &CallContext, path: &str) -> Result<Metadata> {
        self.inner.get_metadata(ctx, path).await
    }

    async fn list_folder(&self, ctx: &CallContext, path: &str) -> Result<Vec<Metadata>> {
        self.inner.list_folder(ctx, path).await
    }

    async fn upload(&self, _ctx: &CallContext, path: &str, _data: ByteStream) -> Result<()> {
        Err(self.deny(Operation::Upload, path))
    }

    async fn download(&self, ctx: &CallContext, path: &str) -> Result<ByteStream> {
        self.inner.download(ctx, path).await
    }

    async fn list_revisions(&self, ctx: &CallContext, path: &str) -> Result<Vec<Revision>> {
        self.inner.list_revisions(ctx, path).await
    }

    async fn download_revision(
        &self,
        ctx: &CallContext,
        path: &str,
        revision_key: &str,
    ) -> Result<ByteStream> {
        self.inner.download_revision(ctx, path, revision_key).await
    }

    async fn restore_revision(
        &self,
        _ctx: &CallContext,
        path: &str,
        _revision_key: &str,
    ) -> Result<()> {
        Err(self.deny(Operation::RestoreRevision, path))
    }

    async fn list_recycle(&self, ctx: &CallContext, path: &str) -> Result<Vec<RecycleEntry>> {
        self.inner.list_recycle(ctx, path).await
    }

    async fn restore_recycle_entry(&self, _ctx: &CallContext, restore_key: &str) -> Result<()> {
        Err(self.deny(Operation::RestoreRecycleEntry, restore_key))
    }

    async fn empty_recycle(&self, _ctx: &CallContext, path: &str) -> Result<()> {
        Err(self.deny(Operation::EmptyRecycle, path))
    }

    async fn get_path_by_id(&self, ctx: &CallContext, id: &str) -> Result<String> {
        self.inner.get_path_by_id(ctx, id).await
    }
}
