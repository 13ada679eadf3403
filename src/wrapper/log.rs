//! Access logging wrapper
//!
//! Emits one `tracing` event per call with the caller, target, outcome and
//! duration. Calls whose future is dropped before completion (cancelled
//! or abandoned by the caller) are logged as such.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::context::CallContext;
use crate::error::{status_of, Result, StatusCode};
use crate::storage::{ByteStream, Metadata, Operation, RecycleEntry, Revision, Storage};
use crate::wrapper::options_or_default;

/// Access log options
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccessLogConfig {
    /// Label attached to every event (defaults to "storage")
    pub label: Option<String>,
    /// Calls slower than this are logged at warn level
    #[serde(with = "humantime_serde")]
    pub slow_threshold: Option<Duration>,
}

/// Call counters kept by the access log
#[derive(Debug, Default)]
pub struct AccessStats {
    pub calls: AtomicU64,
    pub failures: AtomicU64,
    pub abandoned: AtomicU64,
}

/// Wrapper that logs every call
pub struct AccessLog {
    inner: Arc<dyn Storage>,
    label: String,
    slow_threshold: Option<Duration>,
    stats: AccessStats,
}

impl AccessLog {
    pub fn new(inner: Arc<dyn Storage>, config: AccessLogConfig) -> Self {
        Self {
            inner,
            label: config.label.unwrap_or_else(|| "storage".to_string()),
            slow_threshold: config.slow_threshold,
            stats: AccessStats::default(),
        }
    }

    pub fn from_options(inner: Arc<dyn Storage>, options: &serde_yaml::Value) -> Result<Self> {
        Ok(Self::new(inner, options_or_default("log wrapper", options)?))
    }

    pub fn stats(&self) -> &AccessStats {
        &self.stats
    }

    async fn logged<T, F>(&self, ctx: &CallContext, op: Operation, target: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        let started = Instant::now();
        let user = ctx.user().map(|u| u.account_id.clone());
        self.stats.calls.fetch_add(1, Ordering::Relaxed);

        // Runs on every exit, including when this future is dropped mid-call
        let mut outcome = scopeguard::guard(None::<StatusCode>, |outcome| {
            self.finish(op, target, user.as_deref(), started.elapsed(), outcome)
        });

        let res = fut.await;
        *outcome = Some(status_of(&res));
        res
    }

    fn finish(
        &self,
        op: Operation,
        target: &str,
        user: Option<&str>,
        elapsed: Duration,
        outcome: Option<StatusCode>,
    ) {
        let user = user.unwrap_or("-");
        let elapsed_ms = elapsed.as_millis() as u64;
        match outcome {
            None => {
                self.stats.abandoned.fetch_add(1, Ordering::Relaxed);
                debug!(label = %self.label, %op, resource = target, user, elapsed_ms, "call abandoned");
            }
            Some(StatusCode::Ok) => {
                if self.slow_threshold.is_some_and(|t| elapsed > t) {
                    warn!(label = %self.label, %op, resource = target, user, elapsed_ms, "slow call");
                } else {
                    info!(label = %self.label, %op, resource = target, user, elapsed_ms, "ok");
                }
            }
            Some(status) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                info!(label = %self.label, %op, resource = target, user, elapsed_ms, ?status, "failed");
            }
        }
    }
}

#[async_trait]
impl Storage for AccessLog {
    async fn create_dir(&self, ctx: &CallContext, path: &str) -> Result<()> {
        self.logged(ctx, Operation::CreateDir, path, self.inner.create_dir(ctx, path))
            .await
    }

    async fn delete(&self, ctx: &CallContext, path: &str) -> Result<()> {
        self.logged(ctx, Operation::Delete, path, self.inner.delete(ctx, path))
            .await
    }

    async fn move_entry(&self, ctx: &CallContext, from: &str, to: &str) -> Result<()> {
        self.logged(ctx, Operation::Move, from, self.inner.move_entry(ctx, from, to))
            .await
    }

    async fn get_metadata(&self, ctx: &CallContext, path: &str) -> Result<Metadata> {
        self.logged(ctx, Operation::GetMetadata, path, self.inner.get_metadata(ctx, path))
            .await
    }

    async fn list_folder(&self, ctx: &CallContext, path: &str) -> Result<Vec<Metadata>> {
        self.logged(ctx, Operation::ListFolder, path, self.inner.list_folder(ctx, path))
            .await
    }

    async fn upload(&self, ctx: &CallContext, path: &str, data: ByteStream) -> Result<()> {
        self.logged(ctx, Operation::Upload, path, self.inner.upload(ctx, path, data))
            .await
    }

    async fn download(&self, ctx: &CallContext, path: &str) -> Result<ByteStream> {
        self.logged(ctx, Operation::Download, path, self.inner.download(ctx, path))
            .await
    }

    async fn list_revisions(&self, ctx: &CallContext, path: &str) -> Result<Vec<Revision>> {
        self.logged(
            ctx,
            Operation::ListRevisions,
            path,
            self.inner.list_revisions(ctx, path),
        )
        .await
    }

    async fn download_revision(
        &self,
        ctx: &CallContext,
        path: &str,
        revision_key: &str,
    ) -> Result<ByteStream> {
        self.logged(
            ctx,
            Operation::DownloadRevision,
            path,
            self.inner.download_revision(ctx, path, revision_key),
        )
        .await
    }

    async fn restore_revision(
        &self,
        ctx: &CallContext,
        path: &str,
        revision_key: &str,
    ) -> Result<()> {
        self.logged(
            ctx,
            Operation::RestoreRevision,
            path,
            self.inner.restore_revision(ctx, path, revision_key),
        )
        .await
    }

    async fn list_recycle(&self, ctx: &CallContext, path: &str) -> Result<Vec<RecycleEntry>> {
        self.logged(ctx, Operation::ListRecycle, path, self.inner.list_recycle(ctx, path))
            .await
    }

    async fn restore_recycle_entry(&self, ctx: &CallContext, restore_key: &str) -> Result<()> {
        self.logged(
            ctx,
            Operation::RestoreRecycleEntry,
            restore_key,
            self.inner.restore_recycle_entry(ctx, restore_key),
        )
        .await
    }

    async fn empty_recycle(&self, ctx: &CallContext, path: &str) -> Result<()> {
        self.logged(ctx, Operation::EmptyRecycle, path, self.inner.empty_recycle(ctx, path))
            .await
    }

    async fn get_path_by_id(&self, ctx: &CallContext, id: &str) -> Result<String> {
        self.logged(ctx, Operation::GetPathById, id, self.inner.get_path_by_id(ctx, id))
            .await
    }
}
