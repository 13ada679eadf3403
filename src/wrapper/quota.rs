//! Upload size limit
//!
//! Counts bytes as the upload stream is consumed and fails the stream once
//! the limit is crossed, so oversized uploads are refused without
//! buffering them first.

use std::sync::Arc;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

use crate::context::CallContext;
use crate::error::{Result, StorageError};
use crate::storage::{ByteStream, Metadata, RecycleEntry, Revision, Storage};
use crate::wrapper::{options_or_default, parse_size};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Maximum size of a single upload, e.g. "10MB"
    pub max_file_size: Option<String>,
}

/// Wrapper enforcing a per-file size limit on uploads
pub struct Quota {
    inner: Arc<dyn Storage>,
    max_file_size: Option<u64>,
}

impl Quota {
    pub fn new(inner: Arc<dyn Storage>, max_file_size: Option<u64>) -> Self {
        Self {
            inner,
            max_file_size,
        }
    }

    pub fn from_options(inner: Arc<dyn Storage>, options: &serde_yaml::Value) -> Result<Self> {
        let config: QuotaConfig = options_or_default("quota wrapper", options)?;
        let max_file_size = match config.max_file_size {
            Some(s) => Some(parse_size(&s).ok_or_else(|| {
                StorageError::Config(format!("quota wrapper: invalid max_file_size {:?}", s))
            })?),
            None => None,
        };
        Ok(Self::new(inner, max_file_size))
    }

    fn limited(path: &str, limit: u64, mut data: ByteStream) -> ByteStream {
        let path = path.to_string();
        Box::pin(try_stream! {
            let mut seen: u64 = 0;
            while let Some(chunk) = data.next().await {
                let chunk = chunk?;
                seen += chunk.len() as u64;
                if seen > limit {
                    debug!(path = %path, limit, "upload over quota");
                    Err(StorageError::QuotaExceeded(format!(
                        "{} exceeds {} bytes",
                        path, limit
                    )))?;
                }
                yield chunk;
            }
        })
    }
}

#[async_trait]
impl Storage for Quota {
    async fn create_dir(&self, ctx: &CallContext, path: &str) -> Result<()> {
        self.inner.create_dir(ctx, path).await
    }

    async fn delete(&self, ctx: &CallContext, path: &str) -> Result<()> {
        self.inner.delete(ctx, path).await
    }

    async fn move_entry(&self, ctx: &CallContext, from: &str, to: &str) -> Result<()> {
        self.inner.move_entry(ctx, from, to).await
    }

    async fn get_metadata(&self, ctx: &CallContext, path: &str) -> Result<Metadata> {
        self.inner.get_metadata(ctx, path).await
    }

    async fn list_folder(&self, ctx: &CallContext, path: &str) -> Result<Vec<Metadata>> {
        self.inner.list_folder(ctx, path).await
    }

    async fn upload(&self, ctx: &CallContext, path: &str, data: ByteStream) -> Result<()> {
        let data = match self.max_file_size {
            Some(limit) => Self::limited(path, limit, data),
            None => data,
        };
        self.inner.upload(ctx, path, data).await
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
        ctx: &CallContext,
        path: &str,
        revision_key: &str,
    ) -> Result<()> {
        self.inner.restore_revision(ctx, path, revision_key).await
    }

    async fn list_recycle(&self, ctx: &CallContext, path: &str) -> Result<Vec<RecycleEntry>> {
        self.inner.list_recycle(ctx, path).await
    }

    async fn restore_recycle_entry(&self, ctx: &CallContext, restore_key: &str) -> Result<()> {
        self.inner.restore_recycle_entry(ctx, restore_key).await
    }

    async fn empty_recycle(&self, ctx: &CallContext, path: &str) -> Result<()> {
        self.inner.empty_recycle(ctx, path).await
    }

    async fn get_path_by_id(&self, ctx: &CallContext, id: &str) -> Result<String> {
        self.inner.get_path_by_id(ctx, id).await
    }
}
