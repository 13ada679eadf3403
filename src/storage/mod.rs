//! The storage contract shared by drivers, wrappers and the router

pub mod path;

use std::fmt;
use std::pin::Pin;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{stream, Stream, StreamExt};

use crate::context::CallContext;
use crate::error::Result;

/// File type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
}

/// Metadata for a file or directory
///
/// Drivers fill `id` with their local id and `path` relative to the
/// mount root; the mount rewrites both into the global namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub id: String,
    pub path: String,
    pub file_type: FileType,
    pub size: u64,
    pub mtime: SystemTime,
    pub etag: String,
    pub mime: Option<String>,
}

impl Metadata {
    pub fn file(id: impl Into<String>, path: impl Into<String>, size: u64, mtime: SystemTime) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            file_type: FileType::File,
            size,
            mtime,
            etag: String::new(),
            mime: None,
        }
    }

    pub fn directory(id: impl Into<String>, path: impl Into<String>, mtime: SystemTime) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            file_type: FileType::Directory,
            size: 0,
            mtime,
            etag: String::new(),
            mime: None,
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = etag.into();
        self
    }

    pub fn is_file(&self) -> bool {
        matches!(self.file_type, FileType::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.file_type, FileType::Directory)
    }
}

/// A stored previous version of a file
#[derive(Debug, Clone, PartialEq)]
pub struct Revision {
    pub key: String,
    pub size: u64,
    pub mtime: DateTime<Utc>,
}

/// An entry in a mount's recycle bin
#[derive(Debug, Clone, PartialEq)]
pub struct RecycleEntry {
    /// Key accepted by `restore_recycle_entry`
    pub restore_key: String,
    /// Path the entry was deleted from
    pub path: String,
    pub file_type: FileType,
    pub size: u64,
    pub deleted_at: DateTime<Utc>,
}

/// Stream of content chunks for uploads and downloads
///
/// Dropping the stream releases whatever the producer holds.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Wrap an in-memory buffer as a single-chunk stream
pub fn byte_stream(data: impl Into<Bytes>) -> ByteStream {
    let data: Bytes = data.into();
    Box::pin(stream::once(async move { Ok(data) }))
}

/// Drain a stream into one buffer, checking for cancellation between chunks
pub async fn collect_bytes(ctx: &CallContext, mut stream: ByteStream) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        ctx.check()?;
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

/// Storage contract operations, used for logging and access checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateDir,
    Delete,
    Move,
    GetMetadata,
    ListFolder,
    Upload,
    Download,
    ListRevisions,
    DownloadRevision,
    RestoreRevision,
    ListRecycle,
    RestoreRecycleEntry,
    EmptyRecycle,
    GetPathById,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateDir => "create_dir",
            Operation::Delete => "delete",
            Operation::Move => "move",
            Operation::GetMetadata => "get_metadata",
            Operation::ListFolder => "list_folder",
            Operation::Upload => "upload",
            Operation::Download => "download",
            Operation::ListRevisions => "list_revisions",
            Operation::DownloadRevision => "download_revision",
            Operation::RestoreRevision => "restore_revision",
            Operation::ListRecycle => "list_recycle",
            Operation::RestoreRecycleEntry => "restore_recycle_entry",
            Operation::EmptyRecycle => "empty_recycle",
            Operation::GetPathById => "get_path_by_id",
        }
    }

    /// Whether the operation changes backend state
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Operation::CreateDir
                | Operation::Delete
                | Operation::Move
                | Operation::Upload
                | Operation::RestoreRevision
                | Operation::RestoreRecycleEntry
                | Operation::EmptyRecycle
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core storage trait implemented by drivers and wrappers
///
/// Paths handed to an implementation are absolute within the mount
/// (`/` is the mount root). Every operation receives the caller's
/// context and must pass it on unchanged to the next layer.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Create a directory; the parent must exist
    async fn create_dir(&self, ctx: &CallContext, path: &str) -> Result<()>;

    /// Delete a file or directory tree
    async fn delete(&self, ctx: &CallContext, path: &str) -> Result<()>;

    /// Move or rename an entry, keeping its id
    async fn move_entry(&self, ctx: &CallContext, from: &str, to: &str) -> Result<()>;

    async fn get_metadata(&self, ctx: &CallContext, path: &str) -> Result<Metadata>;

    async fn list_folder(&self, ctx: &CallContext, path: &str) -> Result<Vec<Metadata>>;

    /// Store the stream's content at `path`, replacing any previous file
    async fn upload(&self, ctx: &CallContext, path: &str, data: ByteStream) -> Result<()>;

    async fn download(&self, ctx: &CallContext, path: &str) -> Result<ByteStream>;

    async fn list_revisions(&self, ctx: &CallContext, path: &str) -> Result<Vec<Revision>>;

    async fn download_revision(
        &self,
        ctx: &CallContext,
        path: &str,
        revision_key: &str,
    ) -> Result<ByteStream>;

    async fn restore_revision(&self, ctx: &CallContext, path: &str, revision_key: &str)
        -> Result<()>;

    async fn list_recycle(&self, ctx: &CallContext, path: &str) -> Result<Vec<RecycleEntry>>;

    async fn restore_recycle_entry(&self, ctx: &CallContext, restore_key: &str) -> Result<()>;

    async fn empty_recycle(&self, ctx: &CallContext, path: &str) -> Result<()>;

    /// Resolve a local id to its current path
    async fn get_path_by_id(&self, ctx: &CallContext, id: &str) -> Result<String>;
}
