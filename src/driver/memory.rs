//! In-memory reference driver
//!
//! Keeps every file, revision and recycle bin entry in memory. Ids are
//! assigned at creation and survive moves, deletion to the recycle bin and
//! restoration. All data is lost when the driver is dropped.

use std::collections::HashMap;
use std::time::SystemTime;

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::context::CallContext;
use crate::error::{Result, StorageError};
use crate::storage::path::{self, parent};
use crate::storage::{
    collect_bytes, ByteStream, FileType, Metadata, RecycleEntry, Revision, Storage,
};
use crate::wrapper::{options_or_default, parse_size};

const ROOT_ID: u64 = 1;

/// Memory driver options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryDriverConfig {
    /// Download chunk size (e.g. "64KB")
    pub chunk_size: String,
    /// Revisions kept per file before the oldest is dropped
    pub max_revisions: usize,
}

impl Default for MemoryDriverConfig {
    fn default() -> Self {
        Self {
            chunk_size: "64KB".to_string(),
            max_revisions: 10,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredRevision {
    key: String,
    data: Bytes,
    mtime: DateTime<Utc>,
}

#[derive(Debug, Clone)]
enum NodeKind {
    File {
        data: Bytes,
        revisions: Vec<StoredRevision>,
    },
    Directory,
}

#[derive(Debug, Clone)]
struct Node {
    path: String,
    mtime: SystemTime,
    kind: NodeKind,
}

/// Everything removed by one `delete`, restorable as a unit
#[derive(Debug, Clone)]
struct RecycledItem {
    key: String,
    path: String,
    deleted_at: DateTime<Utc>,
    /// Root node first, descendants after
    nodes: Vec<(u64, Node)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    next_key: u64,
    nodes: HashMap<u64, Node>,
    paths: HashMap<String, u64>,
    recycle: Vec<RecycledItem>,
}

impl MemoryState {
    fn node(&self, path: &str) -> Result<(u64, &Node)> {
        let id = *self
            .paths
            .get(path)
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;
        let node = self
            .nodes
            .get(&id)
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;
        Ok((id, node))
    }

    fn require_dir(&self, path: &str) -> Result<()> {
        match self.node(path)? {
            (_, Node { kind: NodeKind::Directory, .. }) => Ok(()),
            _ => Err(StorageError::InvalidPath(format!(
                "not a directory: {}",
                path
            ))),
        }
    }

    fn require_parent_dir(&self, path: &str) -> Result<()> {
        match parent(path) {
            Some(p) => self.require_dir(p),
            None => Err(StorageError::InvalidPath("mount root".to_string())),
        }
    }

    fn insert(&mut self, id: u64, node: Node) {
        self.paths.insert(node.path.clone(), id);
        self.nodes.insert(id, node);
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn allocate_key(&mut self) -> u64 {
        self.next_key += 1;
        self.next_key
    }

    /// Ids of `path` and everything below it, root first
    fn subtree(&self, path: &str) -> Vec<u64> {
        let mut ids: Vec<(&String, u64)> = self
            .paths
            .iter()
            .filter(|(p, _)| path::strip_mount(p, path).is_some())
            .map(|(p, id)| (p, *id))
            .collect();
        ids.sort_by(|a, b| a.0.cmp(b.0));
        ids.into_iter().map(|(_, id)| id).collect()
    }

    fn metadata(id: u64, node: &Node) -> Metadata {
        match &node.kind {
            NodeKind::File { data, revisions } => {
                Metadata::file(id.to_string(), node.path.clone(), data.len() as u64, node.mtime)
                    .with_etag(format!("\"{}-{}\"", id, revisions.len()))
            }
            NodeKind::Directory => {
                Metadata::directory(id.to_string(), node.path.clone(), node.mtime)
                    .with_etag(format!("\"{}\"", id))
            }
        }
    }
}

/// In-memory storage driver
pub struct MemoryDriver {
    state: RwLock<MemoryState>,
    chunk_size: usize,
    max_revisions: usize,
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new(MemoryDriverConfig::default())
    }
}

impl MemoryDriver {
    pub fn new(config: MemoryDriverConfig) -> Self {
        let chunk_size = parse_size(&config.chunk_size)
            .filter(|n| *n > 0)
            .unwrap_or(64 * 1024) as usize;

        let mut state = MemoryState {
            next_id: ROOT_ID,
            ..Default::default()
        };
        state.insert(
            ROOT_ID,
            Node {
                path: "/".to_string(),
                mtime: SystemTime::now(),
                kind: NodeKind::Directory,
            },
        );

        Self {
            state: RwLock::new(state),
            chunk_size,
            max_revisions: config.max_revisions,
        }
    }

    /// Build from opaque mount driver options
    pub fn from_options(options: &serde_yaml::Value) -> Result<Self> {
        let config: MemoryDriverConfig = options_or_default("memory driver", options)?;
        if !matches!(parse_size(&config.chunk_size), Some(n) if n > 0 && n <= usize::MAX as u64) {
            return Err(StorageError::Config(format!(
                "memory driver: invalid chunk_size {:?}",
                config.chunk_size
            )));
        }
        Ok(Self::new(config))
    }

    fn chunked(&self, data: Bytes) -> ByteStream {
        let chunk_size = self.chunk_size;
        Box::pin(try_stream! {
            let mut offset = 0;
            while offset < data.len() {
                let end = (offset + chunk_size).min(data.len());
                yield data.slice(offset..end);
                offset = end;
            }
        })
    }

    fn find_revision(&self, path: &str, revision_key: &str) -> Result<StoredRevision> {
        let state = self.state.read();
        let (_, node) = state.node(path)?;
        match &node.kind {
            NodeKind::File { revisions, .. } => revisions
                .iter()
                .find(|r| r.key == revision_key)
                .cloned()
                .ok_or_else(|| {
                    StorageError::NotFound(format!("revision {} of {}", revision_key, path))
                }),
            NodeKind::Directory => Err(StorageError::InvalidPath(format!(
                "is a directory: {}",
                path
            ))),
        }
    }
}

#[async_trait]
impl Storage for MemoryDriver {
    async fn create_dir(&self, ctx: &CallContext, path: &str) -> Result<()> {
        ctx.check()?;
        let mut state = self.state.write();
        if state.paths.contains_key(path) {
            return Err(StorageError::AlreadyExists(path.to_string()));
        }
        state.require_parent_dir(path)?;

        let id = state.allocate_id();
        state.insert(
            id,
            Node {
                path: path.to_string(),
                mtime: SystemTime::now(),
                kind: NodeKind::Directory,
            },
        );
        debug!(path, id, "created directory");
        Ok(())
    }

    async fn delete(&self, ctx: &CallContext, path: &str) -> Result<()> {
        ctx.check()?;
        if path == "/" {
            return Err(StorageError::InvalidPath(
                "cannot delete the mount root".to_string(),
            ));
        }

        let mut state = self.state.write();
        state.node(path)?;

        let mut nodes = Vec::new();
        for id in state.subtree(path) {
            if let Some(node) = state.nodes.remove(&id) {
                state.paths.remove(&node.path);
                nodes.push((id, node));
            }
        }

        let key = state.allocate_key();
        state.recycle.push(RecycledItem {
            key: key.to_string(),
            path: path.to_string(),
            deleted_at: Utc::now(),
            nodes,
        });
        debug!(path, key, "moved to recycle bin");
        Ok(())
    }

    async fn move_entry(&self, ctx: &CallContext, from: &str, to: &str) -> Result<()> {
        ctx.check()?;
        if from == "/" || to == "/" {
            return Err(StorageError::InvalidPath(
                "cannot move the mount root".to_string(),
            ));
        }
        if path::strip_mount(to, from).is_some() {
            return Err(StorageError::InvalidPath(format!(
                "cannot move {} into itself",
                from
            )));
        }

        let mut state = self.state.write();
        state.node(from)?;
        if state.paths.contains_key(to) {
            return Err(StorageError::AlreadyExists(to.to_string()));
        }
        state.require_parent_dir(to)?;

        for id in state.subtree(from) {
            let Some(node) = state.nodes.get_mut(&id) else {
                continue;
            };
            let old = std::mem::take(&mut node.path);
            let rest = path::strip_mount(&old, from).unwrap_or_else(|| "/".to_string());
            node.path = path::join_mount(to, &rest);
            let new = node.path.clone();
            state.paths.remove(&old);
            state.paths.insert(new, id);
        }
        debug!(from, to, "moved");
        Ok(())
    }

    async fn get_metadata(&self, ctx: &CallContext, path: &str) -> Result<Metadata> {
        ctx.check()?;
        let state = self.state.read();
        let (id, node) = state.node(path)?;
        Ok(MemoryState::metadata(id, node))
    }

    async fn list_folder(&self, ctx: &CallContext, path: &str) -> Result<Vec<Metadata>> {
        ctx.check()?;
        let state = self.state.read();
        state.require_dir(path)?;

        let mut entries: Vec<Metadata> = state
            .nodes
            .iter()
            .filter(|(_, node)| node.path != "/" && parent(&node.path) == Some(path))
            .map(|(id, node)| MemoryState::metadata(*id, node))
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn upload(&self, ctx: &CallContext, path: &str, data: ByteStream) -> Result<()> {
        ctx.check()?;
        {
            let state = self.state.read();
            state.require_parent_dir(path)?;
        }

        let data = collect_bytes(ctx, data).await?;
        trace!(path, size = data.len(), "upload received");

        let mut state = self.state.write();
        state.require_parent_dir(path)?;

        match state.paths.get(path).copied() {
            Some(id) => {
                let max_revisions = self.max_revisions;
                let Some(node) = state.nodes.get_mut(&id) else {
                    return Err(StorageError::NotFound(path.to_string()));
                };
                let previous_mtime = node.mtime;
                let NodeKind::File { data: current, revisions } = &mut node.kind else {
                    return Err(StorageError::InvalidPath(format!(
                        "is a directory: {}",
                        path
                    )));
                };
                let old = std::mem::replace(current, data);
                let serial = revisions.last().map_or(1, |r| revision_serial(&r.key) + 1);
                revisions.push(StoredRevision {
                    key: format!("{}.{}", id, serial),
                    data: old,
                    mtime: previous_mtime.into(),
                });
                if revisions.len() > max_revisions {
                    revisions.remove(0);
                }
                node.mtime = SystemTime::now();
            }
            None => {
                let id = state.allocate_id();
                state.insert(
                    id,
                    Node {
                        path: path.to_string(),
                        mtime: SystemTime::now(),
                        kind: NodeKind::File {
                            data,
                            revisions: Vec::new(),
                        },
                    },
                );
                debug!(path, id, "created file");
            }
        }
        Ok(())
    }

    async fn download(&self, ctx: &CallContext, path: &str) -> Result<ByteStream> {
        ctx.check()?;
        let data = {
            let state = self.state.read();
            let (_, node) = state.node(path)?;
            match &node.kind {
                NodeKind::File { data, .. } => data.clone(),
                NodeKind::Directory => {
                    return Err(StorageError::InvalidPath(format!(
                        "is a directory: {}",
                        path
                    )))
                }
            }
        };
        Ok(self.chunked(data))
    }

    async fn list_revisions(&self, ctx: &CallContext, path: &str) -> Result<Vec<Revision>> {
        ctx.check()?;
        let state = self.state.read();
        let (_, node) = state.node(path)?;
        match &node.kind {
            NodeKind::File { revisions, .. } => Ok(revisions
                .iter()
                .map(|r| Revision {
                    key: r.key.clone(),
                    size: r.data.len() as u64,
                    mtime: r.mtime,
                })
                .collect()),
            NodeKind::Directory => Ok(Vec::new()),
        }
    }

    async fn download_revision(
        &self,
        ctx: &CallContext,
        path: &str,
        revision_key: &str,
    ) -> Result<ByteStream> {
        ctx.check()?;
        let revision = self.find_revision(path, revision_key)?;
        Ok(self.chunked(revision.data))
    }

    async fn restore_revision(
        &self,
        ctx: &CallContext,
        path: &str,
        revision_key: &str,
    ) -> Result<()> {
        ctx.check()?;
        let restored = self.find_revision(path, revision_key)?;

        let mut state = self.state.write();
        let id = state.node(path)?.0;
        let Some(node) = state.nodes.get_mut(&id) else {
            return Err(StorageError::NotFound(path.to_string()));
        };
        let previous_mtime = node.mtime;
        if let NodeKind::File { data, revisions } = &mut node.kind {
            // The current content becomes the newest revision
            let serial = revisions.last().map_or(1, |r| revision_serial(&r.key) + 1);
            let current = std::mem::replace(data, restored.data);
            revisions.push(StoredRevision {
                key: format!("{}.{}", id, serial),
                data: current,
                mtime: previous_mtime.into(),
            });
            if revisions.len() > self.max_revisions {
                revisions.remove(0);
            }
        }
        node.mtime = SystemTime::now();
        debug!(path, revision_key, "restored revision");
        Ok(())
    }

    async fn list_recycle(&self, ctx: &CallContext, path: &str) -> Result<Vec<RecycleEntry>> {
        ctx.check()?;
        let state = self.state.read();
        Ok(state
            .recycle
            .iter()
            .filter(|item| path::strip_mount(&item.path, path).is_some())
            .map(|item| {
                let (file_type, size) = match item.nodes.first() {
                    Some((_, Node { kind: NodeKind::File { data, .. }, .. })) => {
                        (FileType::File, data.len() as u64)
                    }
                    _ => (FileType::Directory, 0),
                };
                RecycleEntry {
                    restore_key: item.key.clone(),
                    path: item.path.clone(),
                    file_type,
                    size,
                    deleted_at: item.deleted_at,
                }
            })
            .collect())
    }

    async fn restore_recycle_entry(&self, ctx: &CallContext, restore_key: &str) -> Result<()> {
        ctx.check()?;
        let mut state = self.state.write();
        let pos = state
            .recycle
            .iter()
            .position(|item| item.key == restore_key)
            .ok_or_else(|| StorageError::NotFound(format!("recycle entry {}", restore_key)))?;

        let target = state.recycle[pos].path.clone();
        if state.paths.contains_key(&target) {
            return Err(StorageError::AlreadyExists(target));
        }
        state.require_parent_dir(&target)?;

        let item = state.recycle.remove(pos);
        for (id, node) in item.nodes {
            state.insert(id, node);
        }
        debug!(path = %target, restore_key, "restored from recycle bin");
        Ok(())
    }

    async fn empty_recycle(&self, ctx: &CallContext, path: &str) -> Result<()> {
        ctx.check()?;
        let mut state = self.state.write();
        state
            .recycle
            .retain(|item| path::strip_mount(&item.path, path).is_none());
        Ok(())
    }

    async fn get_path_by_id(&self, ctx: &CallContext, id: &str) -> Result<String> {
        ctx.check()?;
        let numeric: u64 = id
            .parse()
            .map_err(|_| StorageError::NotFound(format!("id {}", id)))?;
        let state = self.state.read();
        state
            .nodes
            .get(&numeric)
            .map(|node| node.path.clone())
            .ok_or_else(|| StorageError::NotFound(format!("id {}", id)))
    }
}

fn revision_serial(key: &str) -> u64 {
    key.rsplit('.')
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}
