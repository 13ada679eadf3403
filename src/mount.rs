//! Mounts and the mount table
//!
//! A [`Mount`] ties a path (`/home`) and a namespace id (`home`) to one
//! composed wrapper chain. It accepts targets in the global address space
//! and translates them for the chain: path targets lose the mount prefix,
//! identifier targets are resolved through the chain's `get_path_by_id`.
//! Identifiers and paths coming back from the chain are re-anchored into
//! the global form.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::context::CallContext;
use crate::driver::DriverRegistry;
use crate::error::{Result, StorageError};
use crate::id::{self, ResourceId};
use crate::storage::path::{is_normalized, join_mount, normalize, strip_mount};
use crate::storage::{ByteStream, Metadata, Operation, RecycleEntry, Revision, Storage};
use crate::wrapper::readonly::ReadOnly;
use crate::wrapper::{call_order, WrapperRegistry, WrapperSpec};

/// Per-mount options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountOptions {
    /// Reject every mutating operation with `PermissionDenied`
    #[serde(default)]
    pub read_only: bool,
}

/// One row of the mount table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountTableEntry {
    pub mount_point: String,
    pub mount_point_id: String,
    #[serde(default)]
    pub mount_options: MountOptions,
    pub driver: String,
    #[serde(default)]
    pub driver_options: serde_yaml::Value,
    #[serde(default)]
    pub wrappers: Vec<WrapperSpec>,
}

impl MountTableEntry {
    pub fn new(
        mount_point: impl Into<String>,
        mount_point_id: impl Into<String>,
        driver: impl Into<String>,
    ) -> Self {
        Self {
            mount_point: mount_point.into(),
            mount_point_id: mount_point_id.into(),
            mount_options: MountOptions::default(),
            driver: driver.into(),
            driver_options: serde_yaml::Value::Null,
            wrappers: Vec::new(),
        }
    }

    pub fn read_only(mut self) -> Self {
        self.mount_options.read_only = true;
        self
    }

    pub fn with_driver_options(mut self, options: serde_yaml::Value) -> Self {
        self.driver_options = options;
        self
    }

    pub fn with_wrapper(mut self, spec: WrapperSpec) -> Self {
        self.wrappers.push(spec);
        self
    }

    /// Check the mount point and namespace id forms
    pub fn validate(&self) -> Result<()> {
        if !is_normalized(&self.mount_point) {
            return Err(StorageError::InvalidPath(format!(
                "mount point must be absolute and normalized: {:?}",
                self.mount_point
            )));
        }
        validate_namespace_id(&self.mount_point_id)
    }
}

/// Namespace ids are non-empty and contain no separator, `/` or whitespace
pub fn validate_namespace_id(mount_point_id: &str) -> Result<()> {
    let bad = mount_point_id.is_empty()
        || mount_point_id
            .chars()
            .any(|c| c == id::SEPARATOR || c == '/' || c.is_whitespace());
    if bad {
        return Err(StorageError::MalformedIdentifier(format!(
            "invalid mount point id: {:?}",
            mount_point_id
        )));
    }
    Ok(())
}

/// Serializable snapshot of all mounts, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MountTable {
    #[serde(default)]
    pub mounts: Vec<MountTableEntry>,
}

impl MountTable {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| StorageError::Config(format!("mount table: {}", e)))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| StorageError::Config(format!("mount table: {}", e)))
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}

/// An attached backend reachable under a path and a namespace id
pub struct Mount {
    entry: MountTableEntry,
    chain: Arc<dyn Storage>,
}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount")
            .field("mount_point", &self.entry.mount_point)
            .field("mount_point_id", &self.entry.mount_point_id)
            .field("driver", &self.entry.driver)
            .field("read_only", &self.entry.mount_options.read_only)
            .finish()
    }
}

impl Mount {
    /// Construct the driver and its wrapper chain for `entry`
    pub fn build(
        entry: MountTableEntry,
        drivers: &DriverRegistry,
        wrappers: &WrapperRegistry,
    ) -> Result<Self> {
        entry.validate()?;
        wrappers.validate(&entry.wrappers)?;

        let driver = drivers.build(&entry.driver, &entry.driver_options)?;
        let mut chain = wrappers.build_chain(driver, &entry.wrappers)?;
        if entry.mount_options.read_only {
            chain = Arc::new(ReadOnly::new(chain));
        }

        info!(
            mount_point = %entry.mount_point,
            mount_point_id = %entry.mount_point_id,
            driver = %entry.driver,
            wrappers = ?call_order(&entry.wrappers),
            read_only = entry.mount_options.read_only,
            "built mount"
        );
        Ok(Self::from_chain(entry, chain))
    }

    /// Mount an already composed chain
    pub fn from_chain(entry: MountTableEntry, chain: Arc<dyn Storage>) -> Self {
        Self { entry, chain }
    }

    pub fn mount_point(&self) -> &str {
        &self.entry.mount_point
    }

    pub fn mount_point_id(&self) -> &str {
        &self.entry.mount_point_id
    }

    pub fn options(&self) -> &MountOptions {
        &self.entry.mount_options
    }

    pub fn entry(&self) -> &MountTableEntry {
        &self.entry
    }

    /// The composed chain, addressed with mount-relative paths
    pub fn chain(&self) -> &Arc<dyn Storage> {
        &self.chain
    }

    /// Refuse `op` on a read-only mount before the target is resolved
    fn check_writable(&self, op: Operation, target: &str) -> Result<()> {
        if !self.entry.mount_options.read_only {
            return Ok(());
        }
        debug!(
            op = %op,
            resource = target,
            mount_point = %self.mount_point(),
            "rejected on read-only mount"
        );
        Err(StorageError::PermissionDenied(format!(
            "{} on read-only mount {}: {}",
            op,
            self.mount_point(),
            target
        )))
    }

    /// Mount-relative path for a global path or identifier
    async fn local_path(&self, ctx: &CallContext, target: &str) -> Result<String> {
        if target.starts_with('/') {
            let normalized = normalize(target)?;
            return strip_mount(&normalized, self.mount_point())
                .ok_or_else(|| StorageError::MountNotFound(target.to_string()));
        }

        let id: ResourceId = target.parse()?;
        if id.prefix() != self.mount_point_id() {
            return Err(StorageError::MountNotFound(target.to_string()));
        }
        trace!(mount_point = %self.mount_point(), local_id = id.local_id(), "resolving id");
        self.chain.get_path_by_id(ctx, id.local_id()).await
    }

    /// Backend key for a global `prefix:key` identifier
    fn local_key(&self, key: &str) -> Result<String> {
        let id: ResourceId = key.parse()?;
        if id.prefix() != self.mount_point_id() {
            return Err(StorageError::MountNotFound(key.to_string()));
        }
        Ok(id.into_parts().1)
    }

    fn global_id(&self, local_id: &str) -> Result<String> {
        id::join(self.mount_point_id(), local_id)
    }

    fn global_path(&self, local_path: &str) -> String {
        join_mount(self.mount_point(), local_path)
    }

    fn anchor(&self, mut md: Metadata) -> Result<Metadata> {
        md.id = self.global_id(&md.id)?;
        md.path = self.global_path(&md.path);
        Ok(md)
    }

    fn anchor_recycled(&self, mut entry: RecycleEntry) -> Result<RecycleEntry> {
        entry.restore_key = self.global_id(&entry.restore_key)?;
        entry.path = self.global_path(&entry.path);
        Ok(entry)
    }
}

#[async_trait]
impl Storage for Mount {
    async fn create_dir(&self, ctx: &CallContext, path: &str) -> Result<()> {
        self.check_writable(Operation::CreateDir, path)?;
        ctx.run(async {
            let local = self.local_path(ctx, path).await?;
            self.chain.create_dir(ctx, &local).await
        })
        .await
    }

    async fn delete(&self, ctx: &CallContext, path: &str) -> Result<()> {
        self.check_writable(Operation::Delete, path)?;
        ctx.run(async {
            let local = self.local_path(ctx, path).await?;
            self.chain.delete(ctx, &local).await
        })
        .await
    }

    async fn move_entry(&self, ctx: &CallContext, from: &str, to: &str) -> Result<()> {
        self.check_writable(Operation::Move, from)?;
        ctx.run(async {
            let from = self.local_path(ctx, from).await?;
            let to = match self.local_path(ctx, to).await {
                Err(StorageError::MountNotFound(target)) => {
                    return Err(StorageError::NotSupported(format!(
                        "move across mounts: {} to {}",
                        self.mount_point(),
                        target
                    )));
                }
                other => other?,
            };
            self.chain.move_entry(ctx, &from, &to).await
        })
        .await
    }

    async fn get_metadata(&self, ctx: &CallContext, path: &str) -> Result<Metadata> {
        ctx.run(async {
            let local = self.local_path(ctx, path).await?;
            let md = self.chain.get_metadata(ctx, &local).await?;
            self.anchor(md)
        })
        .await
    }

    async fn list_folder(&self, ctx: &CallContext, path: &str) -> Result<Vec<Metadata>> {
        ctx.run(async {
            let local = self.local_path(ctx, path).await?;
            self.chain
                .list_folder(ctx, &local)
                .await?
                .into_iter()
                .map(|md| self.anchor(md))
                .collect::<Result<Vec<_>>>()
        })
        .await
    }

    async fn upload(&self, ctx: &CallContext, path: &str, data: ByteStream) -> Result<()> {
        self.check_writable(Operation::Upload, path)?;
        ctx.run(async {
            let local = self.local_path(ctx, path).await?;
            self.chain.upload(ctx, &local, data).await
        })
        .await
    }

    async fn download(&self, ctx: &CallContext, path: &str) -> Result<ByteStream> {
        ctx.run(async {
            let local = self.local_path(ctx, path).await?;
            self.chain.download(ctx, &local).await
        })
        .await
    }

    async fn list_revisions(&self, ctx: &CallContext, path: &str) -> Result<Vec<Revision>> {
        ctx.run(async {
            let local = self.local_path(ctx, path).await?;
            self.chain.list_revisions(ctx, &local).await
        })
        .await
    }

    async fn download_revision(
        &self,
        ctx: &CallContext,
        path: &str,
        revision_key: &str,
    ) -> Result<ByteStream> {
        ctx.run(async {
            let local = self.local_path(ctx, path).await?;
            self.chain.download_revision(ctx, &local, revision_key).await
        })
        .await
    }

    async fn restore_revision(
        &self,
        ctx: &CallContext,
        path: &str,
        revision_key: &str,
    ) -> Result<()> {
        self.check_writable(Operation::RestoreRevision, path)?;
        ctx.run(async {
            let local = self.local_path(ctx, path).await?;
            self.chain.restore_revision(ctx, &local, revision_key).await
        })
        .await
    }

    async fn list_recycle(&self, ctx: &CallContext, path: &str) -> Result<Vec<RecycleEntry>> {
        ctx.run(async {
            let local = self.local_path(ctx, path).await?;
            self.chain
                .list_recycle(ctx, &local)
                .await?
                .into_iter()
                .map(|entry| self.anchor_recycled(entry))
                .collect::<Result<Vec<_>>>()
        })
        .await
    }

    async fn restore_recycle_entry(&self, ctx: &CallContext, restore_key: &str) -> Result<()> {
        self.check_writable(Operation::RestoreRecycleEntry, restore_key)?;
        ctx.run(async {
            let key = self.local_key(restore_key)?;
            self.chain.restore_recycle_entry(ctx, &key).await
        })
        .await
    }

    async fn empty_recycle(&self, ctx: &CallContext, path: &str) -> Result<()> {
        self.check_writable(Operation::EmptyRecycle, path)?;
        ctx.run(async {
            let local = self.local_path(ctx, path).await?;
            self.chain.empty_recycle(ctx, &local).await
        })
        .await
    }

    async fn get_path_by_id(&self, ctx: &CallContext, id: &str) -> Result<String> {
        if id.starts_with('/') {
            return Err(StorageError::MalformedIdentifier(format!(
                "expected an identifier, got a path: {}",
                id
            )));
        }
        ctx.run(async {
            let local = self.local_path(ctx, id).await?;
            Ok(self.global_path(&local))
        })
        .await
    }
}
