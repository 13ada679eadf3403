//! Virtual storage router
//!
//! [`VirtualStorage`] is the public entry point: a [`Storage`] whose
//! namespace is the union of all registered mounts. Each call resolves its
//! target to a mount and is forwarded through that mount's chain. Errors
//! from the chain come back unmodified.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, trace};

use crate::context::CallContext;
use crate::driver::DriverRegistry;
use crate::error::{Result, StorageError};
use crate::mount::{Mount, MountTable, MountTableEntry};
use crate::registry::MountRegistry;
use crate::storage::{ByteStream, Metadata, RecycleEntry, Revision, Storage};
use crate::wrapper::WrapperRegistry;

pub use crate::registry::Target;

/// Storage facade routing calls to registered mounts
#[derive(Default)]
pub struct VirtualStorage {
    registry: MountRegistry,
}

impl VirtualStorage {
    /// Router with the built-in drivers and wrappers
    pub fn new() -> Self {
        Self::default()
    }

    /// Router using custom driver and wrapper registries
    pub fn with_registries(drivers: DriverRegistry, wrappers: WrapperRegistry) -> Self {
        Self {
            registry: MountRegistry::new(drivers, wrappers),
        }
    }

    /// Router pre-populated from a mount table
    pub fn from_table(table: &MountTable) -> Result<Self> {
        let vs = Self::new();
        vs.load_table(table)?;
        Ok(vs)
    }

    /// Add every entry of `table`, stopping at the first failure
    pub fn load_table(&self, table: &MountTable) -> Result<()> {
        for entry in &table.mounts {
            self.add_mount(entry.clone())?;
        }
        Ok(())
    }

    pub fn add_mount(&self, entry: MountTableEntry) -> Result<Arc<Mount>> {
        self.registry.add_mount(entry)
    }

    pub fn remove_mount(&self, mount_point: &str) -> Result<Arc<Mount>> {
        self.registry.remove_mount(mount_point)
    }

    pub fn list_mounts(&self) -> Vec<Arc<Mount>> {
        self.registry.list_mounts()
    }

    pub fn get_mount(&self, target: &str) -> Result<Arc<Mount>> {
        self.registry.get_mount(target)
    }

    pub fn mount_table(&self) -> MountTable {
        self.registry.mount_table()
    }

    pub fn registry(&self) -> &MountRegistry {
        &self.registry
    }

    /// Detach all mounts
    pub fn unmount_all(&self) {
        let removed = self.registry.clear();
        info!("Unmounted {} mount(s)", removed.len());
    }

    fn route(&self, target: &str) -> Result<Arc<Mount>> {
        let mount = self.registry.get_mount(target)?;
        trace!(target_path = target, mount_point = %mount.mount_point(), "routing");
        Ok(mount)
    }
}

#[async_trait]
impl Storage for VirtualStorage {
    async fn create_dir(&self, ctx: &CallContext, path: &str) -> Result<()> {
        self.route(path)?.create_dir(ctx, path).await
    }

    async fn delete(&self, ctx: &CallContext, path: &str) -> Result<()> {
        self.route(path)?.delete(ctx, path).await
    }

    async fn move_entry(&self, ctx: &CallContext, from: &str, to: &str) -> Result<()> {
        let source = self.route(from)?;
        let dest = self.route(to)?;
        if !Arc::ptr_eq(&source, &dest) {
            return Err(StorageError::NotSupported(format!(
                "move across mounts: {} to {}",
                source.mount_point(),
                dest.mount_point()
            )));
        }
        source.move_entry(ctx, from, to).await
    }

    async fn get_metadata(&self, ctx: &CallContext, path: &str) -> Result<Metadata> {
        self.route(path)?.get_metadata(ctx, path).await
    }

    async fn list_folder(&self, ctx: &CallContext, path: &str) -> Result<Vec<Metadata>> {
        self.route(path)?.list_folder(ctx, path).await
    }

    async fn upload(&self, ctx: &CallContext, path: &str, data: ByteStream) -> Result<()> {
        self.route(path)?.upload(ctx, path, data).await
    }

    async fn download(&self, ctx: &CallContext, path: &str) -> Result<ByteStream> {
        self.route(path)?.download(ctx, path).await
    }

    async fn list_revisions(&self, ctx: &CallContext, path: &str) -> Result<Vec<Revision>> {
        self.route(path)?.list_revisions(ctx, path).await
    }

    async fn download_revision(
        &self,
        ctx: &CallContext,
        path: &str,
        revision_key: &str,
    ) -> Result<ByteStream> {
        self.route(path)?
            .download_revision(ctx, path, revision_key)
            .await
    }

    async fn restore_revision(
        &self,
        ctx: &CallContext,
        path: &str,
        revision_key: &str,
    ) -> Result<()> {
        self.route(path)?
            .restore_revision(ctx, path, revision_key)
            .await
    }

    async fn list_recycle(&self, ctx: &CallContext, path: &str) -> Result<Vec<RecycleEntry>> {
        self.route(path)?.list_recycle(ctx, path).await
    }

    async fn restore_recycle_entry(&self, ctx: &CallContext, restore_key: &str) -> Result<()> {
        self.route(restore_key)?
            .restore_recycle_entry(ctx, restore_key)
            .await
    }

    async fn empty_recycle(&self, ctx: &CallContext, path: &str) -> Result<()> {
        self.route(path)?.empty_recycle(ctx, path).await
    }

    async fn get_path_by_id(&self, ctx: &CallContext, id: &str) -> Result<String> {
        self.route(id)?.get_path_by_id(ctx, id).await
    }
}
