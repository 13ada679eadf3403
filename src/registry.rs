//! Mount registry
//!
//! Authoritative table of attached mounts. Mounts live in an arena keyed by
//! insertion sequence, with one index per addressing form. Every lookup
//! clones an `Arc<Mount>` out of the table and releases the lock before any
//! backend work starts, so removing a mount never disturbs calls already
//! running against it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::driver::DriverRegistry;
use crate::error::{Result, StorageError};
use crate::id::ResourceId;
use crate::mount::{Mount, MountTable, MountTableEntry};
use crate::storage::path::{ancestors, normalize};
use crate::wrapper::WrapperRegistry;

/// A resolution target in one of the two addressing forms
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Normalized absolute path
    Path(String),
    /// `prefix:local-id` identifier
    Id(ResourceId),
}

impl Target {
    /// Classify `target`: leading `/` means a path, anything else an identifier
    pub fn parse(target: &str) -> Result<Self> {
        if target.starts_with('/') {
            Ok(Target::Path(normalize(target)?))
        } else {
            Ok(Target::Id(target.parse()?))
        }
    }
}

#[derive(Default)]
struct Table {
    next_seq: u64,
    mounts: BTreeMap<u64, Arc<Mount>>,
    by_path: HashMap<String, u64>,
    by_id: HashMap<String, u64>,
}

impl Table {
    fn check_free(&self, entry: &MountTableEntry) -> Result<()> {
        if self.by_path.contains_key(&entry.mount_point) {
            return Err(StorageError::MountAlreadyExists(entry.mount_point.clone()));
        }
        if self.by_id.contains_key(&entry.mount_point_id) {
            return Err(StorageError::MountAlreadyExists(
                entry.mount_point_id.clone(),
            ));
        }
        Ok(())
    }

    fn resolve(&self, target: &Target) -> Option<&Arc<Mount>> {
        let seq = match target {
            Target::Path(path) => ancestors(path).find_map(|p| self.by_path.get(p)),
            Target::Id(id) => self.by_id.get(id.prefix()),
        }?;
        self.mounts.get(seq)
    }
}

/// Thread-safe registry of mounts
pub struct MountRegistry {
    table: RwLock<Table>,
    drivers: DriverRegistry,
    wrappers: WrapperRegistry,
}

impl Default for MountRegistry {
    fn default() -> Self {
        Self::new(DriverRegistry::with_builtin(), WrapperRegistry::with_builtin())
    }
}

impl MountRegistry {
    pub fn new(drivers: DriverRegistry, wrappers: WrapperRegistry) -> Self {
        Self {
            table: RwLock::new(Table::default()),
            drivers,
            wrappers,
        }
    }

    /// Build and attach a mount
    ///
    /// The driver and chain are constructed outside the lock; the duplicate
    /// check is repeated under the write lock before inserting. On any
    /// error the registry is left as it was.
    pub fn add_mount(&self, entry: MountTableEntry) -> Result<Arc<Mount>> {
        entry.validate()?;
        self.table.read().check_free(&entry)?;

        let mount = Arc::new(Mount::build(entry, &self.drivers, &self.wrappers)?);

        let mut table = self.table.write();
        table.check_free(mount.entry())?;
        let seq = table.next_seq;
        table.next_seq += 1;
        table.by_path.insert(mount.mount_point().to_string(), seq);
        table.by_id.insert(mount.mount_point_id().to_string(), seq);
        table.mounts.insert(seq, mount.clone());
        drop(table);

        info!(
            mount_point = %mount.mount_point(),
            mount_point_id = %mount.mount_point_id(),
            "mount added"
        );
        Ok(mount)
    }

    /// Detach the mount at `mount_point`
    ///
    /// Calls already holding the mount keep running to completion.
    pub fn remove_mount(&self, mount_point: &str) -> Result<Arc<Mount>> {
        let key = normalize(mount_point)?;
        let mut table = self.table.write();
        let seq = table
            .by_path
            .remove(&key)
            .ok_or_else(|| StorageError::MountNotFound(mount_point.to_string()))?;
        let mount = table
            .mounts
            .remove(&seq)
            .ok_or_else(|| StorageError::MountNotFound(mount_point.to_string()))?;
        table.by_id.remove(mount.mount_point_id());
        drop(table);

        info!(
            mount_point = %mount.mount_point(),
            mount_point_id = %mount.mount_point_id(),
            "mount removed"
        );
        Ok(mount)
    }

    /// Snapshot of all mounts in insertion order
    pub fn list_mounts(&self) -> Vec<Arc<Mount>> {
        self.table.read().mounts.values().cloned().collect()
    }

    /// Snapshot of the mount table, suitable for reloading
    pub fn mount_table(&self) -> MountTable {
        MountTable {
            mounts: self
                .table
                .read()
                .mounts
                .values()
                .map(|m| m.entry().clone())
                .collect(),
        }
    }

    /// Mount owning `target`
    ///
    /// Paths resolve to the longest mount point that is a segment-boundary
    /// prefix; identifiers resolve by exact namespace id.
    pub fn resolve(&self, target: &Target) -> Result<Arc<Mount>> {
        let mount = self.table.read().resolve(target).cloned();
        match mount {
            Some(mount) => {
                debug!(?target, mount_point = %mount.mount_point(), "resolved");
                Ok(mount)
            }
            None => Err(StorageError::MountNotFound(match target {
                Target::Path(p) => p.clone(),
                Target::Id(id) => id.to_string(),
            })),
        }
    }

    /// Parse `target` and resolve it
    pub fn get_mount(&self, target: &str) -> Result<Arc<Mount>> {
        self.resolve(&Target::parse(target)?)
    }

    /// Detach every mount, returning them in insertion order
    pub fn clear(&self) -> Vec<Arc<Mount>> {
        let mut table = self.table.write();
        table.by_path.clear();
        table.by_id.clear();
        std::mem::take(&mut table.mounts).into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.table.read().mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
