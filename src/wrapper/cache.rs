//! Metadata caching wrapper
//!
//! Caches `get_metadata` and `list_folder` results for a TTL. Any mutation
//! through the wrapper invalidates the affected paths; operations whose
//! effect cannot be tied to a path (recycle bin restores) clear everything.
//! Content is never cached.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::context::CallContext;
use crate::error::{Result, StorageError};
use crate::storage::path::{parent, strip_mount};
use crate::storage::{ByteStream, Metadata, RecycleEntry, Revision, Storage};
use crate::wrapper::options_or_default;

/// Metadata cache options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetadataCacheConfig {
    /// Time a cached entry stays valid
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Maximum number of cached entries per table
    pub max_entries: usize,
    /// Glob patterns for paths that are never cached
    pub exclude: Vec<String>,
}

impl Default for MetadataCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            max_entries: 1000,
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct Cached<T> {
    value: T,
    cached_at: Instant,
}

/// Hit/miss counters
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
}

/// Wrapper caching metadata and folder listings
pub struct MetadataCache {
    inner: Arc<dyn Storage>,
    config: MetadataCacheConfig,
    metadata: DashMap<String, Cached<Metadata>>,
    listings: DashMap<String, Cached<Vec<Metadata>>>,
    exclude_matcher: Option<GlobSet>,
    stats: CacheStats,
}

impl MetadataCache {
    /// Fails with `Config` when an exclude pattern is not a valid glob
    pub fn new(inner: Arc<dyn Storage>, config: MetadataCacheConfig) -> Result<Self> {
        let exclude_matcher = Self::build_exclude_matcher(&config.exclude)?;
        Ok(Self {
            inner,
            config,
            metadata: DashMap::new(),
            listings: DashMap::new(),
            exclude_matcher,
            stats: CacheStats::default(),
        })
    }

    pub fn from_options(inner: Arc<dyn Storage>, options: &serde_yaml::Value) -> Result<Self> {
        Self::new(inner, options_or_default("cache wrapper", options)?)
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn build_exclude_matcher(patterns: &[String]) -> Result<Option<GlobSet>> {
        if patterns.is_empty() {
            return Ok(None);
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                StorageError::Config(format!("cache wrapper: exclude {:?}: {}", pattern, e))
            })?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| StorageError::Config(format!("cache wrapper: exclude: {}", e)))?;
        debug!(patterns = patterns.len(), "metadata cache exclude patterns");
        Ok(Some(set))
    }

    fn is_excluded(&self, path: &str) -> bool {
        match &self.exclude_matcher {
            Some(matcher) => matcher.is_match(Path::new(path.trim_start_matches('/'))),
            None => false,
        }
    }

    fn fresh<T: Clone>(&self, entry: &Cached<T>) -> Option<T> {
        (entry.cached_at.elapsed() < self.config.ttl).then(|| entry.value.clone())
    }

    fn lookup<T: Clone>(&self, table: &DashMap<String, Cached<T>>, path: &str) -> Option<T> {
        let hit = table.get(path).and_then(|entry| self.fresh(entry.value()));
        if hit.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            trace!(path, "cache hit");
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    fn store<T>(&self, table: &DashMap<String, Cached<T>>, path: &str, value: T) {
        if self.is_excluded(path) || self.config.max_entries == 0 {
            return;
        }
        if table.len() >= self.config.max_entries {
            let ttl = self.config.ttl;
            table.retain(|_, entry| entry.cached_at.elapsed() < ttl);
        }
        if table.len() >= self.config.max_entries {
            let oldest = table
                .iter()
                .min_by_key(|entry| entry.value().cached_at)
                .map(|entry| entry.key().clone());
            if let Some(key) = oldest {
                table.remove(&key);
            }
        }
        table.insert(
            path.to_string(),
            Cached {
                value,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop cached state for `path`, everything below it, and its parent listing
    fn invalidate(&self, path: &str) {
        self.metadata
            .retain(|key, _| strip_mount(key, path).is_none());
        self.listings
            .retain(|key, _| strip_mount(key, path).is_none());
        if let Some(p) = parent(path) {
            self.listings.remove(p);
        }
    }

    fn invalidate_all(&self) {
        self.metadata.clear();
        self.listings.clear();
    }
}

#[async_trait]
impl Storage for MetadataCache {
    async fn create_dir(&self, ctx: &CallContext, path: &str) -> Result<()> {
        let res = self.inner.create_dir(ctx, path).await;
        self.invalidate(path);
        res
    }

    async fn delete(&self, ctx: &CallContext, path: &str) -> Result<()> {
        let res = self.inner.delete(ctx, path).await;
        self.invalidate(path);
        res
    }

    async fn move_entry(&self, ctx: &CallContext, from: &str, to: &str) -> Result<()> {
        let res = self.inner.move_entry(ctx, from, to).await;
        self.invalidate(from);
        self.invalidate(to);
        res
    }

    async fn get_metadata(&self, ctx: &CallContext, path: &str) -> Result<Metadata> {
        if let Some(md) = self.lookup(&self.metadata, path) {
            return Ok(md);
        }
        let md = self.inner.get_metadata(ctx, path).await?;
        self.store(&self.metadata, path, md.clone());
        Ok(md)
    }

    async fn list_folder(&self, ctx: &CallContext, path: &str) -> Result<Vec<Metadata>> {
        if let Some(entries) = self.lookup(&self.listings, path) {
            return Ok(entries);
        }
        let entries = self.inner.list_folder(ctx, path).await?;
        self.store(&self.listings, path, entries.clone());
        Ok(entries)
    }

    async fn upload(&self, ctx: &CallContext, path: &str, data: ByteStream) -> Result<()> {
        let res = self.inner.upload(ctx, path, data).await;
        self.invalidate(path);
        res
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
        let res = self.inner.restore_revision(ctx, path, revision_key).await;
        self.invalidate(path);
        res
    }

    async fn list_recycle(&self, ctx: &CallContext, path: &str) -> Result<Vec<RecycleEntry>> {
        self.inner.list_recycle(ctx, path).await
    }

    async fn restore_recycle_entry(&self, ctx: &CallContext, restore_key: &str) -> Result<()> {
        let res = self.inner.restore_recycle_entry(ctx, restore_key).await;
        self.invalidate_all();
        res
    }

    async fn empty_recycle(&self, ctx: &CallContext, path: &str) -> Result<()> {
        self.inner.empty_recycle(ctx, path).await
    }

    async fn get_path_by_id(&self, ctx: &CallContext, id: &str) -> Result<String> {
        self.inner.get_path_by_id(ctx, id).await
    }
}
