//! vfswitch: a virtual storage switch with a mount registry and request router
//!
//! Several storage backends are attached at mount points and exposed as one
//! namespace. Callers address resources either by path (`/home/a.txt`) or by
//! namespaced identifier (`home:42`); the router finds the owning mount and
//! forwards the call through that mount's wrapper chain.
//!
//! # Architecture
//!
//! - **Storage contract**: the [`storage::Storage`] trait, implemented by
//!   drivers, wrappers, mounts and the router alike.
//! - **Identifier codec**: `prefix:local-id` encoding in [`id`].
//! - **Wrappers**: decorators composed around a driver in priority order
//!   (access logging, metadata cache, quota, read-only guard).
//! - **Mount registry**: the table of mounts, indexed by path and by id.
//! - **Router**: [`router::VirtualStorage`], the public entry point.
//!
//! # Example
//!
//! ```no_run
//! use vfswitch::config::Config;
//! use vfswitch::context::CallContext;
//! use vfswitch::router::VirtualStorage;
//! use vfswitch::storage::{byte_stream, Storage};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file(&"config.yaml".into())?;
//! let storage = VirtualStorage::from_table(&config.mount_table())?;
//!
//! let ctx = CallContext::new();
//! storage.upload(&ctx, "/home/a.txt", byte_stream("hello")).await?;
//! let md = storage.get_metadata(&ctx, "/home/a.txt").await?;
//! assert_eq!(storage.get_path_by_id(&ctx, &md.id).await?, "/home/a.txt");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod driver;
pub mod env;
pub mod error;
pub mod id;
pub mod mount;
pub mod registry;
pub mod router;
pub mod storage;
pub mod wrapper;

pub use context::CallContext;
pub use error::{Result, StatusCode, StorageError};
pub use router::VirtualStorage;
