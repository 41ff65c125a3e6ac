//! cse-core: Core library for the cse-sync client
//!
//! This crate decides what a sync run transfers and carries it out:
//! - Key/path mapping between object keys and local paths
//! - Enumeration of prefixes (paginated) and local trees
//! - Sequential, fail-fast transfer execution
//! - The run driver and its configuration
//! - The SealedStore trait behind which encryption happens
//!
//! This crate does not depend on any S3 SDK; the adapter lives in cse-s3.

pub mod config;
pub mod enumerate;
pub mod error;
pub mod mapping;
pub mod path;
pub mod sync;
pub mod traits;
pub mod transfer;

#[cfg(any(test, feature = "testutil"))]
pub mod memory;

pub use config::{
    CollisionPolicy, Config, ConfigManager, ConnectionOptions, Defaults, Direction,
    OutputFormat, RunConfig, RunRequest,
};
pub use error::{Error, Result};
pub use mapping::{TransferItem, map_download, map_upload};
pub use path::{LocalKind, LocalRef, RemoteRef};
pub use sync::{RunState, SyncDriver, SyncReport};
pub use traits::{ByteReader, ListPage, SealedStore};
pub use transfer::{NoopObserver, TransferExecutor, TransferObserver};
