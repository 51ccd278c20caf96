//! # ddld - Drive Download Daemon
//!
//! ddld mirrors a remote hierarchical file store (a cloud drive) into a
//! local cache database and a local filesystem mirror. It refreshes cached
//! metadata from remote subtrees, downloads file content with at most one
//! transfer per node, trashes nodes, searches the cache by name and groups
//! nodes by content digest.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ddld::{Config, Controller, LocalDirStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let remote = Arc::new(LocalDirStore::new("/srv/drive"));
//!     let controller = Controller::open(Config::default(), remote)?;
//!     let result = controller.refresh(&["/"]).await;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     for entry in controller.search("*.pdf")? {
//!         controller.download(entry.id()).await?;
//!     }
//!     controller.close().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod compare;
pub mod config;
pub mod controller;
pub mod download;
pub mod error;
pub mod hasher;
pub mod logging;
pub mod mirror;
pub mod remote;
pub mod search;
pub mod sync;
pub mod trash;
pub mod types;
pub mod utils;

// Re-export commonly used types and functions
pub use config::Config;
pub use controller::Controller;
pub use error::{CacheError, ConfigError, DriveError, ErrorKind, RemoteError};
pub use remote::{LocalDirStore, MemoryStore, RemoteStore};
pub use sync::{PathReport, RefreshResult, SubtreeSummary, SyncAction};
pub use types::{CacheEntry, Node, NodeId, NodeKind};

// vim: ts=4
