//! Remote store abstraction
//!
//! The synchronization engine talks to the drive only through
//! [`RemoteStore`]. The wire protocol of a real cloud drive lives behind an
//! implementation of this trait; two are provided here: a directory-backed
//! store and an in-memory store.

pub mod local;
pub mod memory;

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

pub use crate::error::RemoteError;
use crate::types::Node;

pub use local::LocalDirStore;
pub use memory::MemoryStore;

/// Result type for remote store operations
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Stream of content chunks for one file
pub type ContentStream = Pin<Box<dyn Stream<Item = RemoteResult<Vec<u8>>> + Send>>;

/// Operations consumed from the remote drive
#[async_trait]
pub trait RemoteStore: Send + Sync {
	/// The root folder of the drive
	async fn root(&self) -> RemoteResult<Node>;

	/// Direct children of a folder
	async fn list_children(&self, id: &str) -> RemoteResult<Vec<Node>>;

	/// Content of a file as a stream of chunks
	async fn get_content_stream(&self, id: &str) -> RemoteResult<ContentStream>;

	/// Move a node to the remote trash
	async fn trash(&self, id: &str) -> RemoteResult<()>;

	/// Store name (for logs)
	fn name(&self) -> &str;
}

// vim: ts=4
