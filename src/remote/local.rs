//! Directory-backed remote store
//!
//! Serves a local directory tree as if it were a remote drive. Identities
//! are derived from the relative path, so they stay stable across refreshes
//! as long as nothing is renamed. Trashed entries are moved into a
//! `.ddld-trash` folder at the store root, which listings skip.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::io::AsyncReadExt;

use super::{ContentStream, RemoteError, RemoteResult, RemoteStore};
use crate::hasher::{hash_bytes, HASH_CHUNK_SIZE};
use crate::types::Node;

/// Folder holding trashed entries, relative to the store root
pub const TRASH_DIR: &str = ".ddld-trash";

/// Identity of the store root
pub const LOCAL_ROOT_ID: &str = "root";

/// Remote store over a local directory
pub struct LocalDirStore {
	root: PathBuf,
	name: String,
	/// Identity → absolute path, filled as listings discover entries
	index: RwLock<HashMap<String, PathBuf>>,
	chunk_size: usize,
}

impl LocalDirStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		let root = root.into();
		let mut index = HashMap::new();
		index.insert(LOCAL_ROOT_ID.to_string(), root.clone());
		LocalDirStore {
			name: format!("dir:{}", root.display()),
			root,
			index: RwLock::new(index),
			chunk_size: HASH_CHUNK_SIZE,
		}
	}

	/// Identity for a path relative to the store root
	pub fn id_for(relative: &Path) -> String {
		let rel = relative.to_string_lossy();
		if rel.is_empty() {
			return LOCAL_ROOT_ID.to_string();
		}
		hash_bytes(rel.as_bytes())[..16].to_string()
	}

	fn resolve(&self, id: &str) -> RemoteResult<PathBuf> {
		self.index
			.read()
			.unwrap_or_else(|e| e.into_inner())
			.get(id)
			.cloned()
			.ok_or_else(|| RemoteError::NotFound(id.to_string()))
	}

	fn register(&self, id: &str, path: PathBuf) {
		self.index.write().unwrap_or_else(|e| e.into_inner()).insert(id.to_string(), path);
	}

	fn node_for(
		&self,
		id: String,
		name: String,
		parent: Option<&str>,
		meta: &std::fs::Metadata,
	) -> Node {
		let modified: DateTime<Utc> = meta.modified().map(DateTime::from).unwrap_or_else(|_| Utc::now());
		if meta.is_dir() {
			Node::folder(id, name, parent, modified)
		} else {
			Node::file(id, name, parent, modified, meta.len())
		}
	}
}

#[async_trait]
impl RemoteStore for LocalDirStore {
	async fn root(&self) -> RemoteResult<Node> {
		let meta = tokio::fs::metadata(&self.root).await?;
		if !meta.is_dir() {
			return Err(RemoteError::Other(format!("{} is not a directory", self.root.display())));
		}
		Ok(self.node_for(LOCAL_ROOT_ID.to_string(), String::new(), None, &meta))
	}

	async fn list_children(&self, id: &str) -> RemoteResult<Vec<Node>> {
		let dir = self.resolve(id)?;
		let mut reader = tokio::fs::read_dir(&dir).await?;
		let mut children = Vec::new();

		while let Some(entry) = reader.next_entry().await? {
			let name = entry.file_name().to_string_lossy().to_string();
			if id == LOCAL_ROOT_ID && name == TRASH_DIR {
				continue;
			}
			let path = entry.path();
			let meta = match tokio::fs::metadata(&path).await {
				Ok(meta) => meta,
				// Dangling symlinks and entries that vanished mid-listing
				Err(_) => continue,
			};
			let relative = path.strip_prefix(&self.root).unwrap_or(&path).to_path_buf();
			let child_id = Self::id_for(&relative);
			self.register(&child_id, path);
			children.push(self.node_for(child_id, name, Some(id), &meta));
		}

		children.sort_by(|a, b| a.name.cmp(&b.name));
		Ok(children)
	}

	async fn get_content_stream(&self, id: &str) -> RemoteResult<ContentStream> {
		let path = self.resolve(id)?;
		let file = tokio::fs::File::open(&path).await?;
		let chunk_size = self.chunk_size;

		let stream = futures::stream::unfold(Some(file), move |state| async move {
			let mut file = state?;
			let mut buf = vec![0u8; chunk_size];
			match file.read(&mut buf).await {
				Ok(0) => None,
				Ok(n) => {
					buf.truncate(n);
					Some((Ok(buf), Some(file)))
				}
				Err(e) => Some((Err(RemoteError::Io(e)), None)),
			}
		});
		Ok(Box::pin(stream))
	}

	async fn trash(&self, id: &str) -> RemoteResult<()> {
		if id == LOCAL_ROOT_ID {
			return Err(RemoteError::Other("cannot trash the store root".to_string()));
		}
		let path = self.resolve(id)?;
		let trash_dir = self.root.join(TRASH_DIR);
		tokio::fs::create_dir_all(&trash_dir).await?;

		let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
		let target = trash_dir.join(format!("{}-{}", id, name));
		tokio::fs::rename(&path, &target).await?;

		self.index.write().unwrap_or_else(|e| e.into_inner()).remove(id);
		Ok(())
	}

	fn name(&self) -> &str {
		&self.name
	}
}


// vim: ts=4
