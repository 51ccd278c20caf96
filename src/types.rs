//! Node model shared by the cache, the synchronizer and the remote stores

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque node identity, stable across refreshes
pub type NodeId = String;

/// File-or-folder specific part of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeKind {
	Folder,
	File {
		size: u64,
		/// Hex digest of the content, absent until hashed once
		#[serde(default, skip_serializing_if = "Option::is_none")]
		content_hash: Option<String>,
	},
}

/// Description of a remote entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
	pub id: NodeId,
	pub name: String,
	pub parent_id: Option<NodeId>,
	pub modified: DateTime<Utc>,
	pub trashed: bool,
	#[serde(flatten)]
	pub kind: NodeKind,
}

impl Node {
	/// Create a folder node
	pub fn folder(
		id: impl Into<String>,
		name: impl Into<String>,
		parent_id: Option<&str>,
		modified: DateTime<Utc>,
	) -> Self {
		Node {
			id: id.into(),
			name: name.into(),
			parent_id: parent_id.map(str::to_string),
			modified,
			trashed: false,
			kind: NodeKind::Folder,
		}
	}

	/// Create a file node without a known hash
	pub fn file(
		id: impl Into<String>,
		name: impl Into<String>,
		parent_id: Option<&str>,
		modified: DateTime<Utc>,
		size: u64,
	) -> Self {
		Node {
			id: id.into(),
			name: name.into(),
			parent_id: parent_id.map(str::to_string),
			modified,
			trashed: false,
			kind: NodeKind::File { size, content_hash: None },
		}
	}

	/// Attach a content hash (files only, ignored for folders)
	pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
		if let NodeKind::File { content_hash, .. } = &mut self.kind {
			*content_hash = Some(hash.into());
		}
		self
	}

	pub fn is_folder(&self) -> bool {
		matches!(self.kind, NodeKind::Folder)
	}

	pub fn is_file(&self) -> bool {
		!self.is_folder()
	}

	/// Size in bytes; folders report 0
	pub fn size(&self) -> u64 {
		match self.kind {
			NodeKind::File { size, .. } => size,
			NodeKind::Folder => 0,
		}
	}

	pub fn content_hash(&self) -> Option<&str> {
		match &self.kind {
			NodeKind::File { content_hash, .. } => content_hash.as_deref(),
			NodeKind::Folder => None,
		}
	}

	/// Whether `other` describes the same content revision
	///
	/// Compares `modified`, `size`, `trashed` and the file/folder tag. Names
	/// and parents are location, not revision.
	pub fn same_revision(&self, other: &Node) -> bool {
		self.modified == other.modified
			&& self.trashed == other.trashed
			&& self.is_folder() == other.is_folder()
			&& self.size() == other.size()
	}

	/// Whether `other` sits at the same place in the tree
	pub fn same_location(&self, other: &Node) -> bool {
		self.name == other.name && self.parent_id == other.parent_id
	}
}

/// A cached node plus where it lives, remotely and in the mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
	pub node: Node,
	/// Remote path, `/` for the root
	pub path: String,
	/// Path of the mirror copy relative to the mirror root
	pub local_path: String,
	pub cached_at: DateTime<Utc>,
	/// Mirror holds the content of the cached revision
	#[serde(default)]
	pub mirrored: bool,
}

impl CacheEntry {
	pub fn id(&self) -> &str {
		&self.node.id
	}
}

/// Join a child name onto a remote path
pub fn join_path(parent: &str, name: &str) -> String {
	if parent == "/" || parent.is_empty() {
		format!("/{}", name)
	} else {
		format!("{}/{}", parent, name)
	}
}

/// Normalize a user supplied remote path: leading `/`, no empty segments
pub fn normalize_path(path: &str) -> String {
	let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty() && *p != ".").collect();
	format!("/{}", parts.join("/"))
}


// vim: ts=4
