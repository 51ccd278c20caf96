//! In-memory remote store
//!
//! Holds a whole drive in memory. Useful for embedding the engine without a
//! network backend and as the remote collaborator in tests: it counts content
//! requests and trash calls, and can be told to fail listings or to misreport
//! sizes.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use super::{ContentStream, RemoteError, RemoteResult, RemoteStore};
use crate::types::{Node, NodeKind};

/// Identity of the root folder
pub const MEMORY_ROOT_ID: &str = "root";

/// Base timestamp for nodes added without an explicit one
const BASE_MTIME: i64 = 1467800000;

struct StoredNode {
	node: Node,
	content: Vec<u8>,
}

#[derive(Default)]
struct MemoryState {
	nodes: BTreeMap<String, StoredNode>,
	failing: HashSet<String>,
	content_requests: HashMap<String, usize>,
	trash_calls: Vec<String>,
	list_calls: usize,
}

/// Remote drive kept in memory
pub struct MemoryStore {
	state: Mutex<MemoryState>,
	chunk_size: usize,
	latency: Option<Duration>,
}

impl MemoryStore {
	/// Create a store holding only the root folder
	pub fn new() -> Self {
		let mut state = MemoryState::default();
		let root = Node::folder(MEMORY_ROOT_ID, "", None, Self::mtime(0));
		state.nodes.insert(MEMORY_ROOT_ID.to_string(), StoredNode { node: root, content: vec![] });
		MemoryStore { state: Mutex::new(state), chunk_size: 4096, latency: None }
	}

	/// Split content streams into chunks of `chunk_size` bytes
	pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
		self.chunk_size = chunk_size.max(1);
		self
	}

	/// Sleep before yielding each content chunk
	pub fn with_latency(mut self, latency: Duration) -> Self {
		self.latency = Some(latency);
		self
	}

	/// Timestamp `offset` seconds after the store's base time
	pub fn mtime(offset: i64) -> DateTime<Utc> {
		Utc.timestamp_opt(BASE_MTIME + offset, 0).single().unwrap_or_else(Utc::now)
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	pub fn add_folder(&self, id: &str, name: &str, parent: &str) -> Node {
		let node = Node::folder(id, name, Some(parent), Self::mtime(0));
		self.lock()
			.nodes
			.insert(id.to_string(), StoredNode { node: node.clone(), content: vec![] });
		node
	}

	pub fn add_file(&self, id: &str, name: &str, parent: &str, content: &[u8]) -> Node {
		self.add_file_at(id, name, parent, content, Self::mtime(0))
	}

	pub fn add_file_at(
		&self,
		id: &str,
		name: &str,
		parent: &str,
		content: &[u8],
		modified: DateTime<Utc>,
	) -> Node {
		let node = Node::file(id, name, Some(parent), modified, content.len() as u64);
		self.lock()
			.nodes
			.insert(id.to_string(), StoredNode { node: node.clone(), content: content.to_vec() });
		node
	}

	/// Replace a file's content, bumping size and modification time
	pub fn update_file(&self, id: &str, content: &[u8], modified: DateTime<Utc>) {
		if let Some(stored) = self.lock().nodes.get_mut(id) {
			stored.node.modified = modified;
			stored.node.kind = NodeKind::File { size: content.len() as u64, content_hash: None };
			stored.content = content.to_vec();
		}
	}

	/// Report a size that differs from the stored content
	pub fn set_reported_size(&self, id: &str, size: u64) {
		if let Some(stored) = self.lock().nodes.get_mut(id) {
			if let NodeKind::File { size: reported, .. } = &mut stored.node.kind {
				*reported = size;
			}
		}
	}

	/// Report a content hash in listings
	pub fn set_reported_hash(&self, id: &str, hash: &str) {
		if let Some(stored) = self.lock().nodes.get_mut(id) {
			stored.node = stored.node.clone().with_hash(hash);
		}
	}

	pub fn rename(&self, id: &str, name: &str) {
		if let Some(stored) = self.lock().nodes.get_mut(id) {
			stored.node.name = name.to_string();
		}
	}

	/// Delete a node and everything below it
	pub fn remove(&self, id: &str) {
		let mut state = self.lock();
		let mut pending = vec![id.to_string()];
		while let Some(current) = pending.pop() {
			state.nodes.remove(&current);
			let children: Vec<String> = state
				.nodes
				.values()
				.filter(|s| s.node.parent_id.as_deref() == Some(current.as_str()))
				.map(|s| s.node.id.clone())
				.collect();
			pending.extend(children);
		}
	}

	/// Make listings (and content requests) of `id` fail
	pub fn fail(&self, id: &str, failing: bool) {
		let mut state = self.lock();
		if failing {
			state.failing.insert(id.to_string());
		} else {
			state.failing.remove(id);
		}
	}

	/// Number of content streams opened for `id`
	pub fn content_requests(&self, id: &str) -> usize {
		self.lock().content_requests.get(id).copied().unwrap_or(0)
	}

	/// Identities passed to `trash`, in call order
	pub fn trash_calls(&self) -> Vec<String> {
		self.lock().trash_calls.clone()
	}

	/// Number of `list_children` calls
	pub fn list_calls(&self) -> usize {
		self.lock().list_calls
	}

	pub fn node(&self, id: &str) -> Option<Node> {
		self.lock().nodes.get(id).map(|s| s.node.clone())
	}
}

impl Default for MemoryStore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl RemoteStore for MemoryStore {
	async fn root(&self) -> RemoteResult<Node> {
		self.node(MEMORY_ROOT_ID).ok_or_else(|| RemoteError::NotFound(MEMORY_ROOT_ID.to_string()))
	}

	async fn list_children(&self, id: &str) -> RemoteResult<Vec<Node>> {
		let mut state = self.lock();
		state.list_calls += 1;
		if state.failing.contains(id) {
			return Err(RemoteError::Other(format!("listing of {} failed", id)));
		}
		if !state.nodes.contains_key(id) {
			return Err(RemoteError::NotFound(id.to_string()));
		}
		let mut children: Vec<Node> = state
			.nodes
			.values()
			.filter(|s| s.node.parent_id.as_deref() == Some(id))
			.map(|s| s.node.clone())
			.collect();
		children.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
		Ok(children)
	}

	async fn get_content_stream(&self, id: &str) -> RemoteResult<ContentStream> {
		let content = {
			let mut state = self.lock();
			*state.content_requests.entry(id.to_string()).or_insert(0) += 1;
			if state.failing.contains(id) {
				return Err(RemoteError::Other(format!("content of {} unavailable", id)));
			}
			match state.nodes.get(id) {
				Some(stored) if stored.node.is_file() => stored.content.clone(),
				Some(_) => return Err(RemoteError::Other(format!("{} is a folder", id))),
				None => return Err(RemoteError::NotFound(id.to_string())),
			}
		};

		let chunks: Vec<Vec<u8>> = content.chunks(self.chunk_size).map(<[u8]>::to_vec).collect();
		let latency = self.latency;
		let stream = futures::stream::iter(chunks).then(move |chunk| async move {
			if let Some(delay) = latency {
				tokio::time::sleep(delay).await;
			}
			Ok::<Vec<u8>, RemoteError>(chunk)
		});
		Ok(Box::pin(stream))
	}

	async fn trash(&self, id: &str) -> RemoteResult<()> {
		let mut state = self.lock();
		state.trash_calls.push(id.to_string());
		match state.nodes.get_mut(id) {
			Some(stored) => {
				stored.node.trashed = true;
				Ok(())
			}
			None => Err(RemoteError::NotFound(id.to_string())),
		}
	}

	fn name(&self) -> &str {
		"memory"
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_listing_is_sorted_by_name() {
		let store = MemoryStore::new();
		store.add_file("F2", "b.txt", MEMORY_ROOT_ID, b"b");
		store.add_file("F1", "a.txt", MEMORY_ROOT_ID, b"a");

		let children = store.list_children(MEMORY_ROOT_ID).await.unwrap();
		let names: Vec<&str> = children.iter().map(|n| n.name.as_str()).collect();
		assert_eq!(names, vec!["a.txt", "b.txt"]);
	}

	#[tokio::test]
	async fn test_content_stream_chunks() {
		let store = MemoryStore::new().with_chunk_size(2);
		store.add_file("F1", "a", MEMORY_ROOT_ID, b"file 1");

		let mut stream = store.get_content_stream("F1").await.unwrap();
		let mut collected = Vec::new();
		let mut chunks = 0;
		while let Some(chunk) = stream.next().await {
			collected.extend(chunk.unwrap());
			chunks += 1;
		}
		assert_eq!(collected, b"file 1");
		assert_eq!(chunks, 3);
		assert_eq!(store.content_requests("F1"), 1);
	}

	#[tokio::test]
	async fn test_remove_is_recursive() {
		let store = MemoryStore::new();
		store.add_folder("D1", "d", MEMORY_ROOT_ID);
		store.add_file("F1", "f", "D1", b"x");
		store.remove("D1");
		assert!(store.node("F1").is_none());
		assert!(store.list_children(MEMORY_ROOT_ID).await.unwrap().is_empty());
	}
}

// vim: ts=4
