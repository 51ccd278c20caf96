//! Content equality between cached nodes
//!
//! Files are grouped strictly by digest. A file whose digest is not cached
//! yet is hashed from its mirror copy, and the digest is stored for next time.
//! Folders never compare equal to anything.

use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use crate::cache::NodeCache;
use crate::error::DriveError;
use crate::hasher::hash_file;
use crate::logging::*;
use crate::mirror::Mirror;
use crate::types::{CacheEntry, NodeId};

/// Identities sharing one digest, in input order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EqualityClass {
	/// Digest of every member; None for a folder singleton
	pub hash: Option<String>,
	pub members: Vec<NodeId>,
}

/// Partition of the compared identities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Grouping {
	/// Classes in order of their first member's position in the input
	pub classes: Vec<EqualityClass>,
}

impl Grouping {
	/// Index of the first class containing `id`
	pub fn class_of(&self, id: &str) -> Option<usize> {
		self.classes.iter().position(|c| c.members.iter().any(|m| m == id))
	}

	/// Whether two identities landed in one class
	pub fn same_class(&self, a: &str, b: &str) -> bool {
		self.classes.iter().any(|c| {
			c.members.iter().any(|m| m == a) && c.members.iter().any(|m| m == b)
		})
	}
}

pub struct Comparator {
	cache: Arc<NodeCache>,
	mirror: Mirror,
	chunk_size: usize,
}

impl Comparator {
	pub fn new(cache: Arc<NodeCache>, mirror: Mirror, chunk_size: usize) -> Self {
		Comparator { cache, mirror, chunk_size: chunk_size.max(1) }
	}

	/// Group `ids` into content equivalence classes
	pub async fn compare<S: AsRef<str>>(&self, ids: &[S]) -> Result<Grouping, DriveError> {
		let mut grouping = Grouping::default();
		let mut by_hash: HashMap<String, usize> = HashMap::new();

		for id in ids {
			let id = id.as_ref();
			let entry = self.cache.get(id)?.ok_or_else(|| DriveError::not_found(id))?;
			if entry.node.is_folder() {
				grouping.classes.push(EqualityClass { hash: None, members: vec![id.to_string()] });
				continue;
			}

			let digest = self.digest(&entry).await?;
			match by_hash.get(&digest) {
				Some(&index) => grouping.classes[index].members.push(id.to_string()),
				None => {
					by_hash.insert(digest.clone(), grouping.classes.len());
					grouping
						.classes
						.push(EqualityClass { hash: Some(digest), members: vec![id.to_string()] });
				}
			}
		}
		Ok(grouping)
	}

	/// Cached digest of a file, hashing its mirror copy when none is cached
	async fn digest(&self, entry: &CacheEntry) -> Result<String, DriveError> {
		if let Some(hash) = entry.node.content_hash() {
			return Ok(hash.to_string());
		}
		let id = entry.id();
		if !entry.mirrored {
			return Err(DriveError::LocalContentUnavailable { id: id.to_string() });
		}

		let path = self.mirror.path_for(&entry.local_path);
		let digest = match hash_file(&path, self.chunk_size).await {
			Ok(digest) => digest,
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				warn!("Mirror copy of {} vanished ({})", id, path.display());
				self.cache.set_mirrored(id, false)?;
				return Err(DriveError::LocalContentUnavailable { id: id.to_string() });
			}
			Err(e) => return Err(DriveError::io(&path, e)),
		};
		debug!("Hashed mirror copy of {}: {}", id, digest);
		self.cache.record_content(id, &entry.node, &digest, None)?;
		Ok(digest)
	}
}


// vim: ts=4
