//! Local cache of remote node metadata
//!
//! Stores one entry per node identity in a redb database, plus a secondary
//! index ordered by remote path that serves subtree scans and path-ordered
//! listings. Every per-identity update runs in a single write transaction,
//! so readers see either the old or the new entry, never a mix.

use chrono::Utc;
use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use std::path;

use crate::error::CacheError;
use crate::types::{CacheEntry, Node};

/// Table definition for node entries
/// Key: node identity
/// Value: serialized CacheEntry (JSON bytes)
const NODES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Table definition for the path index
/// Key: remote path, NUL, node identity
/// Value: node identity
const PATHS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("paths");

/// What an observation did to the cache
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
	/// Identity was not cached before
	Inserted(CacheEntry),
	/// Content revision (modified/size/trashed) differs from the cached one
	Changed { previous: CacheEntry, current: CacheEntry },
	/// Same revision, but renamed or moved
	Moved { previous: CacheEntry, current: CacheEntry },
	/// Nothing to do
	Unchanged(CacheEntry),
}

impl Observation {
	pub fn entry(&self) -> &CacheEntry {
		match self {
			Observation::Inserted(entry) | Observation::Unchanged(entry) => entry,
			Observation::Changed { current, .. } | Observation::Moved { current, .. } => current,
		}
	}
}

fn path_key(path: &str, id: &str) -> String {
	format!("{}\u{0}{}", path, id)
}

/// Whether an index key belongs to the subtree rooted at `prefix`
fn in_subtree(key: &str, prefix: &str) -> bool {
	if prefix == "/" {
		return true;
	}
	match key.strip_prefix(prefix) {
		Some(rest) => rest.starts_with('\u{0}') || rest.starts_with('/'),
		None => false,
	}
}

fn decode(id: &str, bytes: &[u8]) -> Result<CacheEntry, CacheError> {
	serde_json::from_slice(bytes)
		.map_err(|e| CacheError::Corrupted { id: id.to_string(), message: e.to_string() })
}

fn encode(entry: &CacheEntry) -> Result<Vec<u8>, CacheError> {
	serde_json::to_vec(entry).map_err(|e| CacheError::Encode { message: e.to_string() })
}

/// Node cache backed by redb database
pub struct NodeCache {
	db: redb::Database,
	db_path: path::PathBuf,
}

impl NodeCache {
	/// Open or create a node cache database
	pub fn open(db_path: &path::Path) -> Result<Self, CacheError> {
		let db = redb::Database::create(db_path)?;
		// Ensure both tables exist
		{
			let write_txn = db.begin_write()?;
			let _ = write_txn.open_table(NODES_TABLE)?;
			let _ = write_txn.open_table(PATHS_TABLE)?;
			write_txn.commit()?;
		}
		Ok(NodeCache { db, db_path: db_path.to_path_buf() })
	}

	pub fn db_path(&self) -> &path::Path {
		&self.db_path
	}

	/// Get the entry for an identity
	pub fn get(&self, id: &str) -> Result<Option<CacheEntry>, CacheError> {
		let read_txn = self.db.begin_read()?;
		let table = read_txn.open_table(NODES_TABLE)?;

		match table.get(id)? {
			Some(value) => Ok(Some(decode(id, value.value())?)),
			None => Ok(None),
		}
	}

	/// Record a node seen on the remote side
	///
	/// A changed revision replaces the cached hash with whatever the remote
	/// reported and marks the mirror stale. A pure rename/move keeps the
	/// cached hash.
	pub fn observe(
		&self,
		node: &Node,
		remote_path: &str,
		local_path: &str,
	) -> Result<Observation, CacheError> {
		let write_txn = self.db.begin_write()?;
		let observation;
		{
			let mut nodes = write_txn.open_table(NODES_TABLE)?;
			let mut paths = write_txn.open_table(PATHS_TABLE)?;

			let previous = match nodes.get(node.id.as_str())? {
				Some(value) => Some(decode(&node.id, value.value())?),
				None => None,
			};

			let fresh = |node: Node, mirrored: bool| CacheEntry {
				node,
				path: remote_path.to_string(),
				local_path: local_path.to_string(),
				cached_at: Utc::now(),
				mirrored,
			};

			observation = match previous {
				None => Observation::Inserted(fresh(node.clone(), false)),
				Some(previous) if !previous.node.same_revision(node) => {
					let current = fresh(node.clone(), false);
					Observation::Changed { previous, current }
				}
				Some(previous)
					if !previous.node.same_location(node)
						|| previous.path != remote_path
						|| previous.local_path != local_path =>
				{
					let mut moved = node.clone();
					if moved.is_file() && moved.content_hash().is_none() {
						if let Some(hash) = previous.node.content_hash() {
							moved = moved.with_hash(hash);
						}
					}
					let mirrored = previous.mirrored && previous.local_path == local_path;
					let current = fresh(moved, mirrored);
					Observation::Moved { previous, current }
				}
				Some(previous) => Observation::Unchanged(previous),
			};

			let old_key = match &observation {
				Observation::Changed { previous, .. } | Observation::Moved { previous, .. } => {
					Some(path_key(&previous.path, previous.id()))
				}
				_ => None,
			};
			if !matches!(observation, Observation::Unchanged(_)) {
				let current = observation.entry();
				let new_key = path_key(&current.path, current.id());
				if let Some(old_key) = old_key {
					if old_key != new_key {
						paths.remove(old_key.as_str())?;
					}
				}
				let bytes = encode(current)?;
				nodes.insert(current.id(), bytes.as_slice())?;
				paths.insert(new_key.as_str(), current.id())?;
			}
		}
		write_txn.commit()?;

		Ok(observation)
	}

	/// Remove an entry, returning what was cached
	pub fn remove(&self, id: &str) -> Result<Option<CacheEntry>, CacheError> {
		let write_txn = self.db.begin_write()?;
		let removed;
		{
			let mut nodes = write_txn.open_table(NODES_TABLE)?;
			let mut paths = write_txn.open_table(PATHS_TABLE)?;
			removed = match nodes.remove(id)? {
				Some(value) => Some(decode(id, value.value())?),
				None => None,
			};
			if let Some(entry) = &removed {
				paths.remove(path_key(&entry.path, id).as_str())?;
			}
		}
		write_txn.commit()?;
		Ok(removed)
	}

	/// Apply `update` to an existing entry inside one write transaction
	///
	/// Returns the stored entry, or None if the identity is not cached or the
	/// closure declined the update by returning false.
	fn modify<F>(&self, id: &str, update: F) -> Result<Option<CacheEntry>, CacheError>
	where
		F: FnOnce(&mut CacheEntry) -> bool,
	{
		let write_txn = self.db.begin_write()?;
		let result;
		{
			let mut nodes = write_txn.open_table(NODES_TABLE)?;
			let current = match nodes.get(id)? {
				Some(value) => Some(decode(id, value.value())?),
				None => None,
			};
			result = match current {
				Some(mut entry) => {
					if update(&mut entry) {
						entry.cached_at = Utc::now();
						let bytes = encode(&entry)?;
						nodes.insert(id, bytes.as_slice())?;
						Some(entry)
					} else {
						None
					}
				}
				None => None,
			};
		}
		write_txn.commit()?;
		Ok(result)
	}

	/// Mark an entry as trashed
	pub fn mark_trashed(&self, id: &str) -> Result<Option<CacheEntry>, CacheError> {
		self.modify(id, |entry| {
			entry.node.trashed = true;
			true
		})
	}

	/// Store a content hash computed for `revision`
	///
	/// Skipped (returns None) when the cached revision moved on in the
	/// meantime, so a late hash never lands on newer metadata. With
	/// `mirrored_at` set the entry is also flagged as present in the mirror,
	/// but only if its mirror path is still that one.
	pub fn record_content(
		&self,
		id: &str,
		revision: &Node,
		hash: &str,
		mirrored_at: Option<&str>,
	) -> Result<Option<CacheEntry>, CacheError> {
		self.modify(id, |entry| {
			if !entry.node.same_revision(revision) || entry.node.is_folder() {
				return false;
			}
			entry.node = entry.node.clone().with_hash(hash);
			if mirrored_at == Some(entry.local_path.as_str()) {
				entry.mirrored = true;
			}
			true
		})
	}

	/// Flag an entry as mirrored if it still lives at `local_path`
	pub fn mirror_at(&self, id: &str, local_path: &str) -> Result<Option<CacheEntry>, CacheError> {
		self.modify(id, |entry| {
			if entry.local_path != local_path {
				return false;
			}
			entry.mirrored = true;
			true
		})
	}

	/// Set or clear the mirrored flag
	pub fn set_mirrored(&self, id: &str, mirrored: bool) -> Result<Option<CacheEntry>, CacheError> {
		self.modify(id, |entry| {
			entry.mirrored = mirrored;
			true
		})
	}

	/// Entries whose remote path lies under `remote_path`, the root included,
	/// in path order
	pub fn subtree(&self, remote_path: &str) -> Result<Vec<CacheEntry>, CacheError> {
		self.scan(Some(remote_path))
	}

	/// All entries in path order
	pub fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
		self.scan(None)
	}

	/// Number of cached entries
	pub fn len(&self) -> Result<usize, CacheError> {
		let read_txn = self.db.begin_read()?;
		let table = read_txn.open_table(NODES_TABLE)?;
		let mut count = 0;
		for item in table.iter()? {
			item?;
			count += 1;
		}
		Ok(count)
	}

	pub fn is_empty(&self) -> Result<bool, CacheError> {
		Ok(self.len()? == 0)
	}

	fn scan(&self, prefix: Option<&str>) -> Result<Vec<CacheEntry>, CacheError> {
		let read_txn = self.db.begin_read()?;
		let paths = read_txn.open_table(PATHS_TABLE)?;
		let nodes = read_txn.open_table(NODES_TABLE)?;

		let start = prefix.unwrap_or("");
		let mut entries = Vec::new();
		for item in paths.range(start..)? {
			let (key_guard, id_guard) = item?;
			let key = key_guard.value();
			if let Some(prefix) = prefix {
				if !key.starts_with(prefix) {
					break;
				}
				if !in_subtree(key, prefix) {
					continue;
				}
			}
			let id = id_guard.value();
			if let Some(value) = nodes.get(id)? {
				entries.push(decode(id, value.value())?);
			}
		}
		Ok(entries)
	}
}


// vim: ts=4
