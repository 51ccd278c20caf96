//! Trashing nodes on the remote side

use std::sync::Arc;

use crate::cache::NodeCache;
use crate::download::DownloadManager;
use crate::error::DriveError;
use crate::logging::*;
use crate::remote::RemoteStore;
use crate::types::CacheEntry;

/// Moves nodes to the remote trash and mirrors the result locally
pub struct TrashOperator {
	cache: Arc<NodeCache>,
	remote: Arc<dyn RemoteStore>,
	downloads: Arc<DownloadManager>,
	remove_mirror: bool,
}

impl TrashOperator {
	pub fn new(
		cache: Arc<NodeCache>,
		remote: Arc<dyn RemoteStore>,
		downloads: Arc<DownloadManager>,
	) -> Self {
		TrashOperator { cache, remote, downloads, remove_mirror: true }
	}

	/// Whether to delete the mirror copy of a trashed node
	pub fn remove_mirror(mut self, enabled: bool) -> Self {
		self.remove_mirror = enabled;
		self
	}

	/// Trash a cached node
	///
	/// The cache entry stays, flagged as trashed, until a refresh no longer
	/// sees the node. A failed remote call leaves the cache untouched.
	pub async fn trash(&self, id: &str) -> Result<CacheEntry, DriveError> {
		if self.cache.get(id)?.is_none() {
			return Err(DriveError::not_found(id));
		}

		self.remote.trash(id).await.map_err(|e| DriveError::remote(id, e))?;
		let mut entry = self.cache.mark_trashed(id)?.ok_or_else(|| DriveError::not_found(id))?;
		info!("Trashed {} ({})", id, entry.path);

		if self.remove_mirror {
			if self.downloads.discard(&entry).await? {
				debug!("Removed mirror copy of trashed {}", id);
			}
			if let Some(current) = self.cache.get(id)? {
				entry = current;
			}
		}
		Ok(entry)
	}
}


// vim: ts=4
