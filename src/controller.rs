//! Controller owning the cache, the mirror and the engine components
//!
//! This is the surface a request layer wraps: every operation returns plain
//! serializable data or a [`DriveError`] whose kind maps onto a status.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::NodeCache;
use crate::compare::{Comparator, Grouping};
use crate::config::Config;
use crate::download::{DownloadManager, JobStatus};
use crate::error::DriveError;
use crate::logging::*;
use crate::mirror::Mirror;
use crate::remote::RemoteStore;
use crate::search::Searcher;
use crate::sync::{RefreshResult, SyncAction, Synchronizer};
use crate::trash::TrashOperator;
use crate::types::CacheEntry;

pub struct Controller {
	config: Config,
	cache: Arc<NodeCache>,
	remote: Arc<dyn RemoteStore>,
	mirror: Mirror,
	synchronizer: Synchronizer,
	downloads: Arc<DownloadManager>,
	comparator: Comparator,
	trasher: TrashOperator,
	searcher: Searcher,
	logs: Arc<LogQueue>,
}

impl Controller {
	/// Open the cache and mirror named by `config` against `remote`
	///
	/// Partial downloads left over by an earlier process are swept.
	pub fn open(config: Config, remote: Arc<dyn RemoteStore>) -> Result<Self, DriveError> {
		std::fs::create_dir_all(&config.data_dir).map_err(|e| DriveError::io(&config.data_dir, e))?;
		let mirror_root = config.mirror_root();
		std::fs::create_dir_all(&mirror_root).map_err(|e| DriveError::io(&mirror_root, e))?;

		let cache = Arc::new(NodeCache::open(&config.cache_path())?);
		let mirror = Mirror::new(mirror_root);
		mirror.sweep_partials();

		let synchronizer = Synchronizer::new(cache.clone(), remote.clone())
			.remove_mirror_on_delete(config.remove_mirror_on_delete);
		let downloads = DownloadManager::new(
			cache.clone(),
			remote.clone(),
			mirror.clone(),
			config.max_concurrent_downloads,
		);
		let comparator = Comparator::new(cache.clone(), mirror.clone(), config.hash_chunk_size);
		let trasher = TrashOperator::new(cache.clone(), remote.clone(), downloads.clone())
			.remove_mirror(config.remove_mirror_on_trash);
		let searcher = Searcher::new(cache.clone());
		let logs = Arc::new(LogQueue::new(config.recent_log_capacity));

		info!(
			"Opened cache {} with mirror {} against {}",
			cache.db_path().display(),
			mirror.root().display(),
			remote.name()
		);
		Ok(Controller {
			config,
			cache,
			remote,
			mirror,
			synchronizer,
			downloads,
			comparator,
			trasher,
			searcher,
			logs,
		})
	}

	/// Use `logs` (typically the queue the subscriber feeds) for log viewers
	pub fn with_logs(mut self, logs: Arc<LogQueue>) -> Self {
		self.logs = logs;
		self
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn cache(&self) -> &Arc<NodeCache> {
		&self.cache
	}

	pub fn remote(&self) -> &Arc<dyn RemoteStore> {
		&self.remote
	}

	pub fn logs(&self) -> &Arc<LogQueue> {
		&self.logs
	}

	/// Cached entries whose name matches `pattern`
	pub fn search(&self, pattern: &str) -> Result<Vec<CacheEntry>, DriveError> {
		self.searcher.search(pattern)
	}

	/// Refresh remote paths and apply the resulting mirror actions
	pub async fn refresh<S: AsRef<str>>(&self, paths: &[S]) -> RefreshResult {
		let result = self.synchronizer.refresh(paths).await;
		self.apply(&result).await;
		result
	}

	/// Apply a refresh plan to the mirror
	///
	/// Removals run first, then relocations in two phases (every source is
	/// staged aside before any target is written) so that renames swapping
	/// or reusing names never overwrite a copy still to be moved. Downloads
	/// are scheduled last.
	async fn apply(&self, result: &RefreshResult) {
		let mut removals = Vec::new();
		let mut relocations = Vec::new();
		let mut downloads = Vec::new();
		for action in result.actions() {
			match action {
				SyncAction::RemoveLocal { id, local_path } => removals.push((id, local_path)),
				SyncAction::Relocate { id, from, to } => relocations.push((id, from, to)),
				SyncAction::Download { id, path } => downloads.push((id, path)),
			}
		}

		// Paths that belong to a relocated file once the plan is applied
		let claimed: HashSet<&str> = relocations.iter().map(|(_, _, to)| to.as_str()).collect();
		for (id, local_path) in removals {
			self.downloads.settle(id).await;
			if claimed.contains(local_path.as_str()) {
				debug!("Keeping {} for the file moving there", local_path);
				continue;
			}
			if let Err(e) = self.mirror.remove(local_path).await {
				warn!("Failed to remove mirror copy of {}: {}", id, e);
			}
		}

		let mut staged = Vec::with_capacity(relocations.len());
		for (id, from, to) in relocations {
			self.downloads.settle(id).await;
			match self.mirror.stage(from).await {
				Ok(Some(copy)) => staged.push((id, from, to, copy)),
				Ok(None) => debug!("Nothing to relocate for {} at {}", id, from),
				Err(e) => warn!("Failed to relocate {}: {}", id, e),
			}
		}
		let mut sources = Vec::with_capacity(staged.len());
		for (id, from, to, copy) in staged {
			if let Err(e) = self.mirror.place(copy, to).await {
				warn!("Failed to relocate {}: {}", id, e);
				continue;
			}
			match self.cache.mirror_at(id, to) {
				Ok(Some(_)) => debug!("Relocated {} from {} to {}", id, from, to),
				Ok(None) => debug!("{} moved on again, {} left unflagged", id, to),
				Err(e) => warn!("Relocated {} but could not update cache: {}", id, e),
			}
			sources.push(from);
		}
		for from in sources {
			self.mirror.prune_empty(from).await;
		}

		if !self.config.auto_download {
			return;
		}
		for (id, path) in downloads {
			debug!("Scheduling download of {}", path);
			if let Err(e) = self.downloads.schedule(id) {
				warn!("Cannot schedule download of {}: {}", id, e);
			}
		}
	}

	/// Fetch a node's content into the mirror
	pub async fn download(&self, id: &str) -> Result<CacheEntry, DriveError> {
		self.downloads.download(id).await
	}

	/// State of an in-flight download
	pub fn download_status(&self, id: &str) -> Option<JobStatus> {
		self.downloads.status(id)
	}

	pub async fn trash(&self, id: &str) -> Result<CacheEntry, DriveError> {
		self.trasher.trash(id).await
	}

	pub async fn compare<S: AsRef<str>>(&self, ids: &[S]) -> Result<Grouping, DriveError> {
		self.comparator.compare(ids).await
	}

	/// Cached entry for an identity
	pub fn entry(&self, id: &str) -> Result<CacheEntry, DriveError> {
		self.cache.get(id)?.ok_or_else(|| DriveError::not_found(id))
	}

	/// Absolute mirror path of an identity
	pub fn mirror_path(&self, id: &str) -> Result<PathBuf, DriveError> {
		Ok(self.mirror.path_for(&self.entry(id)?.local_path))
	}

	/// Stop downloads, giving running ones the configured grace period
	pub async fn close(&self) {
		info!("Shutting down");
		self.downloads.close(self.config.shutdown_grace()).await;
	}
}

// vim: ts=4
