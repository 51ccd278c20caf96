//! Download manager
//!
//! At most one transfer runs per identity. A request for an identity that is
//! already being fetched joins the running job and receives the same outcome.
//! Jobs run as spawned tasks, so a caller that goes away does not cancel the
//! transfer for everybody else.
//!
//! Content is streamed into a partial file next to the destination, hashed on
//! the way, verified against the cached size and digest, and only then renamed
//! over the mirror path. A failed job leaves the previous mirror file alone.

use futures::future::{BoxFuture, FutureExt, Shared};
use futures::StreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Semaphore};

use crate::cache::NodeCache;
use crate::error::DriveError;
use crate::hasher::ContentHasher;
use crate::logging::*;
use crate::mirror::{within, Mirror};
use crate::remote::RemoteStore;
use crate::types::{CacheEntry, NodeId};

type JobOutcome = Result<CacheEntry, DriveError>;
type SharedJob = Shared<BoxFuture<'static, JobOutcome>>;

/// Lifecycle of an in-flight job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
	/// Waiting for a transfer slot
	Pending,
	/// Transfer in progress
	Running,
}

struct Job {
	future: SharedJob,
	running: Arc<AtomicBool>,
}

/// Fetches file content into the mirror
pub struct DownloadManager {
	cache: Arc<NodeCache>,
	remote: Arc<dyn RemoteStore>,
	mirror: Mirror,
	jobs: Mutex<HashMap<NodeId, Job>>,
	permits: Arc<Semaphore>,
	shutdown: watch::Sender<bool>,
	closed: AtomicBool,
}

impl DownloadManager {
	/// Create a manager running at most `max_concurrent` transfers at once
	pub fn new(
		cache: Arc<NodeCache>,
		remote: Arc<dyn RemoteStore>,
		mirror: Mirror,
		max_concurrent: usize,
	) -> Arc<Self> {
		let (shutdown, _) = watch::channel(false);
		Arc::new(DownloadManager {
			cache,
			remote,
			mirror,
			jobs: Mutex::new(HashMap::new()),
			permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
			shutdown,
			closed: AtomicBool::new(false),
		})
	}

	pub fn mirror(&self) -> &Mirror {
		&self.mirror
	}

	fn jobs(&self) -> MutexGuard<'_, HashMap<NodeId, Job>> {
		self.jobs.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Download a node's content into the mirror
	///
	/// Folders get their mirror directory and every cached live file below
	/// them.
	pub async fn download(self: &Arc<Self>, id: &str) -> Result<CacheEntry, DriveError> {
		let entry = self.cache.get(id)?.ok_or_else(|| DriveError::not_found(id))?;
		if entry.node.is_folder() {
			return self.download_folder(entry).await;
		}
		self.join_or_start(id)?.await
	}

	async fn download_folder(self: &Arc<Self>, folder: CacheEntry) -> Result<CacheEntry, DriveError> {
		self.mirror.ensure_dir(&folder.local_path).await?;

		let files: Vec<CacheEntry> = self
			.cache
			.subtree(&folder.path)?
			.into_iter()
			.filter(|e| e.node.is_file() && !e.node.trashed)
			.filter(|e| within(&e.local_path, &folder.local_path))
			.collect();
		debug!("Folder {} has {} file(s) to fetch", folder.node.id, files.len());

		let mut jobs = Vec::with_capacity(files.len());
		for file in &files {
			jobs.push(self.join_or_start(file.id())?);
		}
		let outcomes = futures::future::join_all(jobs).await;
		if let Some(Err(e)) = outcomes.into_iter().find(|o| o.is_err()) {
			return Err(e);
		}

		Ok(self.cache.get(folder.id())?.unwrap_or(folder))
	}

	/// Start fetching a file without waiting for the outcome
	pub fn schedule(self: &Arc<Self>, id: &str) -> Result<(), DriveError> {
		let entry = self.cache.get(id)?.ok_or_else(|| DriveError::not_found(id))?;
		if entry.node.is_file() {
			self.join_or_start(id)?;
		}
		Ok(())
	}

	/// Join the job for `id`, spawning it if none is in flight
	fn join_or_start(self: &Arc<Self>, id: &str) -> Result<SharedJob, DriveError> {
		let mut jobs = self.jobs();
		if let Some(job) = jobs.get(id) {
			debug!("Joining in-flight download of {}", id);
			return Ok(job.future.clone());
		}
		if self.closed.load(Ordering::SeqCst) {
			return Err(DriveError::Aborted { id: id.to_string() });
		}

		let running = Arc::new(AtomicBool::new(false));
		let manager = Arc::clone(self);
		let job_id = id.to_string();
		let flag = Arc::clone(&running);
		let handle = tokio::spawn(async move {
			let outcome = manager.run(&job_id, &flag).await;
			if let Err(e) = &outcome {
				warn!("Download of {} failed: {}", job_id, e);
			}
			manager.jobs().remove(&job_id);
			outcome
		});

		let abort_id = id.to_string();
		let future = async move {
			match handle.await {
				Ok(outcome) => outcome,
				Err(e) => {
					error!("Download task for {} died: {}", abort_id, e);
					Err(DriveError::Aborted { id: abort_id })
				}
			}
		}
		.boxed()
		.shared();

		jobs.insert(id.to_string(), Job { future: future.clone(), running });
		Ok(future)
	}

	async fn run(&self, id: &str, running: &AtomicBool) -> JobOutcome {
		let mut shutdown = self.shutdown.subscribe();

		let _permit = tokio::select! {
			permit = Arc::clone(&self.permits).acquire_owned() => {
				permit.map_err(|_| DriveError::Aborted { id: id.to_string() })?
			}
			_ = stopped(&mut shutdown) => {
				return Err(DriveError::Aborted { id: id.to_string() });
			}
		};
		running.store(true, Ordering::SeqCst);

		// Revision as of the start of the transfer
		let entry = self.cache.get(id)?.ok_or_else(|| DriveError::not_found(id))?;

		tokio::select! {
			outcome = self.transfer(&entry) => outcome,
			_ = stopped(&mut shutdown) => {
				warn!("Download of {} aborted by shutdown", id);
				Err(DriveError::Aborted { id: id.to_string() })
			}
		}
	}

	async fn transfer(&self, entry: &CacheEntry) -> JobOutcome {
		let id = entry.id();
		let node = &entry.node;
		let expected_size = node.size();

		self.mirror.ensure_parent(&entry.local_path).await?;
		let partial = self.mirror.partial_for(&entry.local_path);
		let mut file = tokio::fs::File::create(partial.path())
			.await
			.map_err(|e| DriveError::io(partial.path(), e))?;

		let mut stream =
			self.remote.get_content_stream(id).await.map_err(|e| DriveError::remote(id, e))?;
		let mut hasher = ContentHasher::new();
		while let Some(chunk) = stream.next().await {
			let chunk = chunk.map_err(|e| DriveError::remote(id, e))?;
			hasher.update(&chunk);
			if hasher.bytes() > expected_size {
				return Err(size_mismatch(id, expected_size, hasher.bytes()));
			}
			file.write_all(&chunk).await.map_err(|e| DriveError::io(partial.path(), e))?;
		}
		file.flush().await.map_err(|e| DriveError::io(partial.path(), e))?;
		drop(file);

		if hasher.bytes() != expected_size {
			return Err(size_mismatch(id, expected_size, hasher.bytes()));
		}
		let digest = hasher.finalize();
		if let Some(expected) = node.content_hash() {
			if expected != digest {
				return Err(DriveError::ContentMismatch {
					id: id.to_string(),
					expected: expected.to_string(),
					actual: digest,
				});
			}
		}

		let dest = self.mirror.path_for(&entry.local_path);
		partial.persist(&dest).await.map_err(|e| DriveError::io(&dest, e))?;
		info!("Downloaded {} ({} bytes) to {}", entry.path, expected_size, dest.display());

		match self.cache.record_content(id, node, &digest, Some(&entry.local_path))? {
			Some(updated) if updated.mirrored => Ok(updated),
			Some(updated) => self.follow_move(entry, updated).await,
			None => {
				debug!("Revision of {} changed during download, digest not recorded", id);
				Ok(self.cache.get(id)?.unwrap_or_else(|| entry.clone()))
			}
		}
	}

	/// Move a finished download to where the node went while it ran
	async fn follow_move(&self, fetched: &CacheEntry, current: CacheEntry) -> JobOutcome {
		let id = current.id();
		debug!("{} moved to {} during download, following", id, current.local_path);
		if !self.mirror.relocate(&fetched.local_path, &current.local_path).await? {
			return Ok(current);
		}
		match self.cache.mirror_at(id, &current.local_path)? {
			Some(updated) => Ok(updated),
			None => Ok(self.cache.get(id)?.unwrap_or(current)),
		}
	}

	/// State of the in-flight job for `id`, if any
	pub fn status(&self, id: &str) -> Option<JobStatus> {
		self.jobs().get(id).map(|job| {
			if job.running.load(Ordering::SeqCst) {
				JobStatus::Running
			} else {
				JobStatus::Pending
			}
		})
	}

	/// Number of jobs in flight
	pub fn in_flight(&self) -> usize {
		self.jobs().len()
	}

	/// Wait for the in-flight job of `id` (if any), ignoring its outcome
	pub async fn settle(&self, id: &str) {
		let job = self.jobs().get(id).map(|job| job.future.clone());
		if let Some(job) = job {
			let _ = job.await;
		}
	}

	/// Remove the mirror copy of an entry once no job is writing it
	///
	/// For folders the whole mirror directory goes, and every file below is
	/// flagged as no longer mirrored. Returns whether anything was removed.
	pub async fn discard(&self, entry: &CacheEntry) -> Result<bool, DriveError> {
		let affected: Vec<CacheEntry> = if entry.node.is_folder() {
			self.cache
				.subtree(&entry.path)?
				.into_iter()
				.filter(|e| within(&e.local_path, &entry.local_path))
				.collect()
		} else {
			vec![entry.clone()]
		};
		for e in &affected {
			self.settle(e.id()).await;
		}

		let removed = self.mirror.remove(&entry.local_path).await?;
		for e in &affected {
			if e.mirrored {
				self.cache.set_mirrored(e.id(), false)?;
			}
		}
		Ok(removed)
	}

	/// Stop accepting jobs and wind down the ones in flight
	///
	/// Running jobs get `grace` to finish; whatever is left afterwards is
	/// aborted and leaves no partial file behind.
	pub async fn close(&self, grace: Duration) {
		self.closed.store(true, Ordering::SeqCst);
		let pending: Vec<SharedJob> = self.jobs().values().map(|job| job.future.clone()).collect();

		if !pending.is_empty() {
			info!("Waiting up to {:?} for {} download(s)", grace, pending.len());
			let all = futures::future::join_all(pending.clone());
			if tokio::time::timeout(grace, all).await.is_err() {
				warn!("Grace period over, aborting remaining downloads");
				self.shutdown.send_replace(true);
				futures::future::join_all(pending).await;
			}
		}
		self.shutdown.send_replace(true);
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}
}

/// Resolves once shutdown was signalled
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
	let _ = shutdown.wait_for(|stop| *stop).await;
}

fn size_mismatch(id: &str, expected: u64, actual: u64) -> DriveError {
	DriveError::ContentMismatch {
		id: id.to_string(),
		expected: format!("{} bytes", expected),
		actual: format!("{} bytes", actual),
	}
}


// vim: ts=4
