//! Cache refresh from the remote store
//!
//! A refresh resolves each requested remote path, walks its subtree and
//! reconciles every listed node with the cache. Only once the whole subtree
//! listed cleanly are cached entries that were not seen purged. The outcome of
//! every path is reported separately, together with the mirror actions the
//! observed changes call for.

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::cache::{NodeCache, Observation};
use crate::error::DriveError;
use crate::logging::*;
use crate::mirror::{join_local, local_name, sanitize_name, within};
use crate::remote::RemoteStore;
use crate::types::{join_path, normalize_path, CacheEntry, Node, NodeId};

/// Mirror side effect requested by a refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SyncAction {
	/// New or changed file content should be fetched
	Download { id: NodeId, path: String },
	/// Mirrored file was renamed or moved on the remote side
	Relocate { id: NodeId, from: String, to: String },
	/// Mirror copy no longer backed by the remote: the file is gone, or it
	/// changed while moving away from this path
	RemoveLocal { id: NodeId, local_path: String },
}

impl SyncAction {
	pub fn id(&self) -> &str {
		match self {
			SyncAction::Download { id, .. }
			| SyncAction::Relocate { id, .. }
			| SyncAction::RemoveLocal { id, .. } => id,
		}
	}
}

/// Counters and plan for one refreshed subtree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtreeSummary {
	pub root_id: NodeId,
	pub observed: usize,
	pub inserted: usize,
	pub changed: usize,
	pub moved: usize,
	pub unchanged: usize,
	pub removed: usize,
	pub actions: Vec<SyncAction>,
}

impl SubtreeSummary {
	fn record(&mut self, observation: &Observation) {
		self.observed += 1;
		match observation {
			Observation::Inserted(entry) => {
				self.inserted += 1;
				self.plan_download(entry);
			}
			Observation::Changed { previous, current } => {
				self.changed += 1;
				// The old copy is stale and would be orphaned at its old path
				if previous.node.is_file()
					&& previous.mirrored
					&& previous.local_path != current.local_path
				{
					self.actions.push(SyncAction::RemoveLocal {
						id: current.node.id.clone(),
						local_path: previous.local_path.clone(),
					});
				}
				self.plan_download(current);
			}
			Observation::Moved { previous, current } => {
				self.moved += 1;
				if current.node.is_file()
					&& previous.mirrored
					&& previous.local_path != current.local_path
				{
					self.actions.push(SyncAction::Relocate {
						id: current.node.id.clone(),
						from: previous.local_path.clone(),
						to: current.local_path.clone(),
					});
				}
			}
			Observation::Unchanged(_) => self.unchanged += 1,
		}
	}

	fn plan_download(&mut self, entry: &CacheEntry) {
		if entry.node.is_file() && !entry.node.trashed {
			self.actions
				.push(SyncAction::Download { id: entry.node.id.clone(), path: entry.path.clone() });
		}
	}
}

/// Outcome of refreshing one requested path
#[derive(Debug, Clone)]
pub struct PathReport {
	/// Normalized remote path
	pub path: String,
	pub outcome: Result<SubtreeSummary, DriveError>,
}

impl Serialize for PathReport {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut state = serializer.serialize_struct("PathReport", 3)?;
		state.serialize_field("path", &self.path)?;
		match &self.outcome {
			Ok(summary) => {
				state.serialize_field("ok", &true)?;
				state.serialize_field("summary", summary)?;
			}
			Err(e) => {
				state.serialize_field("ok", &false)?;
				state.serialize_field("error", &format!("{}: {}", e.kind(), e))?;
			}
		}
		state.end()
	}
}

/// Result of one refresh request
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshResult {
	pub reports: Vec<PathReport>,
}

impl RefreshResult {
	/// Whether every requested path refreshed cleanly
	pub fn is_ok(&self) -> bool {
		self.reports.iter().all(|r| r.outcome.is_ok())
	}

	/// All planned actions, in report order
	pub fn actions(&self) -> impl Iterator<Item = &SyncAction> {
		self.reports.iter().filter_map(|r| r.outcome.as_ref().ok()).flat_map(|s| s.actions.iter())
	}

	/// Report for a (normalized) path
	pub fn report(&self, path: &str) -> Option<&PathReport> {
		let path = normalize_path(path);
		self.reports.iter().find(|r| r.path == path)
	}
}

/// Mirror names for one listing, in listing order
///
/// Siblings sharing a (sanitized) name are disambiguated by identity.
fn listing_local_names(children: &[Node]) -> Vec<String> {
	let mut counts: HashMap<String, usize> = HashMap::new();
	for child in children {
		*counts.entry(sanitize_name(&child.name)).or_insert(0) += 1;
	}
	children
		.iter()
		.map(|child| {
			let collides = counts.get(&sanitize_name(&child.name)).copied().unwrap_or(0) > 1;
			local_name(&child.name, &child.id, collides)
		})
		.collect()
}

/// Reconciles the cache with the remote store
pub struct Synchronizer {
	cache: Arc<NodeCache>,
	remote: Arc<dyn RemoteStore>,
	remove_mirror_on_delete: bool,
}

impl Synchronizer {
	pub fn new(cache: Arc<NodeCache>, remote: Arc<dyn RemoteStore>) -> Self {
		Synchronizer { cache, remote, remove_mirror_on_delete: false }
	}

	/// Plan mirror removal for files deleted on the remote side
	pub fn remove_mirror_on_delete(mut self, enabled: bool) -> Self {
		self.remove_mirror_on_delete = enabled;
		self
	}

	/// Refresh every path concurrently; failures stay confined to their path
	pub async fn refresh<S: AsRef<str>>(&self, paths: &[S]) -> RefreshResult {
		let tasks = paths.iter().map(|p| self.refresh_path(p.as_ref()));
		let reports = futures::future::join_all(tasks).await;
		RefreshResult { reports }
	}

	async fn refresh_path(&self, raw: &str) -> PathReport {
		let path = normalize_path(raw);
		debug!("Refreshing {} from {}", path, self.remote.name());
		let outcome = self.refresh_subtree(&path).await;
		match &outcome {
			Ok(summary) => info!(
				"Refreshed {}: {} observed, {} new, {} changed, {} moved, {} removed",
				path,
				summary.observed,
				summary.inserted,
				summary.changed,
				summary.moved,
				summary.removed
			),
			Err(e) => warn!("Refresh of {} failed: {}", path, e),
		}
		PathReport { path, outcome }
	}

	async fn refresh_subtree(&self, path: &str) -> Result<SubtreeSummary, DriveError> {
		let target = self.resolve(path).await?;
		let root = target.entry().clone();

		let mut summary = SubtreeSummary { root_id: root.node.id.clone(), ..Default::default() };
		let mut seen: HashSet<NodeId> = HashSet::new();
		summary.record(&target);
		seen.insert(root.node.id.clone());

		let mut stack: Vec<CacheEntry> = Vec::new();
		if root.node.is_folder() {
			stack.push(root.clone());
		}
		while let Some(dir) = stack.pop() {
			let children = self
				.remote
				.list_children(&dir.node.id)
				.await
				.map_err(|e| DriveError::remote(&dir.path, e))?;
			let locals = listing_local_names(&children);

			let mut folders = Vec::new();
			for (child, local) in children.iter().zip(locals) {
				if !seen.insert(child.id.clone()) {
					warn!("Node {} listed twice under {}, skipping", child.id, path);
					continue;
				}
				let remote_path = join_path(&dir.path, &child.name);
				let local_path = join_local(&dir.local_path, &local);
				let observation = self.cache.observe(child, &remote_path, &local_path)?;
				summary.record(&observation);
				if child.is_folder() {
					folders.push(observation.entry().clone());
				}
			}
			// Reverse so the first listed folder is walked first
			stack.extend(folders.into_iter().rev());
		}

		// Every listing succeeded; purge what the remote no longer has
		for entry in self.cache.subtree(&root.path)? {
			if seen.contains(entry.id()) || !within(&entry.local_path, &root.local_path) {
				continue;
			}
			if self.cache.remove(entry.id())?.is_none() {
				continue;
			}
			summary.removed += 1;
			debug!("Node {} ({}) gone from remote", entry.id(), entry.path);
			if self.remove_mirror_on_delete && entry.node.is_file() && entry.mirrored {
				summary.actions.push(SyncAction::RemoveLocal {
					id: entry.node.id.clone(),
					local_path: entry.local_path.clone(),
				});
			}
		}

		Ok(summary)
	}

	/// Walk from the remote root down to `path`, caching every ancestor
	///
	/// Returns the observation of the node `path` names.
	async fn resolve(&self, path: &str) -> Result<Observation, DriveError> {
		let root = self.remote.root().await.map_err(|e| DriveError::remote("/", e))?;
		let mut current = self.cache.observe(&root, "/", "")?;

		let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
		for (depth, segment) in segments.iter().enumerate() {
			let parent = current.entry().clone();
			if parent.node.is_file() {
				return Err(DriveError::PathNotFound { path: path.to_string() });
			}
			let children = self
				.remote
				.list_children(&parent.node.id)
				.await
				.map_err(|e| DriveError::remote(&parent.path, e))?;
			let locals = listing_local_names(&children);

			let found = children
				.iter()
				.position(|c| c.name == *segment && !c.trashed)
				.or_else(|| children.iter().position(|c| c.name == *segment));
			let index = match found {
				Some(index) => index,
				None => {
					debug!("{} not found at depth {} of {}", segment, depth, path);
					return Err(DriveError::PathNotFound { path: path.to_string() });
				}
			};

			let child = &children[index];
			current = self.cache.observe(
				child,
				&join_path(&parent.path, &child.name),
				&join_local(&parent.local_path, &locals[index]),
			)?;
		}
		Ok(current)
	}
}


// vim: ts=4
