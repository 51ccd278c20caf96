//! Local filesystem mirror
//!
//! Maps cache entries onto paths under the mirror root and owns the
//! filesystem side effects on them: partial download files, relocation after
//! remote renames, and removal. Partial files live next to their destination
//! so the final rename stays on one filesystem.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::DriveError;
use crate::logging::*;

/// Suffix of in-progress download files
pub const PARTIAL_SUFFIX: &str = ".ddld-part";

/// Make a remote name usable as a single path component
pub fn sanitize_name(name: &str) -> String {
	let cleaned: String =
		name.chars().map(|c| if c == '/' || c == '\\' || c == '\0' { '_' } else { c }).collect();
	match cleaned.as_str() {
		"" | "." | ".." => "_".to_string(),
		_ => cleaned,
	}
}

/// Mirror name of a node; siblings sharing a name get their identity appended
pub fn local_name(name: &str, id: &str, collides: bool) -> String {
	let name = sanitize_name(name);
	if collides {
		format!("{}~{}", name, sanitize_name(id))
	} else {
		name
	}
}

/// Join a mirror-relative parent path and a child name
pub fn join_local(parent: &str, child: &str) -> String {
	if parent.is_empty() {
		child.to_string()
	} else {
		format!("{}/{}", parent, child)
	}
}

/// Whether `local_path` lies in the mirror subtree rooted at `root`
pub fn within(local_path: &str, root: &str) -> bool {
	root.is_empty()
		|| local_path == root
		|| (local_path.starts_with(root) && local_path[root.len()..].starts_with('/'))
}

/// Mirror directory tree rooted at one path
#[derive(Debug, Clone)]
pub struct Mirror {
	root: PathBuf,
}

impl Mirror {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Mirror { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Absolute path of a mirror-relative path
	pub fn path_for(&self, local_path: &str) -> PathBuf {
		if local_path.is_empty() {
			self.root.clone()
		} else {
			self.root.join(local_path)
		}
	}

	/// Fresh partial file next to the destination of `local_path`
	pub fn partial_for(&self, local_path: &str) -> PartialFile {
		let dest = self.path_for(local_path);
		let file_name = dest.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
		let partial_name =
			format!(".{}.{}{}", file_name, uuid::Uuid::new_v4().simple(), PARTIAL_SUFFIX);
		let path = match dest.parent() {
			Some(parent) => parent.join(partial_name),
			None => self.root.join(partial_name),
		};
		PartialFile { path, armed: true }
	}

	/// Create the directory for `local_path` (the path itself for folders)
	pub async fn ensure_dir(&self, local_path: &str) -> Result<PathBuf, DriveError> {
		let dir = self.path_for(local_path);
		tokio::fs::create_dir_all(&dir).await.map_err(|e| DriveError::io(&dir, e))?;
		Ok(dir)
	}

	/// Create the parent directory of `local_path`
	pub async fn ensure_parent(&self, local_path: &str) -> Result<(), DriveError> {
		let dest = self.path_for(local_path);
		if let Some(parent) = dest.parent() {
			tokio::fs::create_dir_all(parent).await.map_err(|e| DriveError::io(parent, e))?;
		}
		Ok(())
	}

	/// Whether the mirror holds a file at `local_path`
	pub async fn has_file(&self, local_path: &str) -> bool {
		matches!(tokio::fs::metadata(self.path_for(local_path)).await, Ok(meta) if meta.is_file())
	}

	/// Remove the mirror copy at `local_path` (file or whole directory)
	///
	/// Returns false when nothing was there. The mirror root itself is never
	/// removed.
	pub async fn remove(&self, local_path: &str) -> Result<bool, DriveError> {
		if local_path.is_empty() {
			return Ok(false);
		}
		let path = self.path_for(local_path);
		let meta = match tokio::fs::symlink_metadata(&path).await {
			Ok(meta) => meta,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
			Err(e) => return Err(DriveError::io(&path, e)),
		};
		let result = if meta.is_dir() {
			tokio::fs::remove_dir_all(&path).await
		} else {
			tokio::fs::remove_file(&path).await
		};
		match result {
			Ok(()) => {
				debug!("Removed mirror copy {}", path.display());
				Ok(true)
			}
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
			Err(e) => Err(DriveError::io(&path, e)),
		}
	}

	/// Move a mirror copy after the remote node was renamed or moved
	///
	/// Returns false when there was nothing to move. Directories left empty
	/// at the source are pruned.
	pub async fn relocate(&self, from: &str, to: &str) -> Result<bool, DriveError> {
		let staged = match self.stage(from).await? {
			Some(staged) => staged,
			None => return Ok(false),
		};
		self.place(staged, to).await?;
		self.prune_empty(from).await;
		debug!("Relocated mirror copy {} -> {}", from, to);
		Ok(true)
	}

	/// Move the file at `local_path` aside into a fresh partial file
	///
	/// The staged copy is deleted if it is dropped without being placed.
	/// Returns None when no file is there.
	pub async fn stage(&self, local_path: &str) -> Result<Option<PartialFile>, DriveError> {
		let source = self.path_for(local_path);
		match tokio::fs::symlink_metadata(&source).await {
			Ok(meta) if meta.is_file() => {}
			Ok(_) => return Ok(None),
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(DriveError::io(&source, e)),
		}
		let staged = self.partial_for(local_path);
		tokio::fs::rename(&source, staged.path()).await.map_err(|e| DriveError::io(&source, e))?;
		Ok(Some(staged))
	}

	/// Put a staged copy at `local_path`, replacing whatever is there
	pub async fn place(&self, staged: PartialFile, local_path: &str) -> Result<(), DriveError> {
		self.ensure_parent(local_path).await?;
		let dest = self.path_for(local_path);
		staged.persist(&dest).await.map_err(|e| DriveError::io(&dest, e))
	}

	/// Remove directories above `local_path` that are now empty
	///
	/// Stops at the first non-empty directory and never touches the root.
	pub async fn prune_empty(&self, local_path: &str) {
		let mut current = Path::new(local_path).parent();
		while let Some(dir) = current {
			if dir.as_os_str().is_empty() {
				break;
			}
			let path = self.root.join(dir);
			if tokio::fs::remove_dir(&path).await.is_err() {
				break;
			}
			debug!("Pruned empty mirror directory {}", path.display());
			current = dir.parent();
		}
	}

	/// Delete partial files left behind by an interrupted process
	pub fn sweep_partials(&self) -> usize {
		if !self.root.exists() {
			return 0;
		}
		let mut removed = 0;
		for entry in walkdir::WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()) {
			let is_partial = entry.file_type().is_file()
				&& entry.file_name().to_string_lossy().ends_with(PARTIAL_SUFFIX);
			if is_partial {
				match std::fs::remove_file(entry.path()) {
					Ok(()) => removed += 1,
					Err(e) => warn!("Failed to remove stale partial {}: {}", entry.path().display(), e),
				}
			}
		}
		if removed > 0 {
			info!("Swept {} stale partial download(s) from {}", removed, self.root.display());
		}
		removed
	}
}

/// Partial download file, deleted on drop unless persisted
#[derive(Debug)]
pub struct PartialFile {
	path: PathBuf,
	armed: bool,
}

impl PartialFile {
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Atomically move the partial file onto `dest`
	pub async fn persist(mut self, dest: &Path) -> io::Result<()> {
		tokio::fs::rename(&self.path, dest).await?;
		self.armed = false;
		Ok(())
	}
}

impl Drop for PartialFile {
	fn drop(&mut self) {
		if self.armed {
			let _ = std::fs::remove_file(&self.path);
		}
	}
}


// vim: ts=4
