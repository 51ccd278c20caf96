#![allow(dead_code)]

//! Shared fixtures for integration tests

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use ddld::remote::memory::{MemoryStore, MEMORY_ROOT_ID};
use ddld::{Config, Controller};

/// Controller wired to an in-memory remote inside a temp directory
pub struct Harness {
	pub tmp: TempDir,
	pub store: Arc<MemoryStore>,
	pub controller: Controller,
}

impl Harness {
	pub fn new() -> Self {
		Self::with(MemoryStore::new(), |_| {})
	}

	pub fn with<F: FnOnce(&mut Config)>(store: MemoryStore, adjust: F) -> Self {
		let tmp = TempDir::new().unwrap();
		let mut config = Config {
			data_dir: tmp.path().join("data"),
			shutdown_grace_secs: 1,
			..Config::default()
		};
		adjust(&mut config);
		let store = Arc::new(store);
		let controller = Controller::open(config, store.clone()).unwrap();
		Harness { tmp, store, controller }
	}

	pub fn mirror_root(&self) -> PathBuf {
		self.controller.config().mirror_root()
	}

	pub fn mirror_file(&self, local_path: &str) -> PathBuf {
		self.mirror_root().join(local_path)
	}
}

/// Remote drive holding `/root` with file_1.txt, folder_2 and folder_2/file_2.txt
pub fn scenario_store() -> MemoryStore {
	let store = MemoryStore::new();
	store.add_folder("R", "root", MEMORY_ROOT_ID);
	store.add_file("F1", "file_1.txt", "R", b"file 1");
	store.add_folder("D1", "folder_2", "R");
	store.add_file("F2", "file_2.txt", "D1", b"file 2");
	store
}

/// Names of all files below `dir`, partial downloads included
pub fn files_under(dir: &Path) -> Vec<String> {
	let mut names: Vec<String> = walkdir::WalkDir::new(dir)
		.into_iter()
		.filter_map(|e| e.ok())
		.filter(|e| e.file_type().is_file())
		.map(|e| e.path().strip_prefix(dir).unwrap().to_string_lossy().to_string())
		.collect();
	names.sort();
	names
}

/// Poll `check` until it holds or `limit` passes
pub async fn eventually<F: Fn() -> bool>(limit: Duration, check: F) -> bool {
	let deadline = tokio::time::Instant::now() + limit;
	while tokio::time::Instant::now() < deadline {
		if check() {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	check()
}

// vim: ts=4
