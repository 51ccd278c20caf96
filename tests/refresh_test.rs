/// Refresh tests - cache reconciliation against a remote drive
///
/// Tests verify:
/// 1. Cached metadata equals what the remote reported
/// 2. Deletion is scoped to the refreshed subtree and waits for a full listing
/// 3. Listing failures stay confined to their path
/// 4. Changed files lose their digest, renamed files keep it and move in the mirror
/// 5. Renames that swap or reuse names never clobber a mirror copy
mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use common::{files_under, scenario_store, Harness};
use ddld::cache::NodeCache;
use ddld::hasher::hash_bytes;
use ddld::remote::memory::{MemoryStore, MEMORY_ROOT_ID};
use ddld::sync::Synchronizer;
use ddld::{ErrorKind, LocalDirStore, SyncAction};
use filetime::FileTime;
use tempfile::TempDir;

fn subtree_ids(harness: &Harness, path: &str) -> BTreeSet<String> {
	harness
		.controller
		.cache()
		.subtree(path)
		.unwrap()
		.into_iter()
		.map(|e| e.node.id)
		.collect()
}

fn ids(list: &[&str]) -> BTreeSet<String> {
	list.iter().map(|s| s.to_string()).collect()
}

// ===================================================================
// SCENARIO
// ===================================================================

#[tokio::test]
async fn test_refresh_then_remote_delete() {
	let harness = Harness::with(scenario_store(), |_| {});

	let result = harness.controller.refresh(&["/root"]).await;
	assert!(result.is_ok());
	// The refreshed folder itself plus its three descendants
	assert_eq!(subtree_ids(&harness, "/root"), ids(&["R", "F1", "D1", "F2"]));

	harness.store.remove("F2");
	let result = harness.controller.refresh(&["/root"]).await;
	let summary = result.report("/root").unwrap().outcome.as_ref().unwrap();
	assert_eq!(summary.removed, 1);
	assert_eq!(subtree_ids(&harness, "/root"), ids(&["R", "F1", "D1"]));
	assert!(harness.controller.entry("F2").is_err());
}

#[tokio::test]
async fn test_cached_metadata_matches_remote() {
	let store = scenario_store();
	store.add_file_at("F3", "late.bin", "D1", b"abc", MemoryStore::mtime(3600));
	let harness = Harness::with(store, |_| {});
	harness.controller.refresh(&["/"]).await;

	for id in ["R", "F1", "D1", "F2", "F3"] {
		let remote = harness.store.node(id).unwrap();
		let cached = harness.controller.entry(id).unwrap().node;
		assert_eq!(cached.name, remote.name);
		assert_eq!(cached.size(), remote.size());
		assert_eq!(cached.modified, remote.modified);
		assert_eq!(cached.trashed, remote.trashed);
		assert_eq!(cached.parent_id, remote.parent_id);
	}
	assert_eq!(harness.controller.entry("F3").unwrap().path, "/root/folder_2/late.bin");
}

#[tokio::test]
async fn test_unchanged_refresh_plans_nothing() {
	let harness = Harness::with(scenario_store(), |_| {});
	let first = harness.controller.refresh(&["/root"]).await;
	assert_eq!(first.actions().count(), 2);

	let second = harness.controller.refresh(&["/root"]).await;
	let summary = second.reports[0].outcome.as_ref().unwrap();
	assert_eq!(summary.unchanged, 4);
	assert_eq!(second.actions().count(), 0);
}

// ===================================================================
// SUBTREE SCOPING AND FAILURE ISOLATION
// ===================================================================

#[tokio::test]
async fn test_deletion_is_subtree_scoped() {
	let store = MemoryStore::new();
	store.add_folder("A", "a", MEMORY_ROOT_ID);
	store.add_file("A1", "x.txt", "A", b"a1");
	store.add_folder("B", "b", MEMORY_ROOT_ID);
	store.add_file("B1", "x.txt", "B", b"b1");
	let harness = Harness::with(store, |_| {});
	harness.controller.refresh(&["/"]).await;

	harness.store.remove("B1");
	harness.controller.refresh(&["/a"]).await;
	assert!(harness.controller.entry("B1").is_ok(), "outside the refreshed subtree");

	harness.controller.refresh(&["/b"]).await;
	assert!(harness.controller.entry("B1").is_err());
}

#[tokio::test]
async fn test_listing_failure_is_isolated() {
	let store = MemoryStore::new();
	store.add_folder("A", "a", MEMORY_ROOT_ID);
	store.add_file("A1", "one.txt", "A", b"1");
	store.add_folder("B", "b", MEMORY_ROOT_ID);
	store.add_folder("B2", "deep", "B");
	store.add_file("B3", "two.txt", "B2", b"2");
	let harness = Harness::with(store, |_| {});
	harness.controller.refresh(&["/"]).await;

	// B3 vanishes, but the listing that would prove it fails
	harness.store.remove("B3");
	harness.store.add_file("A2", "new.txt", "A", b"new");
	harness.store.fail("B2", true);

	let result = harness.controller.refresh(&["/a", "/b"]).await;
	assert!(!result.is_ok());
	assert!(result.report("/a").unwrap().outcome.is_ok());
	let err = result.report("/b").unwrap().outcome.as_ref().unwrap_err();
	assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);

	assert!(harness.controller.entry("A2").is_ok());
	assert!(harness.controller.entry("B3").is_ok(), "no deletion after a partial listing");

	harness.store.fail("B2", false);
	harness.controller.refresh(&["/b"]).await;
	assert!(harness.controller.entry("B3").is_err());
}

#[tokio::test]
async fn test_unknown_path_reports_not_found() {
	let harness = Harness::with(scenario_store(), |_| {});
	let result = harness.controller.refresh(&["/root/nope", "/root/file_1.txt/below"]).await;
	for report in &result.reports {
		assert_eq!(report.outcome.as_ref().unwrap_err().kind(), ErrorKind::NotFound);
	}
}

#[tokio::test]
async fn test_refresh_of_single_file() {
	let harness = Harness::with(scenario_store(), |_| {});
	let result = harness.controller.refresh(&["/root/file_1.txt"]).await;
	let summary = result.reports[0].outcome.as_ref().unwrap();
	assert_eq!(summary.root_id, "F1");
	assert_eq!(summary.observed, 1);
	assert!(harness.controller.entry("D1").is_err());
}

// ===================================================================
// CHANGES, RENAMES AND MIRROR POLICY
// ===================================================================

#[tokio::test]
async fn test_changed_file_loses_digest() {
	let harness = Harness::with(scenario_store(), |_| {});
	harness.controller.refresh(&["/"]).await;
	let downloaded = harness.controller.download("F1").await.unwrap();
	assert!(downloaded.node.content_hash().is_some());

	harness.store.update_file("F1", b"file one, longer", MemoryStore::mtime(60));
	let result = harness.controller.refresh(&["/"]).await;
	let summary = result.reports[0].outcome.as_ref().unwrap();
	assert_eq!(summary.changed, 1);
	assert!(result
		.actions()
		.any(|a| matches!(a, SyncAction::Download { id, .. } if id == "F1")));

	let entry = harness.controller.entry("F1").unwrap();
	assert_eq!(entry.node.content_hash(), None);
	assert!(!entry.mirrored);
	assert_eq!(entry.node.size(), 16);
}

#[tokio::test]
async fn test_rename_relocates_mirror_copy() {
	let harness = Harness::with(scenario_store(), |_| {});
	harness.controller.refresh(&["/"]).await;
	let before = harness.controller.download("F2").await.unwrap();
	assert!(harness.mirror_file("root/folder_2/file_2.txt").exists());

	harness.store.rename("D1", "renamed");
	let result = harness.controller.refresh(&["/"]).await;
	assert!(result.actions().any(|a| matches!(a, SyncAction::Relocate { id, .. } if id == "F2")));

	let after = harness.controller.entry("F2").unwrap();
	assert_eq!(after.path, "/root/renamed/file_2.txt");
	assert_eq!(after.node.content_hash(), before.node.content_hash());
	assert!(after.mirrored);
	assert!(harness.mirror_file("root/renamed/file_2.txt").exists());
	assert!(!harness.mirror_file("root/folder_2/file_2.txt").exists());
	assert!(!harness.mirror_file("root/folder_2").exists(), "emptied directory pruned");
	assert!(harness.mirror_file("root/file_1.txt").parent().unwrap().is_dir());
}

fn pair_store() -> MemoryStore {
	let store = MemoryStore::new();
	store.add_file("A", "a", MEMORY_ROOT_ID, b"AA");
	store.add_file("B", "b", MEMORY_ROOT_ID, b"BB");
	store
}

async fn mirror_both(harness: &Harness) {
	harness.controller.refresh(&["/"]).await;
	harness.controller.download("A").await.unwrap();
	harness.controller.download("B").await.unwrap();
}

#[tokio::test]
async fn test_swapped_names_keep_their_content() {
	let harness = Harness::with(pair_store(), |_| {});
	mirror_both(&harness).await;

	harness.store.rename("A", "b");
	harness.store.rename("B", "a");
	let result = harness.controller.refresh(&["/"]).await;
	assert_eq!(result.actions().count(), 2);

	for (id, local, content) in [("A", "b", b"AA"), ("B", "a", b"BB")] {
		let entry = harness.controller.entry(id).unwrap();
		assert_eq!(entry.local_path, local);
		assert!(entry.mirrored);
		assert_eq!(std::fs::read(harness.mirror_file(local)).unwrap(), content);
		assert_eq!(entry.node.content_hash(), Some(hash_bytes(content).as_str()));
	}
	assert_eq!(files_under(&harness.mirror_root()), vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn test_rename_onto_deleted_name_keeps_moved_copy() {
	let harness = Harness::with(pair_store(), |config| config.remove_mirror_on_delete = true);
	mirror_both(&harness).await;

	harness.store.remove("B");
	harness.store.rename("A", "b");
	let result = harness.controller.refresh(&["/"]).await;
	assert!(result
		.actions()
		.any(|a| matches!(a, SyncAction::RemoveLocal { local_path, .. } if local_path == "b")));

	let entry = harness.controller.entry("A").unwrap();
	assert_eq!(entry.local_path, "b");
	assert!(entry.mirrored);
	assert_eq!(std::fs::read(harness.mirror_file("b")).unwrap(), b"AA");
	assert_eq!(files_under(&harness.mirror_root()), vec!["b".to_string()]);
}

#[tokio::test]
async fn test_rename_with_edit_drops_old_copy() {
	let harness = Harness::with(scenario_store(), |_| {});
	harness.controller.refresh(&["/"]).await;
	harness.controller.download("F1").await.unwrap();

	harness.store.rename("F1", "renamed.txt");
	harness.store.update_file("F1", b"edited", MemoryStore::mtime(300));
	let result = harness.controller.refresh(&["/"]).await;
	let summary = result.reports[0].outcome.as_ref().unwrap();
	assert_eq!(summary.changed, 1);
	assert!(result.actions().any(
		|a| matches!(a, SyncAction::RemoveLocal { local_path, .. } if local_path == "root/file_1.txt")
	));

	assert!(!harness.mirror_file("root/file_1.txt").exists());
	let entry = harness.controller.entry("F1").unwrap();
	assert_eq!(entry.local_path, "root/renamed.txt");
	assert!(!entry.mirrored);

	harness.controller.download("F1").await.unwrap();
	assert_eq!(std::fs::read(harness.mirror_file("root/renamed.txt")).unwrap(), b"edited");
}

#[tokio::test]
async fn test_duplicate_names_get_distinct_mirror_paths() {
	let store = MemoryStore::new();
	store.add_file("A", "dup.txt", MEMORY_ROOT_ID, b"first");
	store.add_file("B", "dup.txt", MEMORY_ROOT_ID, b"second");
	let harness = Harness::with(store, |_| {});
	harness.controller.refresh(&["/"]).await;

	harness.controller.download("A").await.unwrap();
	harness.controller.download("B").await.unwrap();
	assert_eq!(std::fs::read(harness.mirror_file("dup.txt~A")).unwrap(), b"first");
	assert_eq!(std::fs::read(harness.mirror_file("dup.txt~B")).unwrap(), b"second");
}

#[tokio::test]
async fn test_remote_delete_keeps_mirror_by_default() {
	let harness = Harness::with(scenario_store(), |_| {});
	harness.controller.refresh(&["/"]).await;
	harness.controller.download("F1").await.unwrap();

	harness.store.remove("F1");
	let result = harness.controller.refresh(&["/"]).await;
	assert_eq!(result.actions().count(), 0);
	assert!(harness.mirror_file("root/file_1.txt").exists());
}

#[tokio::test]
async fn test_remote_delete_removes_mirror_with_policy() {
	let harness = Harness::with(scenario_store(), |config| config.remove_mirror_on_delete = true);
	harness.controller.refresh(&["/"]).await;
	harness.controller.download("F1").await.unwrap();

	harness.store.remove("F1");
	let result = harness.controller.refresh(&["/"]).await;
	assert!(result
		.actions()
		.any(|a| matches!(a, SyncAction::RemoveLocal { id, .. } if id == "F1")));
	assert!(!harness.mirror_file("root/file_1.txt").exists());
}

// ===================================================================
// DIRECTORY-BACKED REMOTE
// ===================================================================

#[tokio::test]
async fn test_local_dir_store_mtime_change() {
	let remote_dir = TempDir::new().unwrap();
	let state_dir = TempDir::new().unwrap();
	let file = remote_dir.path().join("notes.txt");
	std::fs::write(&file, b"v1").unwrap();
	filetime::set_file_mtime(&file, FileTime::from_unix_time(1_500_000_000, 0)).unwrap();

	let cache = Arc::new(NodeCache::open(&state_dir.path().join("cache.db")).unwrap());
	let sync = Synchronizer::new(cache.clone(), Arc::new(LocalDirStore::new(remote_dir.path())));
	let first = sync.refresh(&["/"]).await;
	assert_eq!(first.reports[0].outcome.as_ref().unwrap().inserted, 2);

	let id = LocalDirStore::id_for(std::path::Path::new("notes.txt"));
	let modified = cache.get(&id).unwrap().unwrap().node.modified;
	assert_eq!(modified.timestamp(), 1_500_000_000);

	// Same size, new mtime
	std::fs::write(&file, b"v2").unwrap();
	let later = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
	filetime::set_file_mtime(&file, FileTime::from_system_time(later)).unwrap();

	let second = sync.refresh(&["/"]).await;
	let summary = second.reports[0].outcome.as_ref().unwrap();
	assert_eq!(summary.changed, 1);
	assert_eq!(second.actions().count(), 1);
}

// vim: ts=4
