/// Compare tests - content equality classes over cached nodes
///
/// Tests verify:
/// 1. Downloaded files with identical bytes share a class wherever they live
/// 2. Folders stay singletons
/// 3. Digests missing from the cache come from the mirror copy and are stored
mod common;

use common::{scenario_store, Harness};
use ddld::hasher::hash_bytes;
use ddld::remote::memory::{MemoryStore, MEMORY_ROOT_ID};
use ddld::{DriveError, ErrorKind};

fn duplicates_store() -> MemoryStore {
	let store = MemoryStore::new();
	store.add_folder("P", "photos", MEMORY_ROOT_ID);
	store.add_folder("B", "backup", MEMORY_ROOT_ID);
	store.add_file("P1", "cat.jpg", "P", b"meow meow");
	store.add_file("B1", "cat-copy.jpg", "B", b"meow meow");
	store.add_file("P2", "dog.jpg", "P", b"woof");
	store
}

#[tokio::test]
async fn test_identical_content_shares_class() {
	let harness = Harness::with(duplicates_store(), |_| {});
	harness.controller.refresh(&["/"]).await;
	for id in ["P1", "B1", "P2"] {
		harness.controller.download(id).await.unwrap();
	}

	let grouping = harness.controller.compare(&["P2", "P1", "B1"]).await.unwrap();
	assert_eq!(grouping.classes.len(), 2);
	assert_eq!(grouping.classes[0].members, vec!["P2"]);
	assert_eq!(grouping.classes[1].members, vec!["P1", "B1"]);
	assert_eq!(grouping.classes[1].hash, Some(hash_bytes(b"meow meow")));
	assert!(!grouping.same_class("P1", "P2"));
}

#[tokio::test]
async fn test_folders_never_equal() {
	let harness = Harness::with(duplicates_store(), |_| {});
	harness.controller.refresh(&["/"]).await;
	harness.controller.download("P1").await.unwrap();

	let grouping = harness.controller.compare(&["P", "B", "P1"]).await.unwrap();
	assert_eq!(grouping.classes.len(), 3);
	assert_eq!(grouping.class_of("P"), Some(0));
	assert_eq!(grouping.class_of("B"), Some(1));
	assert_eq!(grouping.classes[0].hash, None);
}

#[tokio::test]
async fn test_not_downloaded_is_unavailable() {
	let harness = Harness::with(scenario_store(), |_| {});
	harness.controller.refresh(&["/"]).await;

	let err = harness.controller.compare(&["F1"]).await.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::LocalContentUnavailable);

	let err = harness.controller.compare(&["F1", "missing"]).await.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::LocalContentUnavailable, "first failure wins");
}

#[tokio::test]
async fn test_mirror_copy_is_hashed_and_recorded() {
	let harness = Harness::with(scenario_store(), |_| {});
	harness.controller.refresh(&["/"]).await;

	// A mirror copy placed by an earlier process: flagged, but never hashed
	let path = harness.mirror_file("root/file_1.txt");
	std::fs::create_dir_all(path.parent().unwrap()).unwrap();
	std::fs::write(&path, b"file 1").unwrap();
	harness.controller.cache().set_mirrored("F1", true).unwrap();
	assert_eq!(harness.controller.entry("F1").unwrap().node.content_hash(), None);

	let grouping = harness.controller.compare(&["F1"]).await.unwrap();
	assert_eq!(grouping.classes[0].hash, Some(hash_bytes(b"file 1")));
	assert_eq!(
		harness.controller.entry("F1").unwrap().node.content_hash(),
		Some(hash_bytes(b"file 1").as_str())
	);
}

#[tokio::test]
async fn test_vanished_mirror_copy() {
	let harness = Harness::with(scenario_store(), |_| {});
	harness.controller.refresh(&["/"]).await;
	harness.controller.cache().set_mirrored("F2", true).unwrap();

	let err = harness.controller.compare(&["F2"]).await.unwrap_err();
	assert_eq!(err, DriveError::LocalContentUnavailable { id: "F2".to_string() });
	assert!(!harness.controller.entry("F2").unwrap().mirrored);
}

#[tokio::test]
async fn test_remote_change_invalidates_digest() {
	let harness = Harness::with(scenario_store(), |_| {});
	harness.controller.refresh(&["/"]).await;
	harness.controller.download("F1").await.unwrap();
	assert!(harness.controller.compare(&["F1"]).await.is_ok());

	harness.store.update_file("F1", b"file 1 edited", MemoryStore::mtime(120));
	harness.controller.refresh(&["/"]).await;
	let err = harness.controller.compare(&["F1"]).await.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::LocalContentUnavailable);
}

// vim: ts=4
