//! SQLite Persistence Tests
//!
//! Tests file-based SQLite storage for:
//! 1. Trees surviving a close/reopen cycle
//! 2. Group allocation across reopen
//! 3. Two handles sharing one database file
//! 4. Opening through a YAML configuration

#![cfg(feature = "sqlite")]

use nestedset_index::{
    Backend, IndexConfig, NestedSetIndex, NewNode, RecordStore, SqliteRecordStore,
};
use pretty_assertions::assert_eq;
use std::io::Write;
use tempfile::TempDir;

// Test 1: File-based Persistence
#[tokio::test]
async fn test_tree_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("tree.db");

    let (root, snapshot) = {
        let index = NestedSetIndex::new(SqliteRecordStore::new(&db_path).unwrap());
        let root = index.insert_root(NewNode::new("company")).await.unwrap();
        let depts = index
            .insert_children(&root, vec![NewNode::new("eng"), NewNode::new("ops")])
            .await
            .unwrap();
        for i in 0..20 {
            index
                .insert_child(Some(&depts[0]), NewNode::new(format!("team-{}", i)))
                .await
                .unwrap();
        }
        let snapshot = index.group_nodes(root.tree_group).await.unwrap();
        (root, snapshot)
    };

    assert!(db_path.exists());

    let index = NestedSetIndex::new(SqliteRecordStore::new(&db_path).unwrap());
    let reloaded = index.group_nodes(root.tree_group).await.unwrap();
    assert_eq!(reloaded, snapshot);
    assert_eq!(reloaded.len(), 23);

    let report = index.verify_group(root.tree_group).await.unwrap();
    assert!(report.is_valid(), "{:?}", report.violations);

    let root = index.refresh(&root).await.unwrap();
    assert_eq!((root.left, root.right), (0, 45));
}

// Test 2: Group ids are never reused
#[tokio::test]
async fn test_group_allocation_continues_after_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("groups.db");

    let first = {
        let store = SqliteRecordStore::new(&db_path).unwrap();
        store.allocate_group().await.unwrap();
        store.allocate_group().await.unwrap()
    };

    let store = SqliteRecordStore::new(&db_path).unwrap();
    assert!(store.allocate_group().await.unwrap() > first);
}

// Test 3: Mutations continue from persisted bounds
#[tokio::test]
async fn test_mutation_after_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("mutate.db");

    let (root, leaf) = {
        let index = NestedSetIndex::new(SqliteRecordStore::new(&db_path).unwrap());
        let root = index.insert_root(NewNode::new("R")).await.unwrap();
        let leaf = index.insert_child(Some(&root), NewNode::new("L")).await.unwrap();
        (root, leaf)
    };

    let index = NestedSetIndex::new(SqliteRecordStore::new(&db_path).unwrap());
    index.delete_leaf(&leaf).await.unwrap();

    let root = index.refresh(&root).await.unwrap();
    assert_eq!((root.left, root.right), (0, 1));
    assert!(index.direct_children(&root).await.unwrap().is_empty());
}

// Test 4: Two handles on one file
#[tokio::test]
async fn test_two_handles_share_state() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("shared.db");

    let writer = NestedSetIndex::new(SqliteRecordStore::new(&db_path).unwrap());
    let reader = NestedSetIndex::new(SqliteRecordStore::new(&db_path).unwrap());

    let root = writer.insert_root(NewNode::new("R")).await.unwrap();
    writer
        .insert_children(&root, vec![NewNode::new("a"), NewNode::new("b")])
        .await
        .unwrap();

    let seen = reader.direct_children(&root).await.unwrap();
    let names: Vec<_> = seen.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);

    // The reader's stale copy of the root is refreshed before use
    let c = reader.insert_child(Some(&root), NewNode::new("c")).await.unwrap();
    assert_eq!((c.left, c.right), (1, 2));
    assert!(writer.verify_group(root.tree_group).await.unwrap().is_valid());
}

// Test 5: YAML-configured index
#[tokio::test]
async fn test_open_from_yaml() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("configured.db");
    let yaml_path = temp_dir.path().join("index.yaml");

    let mut file = std::fs::File::create(&yaml_path).unwrap();
    write!(
        file,
        "version: 1\npage_size: 8\nverify_after_mutation: true\nstorage:\n  backend: sqlite\n  path: {}\n",
        db_path.display()
    )
    .unwrap();

    let config = IndexConfig::from_yaml(&yaml_path).unwrap();
    assert_eq!(config.storage.backend, Backend::Sqlite);

    let index = NestedSetIndex::open(config).unwrap();
    let root = index.insert_root(NewNode::new("R")).await.unwrap();
    index.insert_child(Some(&root), NewNode::new("x")).await.unwrap();

    assert!(db_path.exists());
    assert_eq!(index.config().page_size, 8);
}
