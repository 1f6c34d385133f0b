use positioning::{Instance, backend::database::InMemory};

use crate::helpers::*;

#[tokio::test]
async fn test_save_and_load_keep_arrangement() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    let (backend, instance) = in_memory_instance();
    let mut items = create_items(&instance, 1, 3).await;
    items[2].set("position", 1);
    instance.update(&mut items[2]).await.unwrap();
    let before = arrangement(&instance, 1).await;
    backend.save_to_file(&path).await.unwrap();

    let loaded = InMemory::load_from_file(&path).await.unwrap();
    assert_eq!(loaded.table_names().await, ["items"]);
    let instance = Instance::new(loaded, test_registry());
    assert_eq!(arrangement(&instance, 1).await, before);

    // Fresh ids continue after the loaded ones.
    let more = create_items(&instance, 1, 1).await;
    assert!(more[0].id().unwrap() > before.iter().map(|(id, _)| *id).max().unwrap());
    assert_dense(&instance, 1).await;
}

#[tokio::test]
async fn test_load_missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = InMemory::load_from_file(dir.path().join("absent.json"))
        .await
        .unwrap();
    assert!(loaded.table_names().await.is_empty());
}

#[tokio::test]
async fn test_load_corrupt_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.json");
    std::fs::write(&path, "not json").unwrap();

    let err = InMemory::load_from_file(&path).await.unwrap_err();
    assert_eq!(err.module(), "backend");
    assert!(err.is_database_error());
}
