//! File-backed SQLite, where writers really run on separate connections.

use std::sync::Arc;
use std::time::Duration;

use positioning::{
    Instance, Record,
    backend::database::{LockStrategy, Sqlite, sql::schema},
};

use crate::helpers::*;

const ITEMS: &str = "CREATE TABLE items (
    id INTEGER PRIMARY KEY,
    list_id BIGINT,
    kind TEXT,
    position BIGINT,
    name TEXT,
    type TEXT
)";
const ITEMS_INDEX: &str = "CREATE UNIQUE INDEX items_list_position ON items (list_id, position)";

async fn file_instance(dir: &tempfile::TempDir) -> (Arc<Sqlite>, Instance) {
    let backend = Sqlite::open_sqlite(dir.path().join("positions.db"))
        .await
        .expect("Failed to open SQLite file");
    backend.execute(ITEMS).await.expect("Failed to create items");
    backend
        .execute(ITEMS_INDEX)
        .await
        .expect("Failed to create index");
    let backend = Arc::new(backend);
    let instance = Instance::from_parts(backend.clone(), Arc::new(test_registry()));
    (backend, instance)
}

#[tokio::test]
async fn test_schema_is_initialized_once() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, _instance) = file_instance(&dir).await;
    assert_eq!(
        schema::current_version(&backend).await.unwrap(),
        Some(schema::SCHEMA_VERSION)
    );
    backend.close().await;

    let reopened = Sqlite::open_sqlite(dir.path().join("positions.db"))
        .await
        .unwrap();
    assert_eq!(
        schema::current_version(&reopened).await.unwrap(),
        Some(schema::SCHEMA_VERSION)
    );
    assert!(reopened.is_sqlite());
}

#[tokio::test]
async fn test_advisory_strategy_is_postgres_only() {
    let backend = Sqlite::sqlite_in_memory().await.unwrap();
    assert_eq!(backend.lock_strategy(), LockStrategy::SerializationRow);
    let err = backend.with_lock_strategy(LockStrategy::Advisory).unwrap_err();
    assert!(err.is_database_error());
}

#[tokio::test]
async fn test_head_inserts_respect_unique_index() {
    let dir = tempfile::tempdir().unwrap();
    let (_backend, instance) = file_instance(&dir).await;

    let mut ids = Vec::new();
    for _ in 0..6 {
        let mut record = Record::new("Item").with("list_id", 1).with("position", 1);
        instance.create(&mut record).await.unwrap();
        ids.push(record.id().unwrap());
    }
    ids.reverse();
    assert_eq!(order_of(&instance, 1).await, ids);

    let mut last = instance.find("Item", ids[5]).await.unwrap().unwrap();
    last.set("position", 1);
    instance.update(&mut last).await.unwrap();
    assert_eq!(last.position("position"), Some(1));
    assert_dense(&instance, 1).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_second_writer_waits_for_commit() {
    let dir = tempfile::tempdir().unwrap();
    let (_backend, instance) = file_instance(&dir).await;

    let mut tx = instance.begin().await.unwrap();
    let mut first = Record::new("Item").with("list_id", 1);
    tx.create(&mut first).await.unwrap();

    let contender = instance.clone();
    let waiting = tokio::spawn(async move {
        let mut second = Record::new("Item").with("list_id", 1);
        contender.create(&mut second).await.unwrap();
        second
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!waiting.is_finished());

    tx.commit().await.unwrap();
    let second = waiting.await.unwrap();
    assert_eq!(second.position("position"), Some(2));
    assert_dense(&instance, 1).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_stay_dense() {
    let dir = tempfile::tempdir().unwrap();
    let (_backend, instance) = file_instance(&dir).await;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let instance = instance.clone();
            tokio::spawn(async move { create_items(&instance, 1, 5).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(order_of(&instance, 1).await.len(), 20);
    assert_dense(&instance, 1).await;
}

#[tokio::test]
async fn test_columns_of_other_types_are_left_alone() {
    let backend = Sqlite::sqlite_in_memory().await.unwrap();
    backend
        .execute(
            "CREATE TABLE items (
                id INTEGER PRIMARY KEY,
                list_id BIGINT,
                position BIGINT,
                name TEXT,
                type TEXT,
                weight REAL
            )",
        )
        .await
        .unwrap();
    backend
        .execute(
            "INSERT INTO items (id, list_id, position, name, weight) VALUES
                (1, 1, 1, 'a', 1.5),
                (2, 1, 2, 'b', 2.25)",
        )
        .await
        .unwrap();
    let backend = Arc::new(backend);
    let instance = Instance::from_parts(backend.clone(), Arc::new(test_registry()));

    let mut b = instance.find("Item", 2).await.unwrap().unwrap();
    assert!(b.get("weight").is_null());
    assert_eq!(b.get("name"), &positioning::Value::from("b"));

    b.set("position", 1);
    instance.update(&mut b).await.unwrap();
    assert_eq!(order_of(&instance, 1).await, [2, 1]);

    let affected = backend
        .execute("UPDATE items SET name = name WHERE weight = 2.25 AND position = 1")
        .await
        .unwrap();
    assert_eq!(affected, 1, "weight was overwritten");
}
