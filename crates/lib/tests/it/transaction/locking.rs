use std::time::Duration;

use positioning::{Instance, Record, Value, backend::database::InMemory};
use tokio::time::{sleep, timeout};

use crate::helpers::*;

const SETTLE: Duration = Duration::from_millis(50);

#[tokio::test]
async fn test_writer_waits_for_same_scope() {
    let (backend, instance) = in_memory_instance();
    let mut tx = instance.begin().await.unwrap();
    let mut first = Record::new("Item").with("list_id", 1);
    tx.create(&mut first).await.unwrap();
    let key = tx.held_locks().next().unwrap();

    let contender = instance.clone();
    let waiting = tokio::spawn(async move {
        let mut second = Record::new("Item").with("list_id", 1);
        contender.create(&mut second).await.unwrap();
        second
    });

    sleep(SETTLE).await;
    assert!(!waiting.is_finished());
    assert!(backend.is_locked(key));

    tx.commit().await.unwrap();
    let second = waiting.await.unwrap();
    assert_eq!(second.position("position"), Some(2));
    assert_eq!(
        order_of(&instance, 1).await,
        [first.id().unwrap(), second.id().unwrap()]
    );
}

#[tokio::test]
async fn test_other_scopes_do_not_wait() {
    let (_backend, instance) = in_memory_instance();
    let mut tx = instance.begin().await.unwrap();
    tx.create(&mut Record::new("Item").with("list_id", 1))
        .await
        .unwrap();

    let mut other = Record::new("Item").with("list_id", 2);
    timeout(Duration::from_secs(1), instance.create(&mut other))
        .await
        .expect("write to another scope blocked")
        .unwrap();
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn test_lock_timeout() {
    let instance = Instance::new(
        InMemory::with_lock_timeout(Duration::from_millis(50)),
        test_registry(),
    );
    let mut tx = instance.begin().await.unwrap();
    tx.create(&mut Record::new("Item").with("list_id", 1))
        .await
        .unwrap();

    let mut blocked = Record::new("Item").with("list_id", 1);
    let err = instance.create(&mut blocked).await.unwrap_err();
    assert!(err.is_timeout_error());
    assert_eq!(blocked.id(), None);
    tx.rollback().await.unwrap();

    instance.create(&mut blocked).await.unwrap();
    assert_eq!(blocked.position("position"), Some(1));
}

#[tokio::test]
async fn test_dropped_transaction_releases_and_discards() {
    let (backend, instance) = in_memory_instance();
    create_items(&instance, 1, 2).await;
    let before = arrangement(&instance, 1).await;

    let key = {
        let mut tx = instance.begin().await.unwrap();
        let mut head = Record::new("Item").with("list_id", 1).with("position", 1);
        tx.create(&mut head).await.unwrap();
        let key = tx.held_locks().next().unwrap();
        key
    };

    assert!(!backend.is_locked(key));
    assert_eq!(arrangement(&instance, 1).await, before);
}

#[tokio::test]
async fn test_uncommitted_writes_are_private() {
    let (_backend, instance) = in_memory_instance();
    let mut tx = instance.begin().await.unwrap();
    let mut record = Record::new("Item").with("list_id", 1);
    tx.create(&mut record).await.unwrap();

    let id = record.id().unwrap();
    assert!(instance.find("Item", id).await.unwrap().is_none());
    tx.commit().await.unwrap();
    assert!(instance.find("Item", id).await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_stay_dense() {
    let (_backend, instance) = in_memory_instance();
    let writers = 8;
    let per_writer = 6;

    let handles: Vec<_> = (0..writers)
        .map(|_| {
            let instance = instance.clone();
            tokio::spawn(async move { create_items(&instance, 1, per_writer).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(order_of(&instance, 1).await.len(), writers * per_writer);
    assert_dense(&instance, 1).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_moves_stay_dense() {
    let (_backend, instance) = in_memory_instance();
    let items = create_items(&instance, 1, 12).await;

    let handles: Vec<_> = items
        .into_iter()
        .enumerate()
        .map(|(n, record)| {
            let instance = instance.clone();
            tokio::spawn(async move {
                let mut record = reload(&instance, &record).await;
                record.set("position", (n as i64 * 7) % 12 + 1);
                instance.update(&mut record).await.unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }
    assert_dense(&instance, 1).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_cross_scope_moves_do_not_deadlock() {
    let (_backend, instance) = in_memory_instance();
    let first = create_items(&instance, 1, 10).await;
    let second = create_items(&instance, 2, 10).await;

    let mut handles = Vec::new();
    for (record, target) in first
        .into_iter()
        .map(|r| (r, 2))
        .chain(second.into_iter().map(|r| (r, 1)))
    {
        let instance = instance.clone();
        handles.push(tokio::spawn(async move {
            let mut record = reload(&instance, &record).await;
            record.set("list_id", target);
            record.set("position", 1);
            instance.update(&mut record).await.unwrap();
        }));
    }

    timeout(Duration::from_secs(10), async {
        for handle in handles {
            handle.await.unwrap();
        }
    })
    .await
    .expect("cross-scope moves deadlocked");

    assert_eq!(order_of(&instance, 1).await.len(), 10);
    assert_eq!(order_of(&instance, 2).await.len(), 10);
    assert_dense(&instance, 1).await;
    assert_dense(&instance, 2).await;
}

#[tokio::test]
async fn test_rename_committed_after_head_insert_keeps_new_positions() {
    let (_backend, instance) = in_memory_instance();
    let items = create_items(&instance, 1, 2).await;
    let (a, b) = (items[0].id().unwrap(), items[1].id().unwrap());

    let mut rename = instance.begin().await.unwrap();
    let mut renamed = reload(&instance, &items[1]).await;
    renamed.set("name", "renamed");
    rename.update(&mut renamed).await.unwrap();
    assert_eq!(rename.held_locks().count(), 0);

    let mut head = Record::new("Item").with("list_id", 1).with("position", 1);
    instance.create(&mut head).await.unwrap();
    rename.commit().await.unwrap();

    assert_eq!(order_of(&instance, 1).await, [head.id().unwrap(), a, b]);
    assert_dense(&instance, 1).await;
    let stored = reload(&instance, &items[1]).await;
    assert_eq!(stored.get("name"), &Value::from("renamed"));
}

#[tokio::test]
async fn test_head_insert_committed_after_rename_keeps_new_name() {
    let (_backend, instance) = in_memory_instance();
    let items = create_items(&instance, 1, 2).await;

    let mut insert = instance.begin().await.unwrap();
    let mut head = Record::new("Item").with("list_id", 1).with("position", 1);
    insert.create(&mut head).await.unwrap();

    let mut renamed = reload(&instance, &items[0]).await;
    renamed.set("name", "renamed");
    timeout(Duration::from_secs(1), instance.update(&mut renamed))
        .await
        .expect("rename waited for the scope lock")
        .unwrap();

    insert.commit().await.unwrap();

    assert_dense(&instance, 1).await;
    let stored = reload(&instance, &items[0]).await;
    assert_eq!(stored.position("position"), Some(2));
    assert_eq!(stored.get("name"), &Value::from("renamed"));
}
