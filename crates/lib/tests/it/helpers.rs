use std::sync::Arc;

use positioning::{
    Instance, Record, Registry, Value,
    backend::{Backend, TableRef, database::InMemory},
    config::{EntityType, PositionedOptions},
    record::{Row, RowId},
};

// ==========================
// CORE TEST FACTORIES
// ==========================
// Single point of change for backend matrix testing via the TEST_BACKEND env var.

/// Application tables used by the tests, for the SQL stores.
///
/// `items` carries a unique index on its scope and position so the SQL stores
/// prove that renumbering never passes through a duplicate. `cards` has no
/// such index, so broken arrangements can be written for healing tests.
const SQLITE_TABLES: [&str; 3] = [
    "CREATE TABLE items (
        id INTEGER PRIMARY KEY,
        list_id BIGINT,
        kind TEXT,
        position BIGINT,
        name TEXT,
        type TEXT
    )",
    "CREATE UNIQUE INDEX items_list_position ON items (list_id, position)",
    "CREATE TABLE cards (id INTEGER PRIMARY KEY, board_id BIGINT, position BIGINT)",
];

const POSTGRES_TABLES: [&str; 3] = [
    "CREATE TABLE items (
        id BIGSERIAL PRIMARY KEY,
        list_id BIGINT,
        kind TEXT,
        position BIGINT,
        name TEXT,
        type TEXT
    )",
    "CREATE UNIQUE INDEX items_list_position ON items (list_id, position)",
    "CREATE TABLE cards (id BIGSERIAL PRIMARY KEY, board_id BIGINT, position BIGINT)",
];

/// Creates a test backend based on TEST_BACKEND env var.
///
/// Supported values:
/// - "inmemory" or unset: InMemory backend (default)
/// - "sqlite": SQLite in-memory backend (requires `sqlite` feature)
/// - "postgres": PostgreSQL backend (requires `postgres` feature and TEST_POSTGRES_URL)
///
/// # Example
/// ```bash
/// TEST_BACKEND=sqlite cargo test --features sqlite
/// TEST_BACKEND=postgres TEST_POSTGRES_URL="postgres://localhost/positioning_test" \
///   cargo test --features postgres
/// ```
pub async fn test_backend() -> Arc<dyn Backend> {
    match std::env::var("TEST_BACKEND").as_deref() {
        Ok("sqlite") => {
            #[cfg(feature = "sqlite")]
            {
                use positioning::backend::database::Sqlite;
                let backend = Sqlite::sqlite_in_memory()
                    .await
                    .expect("Failed to create SQLite backend");
                for sql in SQLITE_TABLES {
                    backend.execute(sql).await.expect("Failed to create table");
                }
                Arc::new(backend)
            }
            #[cfg(not(feature = "sqlite"))]
            {
                let _ = SQLITE_TABLES;
                panic!("TEST_BACKEND=sqlite requires the 'sqlite' feature to be enabled")
            }
        }
        Ok("postgres") => {
            #[cfg(feature = "postgres")]
            {
                use positioning::backend::database::Postgres;
                let url = std::env::var("TEST_POSTGRES_URL")
                    .unwrap_or_else(|_| "postgres://localhost/positioning_test".to_string());
                let backend = Postgres::connect_postgres_isolated(&url)
                    .await
                    .expect("Failed to connect to PostgreSQL");
                for sql in POSTGRES_TABLES {
                    backend.execute(sql).await.expect("Failed to create table");
                }
                Arc::new(backend)
            }
            #[cfg(not(feature = "postgres"))]
            {
                let _ = POSTGRES_TABLES;
                panic!("TEST_BACKEND=postgres requires the 'postgres' feature to be enabled")
            }
        }
        Ok("inmemory") | Ok("") | Err(_) => Arc::new(InMemory::new()),
        Ok(other) => {
            panic!("Unknown TEST_BACKEND value: {other}. Supported: inmemory, sqlite, postgres")
        }
    }
}

/// Declarations shared by most tests:
/// - `Item` in `items`, positioned in `position` per `list`
/// - `SpecialItem`, a subtype of `Item` told apart by `type`
/// - `Card` in `cards`, positioned per `board`
pub fn test_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .define(EntityType::new("Item").table("items").belongs_to("list"))
        .expect("Failed to define Item");
    registry
        .define(EntityType::new("SpecialItem").inherits("Item", "type"))
        .expect("Failed to define SpecialItem");
    registry
        .define(EntityType::new("Card").table("cards").belongs_to("board"))
        .expect("Failed to define Card");
    registry
        .positioned("Item", PositionedOptions::on("list"))
        .expect("Failed to position Item");
    registry
        .positioned("Card", PositionedOptions::on("board"))
        .expect("Failed to position Card");
    registry
}

/// An instance over the TEST_BACKEND store with [`test_registry`].
pub async fn test_instance() -> Instance {
    Instance::from_parts(test_backend().await, Arc::new(test_registry()))
}

/// An instance over a fresh in-memory store, for tests that need
/// several transactions open at once.
pub fn in_memory_instance() -> (InMemory, Instance) {
    let backend = InMemory::new();
    let instance = Instance::new(backend.clone(), test_registry());
    (backend, instance)
}

// ==========================
// DATA HELPERS
// ==========================

/// Appends `count` items to `list`, returning them in creation order.
pub async fn create_items(instance: &Instance, list: i64, count: usize) -> Vec<Record> {
    let mut records = Vec::with_capacity(count);
    for n in 0..count {
        let mut record = Record::new("Item")
            .with("list_id", list)
            .with("name", format!("item {n}"));
        instance
            .create(&mut record)
            .await
            .expect("Failed to create item");
        records.push(record);
    }
    records
}

/// Ids of the items in `list`, in position order.
pub async fn order_of(instance: &Instance, list: i64) -> Vec<RowId> {
    arrangement(instance, list)
        .await
        .into_iter()
        .map(|(id, _)| id)
        .collect()
}

/// `(id, position)` of every item in `list`, in position order.
pub async fn arrangement(instance: &Instance, list: i64) -> Vec<(RowId, i64)> {
    let probe = Record::new("Item").with("list_id", list);
    instance
        .siblings(&probe, "position")
        .await
        .expect("Failed to read siblings")
        .into_iter()
        .map(|record| {
            (
                record.id().expect("sibling without id"),
                record.position("position").expect("sibling without position"),
            )
        })
        .collect()
}

/// Current stored position of a record.
pub async fn position_of(instance: &Instance, record: &Record) -> Option<i64> {
    instance
        .find(record.entity(), record.id().expect("record without id"))
        .await
        .expect("Failed to find record")
        .and_then(|stored| stored.position("position"))
}

/// Reloads a record from the store.
pub async fn reload(instance: &Instance, record: &Record) -> Record {
    instance
        .find(record.entity(), record.id().expect("record without id"))
        .await
        .expect("Failed to find record")
        .expect("record vanished")
}

/// Asserts the positions of `list` are exactly `1..=N`.
pub async fn assert_dense(instance: &Instance, list: i64) {
    let positions: Vec<i64> = arrangement(instance, list)
        .await
        .into_iter()
        .map(|(_, position)| position)
        .collect();
    let expected: Vec<i64> = (1..=positions.len() as i64).collect();
    assert_eq!(positions, expected, "list {list} is not dense");
}

/// Writes a card row directly, bypassing positioning.
pub async fn insert_raw_card(instance: &Instance, board: i64, position: Option<i64>) -> RowId {
    let mut tx = instance.begin().await.expect("Failed to begin");
    let row = Row::from([
        ("board_id".to_string(), Value::Integer(board)),
        ("position".to_string(), Value::from(position)),
    ]);
    let id = tx
        .backend_transaction()
        .insert(TableRef::new("cards", "id"), &row)
        .await
        .expect("Failed to insert card");
    tx.commit().await.expect("Failed to commit");
    id
}
