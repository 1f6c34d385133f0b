//! JSON snapshots of the committed tables of an [`InMemory`] store.
//!
//! Open transactions and held locks are not part of a snapshot.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use super::{InMemory, Table};
use crate::{Error, Result, backend::errors::BackendError};

/// Snapshot format version. Unversioned files are read as version 0.
const SNAPSHOT_FORMAT: u8 = 0;

fn is_unversioned(format: &u8) -> bool {
    *format == 0
}

fn known_format<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    match u8::deserialize(deserializer)? {
        SNAPSHOT_FORMAT => Ok(SNAPSHOT_FORMAT),
        other => Err(serde::de::Error::custom(format!(
            "snapshot format {other} is not readable, expected {SNAPSHOT_FORMAT}"
        ))),
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    #[serde(
        rename = "_v",
        default,
        skip_serializing_if = "is_unversioned",
        deserialize_with = "known_format"
    )]
    format: u8,
    #[serde(default)]
    tables: HashMap<String, Table>,
}

pub(crate) async fn save_to_file<P: AsRef<Path>>(backend: &InMemory, path: P) -> Result<()> {
    let snapshot = Snapshot {
        format: SNAPSHOT_FORMAT,
        tables: backend.shared.tables.read().await.clone(),
    };

    let encoded = serde_json::to_string_pretty(&snapshot)
        .map_err(|e| -> Error { BackendError::SerializationFailed { source: e }.into() })?;
    tokio::fs::write(path.as_ref(), encoded)
        .await
        .map_err(|e| -> Error { BackendError::FileIo { source: e }.into() })?;
    tracing::debug!(path = %path.as_ref().display(), "Saved in-memory store");
    Ok(())
}

pub(crate) async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<InMemory> {
    let encoded = match tokio::fs::read_to_string(path).await {
        Ok(encoded) => encoded,
        // A store that was never saved starts out empty.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(InMemory::new()),
        Err(e) => return Err(BackendError::FileIo { source: e }.into()),
    };
    let snapshot: Snapshot = serde_json::from_str(&encoded)
        .map_err(|e| -> Error { BackendError::DeserializationFailed { source: e }.into() })?;
    Ok(InMemory::from_tables(snapshot.tables))
}
