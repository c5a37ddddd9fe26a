//! Write the persisted subset of the state to a blob store.
//!
//! Only the slices named in [`PERSISTED_SLICES`] are written. Derived
//! structures such as `nodes_by_type` and any slice outside the list stay in
//! memory. When to checkpoint is the caller's decision.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::blob::BlobStore;
use crate::error::{StateError, StateResult};
use crate::state::{State, NODES_SLICE};
use crate::store::Store;

/// Slices written to the snapshot. Everything else stays in memory.
pub const PERSISTED_SLICES: &[&str] = &[
    NODES_SLICE,
    "status",
    "component_data_dependencies",
    "components",
    "jobs_v2",
    "static_query_components",
    "webpack_compilation_hash",
    "page_data_stats",
    "page_data",
    "pending_page_data_writes",
];

/// What a checkpoint wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSummary {
    pub nodes: usize,
    pub slices: Vec<String>,
    pub bytes: usize,
}

/// The persisted subset of `state` as a JSON object.
///
/// `nodes` is written as an array in collection order; allowlisted slices
/// the state does not hold are left out.
pub fn select(state: &State) -> StateResult<Map<String, Value>> {
    let mut snapshot = Map::new();
    for &name in PERSISTED_SLICES {
        if name == NODES_SLICE {
            let nodes = state
                .nodes()
                .iter()
                .map(|node| serde_json::to_value(node.as_ref()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StateError::Serialize(e.to_string()))?;
            snapshot.insert(name.to_string(), Value::Array(nodes));
        } else if let Some(value) = state.slice(name) {
            snapshot.insert(name.to_string(), Value::clone(value));
        }
    }
    Ok(snapshot)
}

/// Serialize the persisted subset of `state` and write it to `blobs`.
pub fn save(state: &State, blobs: &dyn BlobStore) -> StateResult<CheckpointSummary> {
    let snapshot = select(state)?;
    let bytes = serde_json::to_vec(&snapshot).map_err(|e| StateError::Serialize(e.to_string()))?;
    blobs.write(&bytes)?;

    let summary = CheckpointSummary {
        nodes: state.nodes().len(),
        slices: PERSISTED_SLICES
            .iter()
            .filter(|name| snapshot.contains_key(**name))
            .map(|name| name.to_string())
            .collect(),
        bytes: bytes.len(),
    };
    info!(nodes = summary.nodes, bytes = summary.bytes, "state checkpointed");
    Ok(summary)
}

/// Checkpoint the store's current state.
pub fn save_store(store: &Store, blobs: &dyn BlobStore) -> StateResult<CheckpointSummary> {
    save(&store.get_state(), blobs)
}

/// Checkpoint on the blocking pool, leaving the caller's thread free.
///
/// `state` is a committed version, so dispatches that land while the write
/// runs are not part of this checkpoint.
pub fn spawn_save(
    state: Arc<State>,
    blobs: Arc<dyn BlobStore>,
) -> JoinHandle<StateResult<CheckpointSummary>> {
    debug!("background checkpoint scheduled");
    tokio::task::spawn_blocking(move || save(&state, blobs.as_ref()))
}

/// Await a [`spawn_save`] handle, folding a panicked task into a `StateError`.
pub async fn join_save(
    handle: JoinHandle<StateResult<CheckpointSummary>>,
) -> StateResult<CheckpointSummary> {
    handle
        .await
        .map_err(|e| StateError::Background(e.to_string()))?
}
