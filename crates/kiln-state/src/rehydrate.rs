//! Turn the persisted snapshot back into an initial state.
//!
//! The snapshot is a JSON object of top-level slices. Loading it:
//!
//! 1. drops fields that older versions persisted but this one no longer
//!    uses, plus any derived index that slipped into the snapshot;
//! 2. rebuilds `nodes_by_type` from the ordered `nodes` array;
//! 3. hands the remaining slices to the store as-is.
//!
//! A missing snapshot is a normal cold start. An unreadable one is handled by
//! [`CorruptCachePolicy`]: by default the process starts from an empty state
//! and loses its incremental history; `fail` refuses to start instead.

use kiln_core::{CacheConfig, CorruptCachePolicy, Node};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::blob::BlobStore;
use crate::error::{StateError, StateResult};
use crate::nodes::NodeIndex;
use crate::state::{PersistedState, NODES_SLICE};

/// Top-level fields removed from snapshots written by older versions.
pub const OBSOLETE_FIELDS: &[&str] = &["json_data_paths"];

/// Derived structures that must never be trusted from a snapshot.
const DERIVED_FIELDS: &[&str] = &["nodes_by_type"];

/// How the initial state was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    /// A snapshot was loaded.
    Restored { nodes: usize },
    /// Nothing was persisted yet.
    Missing,
    /// A snapshot existed but could not be used; the state is empty.
    Corrupt { reason: String },
}

#[derive(Debug)]
pub struct Rehydrated {
    pub state: PersistedState,
    pub status: CacheStatus,
}

impl Rehydrated {
    fn empty(status: CacheStatus) -> Self {
        Self {
            state: PersistedState::empty(),
            status,
        }
    }
}

pub struct Rehydrator<'a> {
    blobs: &'a dyn BlobStore,
    policy: CorruptCachePolicy,
    obsolete: Vec<String>,
}

impl<'a> Rehydrator<'a> {
    pub fn new(blobs: &'a dyn BlobStore) -> Self {
        Self {
            blobs,
            policy: CorruptCachePolicy::default(),
            obsolete: Vec::new(),
        }
    }

    /// A rehydrator using the policy and extra obsolete fields from config.
    pub fn from_config(blobs: &'a dyn BlobStore, config: &CacheConfig) -> Self {
        Self::new(blobs)
            .policy(config.on_corrupt)
            .obsolete_fields(config.obsolete_fields.iter().cloned())
    }

    pub fn policy(mut self, policy: CorruptCachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Extra top-level fields to drop, on top of [`OBSOLETE_FIELDS`].
    pub fn obsolete_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.obsolete.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Load the initial state.
    ///
    /// Only fails under [`CorruptCachePolicy::Fail`] with an unreadable
    /// snapshot.
    pub fn load(&self) -> StateResult<Rehydrated> {
        match self.try_load() {
            Ok(Some(state)) => {
                let nodes = state.nodes.as_ref().map_or(0, NodeIndex::len);
                info!(nodes, slices = state.slices.len(), "state rehydrated");
                Ok(Rehydrated {
                    state,
                    status: CacheStatus::Restored { nodes },
                })
            }
            Ok(None) => {
                info!("no persisted state, starting empty");
                Ok(Rehydrated::empty(CacheStatus::Missing))
            }
            Err(err) => match self.policy {
                CorruptCachePolicy::Degrade => {
                    warn!(error = %err, "persisted state unusable, starting empty");
                    Ok(Rehydrated::empty(CacheStatus::Corrupt {
                        reason: err.to_string(),
                    }))
                }
                CorruptCachePolicy::Fail => Err(StateError::CorruptCache(err.to_string())),
            },
        }
    }

    fn try_load(&self) -> StateResult<Option<PersistedState>> {
        let Some(bytes) = self.blobs.read()? else {
            return Ok(None);
        };
        let mut raw: Map<String, Value> =
            serde_json::from_slice(&bytes).map_err(|e| StateError::Deserialize(e.to_string()))?;

        let obsolete = OBSOLETE_FIELDS
            .iter()
            .copied()
            .chain(self.obsolete.iter().map(String::as_str));
        for field in obsolete {
            if raw.remove(field).is_some() {
                debug!(field, "dropped obsolete field");
            }
        }
        for field in DERIVED_FIELDS {
            raw.remove(*field);
        }

        let nodes = match raw.remove(NODES_SLICE) {
            None | Some(Value::Null) => None,
            Some(value) => {
                let nodes: Vec<Node> = serde_json::from_value(value)
                    .map_err(|e| StateError::Deserialize(format!("nodes: {e}")))?;
                Some(NodeIndex::rebuild(nodes))
            }
        };

        Ok(Some(PersistedState {
            nodes,
            slices: raw.into_iter().collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use serde_json::json;

    struct BrokenStore;

    impl BlobStore for BrokenStore {
        fn read(&self) -> StateResult<Option<Vec<u8>>> {
            Err(StateError::Read("disk on fire".to_string()))
        }

        fn write(&self, _bytes: &[u8]) -> StateResult<()> {
            Err(StateError::Write("disk on fire".to_string()))
        }

        fn clear(&self) -> StateResult<bool> {
            Ok(false)
        }
    }

    fn store_with(value: Value) -> MemoryBlobStore {
        MemoryBlobStore::with_bytes(serde_json::to_vec(&value).unwrap())
    }

    fn node(id: &str, node_type: &str) -> Value {
        json!({ "id": id, "internal": { "type": node_type } })
    }

    #[test]
    fn missing_snapshot_is_a_cold_start() {
        let blobs = MemoryBlobStore::new();
        let loaded = Rehydrator::new(&blobs).load().unwrap();
        assert_eq!(loaded.status, CacheStatus::Missing);
        assert!(loaded.state.is_empty());
    }

    #[test]
    fn rebuilds_nodes_by_type() {
        let blobs = store_with(json!({
            "nodes": [node("a", "File"), node("b", "Page"), node("c", "File")],
            "status": { "plugins": {} },
        }));

        let loaded = Rehydrator::new(&blobs).load().unwrap();
        assert_eq!(loaded.status, CacheStatus::Restored { nodes: 3 });

        let nodes = loaded.state.nodes.unwrap();
        assert!(nodes.is_consistent());
        let files: Vec<&str> = nodes.by_type("File").unwrap().keys().map(String::as_str).collect();
        assert_eq!(files, vec!["a", "c"]);
        assert_eq!(nodes.by_type("Page").unwrap().len(), 1);
        let order: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(loaded.state.slices["status"], json!({ "plugins": {} }));
    }

    #[test]
    fn persisted_index_is_ignored() {
        let blobs = store_with(json!({
            "nodes": [node("a", "File")],
            "nodes_by_type": { "Ghost": { "x": node("x", "Ghost") } },
        }));

        let loaded = Rehydrator::new(&blobs).load().unwrap();
        let nodes = loaded.state.nodes.unwrap();
        assert!(nodes.by_type("Ghost").is_none());
        assert!(!loaded.state.slices.contains_key("nodes_by_type"));
    }

    #[test]
    fn strips_obsolete_fields() {
        let blobs = store_with(json!({
            "nodes": [],
            "json_data_paths": { "a": 1 },
            "legacy_redirects": [],
            "page_data": {},
        }));

        let loaded = Rehydrator::new(&blobs)
            .obsolete_fields(["legacy_redirects"])
            .load()
            .unwrap();

        assert!(!loaded.state.slices.contains_key("json_data_paths"));
        assert!(!loaded.state.slices.contains_key("legacy_redirects"));
        assert!(loaded.state.slices.contains_key("page_data"));
        assert!(loaded.state.nodes.unwrap().is_empty());
    }

    #[test]
    fn read_failure_degrades_to_empty() {
        let loaded = Rehydrator::new(&BrokenStore).load().unwrap();
        assert!(matches!(loaded.status, CacheStatus::Corrupt { ref reason } if reason.contains("disk on fire")));
        assert!(loaded.state.is_empty());
    }

    #[test]
    fn unparsable_bytes_degrade_to_empty() {
        let blobs = MemoryBlobStore::with_bytes(b"\x00\x01not json".to_vec());
        let loaded = Rehydrator::new(&blobs).load().unwrap();
        assert!(matches!(loaded.status, CacheStatus::Corrupt { .. }));
        assert!(loaded.state.is_empty());
    }

    #[test]
    fn malformed_nodes_degrade_to_empty() {
        let blobs = store_with(json!({
            "nodes": [{ "id": "a" }],
            "status": {},
        }));
        let loaded = Rehydrator::new(&blobs).load().unwrap();
        assert!(matches!(loaded.status, CacheStatus::Corrupt { ref reason } if reason.contains("nodes")));
        assert!(loaded.state.is_empty());
    }

    #[test]
    fn non_object_snapshot_is_corrupt() {
        let blobs = store_with(json!([1, 2, 3]));
        let loaded = Rehydrator::new(&blobs).load().unwrap();
        assert!(matches!(loaded.status, CacheStatus::Corrupt { .. }));
    }

    #[test]
    fn fail_policy_surfaces_corruption() {
        let blobs = MemoryBlobStore::with_bytes(b"garbage".to_vec());
        let err = Rehydrator::new(&blobs)
            .policy(CorruptCachePolicy::Fail)
            .load()
            .unwrap_err();
        assert!(matches!(err, StateError::CorruptCache(_)));
    }

    #[test]
    fn fail_policy_still_allows_cold_start() {
        let blobs = MemoryBlobStore::new();
        let loaded = Rehydrator::new(&blobs)
            .policy(CorruptCachePolicy::Fail)
            .load()
            .unwrap();
        assert_eq!(loaded.status, CacheStatus::Missing);
    }

    #[test]
    fn duplicate_ids_keep_the_later_node() {
        let blobs = store_with(json!({
            "nodes": [node("a", "File"), node("b", "File"), node("a", "Page")],
        }));
        let loaded = Rehydrator::new(&blobs).load().unwrap();
        assert_eq!(loaded.status, CacheStatus::Restored { nodes: 2 });

        let nodes = loaded.state.nodes.unwrap();
        assert_eq!(nodes.get("a").unwrap().node_type(), "Page");
        assert!(nodes.is_consistent());
    }

    #[test]
    fn null_nodes_treated_as_absent() {
        let blobs = store_with(json!({ "nodes": null, "status": {} }));
        let loaded = Rehydrator::new(&blobs).load().unwrap();
        assert_eq!(loaded.status, CacheStatus::Restored { nodes: 0 });
        assert!(loaded.state.nodes.is_none());
    }

    #[test]
    fn from_config_applies_policy_and_fields() {
        let config = CacheConfig {
            on_corrupt: CorruptCachePolicy::Fail,
            obsolete_fields: vec!["old".to_string()],
            ..CacheConfig::default()
        };
        let blobs = store_with(json!({ "old": 1, "status": {} }));
        let loaded = Rehydrator::from_config(&blobs, &config).load().unwrap();
        assert!(!loaded.state.slices.contains_key("old"));

        let broken = Rehydrator::from_config(&BrokenStore, &config).load();
        assert!(broken.is_err());
    }
}
