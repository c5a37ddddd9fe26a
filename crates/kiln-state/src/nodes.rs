//! The node collection and its `nodes_by_type` index.
//!
//! `NodeIndex` owns both the insertion-ordered `id -> node` collection and the
//! derived `type -> (id -> node)` index. Every mutation goes through
//! [`NodeIndex::insert`] / [`NodeIndex::remove`], which update both sides, so
//! the index can only diverge from the collection through a bug in this file.
//!
//! All three maps are persistent (`im`): cloning an index is O(1) and a
//! mutation copies only the O(log n) path it touches, so every committed
//! version shares its untouched nodes with the previous one.

use std::sync::Arc;

use anyhow::Context;
use im::{HashMap, OrdMap};
use kiln_core::{kinds, Action, Node, NodeId};
use serde::Deserialize;
use tracing::{debug, warn};

/// Nodes of one type, keyed by id.
pub type TypeBucket = OrdMap<NodeId, Arc<Node>>;

#[derive(Debug, Clone, Default)]
pub struct NodeIndex {
    /// Insertion sequence -> id. Gives iteration order.
    order: OrdMap<u64, NodeId>,
    /// id -> (insertion sequence, node).
    nodes: HashMap<NodeId, (u64, Arc<Node>)>,
    by_type: OrdMap<String, TypeBucket>,
    next_seq: u64,
}

impl NodeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the collection and the type index from scratch.
    ///
    /// Nodes are taken in the given order; a repeated id replaces the earlier
    /// node but keeps its position.
    pub fn rebuild<I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = Node>,
    {
        let mut index = Self::new();
        for node in nodes {
            if let Some(previous) = index.insert(node) {
                warn!(id = %previous.id, "duplicate node id, keeping the later node");
            }
        }
        index
    }

    /// Insert or replace a node. Returns the node previously stored under the id.
    pub fn insert(&mut self, node: Node) -> Option<Arc<Node>> {
        let node = Arc::new(node);
        let id = node.id.clone();

        let previous = match self.nodes.get(&id) {
            Some((seq, old)) => {
                let seq = *seq;
                let old = Arc::clone(old);
                self.unbucket(&old);
                self.nodes.insert(id.clone(), (seq, Arc::clone(&node)));
                Some(old)
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.order.insert(seq, id.clone());
                self.nodes.insert(id.clone(), (seq, Arc::clone(&node)));
                None
            }
        };

        let node_type = node.internal.node_type.clone();
        if let Some(bucket) = self.by_type.get_mut(&node_type) {
            bucket.insert(id, node);
        } else {
            self.by_type.insert(node_type, OrdMap::unit(id, node));
        }
        previous
    }

    /// Remove a node by id, from both the collection and its type bucket.
    pub fn remove(&mut self, id: &str) -> Option<Arc<Node>> {
        let (seq, node) = self.nodes.remove(id)?;
        self.order.remove(&seq);
        self.unbucket(&node);
        Some(node)
    }

    fn unbucket(&mut self, node: &Node) {
        let node_type = node.node_type();
        let emptied = match self.by_type.get_mut(node_type) {
            Some(bucket) => {
                bucket.remove(&node.id);
                bucket.is_empty()
            }
            None => false,
        };
        if emptied {
            self.by_type.remove(node_type);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Node>> {
        self.nodes.get(id).map(|(_, node)| node)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Node>> + '_ {
        self.order.values().filter_map(|id| self.get(id))
    }

    /// All nodes of one type.
    pub fn by_type(&self, node_type: &str) -> Option<&TypeBucket> {
        self.by_type.get(node_type)
    }

    /// Known node types with their node counts, sorted by type name.
    pub fn types(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.by_type
            .iter()
            .map(|(node_type, bucket)| (node_type.as_str(), bucket.len()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check that `nodes_by_type` holds exactly the (type, id, node) triples
    /// of the collection.
    pub fn is_consistent(&self) -> bool {
        if self.order.len() != self.nodes.len() {
            return false;
        }
        let indexed: usize = self.by_type.values().map(TypeBucket::len).sum();
        if indexed != self.nodes.len() {
            return false;
        }
        let buckets_ok = self.by_type.iter().all(|(node_type, bucket)| {
            !bucket.is_empty()
                && bucket.iter().all(|(id, node)| {
                    node.node_type() == node_type
                        && self
                            .get(id)
                            .is_some_and(|stored| Arc::ptr_eq(stored, node))
                })
        });
        let order_ok = self
            .order
            .iter()
            .all(|(seq, id)| self.nodes.get(id).is_some_and(|(s, _)| s == seq));
        buckets_ok && order_ok
    }
}

// ── Reducer ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct NodeRef {
    id: NodeId,
}

/// Reducer for the `nodes` slice.
///
/// Returns the same `Arc` for actions that do not touch nodes, so the slice
/// stays reference-stable across unrelated commits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeReducer;

impl NodeReducer {
    pub fn reduce(&self, index: &Arc<NodeIndex>, action: &Action) -> anyhow::Result<Arc<NodeIndex>> {
        match action.kind.as_str() {
            kinds::CREATE_NODE | kinds::ADD_FIELD_TO_NODE => {
                let node: Node = action
                    .payload_as()
                    .with_context(|| format!("{} payload is not a node", action.kind))?;
                debug!(id = %node.id, node_type = %node.internal.node_type, "node stored");
                let mut next = NodeIndex::clone(index);
                next.insert(node);
                Ok(Arc::new(next))
            }
            kinds::DELETE_NODE => {
                let target: NodeRef = action
                    .payload_as()
                    .context("DELETE_NODE payload has no node id")?;
                if !index.contains(&target.id) {
                    return Ok(Arc::clone(index));
                }
                let mut next = NodeIndex::clone(index);
                next.remove(&target.id);
                Ok(Arc::new(next))
            }
            kinds::DELETE_NODES => {
                let ids: Vec<NodeId> = action
                    .payload_as()
                    .context("DELETE_NODES payload is not a list of node ids")?;
                if !ids.iter().any(|id| index.contains(id)) {
                    return Ok(Arc::clone(index));
                }
                let mut next = NodeIndex::clone(index);
                for id in &ids {
                    next.remove(id);
                }
                Ok(Arc::new(next))
            }
            kinds::DELETE_CACHE if !index.is_empty() => Ok(Arc::new(NodeIndex::new())),
            _ => Ok(Arc::clone(index)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids_of(index: &NodeIndex) -> Vec<&str> {
        index.iter().map(|n| n.id.as_str()).collect()
    }

    fn create(id: &str, node_type: &str) -> Action {
        Action::with_payload(
            kinds::CREATE_NODE,
            json!({ "id": id, "internal": { "type": node_type } }),
        )
    }

    #[test]
    fn insert_populates_type_bucket() {
        let mut index = NodeIndex::new();
        index.insert(Node::new("a", "File"));
        index.insert(Node::new("b", "Page"));
        index.insert(Node::new("c", "File"));

        assert_eq!(index.len(), 3);
        assert_eq!(index.by_type("File").unwrap().len(), 2);
        assert_eq!(index.by_type("Page").unwrap().len(), 1);
        assert!(index.is_consistent());
    }

    #[test]
    fn replace_keeps_position_and_moves_bucket() {
        let mut index = NodeIndex::new();
        index.insert(Node::new("a", "File"));
        index.insert(Node::new("b", "File"));

        let previous = index.insert(Node::new("a", "Image"));
        assert_eq!(previous.unwrap().node_type(), "File");

        assert_eq!(ids_of(&index), vec!["a", "b"]);
        assert!(index.by_type("Image").unwrap().contains_key("a"));
        assert!(!index.by_type("File").unwrap().contains_key("a"));
        assert!(index.is_consistent());
    }

    #[test]
    fn remove_drops_empty_bucket() {
        let mut index = NodeIndex::new();
        index.insert(Node::new("a", "File"));
        index.insert(Node::new("b", "Page"));

        assert!(index.remove("b").is_some());
        assert!(index.remove("b").is_none());
        assert!(index.by_type("Page").is_none());
        assert_eq!(index.types().collect::<Vec<_>>(), vec![("File", 1)]);
        assert!(index.is_consistent());
    }

    #[test]
    fn rebuild_preserves_order() {
        let index = NodeIndex::rebuild(vec![
            Node::new("z", "T"),
            Node::new("a", "U"),
            Node::new("m", "T"),
        ]);
        assert_eq!(ids_of(&index), vec!["z", "a", "m"]);
        assert!(index.is_consistent());
    }

    #[test]
    fn rebuild_keeps_later_duplicate_in_first_position() {
        let index = NodeIndex::rebuild(vec![
            Node::new("a", "File").with_field("rev", json!(1)),
            Node::new("b", "File"),
            Node::new("a", "Page").with_field("rev", json!(2)),
        ]);
        assert_eq!(ids_of(&index), vec!["a", "b"]);
        assert_eq!(index.get("a").unwrap().fields.get("rev"), Some(&json!(2)));
        assert!(index.by_type("Page").unwrap().contains_key("a"));
        assert!(index.is_consistent());
    }

    #[test]
    fn clones_share_untouched_nodes() {
        let base = NodeIndex::rebuild((0..1_000).map(|i| Node::new(format!("n{i}"), "File")));
        let mut next = base.clone();
        next.insert(Node::new("extra", "Page"));
        next.remove("n0");

        assert_eq!(base.len(), 1_000);
        assert!(base.contains("n0"));
        assert_eq!(next.len(), 1_000);
        assert!(Arc::ptr_eq(base.get("n500").unwrap(), next.get("n500").unwrap()));
        assert!(base.is_consistent());
        assert!(next.is_consistent());
    }

    #[test]
    fn reducer_scales_to_large_collections() {
        let reducer = NodeReducer;
        let types = ["File", "Page", "MarkdownRemark", "ImageSharp"];
        let started = std::time::Instant::now();

        let mut index = Arc::new(NodeIndex::new());
        for i in 0..50_000 {
            index = reducer
                .reduce(&index, &create(&format!("n{i}"), types[i % types.len()]))
                .unwrap();
        }

        assert_eq!(index.len(), 50_000);
        assert_eq!(index.by_type("File").unwrap().len(), 12_500);
        assert!(index.is_consistent());
        // Copying the collection per insert takes minutes at this size.
        assert!(started.elapsed() < std::time::Duration::from_secs(30));
    }

    #[test]
    fn reducer_create_and_delete() {
        let reducer = NodeReducer;
        let empty = Arc::new(NodeIndex::new());

        let one = reducer.reduce(&empty, &create("a", "File")).unwrap();
        let two = reducer.reduce(&one, &create("b", "File")).unwrap();
        assert_eq!(two.len(), 2);

        let delete = Action::with_payload(kinds::DELETE_NODE, json!({ "id": "a" }));
        let after = reducer.reduce(&two, &delete).unwrap();
        assert_eq!(ids_of(&after), vec!["b"]);
        assert!(after.is_consistent());
        // Earlier values are untouched.
        assert_eq!(two.len(), 2);
    }

    #[test]
    fn reducer_delete_nodes_batch() {
        let reducer = NodeReducer;
        let index = Arc::new(NodeIndex::rebuild(vec![
            Node::new("a", "File"),
            Node::new("b", "Page"),
            Node::new("c", "File"),
        ]));

        let action = Action::with_payload(kinds::DELETE_NODES, json!(["a", "b", "missing"]));
        let next = reducer.reduce(&index, &action).unwrap();
        assert_eq!(ids_of(&next), vec!["c"]);
        assert!(next.is_consistent());
    }

    #[test]
    fn reducer_is_reference_stable_for_unrelated_actions() {
        let reducer = NodeReducer;
        let index = Arc::new(NodeIndex::rebuild(vec![Node::new("a", "File")]));

        let same = reducer.reduce(&index, &Action::new("SET_PROGRAM_STATUS")).unwrap();
        assert!(Arc::ptr_eq(&index, &same));

        let missing = Action::with_payload(kinds::DELETE_NODE, json!({ "id": "nope" }));
        let same = reducer.reduce(&index, &missing).unwrap();
        assert!(Arc::ptr_eq(&index, &same));
    }

    #[test]
    fn reducer_delete_cache_clears() {
        let reducer = NodeReducer;
        let index = Arc::new(NodeIndex::rebuild(vec![Node::new("a", "File")]));
        let next = reducer.reduce(&index, &Action::new(kinds::DELETE_CACHE)).unwrap();
        assert!(next.is_empty());
        assert!(next.types().next().is_none());
    }

    #[test]
    fn reducer_rejects_malformed_node() {
        let reducer = NodeReducer;
        let index = Arc::new(NodeIndex::new());
        let bad = Action::with_payload(kinds::CREATE_NODE, json!({ "id": "a" }));
        let err = reducer.reduce(&index, &bad).unwrap_err();
        assert!(err.to_string().contains("CREATE_NODE"));
    }
}
