//! The aggregate state held by a [`Store`](crate::Store).

use std::collections::BTreeMap;
use std::sync::Arc;

use kiln_core::{Action, Node};
use serde_json::Value;

use crate::nodes::NodeIndex;

/// Name of the node collection slice.
pub const NODES_SLICE: &str = "nodes";

/// One committed version of the build state.
///
/// Each slice sits behind its own `Arc`; a commit that leaves a slice alone
/// shares it with the previous version.
#[derive(Debug, Clone, Default)]
pub struct State {
    pub(crate) nodes: Arc<NodeIndex>,
    pub(crate) slices: BTreeMap<String, Arc<Value>>,
    pub(crate) last_action: Option<Arc<Action>>,
}

impl State {
    /// The node collection together with its `nodes_by_type` index.
    pub fn nodes(&self) -> &Arc<NodeIndex> {
        &self.nodes
    }

    /// A reducer-owned slice by name.
    pub fn slice(&self, name: &str) -> Option<&Arc<Value>> {
        self.slices.get(name)
    }

    pub fn slices(&self) -> impl Iterator<Item = (&str, &Arc<Value>)> + '_ {
        self.slices.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// The action of the most recent commit.
    pub fn last_action(&self) -> Option<&Arc<Action>> {
        self.last_action.as_ref()
    }
}

/// State read back from a snapshot, before a store takes ownership of it.
#[derive(Debug, Default)]
pub struct PersistedState {
    /// Present only if the snapshot carried a `nodes` collection.
    pub nodes: Option<NodeIndex>,
    pub slices: BTreeMap<String, Value>,
}

impl PersistedState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_none() && self.slices.is_empty()
    }

    pub fn with_nodes<I>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = Node>,
    {
        self.nodes = Some(NodeIndex::rebuild(nodes));
        self
    }

    pub fn with_slice(mut self, name: impl Into<String>, value: Value) -> Self {
        self.slices.insert(name.into(), value);
        self
    }
}
