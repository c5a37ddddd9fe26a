//! Records shared by every kiln crate: actions and content nodes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unique identifier of a content node.
pub type NodeId = String;

/// Well-known action kinds.
pub mod kinds {
    pub const CREATE_NODE: &str = "CREATE_NODE";
    pub const ADD_FIELD_TO_NODE: &str = "ADD_FIELD_TO_NODE";
    pub const DELETE_NODE: &str = "DELETE_NODE";
    pub const DELETE_NODES: &str = "DELETE_NODES";
    pub const DELETE_CACHE: &str = "DELETE_CACHE";
    pub const SET_PROGRAM_STATUS: &str = "SET_PROGRAM_STATUS";
    pub const SET_WEBPACK_COMPILATION_HASH: &str = "SET_WEBPACK_COMPILATION_HASH";
}

// ── Action ────────────────────────────────────────────────────────

/// A requested state change: a discriminating `kind` plus a free-form payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl Action {
    /// An action without payload.
    pub fn new(kind: impl Into<String>) -> Self {
        Action {
            kind: kind.into(),
            payload: Value::Null,
        }
    }

    pub fn with_payload(kind: impl Into<String>, payload: Value) -> Self {
        Action {
            kind: kind.into(),
            payload,
        }
    }

    /// Decode the payload into a typed value.
    pub fn payload_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.payload)
    }
}

// ── Node ──────────────────────────────────────────────────────────

/// A content record produced by a source plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub internal: NodeInternal,
    /// Everything else the plugin attached to the node.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Bookkeeping fields every node carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInternal {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_digest: Option<String>,
    /// Plugin that created the node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Remaining internal keys (`mediaType`, `fieldOwners`, ...), kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Node {
            id: id.into(),
            internal: NodeInternal {
                node_type: node_type.into(),
                content_digest: None,
                owner: None,
                extra: Map::new(),
            },
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn node_type(&self) -> &str {
        &self.internal.node_type
    }
}
