//! redb table definitions for the snapshot blob.
//!
//! The cache is a single table with `&str` keys and `&[u8]` values. Only one
//! key is ever written, so the file always holds the latest checkpoint.

use redb::TableDefinition;

/// Serialized snapshots keyed by slot name.
pub const SNAPSHOTS: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshots");

/// The fixed slot the state snapshot is stored under.
pub const STATE_KEY: &str = "state";
