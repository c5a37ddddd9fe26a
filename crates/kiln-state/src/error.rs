//! Error types for the Kiln state container.

use thiserror::Error;

/// Result type alias for state container operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while dispatching, loading or checkpointing state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("reducer for slice `{slice}` failed: {source}")]
    Reducer {
        slice: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no middleware handled a {0} dispatch")]
    UnhandledDispatch(&'static str),

    #[error("persisted state is corrupt: {0}")]
    CorruptCache(String),

    #[error("background checkpoint failed: {0}")]
    Background(String),
}
