//! kiln-state: the build-state container for Kiln.
//!
//! Holds every build-derived record (content nodes, page data, compilation
//! status) in one in-memory [`State`], changed only by dispatching actions
//! through a [`Store`]. The persisted subset is checkpointed into a redb
//! file between runs and rehydrated on startup.
//!
//! # Architecture
//!
//! ```text
//! Rehydrator::load ──► PersistedState ──► Store
//!                                          │
//!   dispatch ─► Thunk ─► MultiDispatch ─► root reducer ─► commit
//!                                                          │
//!                                    listeners ◄───────────┤
//!                                    EventBus  ◄───────────┘
//!                                          │
//!                  checkpoint::save ──► BlobStore (redb)
//! ```
//!
//! The `nodes_by_type` index is never persisted; it is kept in lockstep by
//! the node reducer and rebuilt from `nodes` during rehydration.

pub mod blob;
pub mod bus;
pub mod checkpoint;
pub mod error;
pub mod middleware;
pub mod nodes;
pub mod reducer;
pub mod rehydrate;
pub mod state;
pub mod store;
pub mod tables;

pub use blob::{BlobStore, MemoryBlobStore, RedbBlobStore};
pub use bus::{EventBus, HandlerId};
pub use error::{StateError, StateResult};
pub use middleware::{Dispatch, Dispatched, Middleware, MultiDispatch, Next, ThunkMiddleware};
pub use nodes::{NodeIndex, NodeReducer};
pub use reducer::{Reducer, ReducerRegistry};
pub use rehydrate::{CacheStatus, Rehydrated, Rehydrator};
pub use state::{PersistedState, State};
pub use store::{Store, StoreBuilder, Subscription};
