//! Per-slice reducers and their composition into the root reducer.

use std::collections::BTreeMap;
use std::sync::Arc;

use kiln_core::{kinds, Action};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::checkpoint::PERSISTED_SLICES;
use crate::error::{StateError, StateResult};
use crate::nodes::NodeReducer;
use crate::state::{PersistedState, State, NODES_SLICE};

/// Pure function computing the next value of one slice.
pub trait Reducer: Send + Sync {
    /// Value of the slice before any action was applied.
    fn initial(&self) -> Value;

    /// Compute the next slice value. Returning a clone of `slice` (the same
    /// `Arc`) marks the slice as unchanged.
    fn reduce(&self, slice: &Arc<Value>, action: &Action) -> anyhow::Result<Arc<Value>>;
}

/// Reducer built from a closure. The closure returns `None` to leave the
/// slice untouched.
pub struct FnReducer<F> {
    initial: Value,
    f: F,
}

impl<F> Reducer for FnReducer<F>
where
    F: Fn(&Value, &Action) -> anyhow::Result<Option<Value>> + Send + Sync,
{
    fn initial(&self) -> Value {
        self.initial.clone()
    }

    fn reduce(&self, slice: &Arc<Value>, action: &Action) -> anyhow::Result<Arc<Value>> {
        Ok(match (self.f)(slice, action)? {
            Some(next) => Arc::new(next),
            None => Arc::clone(slice),
        })
    }
}

pub fn reducer_fn<F>(initial: Value, f: F) -> FnReducer<F>
where
    F: Fn(&Value, &Action) -> anyhow::Result<Option<Value>> + Send + Sync,
{
    FnReducer { initial, f }
}

/// Keeps its slice as-is, resetting it on `DELETE_CACHE`.
pub fn retain(initial: Value) -> impl Reducer {
    let reset = initial.clone();
    reducer_fn(initial, move |slice, action| {
        Ok((action.kind == kinds::DELETE_CACHE && *slice != reset).then(|| reset.clone()))
    })
}

/// Replaces its slice with the action payload whenever `kind` is dispatched.
pub fn replace_on(kind: &'static str, initial: Value) -> impl Reducer {
    reducer_fn(initial, move |_, action| {
        Ok((action.kind == kind).then(|| action.payload.clone()))
    })
}

// ── Registry ──────────────────────────────────────────────────────

/// Slice name -> reducer. Frozen once handed to a store.
#[derive(Clone, Default)]
pub struct ReducerRegistry {
    reducers: BTreeMap<String, Arc<dyn Reducer>>,
}

impl ReducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reducer for `name`, replacing any earlier one.
    ///
    /// The `nodes` slice belongs to the built-in node reducer and cannot be
    /// registered.
    pub fn register(&mut self, name: impl Into<String>, reducer: impl Reducer + 'static) -> &mut Self {
        let name = name.into();
        if name == NODES_SLICE {
            warn!("ignoring reducer registered for the built-in `nodes` slice");
            return self;
        }
        self.reducers.insert(name, Arc::new(reducer));
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, name: impl Into<String>, reducer: impl Reducer + 'static) -> Self {
        self.register(name, reducer);
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.reducers.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.reducers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.reducers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reducers.is_empty()
    }

    /// A registry holding every persisted slice, for tools that only need
    /// to load and re-save the cache.
    pub fn persisted_defaults() -> Self {
        let mut registry = Self::new();
        for &name in PERSISTED_SLICES {
            match name {
                NODES_SLICE => {}
                "status" => {
                    registry.register(name, replace_on(kinds::SET_PROGRAM_STATUS, json!({})));
                }
                "webpack_compilation_hash" => {
                    registry.register(
                        name,
                        replace_on(kinds::SET_WEBPACK_COMPILATION_HASH, json!("")),
                    );
                }
                _ => {
                    registry.register(name, retain(json!({})));
                }
            }
        }
        registry
    }
}

// ── Root reducer ──────────────────────────────────────────────────

/// Structural composition of the node reducer and the registry.
pub(crate) struct RootReducer {
    nodes: NodeReducer,
    registry: ReducerRegistry,
}

impl RootReducer {
    pub(crate) fn new(registry: ReducerRegistry) -> Self {
        Self {
            nodes: NodeReducer,
            registry,
        }
    }

    /// Seed a state from persisted slices, filling the rest from each
    /// reducer's initial value.
    pub(crate) fn initial_state(&self, mut persisted: PersistedState) -> State {
        let nodes = Arc::new(persisted.nodes.take().unwrap_or_default());
        let mut slices = BTreeMap::new();
        for (name, reducer) in &self.registry.reducers {
            let value = persisted
                .slices
                .remove(name)
                .unwrap_or_else(|| reducer.initial());
            slices.insert(name.clone(), Arc::new(value));
        }
        for name in persisted.slices.keys() {
            warn!(slice = %name, "dropping persisted slice with no reducer");
        }
        State {
            nodes,
            slices,
            last_action: None,
        }
    }

    /// Run every slice reducer. Any failure aborts the whole reduction.
    pub(crate) fn reduce(&self, state: &State, action: Arc<Action>) -> StateResult<State> {
        let nodes = self
            .nodes
            .reduce(&state.nodes, &action)
            .map_err(|source| StateError::Reducer {
                slice: NODES_SLICE.to_string(),
                source,
            })?;

        let mut slices = BTreeMap::new();
        for (name, reducer) in &self.registry.reducers {
            let current = match state.slices.get(name) {
                Some(current) => Arc::clone(current),
                None => Arc::new(reducer.initial()),
            };
            let next = reducer
                .reduce(&current, &action)
                .map_err(|source| StateError::Reducer {
                    slice: name.clone(),
                    source,
                })?;
            if !Arc::ptr_eq(&current, &next) {
                debug!(slice = %name, kind = %action.kind, "slice changed");
            }
            slices.insert(name.clone(), next);
        }

        Ok(State {
            nodes,
            slices,
            last_action: Some(action),
        })
    }
}
