//! The state container.
//!
//! Owns the current [`State`], the root reducer, the middleware chain and the
//! subscriber list. A `Store` is `Clone` (backed by `Arc`) and is built once
//! per process, then handed to whoever needs to read or dispatch.
//!
//! Commits are serialized behind a re-entrant lock held from reduce through
//! listener notification and the bus publish, so every observer sees commits
//! from concurrent dispatchers in commit order. The root reducer runs against
//! the current state and its result replaces that state in a single pointer
//! swap. A listener or bus handler may dispatch again on its own thread; that
//! nested commit completes before the outer one finishes notifying.

use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use parking_lot::ReentrantMutex;
use tracing::{debug, info};

use crate::bus::EventBus;
use crate::error::{StateError, StateResult};
use crate::middleware::{Dispatch, Dispatched, Middleware, MultiDispatch, Next, ThunkMiddleware};
use crate::reducer::{ReducerRegistry, RootReducer};
use crate::state::{PersistedState, State};

/// Callback run after every commit with the committed state.
pub type Listener = Arc<dyn Fn(&Arc<State>) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

struct Inner {
    root: RootReducer,
    chain: Vec<Arc<dyn Middleware>>,
    state: RwLock<Arc<State>>,
    commit_lock: ReentrantMutex<()>,
    listeners: Arc<Mutex<Listeners>>,
    bus: Option<EventBus>,
}

/// Handle to the build state container.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

/// Assembles a [`Store`] with an explicit middleware order.
pub struct StoreBuilder {
    registry: ReducerRegistry,
    chain: Vec<Arc<dyn Middleware>>,
    bus: Option<EventBus>,
}

impl StoreBuilder {
    /// A builder with an empty middleware chain.
    pub fn new(registry: ReducerRegistry) -> Self {
        Self {
            registry,
            chain: Vec::new(),
            bus: None,
        }
    }

    /// Append a stage to the chain. Stages run in the order added.
    pub fn middleware(mut self, stage: impl Middleware + 'static) -> Self {
        self.chain.push(Arc::new(stage));
        self
    }

    /// Publish every committed action on `bus`.
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn build(self, initial: PersistedState) -> Store {
        let root = RootReducer::new(self.registry);
        let state = root.initial_state(initial);
        info!(
            nodes = state.nodes().len(),
            slices = state.slices.len(),
            middleware = ?self.chain.iter().map(|m| m.name()).collect::<Vec<_>>(),
            "state store ready"
        );
        Store {
            inner: Arc::new(Inner {
                root,
                chain: self.chain,
                state: RwLock::new(Arc::new(state)),
                commit_lock: ReentrantMutex::new(()),
                listeners: Arc::new(Mutex::new(Listeners::default())),
                bus: self.bus,
            }),
        }
    }
}

impl Store {
    /// A store with the default chain: thunks first, then batches.
    pub fn configure(registry: ReducerRegistry, initial: PersistedState) -> Self {
        StoreBuilder::new(registry)
            .middleware(ThunkMiddleware)
            .middleware(MultiDispatch)
            .build(initial)
    }

    pub fn builder(registry: ReducerRegistry) -> StoreBuilder {
        StoreBuilder::new(registry)
    }

    /// Run `dispatch` through the middleware chain and commit the result.
    ///
    /// On a reducer error the state is left as it was and the error is
    /// returned.
    pub fn dispatch(&self, dispatch: impl Into<Dispatch>) -> StateResult<Dispatched> {
        Next::new(self, &self.inner.chain).run(dispatch.into())
    }

    /// The latest committed state.
    pub fn get_state(&self) -> Arc<State> {
        Arc::clone(&self.inner.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Register a listener called after every commit, in subscription order.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<State>) + Send + Sync + 'static,
    {
        let mut listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, Arc::new(listener)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.inner.listeners),
        }
    }

    pub fn event_bus(&self) -> Option<&EventBus> {
        self.inner.bus.as_ref()
    }

    /// End of the chain: reduce, swap, notify, publish.
    pub(crate) fn commit(&self, dispatch: Dispatch) -> StateResult<Dispatched> {
        let action = match dispatch {
            Dispatch::Action(action) => Arc::new(action),
            other => return Err(StateError::UnhandledDispatch(other.label())),
        };

        let _guard = self.inner.commit_lock.lock();
        let current = self.get_state();
        let committed = Arc::new(self.inner.root.reduce(&current, Arc::clone(&action))?);
        *self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::clone(&committed);
        debug!(kind = %action.kind, "action committed");

        self.notify(&committed);
        if let (Some(bus), Some(last)) = (&self.inner.bus, committed.last_action()) {
            bus.emit(&last.kind, last);
        }
        Ok(Dispatched::Action(action))
    }

    fn notify(&self, state: &Arc<State>) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in &listeners {
            listener(state);
        }
    }
}

/// Returned by [`Store::subscribe`].
///
/// Dropping a `Subscription` does not remove the listener; call
/// [`Subscription::unsubscribe`] for that.
#[must_use = "dropping a Subscription keeps the listener registered"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    /// Remove the listener. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(listeners) = self.listeners.upgrade() else {
            return false;
        };
        let mut listeners = listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.entries.len();
        listeners.entries.retain(|(id, _)| *id != self.id);
        listeners.entries.len() != before
    }
}
