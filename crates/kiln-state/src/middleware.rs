//! The dispatch chain.
//!
//! A store owns an ordered list of [`Middleware`] stages fixed at build time.
//! Each stage either handles a [`Dispatch`] itself or forwards it with
//! [`Next::run`]; whatever falls off the end of the chain is committed by the
//! store, which only accepts single actions.

use std::fmt;
use std::sync::Arc;

use kiln_core::Action;
use tracing::debug;

use crate::error::StateResult;
use crate::store::Store;

/// Deferred work run by [`ThunkMiddleware`] with access to the store.
pub type Thunk = Box<dyn FnOnce(&Store) -> StateResult<Dispatched> + Send>;

/// A value handed to [`Store::dispatch`].
pub enum Dispatch {
    Action(Action),
    /// Several actions; `None` entries are skipped.
    Batch(Vec<Option<Action>>),
    Thunk(Thunk),
}

impl Dispatch {
    pub fn thunk<F>(f: F) -> Self
    where
        F: FnOnce(&Store) -> StateResult<Dispatched> + Send + 'static,
    {
        Dispatch::Thunk(Box::new(f))
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            Dispatch::Action(_) => "action",
            Dispatch::Batch(_) => "batch",
            Dispatch::Thunk(_) => "thunk",
        }
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatch::Action(action) => f.debug_tuple("Action").field(action).finish(),
            Dispatch::Batch(actions) => f.debug_tuple("Batch").field(actions).finish(),
            Dispatch::Thunk(_) => f.write_str("Thunk(..)"),
        }
    }
}

impl From<Action> for Dispatch {
    fn from(action: Action) -> Self {
        Dispatch::Action(action)
    }
}

impl From<Vec<Action>> for Dispatch {
    fn from(actions: Vec<Action>) -> Self {
        Dispatch::Batch(actions.into_iter().map(Some).collect())
    }
}

impl From<Vec<Option<Action>>> for Dispatch {
    fn from(actions: Vec<Option<Action>>) -> Self {
        Dispatch::Batch(actions)
    }
}

/// What a dispatch ended up committing.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    Action(Arc<Action>),
    Batch(Vec<Arc<Action>>),
}

impl Dispatched {
    /// The committed actions, in commit order.
    pub fn into_actions(self) -> Vec<Arc<Action>> {
        match self {
            Dispatched::Action(action) => vec![action],
            Dispatched::Batch(actions) => actions,
        }
    }

    pub fn kinds(&self) -> Vec<&str> {
        match self {
            Dispatched::Action(action) => vec![action.kind.as_str()],
            Dispatched::Batch(actions) => actions.iter().map(|a| a.kind.as_str()).collect(),
        }
    }
}

/// One stage of the dispatch chain.
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;

    /// Handle `dispatch` or pass it on with `next.run(..)`.
    fn handle(&self, store: &Store, dispatch: Dispatch, next: Next<'_>) -> StateResult<Dispatched>;
}

/// The remainder of the chain after the current stage.
pub struct Next<'a> {
    store: &'a Store,
    rest: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(store: &'a Store, rest: &'a [Arc<dyn Middleware>]) -> Self {
        Self { store, rest }
    }

    pub fn run(self, dispatch: Dispatch) -> StateResult<Dispatched> {
        match self.rest.split_first() {
            Some((head, tail)) => head.handle(self.store, dispatch, Next::new(self.store, tail)),
            None => self.store.commit(dispatch),
        }
    }
}

// ── Stages ────────────────────────────────────────────────────────

/// Splits a batch into individual dispatches.
///
/// Each remaining action goes back through [`Store::dispatch`], so the whole
/// chain and a full commit/notify cycle run per action, in batch order. A
/// failing action stops the batch; actions before it stay committed.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultiDispatch;

impl Middleware for MultiDispatch {
    fn name(&self) -> &'static str {
        "multi-dispatch"
    }

    fn handle(&self, store: &Store, dispatch: Dispatch, next: Next<'_>) -> StateResult<Dispatched> {
        let actions = match dispatch {
            Dispatch::Batch(actions) => actions,
            other => return next.run(other),
        };

        let mut committed = Vec::with_capacity(actions.len());
        for action in actions.into_iter().flatten() {
            if action.kind.is_empty() {
                continue;
            }
            committed.extend(store.dispatch(action)?.into_actions());
        }
        debug!(count = committed.len(), "batch dispatched");
        Ok(Dispatched::Batch(committed))
    }
}

/// Runs thunks with the store so they can read state and dispatch follow-ups.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThunkMiddleware;

impl Middleware for ThunkMiddleware {
    fn name(&self) -> &'static str {
        "thunk"
    }

    fn handle(&self, store: &Store, dispatch: Dispatch, next: Next<'_>) -> StateResult<Dispatched> {
        match dispatch {
            Dispatch::Thunk(thunk) => thunk(store),
            other => next.run(other),
        }
    }
}
