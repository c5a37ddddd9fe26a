//! Topic-keyed publish/subscribe for committed actions.
//!
//! A store built with an [`EventBus`] publishes every committed action under
//! its kind once the new state is visible. Handlers run synchronously on the
//! dispatching thread.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use kiln_core::Action;
use tracing::trace;

/// Topic that receives every event.
pub const WILDCARD: &str = "*";

/// Callback invoked with the published action.
pub type Handler = Arc<dyn Fn(&Action) + Send + Sync>;

/// Identifies a registered handler for [`EventBus::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
struct Topics {
    next_id: u64,
    handlers: HashMap<String, Vec<(HandlerId, Handler)>>,
}

/// Cheaply cloneable handle to a shared set of topic handlers.
#[derive(Clone, Default)]
pub struct EventBus {
    topics: Arc<Mutex<Topics>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic` (or [`WILDCARD`] for all topics).
    pub fn on<F>(&self, topic: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&Action) + Send + Sync + 'static,
    {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        let id = HandlerId(topics.next_id);
        topics.next_id += 1;
        topics
            .handlers
            .entry(topic.into())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns true if it was registered under `topic`.
    pub fn off(&self, topic: &str, id: HandlerId) -> bool {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(handlers) = topics.handlers.get_mut(topic) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            topics.handlers.remove(topic);
        }
        removed
    }

    /// Deliver `action` to the handlers of `topic`, then to wildcard handlers.
    ///
    /// Handlers are collected before any is called: a handler registered
    /// while this emit runs does not see the current event. Returns the
    /// number of handlers invoked.
    pub fn emit(&self, topic: &str, action: &Action) -> usize {
        let targets: Vec<Handler> = {
            let topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
            let direct = topics.handlers.get(topic).into_iter().flatten();
            let wildcard = (topic != WILDCARD)
                .then(|| topics.handlers.get(WILDCARD))
                .flatten()
                .into_iter()
                .flatten();
            direct
                .chain(wildcard)
                .map(|(_, handler)| Arc::clone(handler))
                .collect()
        };

        trace!(topic, handlers = targets.len(), "emitting event");
        for handler in &targets {
            handler(action);
        }
        targets.len()
    }

    pub fn listener_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .get(topic)
            .map_or(0, Vec::len)
    }
}
