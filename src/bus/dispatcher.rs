//! Inbound dispatcher
//!
//! Every message the connection loop receives goes through
//! [`Dispatcher::on_message`], which:
//! - overwrites the last-known payload for the topic (older values are
//!   coalesced away)
//! - appends the message to a bounded debug log
//! - calls the observers registered for that topic, then the catch-all ones
//!
//! Payloads are passed through untouched; interpreting them is the job of
//! each feature. The dispatcher is shared as `Arc<Mutex<Dispatcher>>` and
//! observers run while it is locked, so an observer must never call back
//! into the dispatcher.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::debug;

/// One message as delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub topic: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    /// The payload cut to `max_chars`, with an ellipsis when shortened.
    pub fn preview(&self, max_chars: usize) -> String {
        let mut chars = self.payload.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{head}...")
        } else {
            head
        }
    }
}

pub type ObserverFn = Box<dyn FnMut(&InboundEvent) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct Observer {
    id: ObserverId,
    callback: ObserverFn,
}

pub type SharedDispatcher = Arc<Mutex<Dispatcher>>;

pub struct Dispatcher {
    cache: HashMap<String, String>,
    recent: VecDeque<InboundEvent>,
    capacity: usize,
    observers: HashMap<String, Vec<Observer>>,
    catch_all: Vec<Observer>,
    next_id: u64,
}

impl Dispatcher {
    pub const DEFAULT_LOG_CAPACITY: usize = 20;

    pub fn new(capacity: usize) -> Self {
        Self {
            cache: HashMap::new(),
            recent: VecDeque::with_capacity(capacity),
            capacity,
            observers: HashMap::new(),
            catch_all: Vec::new(),
            next_id: 0,
        }
    }

    pub fn shared(capacity: usize) -> SharedDispatcher {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    pub fn on_message(&mut self, topic: &str, payload: String) {
        let event = InboundEvent {
            topic: topic.to_string(),
            payload,
            received_at: Utc::now(),
        };
        debug!("received {} ({} bytes)", topic, event.payload.len());

        self.cache.insert(event.topic.clone(), event.payload.clone());

        if self.capacity > 0 {
            if self.recent.len() == self.capacity {
                self.recent.pop_front();
            }
            self.recent.push_back(event.clone());
        }

        self.notify(&event);
    }

    /// Seeds the cache with previously persisted payloads and lets observers
    /// derive their state from them. The debug log is left alone.
    pub fn restore<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = InboundEvent>,
    {
        for event in entries {
            self.cache.insert(event.topic.clone(), event.payload.clone());
            self.notify(&event);
        }
    }

    fn notify(&mut self, event: &InboundEvent) {
        if let Some(observers) = self.observers.get_mut(&event.topic) {
            for observer in observers.iter_mut() {
                (observer.callback)(event);
            }
        }
        for observer in self.catch_all.iter_mut() {
            (observer.callback)(event);
        }
    }

    /// Registers `callback` for messages on exactly `topic`.
    pub fn observe<F>(&mut self, topic: &str, callback: F) -> ObserverId
    where
        F: FnMut(&InboundEvent) + Send + 'static,
    {
        let id = self.next_observer_id();
        self.observers
            .entry(topic.to_string())
            .or_default()
            .push(Observer {
                id,
                callback: Box::new(callback),
            });
        id
    }

    /// Registers `callback` for every inbound message.
    pub fn observe_all<F>(&mut self, callback: F) -> ObserverId
    where
        F: FnMut(&InboundEvent) + Send + 'static,
    {
        let id = self.next_observer_id();
        self.catch_all.push(Observer {
            id,
            callback: Box::new(callback),
        });
        id
    }

    pub fn unobserve(&mut self, id: ObserverId) {
        for observers in self.observers.values_mut() {
            observers.retain(|o| o.id != id);
        }
        self.observers.retain(|_, observers| !observers.is_empty());
        self.catch_all.retain(|o| o.id != id);
    }

    pub fn latest(&self, topic: &str) -> Option<&str> {
        self.cache.get(topic).map(String::as_str)
    }

    pub fn cached_topics(&self) -> impl Iterator<Item = &str> {
        self.cache.keys().map(String::as_str)
    }

    /// The debug log, oldest first.
    pub fn recent(&self) -> impl Iterator<Item = &InboundEvent> {
        self.recent.iter()
    }

    pub fn observer_count(&self, topic: &str) -> usize {
        self.observers.get(topic).map_or(0, Vec::len)
    }

    fn next_observer_id(&mut self) -> ObserverId {
        self.next_id += 1;
        ObserverId(self.next_id)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LOG_CAPACITY)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("cached_topics", &self.cache.len())
            .field("recent", &self.recent.len())
            .field("observed_topics", &self.observers.len())
            .finish()
    }
}

/// Locks a shared dispatcher, recovering the guard if a previous holder
/// panicked inside an observer.
pub fn lock(dispatcher: &SharedDispatcher) -> std::sync::MutexGuard<'_, Dispatcher> {
    dispatcher.lock().unwrap_or_else(PoisonError::into_inner)
}
