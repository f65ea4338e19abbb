//! Topic consumers
//!
//! One consumer per feature area. A consumer names the response topics it
//! cares about, turns each raw payload into typed state and offers request
//! methods that go out through a [`Publisher`]. Consumers are shared as
//! `Arc<Mutex<_>>`; [`attach`] wires one to the dispatcher so it is fed the
//! cached value for each topic immediately and every later delivery after
//! that.
//!
//! A payload that fails to decode is logged and dropped; the consumer keeps
//! whatever state it derived from the previous good payload.

pub mod dashboard;
pub mod heartbeat;
pub mod history;
pub mod insights;
pub mod integrations;
pub mod memory;
pub mod notes;
pub mod poller;
pub mod voice;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::{Deserialize, DeserializeOwned, Deserializer};
use tracing::warn;

use crate::bus::dispatcher::{self, ObserverId, SharedDispatcher};
use crate::utils::error::DecodeError;

pub use dashboard::DashboardView;
pub use heartbeat::AgentMonitor;
pub use history::Timeline;
pub use insights::LiveInsights;
pub use integrations::{Integrations, UrlOpener};
pub use memory::MemoryBrowser;
pub use notes::NoteSession;
pub use poller::Poller;
pub use voice::Personalization;

pub trait TopicConsumer: Send + 'static {
    /// Response topics this consumer derives state from.
    fn topics(&self) -> &'static [&'static str];

    fn apply(&mut self, topic: &str, payload: &str) -> Result<(), DecodeError>;
}

pub type Shared<C> = Arc<Mutex<C>>;

pub fn shared<C>(consumer: C) -> Shared<C> {
    Arc::new(Mutex::new(consumer))
}

pub fn lock<C>(consumer: &Shared<C>) -> MutexGuard<'_, C> {
    consumer.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registers `consumer` for each of its topics and replays what the cache
/// already holds for them.
pub fn attach<C: TopicConsumer>(
    dispatcher: &SharedDispatcher,
    consumer: &Shared<C>,
) -> Vec<ObserverId> {
    let topics = lock(consumer).topics();
    let mut dispatcher = dispatcher::lock(dispatcher);

    topics
        .iter()
        .map(|topic| {
            if let Some(payload) = dispatcher.latest(topic) {
                feed(&mut *lock(consumer), topic, payload);
            }
            let consumer = consumer.clone();
            dispatcher.observe(topic, move |event| {
                feed(&mut *lock(&consumer), &event.topic, &event.payload);
            })
        })
        .collect()
}

fn feed<C: TopicConsumer>(consumer: &mut C, topic: &str, payload: &str) {
    if let Err(e) = consumer.apply(topic, payload) {
        warn!("{e}; keeping previous state");
    }
}

pub(crate) fn decode_json<T: DeserializeOwned>(topic: &str, payload: &str) -> Result<T, DecodeError> {
    serde_json::from_str(payload).map_err(|source| DecodeError::Json {
        topic: topic.to_string(),
        source,
    })
}

/// Field deserializer that reads `null` or a value of the wrong shape as
/// `None`, leaving the sibling fields intact.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(value) {
        Ok(decoded) => Ok(Some(decoded)),
        Err(e) => {
            warn!("ignoring malformed field: {e}");
            Ok(None)
        }
    }
}

pub(crate) fn unexpected_topic(topic: &str) -> DecodeError {
    DecodeError::Unexpected {
        topic: topic.to_string(),
        detail: "topic not handled by this consumer".to_string(),
    }
}

/// Every consumer of the dashboard, sharing one dispatcher.
#[derive(Clone)]
pub struct Features {
    pub monitor: Shared<AgentMonitor>,
    pub dashboard: Shared<DashboardView>,
    pub notes: Shared<NoteSession>,
    pub memory: Shared<MemoryBrowser>,
    pub timeline: Shared<Timeline>,
    pub integrations: Shared<Integrations>,
    pub voice: Shared<Personalization>,
    pub insights: Shared<LiveInsights>,
}

impl Features {
    pub fn new(opener: Box<dyn UrlOpener>) -> Self {
        Self {
            monitor: shared(AgentMonitor::default()),
            dashboard: shared(DashboardView::default()),
            notes: shared(NoteSession::default()),
            memory: shared(MemoryBrowser::default()),
            timeline: shared(Timeline::default()),
            integrations: shared(Integrations::new(opener)),
            voice: shared(Personalization::default()),
            insights: shared(LiveInsights::default()),
        }
    }

    pub fn attach(&self, dispatcher: &SharedDispatcher) {
        attach(dispatcher, &self.monitor);
        attach(dispatcher, &self.dashboard);
        attach(dispatcher, &self.notes);
        attach(dispatcher, &self.memory);
        attach(dispatcher, &self.timeline);
        attach(dispatcher, &self.integrations);
        attach(dispatcher, &self.voice);
        attach(dispatcher, &self.insights);
    }
}
