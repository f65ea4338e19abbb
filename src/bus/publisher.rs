use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use super::limiter::{RateLimiter, TopicRateLimiter};

/// Work handed from publishers to the connection loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Publish { topic: String, payload: String },
}

/// Fire-and-forget command channel to the broker.
///
/// A publish is dropped with a warning when the link is down or when the
/// same topic was published less than one rate-limit window ago. Callers
/// cannot tell a dropped publish from a sent one; they notice a missing
/// response instead.
#[derive(Clone)]
pub struct Publisher {
    sender: mpsc::UnboundedSender<Outbound>,
    connected: watch::Receiver<bool>,
    limiter: Arc<Mutex<dyn RateLimiter>>,
}

impl Publisher {
    pub fn new(
        sender: mpsc::UnboundedSender<Outbound>,
        connected: watch::Receiver<bool>,
        limiter: Arc<Mutex<dyn RateLimiter>>,
    ) -> Self {
        Self {
            sender,
            connected,
            limiter,
        }
    }

    /// Publisher with the default 500ms per-topic limiter.
    pub fn with_default_limiter(
        sender: mpsc::UnboundedSender<Outbound>,
        connected: watch::Receiver<bool>,
    ) -> Self {
        Self::new(
            sender,
            connected,
            Arc::new(Mutex::new(TopicRateLimiter::default())),
        )
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub fn status(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    pub fn publish(&self, topic: &str, message: impl Into<String>) {
        if !self.is_connected() {
            warn!("dropping publish to '{}': not connected", topic);
            return;
        }

        let acquired = self
            .limiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_acquire(topic);
        if !acquired {
            warn!("rate limit: ignored publish to '{}'", topic);
            return;
        }

        let payload = message.into();
        debug!("publishing to {}: {}", topic, payload);
        if self
            .sender
            .send(Outbound::Publish {
                topic: topic.to_string(),
                payload,
            })
            .is_err()
        {
            warn!("dropping publish to '{}': connection closed", topic);
        }
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("connected", &self.is_connected())
            .finish()
    }
}
