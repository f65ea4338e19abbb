use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Decides whether a publish to `topic` may go out now.
///
/// Implementations record the acquisition when they return `true`.
pub trait RateLimiter: Send {
    fn try_acquire(&mut self, topic: &str) -> bool;
}

/// Allows at most one publish per topic per `window`.
#[derive(Debug)]
pub struct TopicRateLimiter {
    window: Duration,
    last_publish: HashMap<String, Instant>,
}

impl TopicRateLimiter {
    pub const DEFAULT_WINDOW: Duration = Duration::from_millis(500);

    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_publish: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn try_acquire_at(&mut self, topic: &str, now: Instant) -> bool {
        if let Some(last) = self.last_publish.get(topic) {
            if now.saturating_duration_since(*last) < self.window {
                return false;
            }
        }
        self.last_publish.insert(topic.to_string(), now);
        true
    }

    pub fn last_publish(&self, topic: &str) -> Option<Instant> {
        self.last_publish.get(topic).copied()
    }
}

impl Default for TopicRateLimiter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}

impl RateLimiter for TopicRateLimiter {
    fn try_acquire(&mut self, topic: &str) -> bool {
        self.try_acquire_at(topic, Instant::now())
    }
}
