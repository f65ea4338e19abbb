use crate::protocol::{Packet, QoS, Subscribe};
use crate::topics;

/// The fixed, ordered set of topics subscribed on every (re)connect.
///
/// Features never subscribe on their own; they observe the dispatcher's
/// cache for the topics listed here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRegistry {
    topics: Vec<String>,
    qos: QoS,
}

impl SubscriptionRegistry {
    /// Builds a registry from `topics`, keeping first-seen order and dropping
    /// duplicates.
    pub fn new<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for topic in topics {
            let topic = topic.into();
            if !unique.contains(&topic) {
                unique.push(topic);
            }
        }
        Self {
            topics: unique,
            qos: QoS::AtLeastOnce,
        }
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// One batched SUBSCRIBE covering the whole set, or `None` when empty.
    pub fn subscribe_packet(&self, pkid: u16) -> Option<Packet> {
        if self.topics.is_empty() {
            return None;
        }
        Some(Packet::Subscribe(Subscribe {
            pkid,
            filters: self
                .topics
                .iter()
                .map(|topic| (topic.clone(), self.qos))
                .collect(),
        }))
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(topics::SUBSCRIPTIONS.iter().copied())
    }
}
