use serde::Deserialize;

use super::{TopicConsumer, decode_json, unexpected_topic};
use crate::topics;
use crate::utils::error::DecodeError;

/// Rolling summary of the ongoing conversation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RealtimeSummary {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<String>,
    #[serde(default)]
    pub turn_count: Option<u64>,
    #[serde(default)]
    pub processing_time_ms: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CurrentTopic {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub subtopics: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Passive view of what the agent thinks the conversation is about.
#[derive(Debug, Default)]
pub struct LiveInsights {
    summary: Option<RealtimeSummary>,
    topic: Option<CurrentTopic>,
}

impl LiveInsights {
    pub fn summary(&self) -> Option<&RealtimeSummary> {
        self.summary.as_ref()
    }

    pub fn topic(&self) -> Option<&CurrentTopic> {
        self.topic.as_ref()
    }
}

impl TopicConsumer for LiveInsights {
    fn topics(&self) -> &'static [&'static str] {
        &[topics::SUMMARY_REALTIME, topics::TOPICS_CURRENT]
    }

    fn apply(&mut self, topic: &str, payload: &str) -> Result<(), DecodeError> {
        match topic {
            topics::SUMMARY_REALTIME => self.summary = Some(decode_json(topic, payload)?),
            topics::TOPICS_CURRENT => self.topic = Some(decode_json(topic, payload)?),
            other => return Err(unexpected_topic(other)),
        }
        Ok(())
    }
}
