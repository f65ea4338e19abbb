//! Memory browser: counts, activity search, base memory and context window.
//!
//! Responses have changed shape across agent releases. Older layouts are
//! still accepted:
//! - stats flat (`total` or `total_activities`) or nested under `memories`
//! - activity results as a bare array or wrapped in `{results}`

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::{TopicConsumer, decode_json, unexpected_topic};
use crate::bus::Publisher;
use crate::topics::{self, ControlWord};
use crate::utils::error::DecodeError;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MemoryStats {
    #[serde(default, alias = "total_activities")]
    pub total: u64,
    #[serde(default)]
    pub last_24h: Option<u64>,
    #[serde(default)]
    pub by_type: BTreeMap<String, u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatsResponse {
    Nested { memories: MemoryStats },
    Flat(MemoryStats),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActivityRecord {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, alias = "type")]
    pub activity_type: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub activity_data: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ActivityResponse {
    Wrapped { results: Vec<ActivityRecord> },
    Bare(Vec<ActivityRecord>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentResponse {
    Data { data: Value },
    Error { error: String },
}

/// Body published on `memory/activity/search`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivitySearch {
    pub query: String,
    pub activity_type: Option<String>,
    pub days_back: u32,
    pub limit: u32,
}

impl Default for ActivitySearch {
    fn default() -> Self {
        Self {
            query: String::new(),
            activity_type: None,
            days_back: 30,
            limit: 10,
        }
    }
}

/// A base-memory or context document, or the agent's reason for not
/// providing one.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Loaded(Value),
    Failed(String),
}

#[derive(Debug, Default)]
pub struct MemoryBrowser {
    stats: Option<MemoryStats>,
    activity: Vec<ActivityRecord>,
    loading_activity: bool,
    base: Option<Document>,
    context: Option<Document>,
}

impl MemoryBrowser {
    pub fn stats(&self) -> Option<&MemoryStats> {
        self.stats.as_ref()
    }

    /// Results of the latest search; each response replaces the previous one.
    pub fn activity(&self) -> &[ActivityRecord] {
        &self.activity
    }

    pub fn is_loading_activity(&self) -> bool {
        self.loading_activity
    }

    pub fn base(&self) -> Option<&Document> {
        self.base.as_ref()
    }

    pub fn context(&self) -> Option<&Document> {
        self.context.as_ref()
    }

    pub fn request_stats(&self, publisher: &Publisher) {
        publisher.publish(topics::MEMORY_STATS_REQUEST, ControlWord::Get);
    }

    pub fn search(&mut self, publisher: &Publisher, search: &ActivitySearch) {
        match serde_json::to_string(search) {
            Ok(body) => {
                self.loading_activity = true;
                publisher.publish(topics::MEMORY_ACTIVITY_SEARCH, body);
            }
            Err(e) => warn!("could not encode activity search: {e}"),
        }
    }

    pub fn request_base(&self, publisher: &Publisher) {
        publisher.publish(topics::MEMORY_BASE_REQUEST, ControlWord::Get);
    }

    pub fn request_context(&self, publisher: &Publisher) {
        publisher.publish(topics::MEMORY_CONTEXT_REQUEST, ControlWord::Get);
    }
}

fn document(topic: &str, payload: &str) -> Result<Document, DecodeError> {
    Ok(match decode_json::<DocumentResponse>(topic, payload)? {
        DocumentResponse::Data { data } => Document::Loaded(data),
        DocumentResponse::Error { error } => {
            warn!("{} reported: {}", topic, error);
            Document::Failed(error)
        }
    })
}

impl TopicConsumer for MemoryBrowser {
    fn topics(&self) -> &'static [&'static str] {
        &[
            topics::MEMORY_STATS_RESPONSE,
            topics::MEMORY_ACTIVITY_RESPONSE,
            topics::MEMORY_BASE_RESPONSE,
            topics::MEMORY_CONTEXT_RESPONSE,
        ]
    }

    fn apply(&mut self, topic: &str, payload: &str) -> Result<(), DecodeError> {
        match topic {
            topics::MEMORY_STATS_RESPONSE => {
                let stats = match decode_json::<StatsResponse>(topic, payload)? {
                    StatsResponse::Nested { memories } => memories,
                    StatsResponse::Flat(stats) => stats,
                };
                self.stats = Some(stats);
            }
            topics::MEMORY_ACTIVITY_RESPONSE => {
                let decoded = decode_json::<ActivityResponse>(topic, payload);
                self.loading_activity = false;
                self.activity = match decoded? {
                    ActivityResponse::Wrapped { results } => results,
                    ActivityResponse::Bare(records) => records,
                };
            }
            topics::MEMORY_BASE_RESPONSE => self.base = Some(document(topic, payload)?),
            topics::MEMORY_CONTEXT_RESPONSE => self.context = Some(document(topic, payload)?),
            other => return Err(unexpected_topic(other)),
        }
        Ok(())
    }
}
