use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::{TopicConsumer, decode_json, unexpected_topic};
use crate::bus::Publisher;
use crate::topics::{self, ControlWord};
use crate::utils::error::DecodeError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimelineItem {
    #[serde(default)]
    pub role: String,
    #[serde(default, alias = "text")]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TimelineResponse {
    Feed {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        data: Vec<Value>,
    },
    Bare(Vec<Value>),
}

/// Decodes each row on its own, dropping the ones that are not items.
fn decode_items(rows: Vec<Value>) -> Vec<TimelineItem> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("skipping timeline row: {e}");
                None
            }
        })
        .collect()
}

/// Conversation history for the live timeline.
#[derive(Debug, Default)]
pub struct Timeline {
    items: Vec<TimelineItem>,
    loading: bool,
}

impl Timeline {
    pub fn items(&self) -> &[TimelineItem] {
        &self.items
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn request(&mut self, publisher: &Publisher) {
        self.loading = true;
        publisher.publish(topics::HISTORY_REQUEST, ControlWord::CheckHistory);
    }
}

impl TopicConsumer for Timeline {
    fn topics(&self) -> &'static [&'static str] {
        &[topics::HISTORY_RESPONSE]
    }

    fn apply(&mut self, topic: &str, payload: &str) -> Result<(), DecodeError> {
        if topic != topics::HISTORY_RESPONSE {
            return Err(unexpected_topic(topic));
        }
        let decoded = decode_json::<TimelineResponse>(topic, payload);
        self.loading = false;
        self.items = match decoded? {
            TimelineResponse::Feed { kind, data } if kind == "timeline_feed" => decode_items(data),
            TimelineResponse::Feed { kind, .. } => {
                return Err(DecodeError::Unexpected {
                    topic: topic.to_string(),
                    detail: format!("unknown feed type '{kind}'"),
                });
            }
            TimelineResponse::Bare(rows) => decode_items(rows),
        };
        Ok(())
    }
}
