use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use super::{TopicConsumer, decode_json, unexpected_topic};
use crate::bus::Publisher;
use crate::topics::{self, ControlWord};
use crate::utils::error::DecodeError;

/// Periodic status published by the agent on `alex/dashboard/state`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Heartbeat {
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_connected: bool,
    #[serde(default)]
    pub battery_level: Option<f64>,
    #[serde(default)]
    pub active_status_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Battery {
    pub level: f64,
    #[serde(default)]
    pub charging: bool,
}

/// Agent liveness, device battery and the agent's replies to on/off commands.
#[derive(Debug, Default)]
pub struct AgentMonitor {
    heartbeat: Option<Heartbeat>,
    last_heartbeat_at: Option<DateTime<Utc>>,
    battery: Option<Battery>,
    agent_feedback: Option<String>,
}

impl AgentMonitor {
    pub fn heartbeat(&self) -> Option<&Heartbeat> {
        self.heartbeat.as_ref()
    }

    pub fn last_heartbeat_at(&self) -> Option<DateTime<Utc>> {
        self.last_heartbeat_at
    }

    pub fn battery(&self) -> Option<&Battery> {
        self.battery.as_ref()
    }

    /// Raw text last published on `/agent/status`.
    pub fn agent_feedback(&self) -> Option<&str> {
        self.agent_feedback.as_deref()
    }

    pub fn is_agent_active(&self) -> bool {
        self.heartbeat.as_ref().is_some_and(|hb| hb.is_active)
    }

    pub fn request_state(&self, publisher: &Publisher) {
        publisher.publish(topics::AGENT_STATE_REQUEST, ControlWord::Ping);
    }

    pub fn request_battery(&self, publisher: &Publisher) {
        publisher.publish(topics::BATTERY_REQUEST, ControlWord::Get);
    }

    pub fn set_agent(&self, publisher: &Publisher, on: bool) {
        let word = if on {
            ControlWord::AgentOn
        } else {
            ControlWord::AgentOff
        };
        publisher.publish(topics::AGENT_CONTROL, word);
    }

    /// Asks for the opposite of the last reported activity state.
    pub fn toggle_agent(&self, publisher: &Publisher) {
        self.set_agent(publisher, !self.is_agent_active());
    }
}

impl TopicConsumer for AgentMonitor {
    fn topics(&self) -> &'static [&'static str] {
        &[
            topics::AGENT_STATE,
            topics::BATTERY_RESPONSE,
            topics::AGENT_STATUS,
        ]
    }

    fn apply(&mut self, topic: &str, payload: &str) -> Result<(), DecodeError> {
        match topic {
            topics::AGENT_STATE => {
                let heartbeat: Heartbeat = decode_json(topic, payload)?;
                debug!("heartbeat: active={}", heartbeat.is_active);
                self.heartbeat = Some(heartbeat);
                self.last_heartbeat_at = Some(Utc::now());
            }
            topics::BATTERY_RESPONSE => {
                self.battery = Some(decode_json(topic, payload)?);
            }
            topics::AGENT_STATUS => {
                info!("agent: {}", payload);
                self.agent_feedback = Some(payload.to_string());
            }
            other => return Err(unexpected_topic(other)),
        }
        Ok(())
    }
}
