use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{TopicConsumer, decode_json, unexpected_topic};
use crate::bus::Publisher;
use crate::topics::{self, ControlWord};
use crate::utils::error::DecodeError;

#[derive(Deserialize)]
#[serde(untagged)]
enum VoiceList {
    Full {
        #[serde(default)]
        status: Option<String>,
        voices: Vec<String>,
        #[serde(default)]
        current_voice: Option<String>,
    },
    Bare(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VoiceStatus {
    pub status: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl VoiceStatus {
    pub fn is_success(&self) -> bool {
        matches!(self.status.as_str(), "success" | "ok")
    }
}

#[derive(Serialize)]
struct SetVoice<'a> {
    voice: &'a str,
}

/// Text-to-speech voice selection.
#[derive(Debug, Default)]
pub struct Personalization {
    voices: Vec<String>,
    current: Option<String>,
    pending: Option<String>,
    last_status: Option<VoiceStatus>,
}

impl Personalization {
    pub fn voices(&self) -> &[String] {
        &self.voices
    }

    pub fn current_voice(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Voice requested but not yet confirmed by the agent.
    pub fn pending_voice(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub fn last_status(&self) -> Option<&VoiceStatus> {
        self.last_status.as_ref()
    }

    pub fn request_voices(&self, publisher: &Publisher) {
        publisher.publish(topics::VOICE_LIST_REQUEST, ControlWord::Get);
    }

    pub fn set_voice(&mut self, publisher: &Publisher, voice: &str) {
        match serde_json::to_string(&SetVoice { voice }) {
            Ok(body) => {
                self.pending = Some(voice.to_string());
                publisher.publish(topics::VOICE_SET, body);
            }
            Err(e) => warn!("could not encode voice request: {e}"),
        }
    }
}

impl TopicConsumer for Personalization {
    fn topics(&self) -> &'static [&'static str] {
        &[topics::VOICE_LIST_RESPONSE, topics::VOICE_STATUS]
    }

    fn apply(&mut self, topic: &str, payload: &str) -> Result<(), DecodeError> {
        match topic {
            topics::VOICE_LIST_RESPONSE => match decode_json::<VoiceList>(topic, payload)? {
                VoiceList::Full {
                    status,
                    voices,
                    current_voice,
                } => {
                    if let Some(status) = status.filter(|s| s != "success" && s != "ok") {
                        warn!("voice list status: {}", status);
                    }
                    self.voices = voices;
                    if current_voice.is_some() {
                        self.current = current_voice;
                    }
                }
                VoiceList::Bare(voices) => self.voices = voices,
            },
            topics::VOICE_STATUS => {
                let status: VoiceStatus = decode_json(topic, payload)?;
                if status.is_success() {
                    if let Some(voice) = status.voice.clone().or_else(|| self.pending.clone()) {
                        info!("voice set to {}", voice);
                        self.current = Some(voice);
                    }
                } else {
                    warn!(
                        "voice change failed: {}",
                        status.message.as_deref().unwrap_or(&status.status)
                    );
                }
                self.pending = None;
                self.last_status = Some(status);
            }
            other => return Err(unexpected_topic(other)),
        }
        Ok(())
    }
}
