//! Note-recording pipeline
//!
//! The agent reports progress on `/note/status` and delivers the finished
//! session on `gacor/1`. Status moves
//! `IDLE -> RECORDING -> TRANSCRIBING -> PROCESSING -> COMPLETE | ERROR`,
//! but nothing here enforces the order: whatever the agent reports last is
//! what is shown.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use super::{TopicConsumer, decode_json, unexpected_topic};
use crate::bus::Publisher;
use crate::topics::{self, ControlWord};
use crate::utils::error::DecodeError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NoteStatus {
    #[default]
    Idle,
    Recording,
    Transcribing,
    Processing,
    Complete,
    Error,
}

impl NoteStatus {
    /// Unknown strings are shown as idle.
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "RECORDING" => NoteStatus::Recording,
            "TRANSCRIBING" => NoteStatus::Transcribing,
            "PROCESSING" => NoteStatus::Processing,
            "COMPLETE" => NoteStatus::Complete,
            "ERROR" => NoteStatus::Error,
            _ => NoteStatus::Idle,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NoteStatus::Idle => "IDLE",
            NoteStatus::Recording => "RECORDING",
            NoteStatus::Transcribing => "TRANSCRIBING",
            NoteStatus::Processing => "PROCESSING",
            NoteStatus::Complete => "COMPLETE",
            NoteStatus::Error => "ERROR",
        }
    }

    /// The agent is working on audio it already has.
    pub fn is_busy(self) -> bool {
        matches!(self, NoteStatus::Transcribing | NoteStatus::Processing)
    }
}

#[derive(Debug, Deserialize)]
struct StatusUpdate {
    #[serde(default)]
    status: String,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Flashcard {
    #[serde(alias = "question")]
    pub front: String,
    #[serde(alias = "answer")]
    pub back: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Index(usize),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: Answer,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CornellNotes {
    #[serde(default)]
    pub cues: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// An artifact delivered inline, or a path to where the agent stored it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Artifact<T> {
    Inline(T),
    Stored(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NoteArtifacts {
    /// Markdown.
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub flashcards: Option<Artifact<Vec<Flashcard>>>,
    #[serde(default)]
    pub quiz: Option<Artifact<Vec<QuizQuestion>>>,
    /// Mermaid source.
    #[serde(default)]
    pub mindmap: Option<String>,
    #[serde(default, alias = "cornell_notes")]
    pub cornell: Option<Artifact<CornellNotes>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum NoteResult {
    NoteSummary(NoteSummary),
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct NoteSummary {
    session_id: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    duration_minutes: f64,
    #[serde(default)]
    preview_text: String,
    #[serde(default)]
    artifacts: NoteArtifacts,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub id: String,
    pub title: String,
    pub duration: String,
    pub preview: String,
    pub artifacts: NoteArtifacts,
}

impl Recording {
    fn from_summary(summary: NoteSummary) -> Self {
        let started = summary
            .timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .unwrap_or_else(|| Utc::now().fixed_offset());
        Self {
            id: summary.session_id,
            title: format!("Session {}", started.format("%H:%M:%S")),
            duration: format!("{} mins", summary.duration_minutes),
            preview: summary.preview_text,
            artifacts: summary.artifacts,
        }
    }
}

#[derive(Debug, Default)]
pub struct NoteSession {
    status: NoteStatus,
    progress: f64,
    message: Option<String>,
    recording: bool,
    recordings: Vec<Recording>,
    selected: Option<String>,
}

impl NoteSession {
    pub fn status(&self) -> NoteStatus {
        self.status
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn is_processing(&self) -> bool {
        self.status.is_busy()
    }

    /// Finished sessions, newest first.
    pub fn recordings(&self) -> &[Recording] {
        &self.recordings
    }

    pub fn selected(&self) -> Option<&Recording> {
        let id = self.selected.as_deref()?;
        self.recordings.iter().find(|r| r.id == id)
    }

    pub fn select(&mut self, id: &str) -> bool {
        if self.recordings.iter().any(|r| r.id == id) {
            self.selected = Some(id.to_string());
            true
        } else {
            false
        }
    }

    /// Starts or stops recording. Refused while the agent is transcribing or
    /// processing; otherwise the local flag flips before the agent confirms.
    pub fn toggle_recording(&mut self, publisher: &Publisher) -> bool {
        if self.is_processing() {
            warn!("note agent is {}; toggle ignored", self.status.as_str());
            return false;
        }
        let word = if self.recording {
            ControlWord::NoteOff
        } else {
            ControlWord::NoteOn
        };
        publisher.publish(topics::NOTE_CONTROL, word);
        self.recording = !self.recording;
        true
    }

    fn apply_status(&mut self, update: StatusUpdate) {
        self.status = NoteStatus::from_wire(&update.status);
        self.recording = self.status == NoteStatus::Recording;
        self.progress = update.progress.unwrap_or(0.0);
        self.message = update.message;
    }

    fn apply_result(&mut self, result: NoteResult) {
        self.recording = false;
        match result {
            NoteResult::NoteSummary(summary) => {
                let recording = Recording::from_summary(summary);
                info!("note session {} complete", recording.id);
                self.status = NoteStatus::Complete;
                self.progress = 100.0;
                self.message = None;
                self.recordings.retain(|r| r.id != recording.id);
                self.selected = Some(recording.id.clone());
                self.recordings.insert(0, recording);
            }
            NoteResult::Error { message } => {
                warn!(
                    "note pipeline error: {}",
                    message.as_deref().unwrap_or("unknown")
                );
                self.status = NoteStatus::Error;
                self.message = message;
            }
        }
    }
}

impl TopicConsumer for NoteSession {
    fn topics(&self) -> &'static [&'static str] {
        &[topics::NOTE_STATUS, topics::NOTE_RESULT]
    }

    fn apply(&mut self, topic: &str, payload: &str) -> Result<(), DecodeError> {
        match topic {
            topics::NOTE_STATUS => self.apply_status(decode_json(topic, payload)?),
            topics::NOTE_RESULT => self.apply_result(decode_json(topic, payload)?),
            other => return Err(unexpected_topic(other)),
        }
        Ok(())
    }
}
