//! Third-party account linking.
//!
//! Connecting a service publishes `AUTH:<SERVICE>` on `/user1/0`. The agent
//! answers on `/user2/0` with an OAuth URL for the user to visit, and later
//! with `SUCCESS:<SERVICE>` or one of the error replies. A connect attempt
//! that hears nothing back is abandoned client-side after a timeout.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::dashboard::DashboardResponse;
use super::{Shared, TopicConsumer, decode_json, lock, unexpected_topic};
use crate::bus::Publisher;
use crate::topics;
use crate::utils::error::DecodeError;

/// Opens an authorization URL for the user.
pub trait UrlOpener: Send {
    fn open(&mut self, url: &str);
}

/// Prints the URL to the log for the user to follow.
#[derive(Debug, Default)]
pub struct LogOpener;

impl UrlOpener for LogOpener {
    fn open(&mut self, url: &str) {
        info!("open this URL to finish linking the account: {}", url);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthReply {
    Url(String),
    Success(String),
    Error(String),
    Busy,
    Timeout,
    Unknown(String),
    Other(String),
}

impl AuthReply {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with("http") {
            AuthReply::Url(raw.to_string())
        } else if let Some(service) = raw.strip_prefix("SUCCESS:") {
            AuthReply::Success(service.trim().to_string())
        } else if let Some(reason) = raw.strip_prefix("ERROR:") {
            AuthReply::Error(reason.trim().to_string())
        } else if raw == "AUTH_BUSY" {
            AuthReply::Busy
        } else if raw == "TIMEOUT" {
            AuthReply::Timeout
        } else if let Some(what) = raw.strip_prefix("UNKNOWN:") {
            AuthReply::Unknown(what.trim().to_string())
        } else {
            AuthReply::Other(raw.to_string())
        }
    }
}

impl std::fmt::Display for AuthReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthReply::Url(url) => f.write_str(url),
            AuthReply::Success(service) => write!(f, "SUCCESS:{service}"),
            AuthReply::Error(reason) => write!(f, "ERROR:{reason}"),
            AuthReply::Busy => f.write_str("AUTH_BUSY"),
            AuthReply::Timeout => f.write_str("TIMEOUT"),
            AuthReply::Unknown(what) => write!(f, "UNKNOWN:{what}"),
            AuthReply::Other(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// An auth request went out; carries the attempt number to arm a timeout.
    Started(u64),
    /// The service was linked and has been toggled off locally.
    Disconnected,
}

struct Pending {
    service: String,
    attempt: u64,
}

pub struct Integrations {
    connections: BTreeMap<String, bool>,
    pending: Option<Pending>,
    last_error: Option<String>,
    attempts: u64,
    opener: Box<dyn UrlOpener>,
}

impl Integrations {
    pub fn new(opener: Box<dyn UrlOpener>) -> Self {
        Self {
            connections: BTreeMap::new(),
            pending: None,
            last_error: None,
            attempts: 0,
            opener,
        }
    }

    pub fn connections(&self) -> &BTreeMap<String, bool> {
        &self.connections
    }

    pub fn is_connected(&self, service: &str) -> bool {
        self.connections.get(service).copied().unwrap_or(false)
    }

    /// Service whose auth flow is in progress.
    pub fn loading(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.service.as_str())
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Links `service`, or unlinks it locally when it is already linked.
    pub fn connect(&mut self, publisher: &Publisher, service: &str) -> ConnectOutcome {
        let service = service.trim().to_uppercase();
        if self.is_connected(&service) {
            info!("{} disconnected locally", service);
            self.connections.insert(service, false);
            return ConnectOutcome::Disconnected;
        }
        if let Some(pending) = &self.pending {
            debug!("abandoning pending auth for {}", pending.service);
        }

        self.attempts += 1;
        self.last_error = None;
        publisher.publish(topics::AUTH_REQUEST, format!("AUTH:{service}"));
        self.pending = Some(Pending {
            service,
            attempt: self.attempts,
        });
        ConnectOutcome::Started(self.attempts)
    }

    /// Abandons `attempt` if it is still the one waiting.
    pub fn expire(&mut self, attempt: u64) -> bool {
        match &self.pending {
            Some(pending) if pending.attempt == attempt => {
                warn!("no auth reply for {}; giving up", pending.service);
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    fn apply_reply(&mut self, reply: AuthReply) {
        match &reply {
            AuthReply::Url(url) => self.opener.open(url),
            AuthReply::Success(service) => {
                info!("{} linked", service);
                self.connections.insert(service.clone(), true);
                self.pending = None;
            }
            AuthReply::Other(text) => debug!("ignoring auth reply '{}'", text),
            AuthReply::Error(_) | AuthReply::Busy | AuthReply::Timeout | AuthReply::Unknown(_) => {
                warn!("authentication error: {}", reply);
                self.last_error = Some(reply.to_string());
                self.pending = None;
            }
        }
    }
}

impl std::fmt::Debug for Integrations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Integrations")
            .field("connections", &self.connections)
            .field("loading", &self.loading())
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl TopicConsumer for Integrations {
    fn topics(&self) -> &'static [&'static str] {
        &[topics::AUTH_RESPONSE, topics::DASHBOARD_RESPONSE]
    }

    fn apply(&mut self, topic: &str, payload: &str) -> Result<(), DecodeError> {
        match topic {
            topics::AUTH_RESPONSE => self.apply_reply(AuthReply::parse(payload)),
            topics::DASHBOARD_RESPONSE => {
                let response: DashboardResponse = decode_json(topic, payload)?;
                if let Some(integrations) = response.integrations {
                    self.connections = integrations;
                }
            }
            other => return Err(unexpected_topic(other)),
        }
        Ok(())
    }
}

/// Starts linking `service` and, when a request went out, arms the
/// client-side timeout for that attempt.
pub fn connect_with_timeout(
    integrations: &Shared<Integrations>,
    publisher: &Publisher,
    service: &str,
    after: Duration,
) -> (ConnectOutcome, Option<JoinHandle<()>>) {
    let outcome = lock(integrations).connect(publisher, service);
    let timer = match outcome {
        ConnectOutcome::Started(attempt) => {
            Some(arm_auth_timeout(integrations.clone(), attempt, after))
        }
        _ => None,
    };
    (outcome, timer)
}

pub fn arm_auth_timeout(
    integrations: Shared<Integrations>,
    attempt: u64,
    after: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        lock(&integrations).expire(attempt);
    })
}
