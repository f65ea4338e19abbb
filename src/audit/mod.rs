//! Backend audit
//!
//! Sends each request of the topic catalogue once and checks that the agent
//! answers on the matching response topic with a payload the owning
//! consumer accepts.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info};

use crate::bus::BusHandle;
use crate::bus::dispatcher;
use crate::features::memory::ActivitySearch;
use crate::features::{
    AgentMonitor, DashboardView, MemoryBrowser, Personalization, Timeline, TopicConsumer,
};
use crate::topics::{self, ControlWord};

/// One request/response pair to exercise.
#[derive(Debug, Clone, Copy)]
pub struct Probe {
    pub name: &'static str,
    pub request: &'static str,
    pub response: &'static str,
    pub payload: fn() -> String,
    pub check: fn(&str, &str) -> Result<(), String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail(String),
    Timeout,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail(reason) => write!(f, "FAIL ({reason})"),
            Verdict::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn activity_search() -> String {
    serde_json::to_string(&ActivitySearch::default()).unwrap_or_default()
}

/// Accepts what a fresh `C` would accept, minus explicit agent errors.
fn accepted_by<C: TopicConsumer + Default>(topic: &str, payload: &str) -> Result<(), String> {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(payload) {
        if let Some(error) = map.get("error").and_then(|e| e.as_str()) {
            return Err(error.to_string());
        }
    }
    C::default().apply(topic, payload).map_err(|e| e.to_string())
}

pub const PROBES: &[Probe] = &[
    Probe {
        name: "dashboard_data",
        request: topics::DASHBOARD_REQUEST,
        response: topics::DASHBOARD_RESPONSE,
        payload: || ControlWord::Get.into(),
        check: accepted_by::<DashboardView>,
    },
    Probe {
        name: "dashboard_heartbeat",
        request: topics::AGENT_STATE_REQUEST,
        response: topics::AGENT_STATE,
        payload: || ControlWord::Ping.into(),
        check: accepted_by::<AgentMonitor>,
    },
    Probe {
        name: "battery",
        request: topics::BATTERY_REQUEST,
        response: topics::BATTERY_RESPONSE,
        payload: || ControlWord::Get.into(),
        check: accepted_by::<AgentMonitor>,
    },
    Probe {
        name: "memory_search",
        request: topics::MEMORY_ACTIVITY_SEARCH,
        response: topics::MEMORY_ACTIVITY_RESPONSE,
        payload: activity_search,
        check: accepted_by::<MemoryBrowser>,
    },
    Probe {
        name: "memory_stats",
        request: topics::MEMORY_STATS_REQUEST,
        response: topics::MEMORY_STATS_RESPONSE,
        payload: || ControlWord::Get.into(),
        check: accepted_by::<MemoryBrowser>,
    },
    Probe {
        name: "memory_base",
        request: topics::MEMORY_BASE_REQUEST,
        response: topics::MEMORY_BASE_RESPONSE,
        payload: || ControlWord::Get.into(),
        check: accepted_by::<MemoryBrowser>,
    },
    Probe {
        name: "memory_context",
        request: topics::MEMORY_CONTEXT_REQUEST,
        response: topics::MEMORY_CONTEXT_RESPONSE,
        payload: || ControlWord::Get.into(),
        check: accepted_by::<MemoryBrowser>,
    },
    Probe {
        name: "history",
        request: topics::HISTORY_REQUEST,
        response: topics::HISTORY_RESPONSE,
        payload: || ControlWord::CheckHistory.into(),
        check: accepted_by::<Timeline>,
    },
    Probe {
        name: "voices",
        request: topics::VOICE_LIST_REQUEST,
        response: topics::VOICE_LIST_RESPONSE,
        payload: || ControlWord::Get.into(),
        check: accepted_by::<Personalization>,
    },
];

impl Probe {
    pub fn judge(&self, payload: &str) -> Verdict {
        match (self.check)(self.response, payload) {
            Ok(()) => Verdict::Pass,
            Err(reason) => Verdict::Fail(reason),
        }
    }
}

/// Runs every probe at once and waits up to `limit` for the answers. The
/// first answer on a response topic decides the verdict of each probe
/// waiting on it.
pub async fn run(
    handle: &BusHandle,
    probes: &[Probe],
    limit: Duration,
) -> BTreeMap<&'static str, Verdict> {
    let (tx, mut rx) = mpsc::unbounded_channel::<(String, String)>();

    let mut response_topics: Vec<&str> = probes.iter().map(|p| p.response).collect();
    response_topics.sort_unstable();
    response_topics.dedup();

    let observers: Vec<_> = {
        let mut dispatcher = dispatcher::lock(handle.dispatcher());
        response_topics
            .iter()
            .map(|topic| {
                let tx = tx.clone();
                dispatcher.observe(topic, move |event| {
                    let _ = tx.send((event.topic.clone(), event.payload.clone()));
                })
            })
            .collect()
    };
    drop(tx);

    for probe in probes {
        info!("probing {} on {}", probe.name, probe.request);
        handle.publisher().publish(probe.request, (probe.payload)());
    }

    let mut verdicts = BTreeMap::new();
    let deadline = Instant::now() + limit;
    while verdicts.len() < probes.len() {
        match timeout_at(deadline, rx.recv()).await {
            Ok(Some((topic, payload))) => {
                debug!("audit received {}", topic);
                for probe in probes.iter().filter(|p| p.response == topic) {
                    verdicts
                        .entry(probe.name)
                        .or_insert_with(|| probe.judge(&payload));
                }
            }
            Ok(None) | Err(_) => break,
        }
    }
    for probe in probes {
        verdicts.entry(probe.name).or_insert(Verdict::Timeout);
    }

    let mut dispatcher = dispatcher::lock(handle.dispatcher());
    for id in observers {
        dispatcher.unobserve(id);
    }
    verdicts
}

#[cfg(test)]
mod tests;
