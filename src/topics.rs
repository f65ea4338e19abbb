//! Topic catalogue shared with the Alex agent.
//!
//! Request topics are published by this client, response topics are
//! published by the agent. [`SUBSCRIPTIONS`] is the set subscribed on every
//! (re)connect.

pub const AUTH_REQUEST: &str = "/user1/0";
pub const AUTH_RESPONSE: &str = "/user2/0";

pub const NOTE_CONTROL: &str = "/note/1";
pub const NOTE_STATUS: &str = "/note/status";
pub const NOTE_RESULT: &str = "gacor/1";

pub const AGENT_STATE_REQUEST: &str = "alex/dashboard/state/request";
pub const AGENT_STATE: &str = "alex/dashboard/state";
pub const AGENT_CONTROL: &str = "/agent/1";
pub const AGENT_STATUS: &str = "/agent/status";

pub const DASHBOARD_REQUEST: &str = "dashboard/request";
pub const DASHBOARD_RESPONSE: &str = "dashboard/response";

pub const HISTORY_REQUEST: &str = "history/2";
pub const HISTORY_RESPONSE: &str = "history/1";

pub const MEMORY_ACTIVITY_SEARCH: &str = "memory/activity/search";
pub const MEMORY_ACTIVITY_RESPONSE: &str = "memory/activity/response";
pub const MEMORY_STATS_REQUEST: &str = "memory/stats/request";
pub const MEMORY_STATS_RESPONSE: &str = "memory/stats/response";
pub const MEMORY_BASE_REQUEST: &str = "memory/base/request";
pub const MEMORY_BASE_RESPONSE: &str = "memory/base/response";
pub const MEMORY_CONTEXT_REQUEST: &str = "memory/context/request";
pub const MEMORY_CONTEXT_RESPONSE: &str = "memory/context/response";

pub const VOICE_LIST_REQUEST: &str = "agent/voice/list";
pub const VOICE_LIST_RESPONSE: &str = "agent/voice/list/response";
pub const VOICE_SET: &str = "agent/voice/set";
pub const VOICE_STATUS: &str = "agent/voice/status";

pub const SUMMARY_REALTIME: &str = "agent/summary/realtime";
pub const TOPICS_CURRENT: &str = "agent/topics/current";

pub const BATTERY_REQUEST: &str = "device/battery/request";
pub const BATTERY_RESPONSE: &str = "device/battery/response";

/// Topics every dashboard session subscribes to, in subscription order.
pub const SUBSCRIPTIONS: &[&str] = &[
    AUTH_RESPONSE,
    NOTE_STATUS,
    NOTE_RESULT,
    AGENT_STATE,
    DASHBOARD_RESPONSE,
    HISTORY_RESPONSE,
    MEMORY_ACTIVITY_RESPONSE,
    MEMORY_STATS_RESPONSE,
    MEMORY_BASE_RESPONSE,
    MEMORY_CONTEXT_RESPONSE,
    AGENT_STATUS,
    VOICE_LIST_RESPONSE,
    VOICE_STATUS,
    SUMMARY_REALTIME,
    TOPICS_CURRENT,
    BATTERY_RESPONSE,
];

/// Bare-text command payloads. These are never JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlWord {
    Get,
    Ping,
    NoteOn,
    NoteOff,
    AgentOn,
    AgentOff,
    CheckHistory,
}

impl ControlWord {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlWord::Get => "GET",
            ControlWord::Ping => "ping",
            ControlWord::NoteOn => "NOTEON",
            ControlWord::NoteOff => "NOTEOFF",
            ControlWord::AgentOn => "AGENTON",
            ControlWord::AgentOff => "AGENTOFF",
            ControlWord::CheckHistory => "check_history",
        }
    }
}

impl From<ControlWord> for String {
    fn from(word: ControlWord) -> Self {
        word.as_str().to_string()
    }
}
