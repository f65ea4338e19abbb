//! The `error` module defines the error types used within `alexbus`.
//!
//! Configuration problems surface as [`BusError`] when a connection is
//! initialized. Everything that can go wrong on a live link is a
//! [`ConnectionError`]; it is reported through lifecycle events and never
//! aborts the process. Payload problems are [`DecodeError`]s, owned by the
//! consumer that tried to interpret the payload.

use thiserror::Error;

use crate::protocol::ConnectReturnCode;

/// Errors reported synchronously by `ConnectionManager::initialize`.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("invalid broker url '{url}': {source}")]
    InvalidBrokerUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported broker url scheme '{0}' (expected ws or wss)")]
    UnsupportedScheme(String),
}

/// Failures of an established or in-progress broker session.
///
/// Cloneable so it can travel inside broadcast lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out waiting for the broker to accept the connection")]
    ConnectTimeout,

    #[error("broker rejected credentials: {0:?}")]
    AuthFailed(ConnectReturnCode),

    #[error("broker refused connection: {0:?}")]
    Refused(ConnectReturnCode),

    #[error("no PINGRESP within the keepalive interval")]
    KeepaliveTimeout,

    #[error("connection closed by broker")]
    ConnectionLost,

    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl ConnectionError {
    pub fn from_return_code(code: ConnectReturnCode) -> Self {
        match code {
            ConnectReturnCode::BadCredentials | ConnectReturnCode::NotAuthorized => {
                ConnectionError::AuthFailed(code)
            }
            other => ConnectionError::Refused(other),
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ConnectionError::AuthFailed(_))
    }
}

impl From<TransportError> for ConnectionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Protocol(e) => ConnectionError::Protocol(e.to_string()),
            TransportError::Closed => ConnectionError::ConnectionLost,
            other => ConnectionError::Transport(other.to_string()),
        }
    }
}

/// Errors raised by a [`crate::transport::Transport`] implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("transport closed")]
    Closed,
}

/// MQTT wire-format errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed remaining length")]
    MalformedRemainingLength,

    #[error("packet of {0} bytes exceeds the maximum size")]
    PayloadTooLarge(usize),

    #[error("unsupported packet type {0:#x}")]
    UnsupportedPacketType(u8),

    #[error("invalid qos {0}")]
    InvalidQos(u8),

    #[error("string field is not valid utf-8")]
    InvalidUtf8,

    #[error("string field longer than 65535 bytes")]
    StringTooLong,

    #[error("malformed packet: {0}")]
    Malformed(&'static str),
}

/// A payload could not be interpreted by the consumer of its topic.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid json on '{topic}': {source}")]
    Json {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected payload on '{topic}': {detail}")]
    Unexpected { topic: String, detail: String },
}

impl DecodeError {
    pub fn topic(&self) -> &str {
        match self {
            DecodeError::Json { topic, .. } | DecodeError::Unexpected { topic, .. } => topic,
        }
    }
}

/// Snapshot store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The health endpoint could not be read. Callers treat every variant as
/// "offline".
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("health request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("health endpoint returned {0}")]
    Status(reqwest::StatusCode),
}
