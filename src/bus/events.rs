use crate::utils::error::ConnectionError;

/// Lifecycle notifications broadcast by the connection loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// CONNACK accepted and the subscription set has been issued.
    Connected,
    /// An established link was lost.
    Disconnected,
    /// A new attempt will be made after the reconnect interval.
    Reconnecting { attempt: u32 },
    Error(ConnectionError),
}
