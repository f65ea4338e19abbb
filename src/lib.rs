//! # alexbus
//!
//! `alexbus` is the message-bus client core of the Alex assistant dashboard.
//! It keeps one MQTT 3.1.1 session open to a broker over WebSocket, routes
//! every inbound message to the feature that understands its topic and
//! sends rate-limited requests back to the agent.
//!
//! ## Core Modules
//!
//! - `bus`: Connection lifecycle, subscription registry, inbound dispatcher and outbound publisher.
//! - `features`: One topic consumer per dashboard area, turning payloads into typed state.
//! - `topics`: The topic catalogue shared with the agent.
//! - `protocol`: The MQTT packet codec.
//! - `transport`: Carries packets over a WebSocket.
//! - `health`: HTTP health probe for the agent bridge.
//! - `persistence`: Optional sled snapshot of last-known values.
//! - `audit`: Round-trips every request of the catalogue against a live agent.
//! - `config`: Loads settings from files and the environment.
//! - `utils`: Logging setup and error types.

pub mod audit;
pub mod bus;
pub mod config;
pub mod features;
pub mod health;
pub mod persistence;
pub mod protocol;
pub mod topics;
pub mod transport;
pub mod utils;
