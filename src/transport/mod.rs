//! The `transport` module is responsible for carrying MQTT packets between
//! this client and the broker.
//!
//! The connection loop only talks to the [`Connector`] and [`Transport`]
//! traits. The production implementation tunnels MQTT over a WebSocket
//! (`ws://` or `wss://`, sub-protocol `mqtt`); tests plug in an in-memory
//! stub that lets them play the broker side.

use std::future::Future;

use url::Url;

use crate::protocol::Packet;
use crate::utils::error::TransportError;

pub mod websocket;

#[cfg(test)]
pub(crate) mod stub;

pub use websocket::{WsConnector, WsTransport};

/// An established, bidirectional packet stream to the broker.
pub trait Transport: Send {
    fn send(&mut self, packet: Packet) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Next packet from the broker; `Ok(None)` once the stream has ended.
    ///
    /// Must be cancel-safe: the connection loop polls it inside `select!`.
    fn recv(&mut self) -> impl Future<Output = Result<Option<Packet>, TransportError>> + Send;

    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Opens new [`Transport`]s; called once per (re)connect attempt.
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport + 'static;

    fn connect(
        &self,
        url: &Url,
    ) -> impl Future<Output = Result<Self::Transport, TransportError>> + Send;
}

#[cfg(test)]
mod tests;
