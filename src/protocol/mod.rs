//! The `protocol` module implements the subset of MQTT 3.1.1 a dashboard
//! client needs: session setup, batched subscription, QoS 0/1 publishing and
//! keepalive.
//!
//! Packets are encoded into and decoded from a [`bytes::BytesMut`] buffer so
//! a transport can feed partial frames and pull complete packets out as they
//! become available.

pub mod packet;

pub use packet::{
    ConnAck, Connect, ConnectReturnCode, Packet, Publish, QoS, SubAck, Subscribe,
    SubscribeReturnCode,
};

#[cfg(test)]
mod tests;
