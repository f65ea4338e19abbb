//! In-memory transport used by tests to play the broker.
//!
//! Every successful `connect` hands the test a [`BrokerSide`] through which it
//! sees the packets the client sends and injects packets of its own.
//! Dropping the `BrokerSide` ends the client's stream, which the connection
//! loop treats as a lost link.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use url::Url;

use super::{Connector, Transport};
use crate::protocol::{ConnAck, ConnectReturnCode, Packet, QoS, SubAck, SubscribeReturnCode};
use crate::utils::error::TransportError;

pub(crate) struct StubTransport {
    to_broker: mpsc::UnboundedSender<Packet>,
    from_broker: mpsc::UnboundedReceiver<Packet>,
}

impl Transport for StubTransport {
    async fn send(&mut self, packet: Packet) -> Result<(), TransportError> {
        self.to_broker
            .send(packet)
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Result<Option<Packet>, TransportError> {
        Ok(self.from_broker.recv().await)
    }

    async fn close(&mut self) {
        self.from_broker.close();
    }
}

pub(crate) struct BrokerSide {
    pub(crate) inbound: mpsc::UnboundedReceiver<Packet>,
    pub(crate) outbound: mpsc::UnboundedSender<Packet>,
}

impl BrokerSide {
    pub(crate) async fn expect(&mut self) -> Packet {
        tokio::time::timeout(Duration::from_secs(5), self.inbound.recv())
            .await
            .expect("timed out waiting for a client packet")
            .expect("client stream closed")
    }

    pub(crate) fn send(&self, packet: Packet) {
        let _ = self.outbound.send(packet);
    }

    /// Plays CONNECT/CONNACK and SUBSCRIBE/SUBACK, returning the filters.
    pub(crate) async fn accept(&mut self) -> Vec<(String, QoS)> {
        match self.expect().await {
            Packet::Connect(_) => {}
            other => panic!("expected CONNECT, got {other:?}"),
        }
        self.send(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Accepted,
        }));
        match self.expect().await {
            Packet::Subscribe(subscribe) => {
                self.send(Packet::SubAck(SubAck {
                    pkid: subscribe.pkid,
                    codes: vec![
                        SubscribeReturnCode::Success(QoS::AtLeastOnce);
                        subscribe.filters.len()
                    ],
                }));
                subscribe.filters
            }
            other => panic!("expected SUBSCRIBE, got {other:?}"),
        }
    }
}

#[derive(Clone)]
pub(crate) struct StubConnector {
    pub(crate) attempts: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
    accepted: mpsc::UnboundedSender<BrokerSide>,
}

impl StubConnector {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<BrokerSide>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        (
            Self {
                attempts: Arc::new(AtomicUsize::new(0)),
                failures: Arc::new(AtomicUsize::new(0)),
                accepted,
            },
            rx,
        )
    }

    /// Makes the next `count` connect attempts fail with an I/O error.
    pub(crate) fn fail_next(&self, count: usize) {
        self.failures.fetch_add(count, Ordering::SeqCst);
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for StubConnector {
    type Transport = StubTransport;

    async fn connect(&self, _url: &Url) -> Result<StubTransport, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "stub refused",
            )));
        }

        let (to_broker, inbound) = mpsc::unbounded_channel();
        let (outbound, from_broker) = mpsc::unbounded_channel();
        let _ = self.accepted.send(BrokerSide { inbound, outbound });
        Ok(StubTransport {
            to_broker,
            from_broker,
        })
    }
}
