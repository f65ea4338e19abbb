use url::Url;

use super::stub::StubConnector;
use super::{Connector, Transport, WsConnector};
use crate::protocol::Packet;
use crate::utils::error::TransportError;

#[tokio::test]
async fn test_stub_carries_packets_both_ways() {
    let (connector, mut accepted) = StubConnector::new();
    let url = Url::parse("ws://stub/mqtt").unwrap();

    let mut transport = connector.connect(&url).await.unwrap();
    let mut broker = accepted.recv().await.unwrap();

    transport.send(Packet::PingReq).await.unwrap();
    assert_eq!(broker.expect().await, Packet::PingReq);

    broker.send(Packet::PingResp);
    assert_eq!(transport.recv().await.unwrap(), Some(Packet::PingResp));

    drop(broker);
    assert_eq!(transport.recv().await.unwrap(), None);
    assert!(matches!(
        transport.send(Packet::PingReq).await,
        Err(TransportError::Closed)
    ));
}

#[tokio::test]
async fn test_stub_can_refuse_connections() {
    let (connector, _accepted) = StubConnector::new();
    let url = Url::parse("ws://stub/mqtt").unwrap();
    connector.fail_next(1);

    assert!(connector.connect(&url).await.is_err());
    assert!(connector.connect(&url).await.is_ok());
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test]
async fn test_ws_connector_reports_unreachable_broker() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let url = Url::parse(&format!("ws://127.0.0.1:{port}/mqtt")).unwrap();

    assert!(WsConnector.connect(&url).await.is_err());
}
