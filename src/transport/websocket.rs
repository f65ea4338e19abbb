//! WebSocket transport
//!
//! MQTT-over-WebSocket as brokers such as HiveMQ or Mosquitto expose it:
//! - the handshake requests the `mqtt` sub-protocol
//! - every outbound packet is sent as one binary frame
//! - inbound binary frames are appended to a buffer and complete packets are
//!   cut from it, since a frame may carry several packets or only part of one

use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use tungstenite::client::IntoClientRequest;
use tungstenite::http::HeaderValue;
use tungstenite::protocol::Message as WsMessage;
use url::Url;

use super::{Connector, Transport};
use crate::protocol::Packet;
use crate::utils::error::TransportError;

const SUBPROTOCOL_HEADER: &str = "Sec-WebSocket-Protocol";

#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self, url: &Url) -> Result<WsTransport, TransportError> {
        let mut request = url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert(SUBPROTOCOL_HEADER, HeaderValue::from_static("mqtt"));

        let (stream, response) = connect_async(request).await?;
        debug!("websocket handshake with {} -> {}", url, response.status());

        Ok(WsTransport {
            stream,
            buffer: BytesMut::new(),
        })
    }
}

pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    buffer: BytesMut,
}

impl Transport for WsTransport {
    async fn send(&mut self, packet: Packet) -> Result<(), TransportError> {
        let mut buf = BytesMut::new();
        packet.encode(&mut buf)?;
        self.stream.send(WsMessage::binary(buf.freeze())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Packet>, TransportError> {
        loop {
            if let Some(packet) = Packet::decode(&mut self.buffer)? {
                return Ok(Some(packet));
            }

            match self.stream.next().await {
                Some(Ok(WsMessage::Binary(data))) => self.buffer.extend_from_slice(&data),
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!("broker closed websocket: {:?}", frame);
                    return Ok(None);
                }
                // Pings are answered by tungstenite itself; text frames are not MQTT.
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("websocket close: {e}");
        }
    }
}
