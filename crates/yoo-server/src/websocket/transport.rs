//! Transport seam between the lifecycle core and the WebSocket.
//!
//! The core only ever writes through [`Transport`] and reads an
//! [`InboundFrame`] stream, so sessions can run over a mock in tests.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, Stream, StreamExt};
use tokio::sync::Mutex;

use crate::error::TransportError;

/// Frames the server writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Application payload.
    Text(String),
    /// Liveness probe.
    Ping,
}

/// Frames the server reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundFrame {
    /// UTF-8 payload.
    Text(String),
    /// Binary payload.
    Binary(Vec<u8>),
    /// Peer probe. Answered by the WebSocket layer.
    Ping,
    /// Answer to one of our probes.
    Pong,
    /// Peer initiated close.
    Close,
}

impl From<Message> for InboundFrame {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => Self::Text(text.to_string()),
            Message::Binary(data) => Self::Binary(data.to_vec()),
            Message::Ping(_) => Self::Ping,
            Message::Pong(_) => Self::Pong,
            Message::Close(_) => Self::Close,
        }
    }
}

/// Write half of a connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one frame.
    async fn send(&self, frame: OutboundFrame) -> Result<(), TransportError>;

    /// Close the connection. Called at most once per session.
    async fn close(&self) -> Result<(), TransportError>;
}

/// [`Transport`] over the send half of an axum `WebSocket`.
pub struct WsTransport {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, frame: OutboundFrame) -> Result<(), TransportError> {
        let msg = match frame {
            OutboundFrame::Text(text) => Message::Text(text.into()),
            OutboundFrame::Ping => Message::Ping(vec![].into()),
        };
        self.sink
            .lock()
            .await
            .send(msg)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| TransportError::Close(e.to_string()))
    }
}

/// Split an upgraded socket into a [`WsTransport`] and an inbound stream.
pub fn split_socket(
    socket: WebSocket,
) -> (
    WsTransport,
    impl Stream<Item = Result<InboundFrame, TransportError>> + Send + Unpin + 'static,
) {
    let (sink, stream) = socket.split();
    let inbound = stream.map(|res| {
        res.map(InboundFrame::from)
            .map_err(|e| TransportError::Receive(e.to_string()))
    });
    (
        WsTransport {
            sink: Mutex::new(sink),
        },
        inbound,
    )
}
