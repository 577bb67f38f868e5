//! Adapts an axum [`WebSocket`] into a hub [`Transport`].
//!
//! Ping and pong frames are answered by axum and never surface. A close
//! frame from the peer ends the inbound stream with
//! [`TransportError::ClosedByPeer`].

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt, future};

use crate::transport::{Frame, Transport, TransportError};

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Self::text(text),
            Frame::Binary(data) => Self::binary(data),
        }
    }
}

/// Maps one inbound WebSocket message to a hub frame, dropping control
/// frames.
fn inbound(message: Result<Message, axum::Error>) -> Option<Result<Frame, TransportError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
        Ok(Message::Binary(data)) => Some(Ok(Frame::Binary(data.to_vec()))),
        Ok(Message::Close(_)) => Some(Err(TransportError::ClosedByPeer)),
        Ok(Message::Ping(_) | Message::Pong(_)) => None,
        Err(err) => Some(Err(err.into())),
    }
}

impl From<WebSocket> for Transport {
    fn from(socket: WebSocket) -> Self {
        let (ws_tx, ws_rx) = socket.split();
        let sink = ws_tx
            .sink_map_err(TransportError::from)
            .with(|frame: Frame| future::ready(Ok::<Message, TransportError>(frame.into())));
        let stream = ws_rx.filter_map(|message| future::ready(inbound(message)));
        Self::new(sink, stream)
    }
}
