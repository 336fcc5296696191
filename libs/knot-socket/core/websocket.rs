//! tokio-tungstenite transport
//!
//! Each handle owns one socket task. The handle feeds it outbound messages
//! over an unbounded channel; the task reports everything it observes
//! through the handle's [`EventSink`].
//!
//! ```text
//! WsHandle ──Outbound──> socket task ──> WebSocket
//!                            │
//!                            └──TransportEvent──> EventSink
//! ```

use crate::traits::*;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::{self, http, Message};
use tracing::{debug, error, warn};
use url::Url;

/// Messages from the handle to its socket task
#[derive(Debug)]
enum Outbound {
    Text(String),
    Ping,
    Close,
}

/// WebSocket transport over tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WsTransport {
    fn open(
        &mut self,
        uri: &Url,
        options: &OpenOptions,
        sink: EventSink,
    ) -> Result<Box<dyn TransportHandle>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::new(format!("no tokio runtime: {}", e)))?;

        let mut request = uri
            .as_str()
            .into_client_request()
            .map_err(|e| KnotError::Configuration(format!("Failed to create request: {}", e)))?;

        if let Some(ref protocol) = options.protocol {
            let value = protocol.parse::<http::HeaderValue>().map_err(|_| {
                KnotError::Configuration(format!("Invalid protocol header value: {}", protocol))
            })?;
            request
                .headers_mut()
                .insert(http::header::SEC_WEBSOCKET_PROTOCOL, value);
        }

        let (outbound_tx, outbound_rx) = unbounded_channel();
        runtime.spawn(run_socket(
            request,
            options.connect_timeout,
            outbound_rx,
            sink,
        ));

        Ok(Box::new(WsHandle {
            outbound: outbound_tx,
            closed: false,
        }))
    }
}

/// Handle to one socket task
struct WsHandle {
    outbound: UnboundedSender<Outbound>,
    closed: bool,
}

impl WsHandle {
    fn push(&self, message: Outbound) -> Result<()> {
        if self.closed {
            return Err(KnotError::NotConnected);
        }
        self.outbound
            .send(message)
            .map_err(|_| TransportError::new("socket task stopped").into())
    }
}

impl TransportHandle for WsHandle {
    fn send(&mut self, payload: String) -> Result<()> {
        self.push(Outbound::Text(payload))
    }

    fn supports_ping(&self) -> bool {
        true
    }

    fn ping(&mut self) -> Result<()> {
        self.push(Outbound::Ping)
    }

    fn close(&mut self) {
        if !self.closed {
            let _ = self.outbound.send(Outbound::Close);
            self.closed = true;
        }
    }
}

/// Translate a tungstenite error into the transport error domain
fn transport_error(err: &tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
            TransportError::with_code(CONNECTION_REFUSED, io.to_string())
        }
        other => TransportError::new(other.to_string()),
    }
}

fn abnormal_close(sink: &EventSink, reason: impl Into<String>) {
    sink.emit(TransportEvent::Closed {
        code: CLOSE_ABNORMAL,
        reason: reason.into(),
    });
}

/// Socket task: handshake, then pump messages until either side closes
async fn run_socket(
    request: Request,
    connect_timeout: Duration,
    mut outbound_rx: UnboundedReceiver<Outbound>,
    sink: EventSink,
) {
    let generation = sink.generation();

    let ws_stream = match tokio::time::timeout(connect_timeout, connect_async(request)).await {
        Ok(Ok((ws_stream, _response))) => ws_stream,
        Ok(Err(tungstenite::Error::Http(response))) => {
            let status = response.status().as_u16();
            warn!(generation, status, "Server rejected the WebSocket upgrade");
            sink.emit(TransportEvent::UnexpectedResponse { status });
            abnormal_close(&sink, format!("unexpected response {}", status));
            return;
        }
        Ok(Err(e)) => {
            error!(generation, "Failed to connect: {}", e);
            sink.emit(TransportEvent::Error(transport_error(&e)));
            abnormal_close(&sink, e.to_string());
            return;
        }
        Err(_) => {
            let message = format!("opening handshake timed out after {:?}", connect_timeout);
            error!(generation, "{}", message);
            sink.emit(TransportEvent::Error(TransportError::with_code(
                HANDSHAKE_TIMEOUT,
                message.clone(),
            )));
            abnormal_close(&sink, message);
            return;
        }
    };

    if !sink.emit(TransportEvent::Opened) {
        return;
    }

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                let message = match outbound {
                    Some(Outbound::Text(text)) => Message::Text(text),
                    Some(Outbound::Ping) => Message::Ping(Vec::new()),
                    Some(Outbound::Close) | None => {
                        debug!(generation, "Closing socket");
                        let _ = write.send(Message::Close(None)).await;
                        return;
                    }
                };

                if let Err(e) = write.send(message).await {
                    error!(generation, "WebSocket send error: {}", e);
                    sink.emit(TransportEvent::Error(transport_error(&e)));
                    abnormal_close(&sink, e.to_string());
                    return;
                }
            }

            incoming = read.next() => {
                let event = match incoming {
                    Some(Ok(Message::Text(text))) => TransportEvent::Message(text),
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => TransportEvent::Message(text),
                        Err(_) => TransportEvent::Error(TransportError::new(
                            "received a binary message that is not UTF-8",
                        )),
                    },
                    Some(Ok(Message::Ping(payload))) => TransportEvent::Ping(payload),
                    Some(Ok(Message::Pong(payload))) => TransportEvent::Pong(payload),
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|frame| (u16::from(frame.code), frame.reason.into_owned()))
                            .unwrap_or((CLOSE_NO_STATUS, String::new()));
                        debug!(generation, code, "Server closed the connection");
                        // Flush the close reply queued by tungstenite
                        let _ = write.close().await;
                        sink.emit(TransportEvent::Closed { code, reason });
                        return;
                    }
                    Some(Ok(Message::Frame(_))) => continue,
                    Some(Err(e)) => {
                        error!(generation, "WebSocket error: {}", e);
                        sink.emit(TransportEvent::Error(transport_error(&e)));
                        abnormal_close(&sink, e.to_string());
                        return;
                    }
                    None => {
                        warn!(generation, "WebSocket stream closed");
                        abnormal_close(&sink, "stream ended");
                        return;
                    }
                };

                if !sink.emit(event) {
                    return;
                }
            }
        }
    }
}
