//! Common test utilities for knot-socket integration tests
//!
//! Provides a scripted in-memory transport, a local KNoT-speaking WebSocket
//! server and helpers for waiting on client events.

#![allow(dead_code)]

use crossbeam_channel::Receiver;
use futures::{SinkExt, StreamExt};
use knot_socket::{
    ClientEvent, EventSink, KnotError, OpenOptions, Result, Transport, TransportError,
    TransportEvent, TransportHandle, CLOSE_NORMAL,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// One `open` call observed by [`ScriptedTransport`]
pub struct Opened {
    pub uri: String,
    pub protocol: Option<String>,
    pub sink: EventSink,
    pub sent: Vec<String>,
    pub pings: usize,
    pub closed: bool,
}

#[derive(Default)]
struct Script {
    opens: Vec<Opened>,
    refuse_next: bool,
}

/// In-memory transport driven by the test
///
/// Every `open` is recorded together with its sink, so the test decides when
/// each handle opens, receives frames or closes.
#[derive(Clone)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
    supports_ping: bool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            script: Arc::default(),
            supports_ping: false,
        }
    }

    /// Handles created from now on advertise a ping primitive
    pub fn with_ping(mut self) -> Self {
        self.supports_ping = true;
        self
    }

    /// Make the next `open` fail synchronously
    pub fn refuse_next(&self) {
        self.script.lock().refuse_next = true;
    }

    pub fn open_count(&self) -> usize {
        self.script.lock().opens.len()
    }

    pub fn uri(&self, index: usize) -> String {
        self.script.lock().opens[index].uri.clone()
    }

    pub fn protocol(&self, index: usize) -> Option<String> {
        self.script.lock().opens[index].protocol.clone()
    }

    /// Payloads sent through handle `index`, decoded as JSON
    pub fn sent(&self, index: usize) -> Vec<Value> {
        self.script.lock().opens[index]
            .sent
            .iter()
            .map(|payload| serde_json::from_str(payload).expect("sent payload is JSON"))
            .collect()
    }

    pub fn pings(&self, index: usize) -> usize {
        self.script.lock().opens[index].pings
    }

    pub fn is_closed(&self, index: usize) -> bool {
        self.script.lock().opens[index].closed
    }

    /// Deliver a notification as handle `index`
    pub fn emit(&self, index: usize, event: TransportEvent) {
        let sink = self.script.lock().opens[index].sink.clone();
        sink.emit(event);
    }

    pub fn open(&self, index: usize) {
        self.emit(index, TransportEvent::Opened);
    }

    pub fn close(&self, index: usize, code: u16) {
        self.emit(
            index,
            TransportEvent::Closed {
                code,
                reason: String::new(),
            },
        );
    }

    pub fn message(&self, index: usize, raw: &str) {
        self.emit(index, TransportEvent::Message(raw.to_string()));
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ScriptedTransport {
    fn open(
        &mut self,
        uri: &Url,
        options: &OpenOptions,
        sink: EventSink,
    ) -> Result<Box<dyn TransportHandle>> {
        let mut script = self.script.lock();
        if script.refuse_next {
            script.refuse_next = false;
            return Err(TransportError::with_code(knot_socket::CONNECTION_REFUSED, "refused").into());
        }

        let index = script.opens.len();
        script.opens.push(Opened {
            uri: uri.to_string(),
            protocol: options.protocol.clone(),
            sink,
            sent: Vec::new(),
            pings: 0,
            closed: false,
        });

        Ok(Box::new(ScriptedHandle {
            index,
            script: self.script.clone(),
            supports_ping: self.supports_ping,
        }))
    }
}

struct ScriptedHandle {
    index: usize,
    script: Arc<Mutex<Script>>,
    supports_ping: bool,
}

impl TransportHandle for ScriptedHandle {
    fn send(&mut self, payload: String) -> Result<()> {
        let mut script = self.script.lock();
        let opened = &mut script.opens[self.index];
        if opened.closed {
            return Err(KnotError::NotConnected);
        }
        opened.sent.push(payload);
        Ok(())
    }

    fn supports_ping(&self) -> bool {
        self.supports_ping
    }

    fn ping(&mut self) -> Result<()> {
        self.script.lock().opens[self.index].pings += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.script.lock().opens[self.index].closed = true;
    }
}

/// Let the lifecycle task drain its queues
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Wait for the next event on `rx`, yielding to the runtime in between
pub async fn next_event(rx: &Receiver<ClientEvent>) -> Option<ClientEvent> {
    for _ in 0..256 {
        if let Ok(event) = rx.try_recv() {
            return Some(event);
        }
        tokio::task::yield_now().await;
    }
    None
}

/// Drain whatever is queued on `rx`
pub fn drain(rx: &Receiver<ClientEvent>) -> Vec<ClientEvent> {
    rx.try_iter().collect()
}

/// Command for [`KnotServer`] connections
#[derive(Debug)]
pub enum ServerCommand {
    Send(String),
    Close(u16),
}

/// A local WebSocket server speaking just enough KNoT for tests
///
/// Records text frames from the client and lets the test push frames or
/// close the most recent connection.
pub struct KnotServer {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    commands: Arc<Mutex<Option<mpsc::UnboundedSender<ServerCommand>>>>,
    shutdown: Arc<Notify>,
}

impl KnotServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let commands = Arc::new(Mutex::new(None));
        let shutdown = Arc::new(Notify::new());

        let server_received = received.clone();
        let server_commands = commands.clone();
        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let (tx, rx) = mpsc::unbounded_channel();
                                *server_commands.lock() = Some(tx);
                                tokio::spawn(Self::handle_connection(
                                    stream,
                                    rx,
                                    server_received.clone(),
                                ));
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = server_shutdown.notified() => break,
                }
            }
        });

        Self {
            addr,
            received,
            commands,
            shutdown,
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        mut commands: mpsc::UnboundedReceiver<ServerCommand>,
        received: Arc<Mutex<Vec<String>>>,
    ) {
        let ws_stream = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => received.lock().push(text),
                    Some(Ok(Message::Ping(payload))) => {
                        if write.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
                command = commands.recv() => match command {
                    Some(ServerCommand::Send(text)) => {
                        if write.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Some(ServerCommand::Close(code)) => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: "".into(),
                        };
                        let _ = write.send(Message::Close(Some(frame))).await;
                        // Wait for the client's close reply
                        while let Some(Ok(msg)) = read.next().await {
                            if msg.is_close() {
                                break;
                            }
                        }
                        break;
                    }
                    None => break,
                },
            }
        }
    }

    /// Hostname and port for `ConnectionOptions`
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Text frames received so far, decoded as JSON
    pub fn received(&self) -> Vec<Value> {
        self.received
            .lock()
            .iter()
            .filter_map(|text| serde_json::from_str(text).ok())
            .collect()
    }

    /// Wait until at least `count` frames have arrived
    pub async fn wait_for_frames(&self, count: usize) -> Vec<Value> {
        for _ in 0..200 {
            let frames = self.received();
            if frames.len() >= count {
                return frames;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.received()
    }

    pub fn send(&self, text: &str) {
        if let Some(tx) = self.commands.lock().as_ref() {
            let _ = tx.send(ServerCommand::Send(text.to_string()));
        }
    }

    pub fn close(&self, code: u16) {
        if let Some(tx) = self.commands.lock().as_ref() {
            let _ = tx.send(ServerCommand::Close(code));
        }
    }

    pub fn close_normally(&self) {
        self.close(CLOSE_NORMAL);
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for KnotServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Wait (in real time) for an event matching `predicate`
pub async fn wait_for<F>(rx: &Receiver<ClientEvent>, mut predicate: F) -> Option<ClientEvent>
where
    F: FnMut(&ClientEvent) -> bool,
{
    for _ in 0..300 {
        while let Ok(event) = rx.try_recv() {
            if predicate(&event) {
                return Some(event);
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    None
}
