//! Connection lifecycle
//!
//! # State machine
//!
//! ```text
//!            connect()                 Opened                identity sent
//! CLOSED ─────────────> CONNECTING ──────────> AUTHENTICATING ─────────────> READY
//!   ↑                      ↑                                                   │
//!   │ close() / Closed(1000)│ reconnect deadline                               │ Closed(≠1000)
//!   │                      │                                                   │ error frame (transient)
//!   └──────────────────── RECONNECTING <───────────────────────────────────────┘
//! ```
//!
//! `Lifecycle` is the single owner of the transport handle, the reconnection
//! strategy and the keepalive monitor. It is driven by one task (see
//! `client::run_lifecycle`) and never locks.
//!
//! # Generations
//!
//! Every handle is opened with a sink stamped with the current generation.
//! The generation advances whenever a handle is retired (explicit close,
//! reconnect scheduling, new connect), so late notifications from a dead
//! handle and reconnect timers that outlived an explicit close are both
//! recognised as stale and ignored.

use super::codec::Frame;
use super::commands::Request;
use super::config::ConnectionOptions;
use super::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use super::heartbeat::{KeepaliveMonitor, KeepaliveStart};
use super::router::{route_frame, ClientEvent, EventRouter, Routed};
use crate::traits::*;
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// A scheduled reconnect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingReconnect {
    /// Generation that was current when the reconnect was scheduled
    pub generation: u64,
    pub deadline: Instant,
}

/// Receiving end of transport notifications
pub type TransportEvents = UnboundedReceiver<(u64, TransportEvent)>;

/// Connection lifecycle state machine
pub struct Lifecycle {
    options: ConnectionOptions,
    transport: Box<dyn Transport>,
    strategy: Box<dyn ReconnectionStrategy>,
    /// Exclusively owned; replaced wholesale on every connect
    handle: Option<Box<dyn TransportHandle>>,
    generation: u64,
    state: ConnectionState,
    shared_state: Arc<AtomicConnectionState>,
    metrics: Arc<AtomicMetrics>,
    keepalive: KeepaliveMonitor,
    pending_reconnect: Option<PendingReconnect>,
    router: EventRouter,
    events_tx: UnboundedSender<(u64, TransportEvent)>,
}

impl Lifecycle {
    /// Create a closed lifecycle
    ///
    /// Returns the receiver on which transport handles will report.
    pub fn new(
        options: ConnectionOptions,
        transport: Box<dyn Transport>,
        strategy: Box<dyn ReconnectionStrategy>,
    ) -> (Self, TransportEvents) {
        let (events_tx, events_rx) = unbounded_channel();
        let keepalive =
            KeepaliveMonitor::new(options.keepalive_interval(), options.keepalive_idle_timeout());

        let lifecycle = Self {
            options,
            transport,
            strategy,
            handle: None,
            generation: 0,
            state: ConnectionState::Closed,
            shared_state: Arc::new(AtomicConnectionState::default()),
            metrics: Arc::new(AtomicMetrics::new()),
            keepalive,
            pending_reconnect: None,
            router: EventRouter::new(),
            events_tx,
        };
        (lifecycle, events_rx)
    }

    /// State cell readable from other tasks
    pub fn shared_state(&self) -> Arc<AtomicConnectionState> {
        Arc::clone(&self.shared_state)
    }

    /// Counters readable from other tasks
    pub fn metrics(&self) -> Arc<AtomicMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn retry_count(&self) -> u32 {
        self.strategy.retry_count()
    }

    pub fn has_handle(&self) -> bool {
        self.handle.is_some()
    }

    pub fn pending_reconnect(&self) -> Option<PendingReconnect> {
        self.pending_reconnect
    }

    pub fn keepalive(&self) -> &KeepaliveMonitor {
        &self.keepalive
    }

    pub fn subscribe(&mut self, name: impl Into<String>) -> Receiver<ClientEvent> {
        self.router.subscribe(name)
    }

    pub fn subscribe_all(&mut self) -> Receiver<ClientEvent> {
        self.router.subscribe_all()
    }

    pub fn add_subscriber(&mut self, name: Option<String>, tx: Sender<ClientEvent>) {
        self.router.add_subscriber(name, tx);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(generation = self.generation, "State {} -> {}", self.state, state);
        }
        self.state = state;
        self.shared_state.set(state);
    }

    /// Open a new transport handle
    ///
    /// Any existing handle is closed first. Retry and backoff state are left
    /// untouched; only a successful authentication resets them.
    pub fn connect(&mut self) -> Result<()> {
        self.retire_handle();
        self.pending_reconnect = None;

        let uri = match self.options.uri() {
            Ok(uri) => uri,
            Err(e) => {
                self.set_state(ConnectionState::Closed);
                return Err(e);
            }
        };

        info!(generation = self.generation, "Connecting to {}", uri);
        self.set_state(ConnectionState::Connecting);

        let sink = EventSink::new(self.generation, self.events_tx.clone());
        match self.transport.open(&uri, &self.options.open_options(), sink) {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                error!("Failed to open transport: {}", e);
                self.set_state(ConnectionState::Closed);
                Err(e)
            }
        }
    }

    /// Close the connection
    ///
    /// No-op when already closed. Cancels a pending reconnect. When a live
    /// handle is closed, subscribers see a normal `close` event; the handle's
    /// own notification is dropped with its generation.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }

        info!(generation = self.generation, "Closing connection");
        let had_handle = self.handle.is_some();
        self.retire_handle();
        self.pending_reconnect = None;
        self.set_state(ConnectionState::Closed);

        if had_handle {
            self.router.emit(ClientEvent::Close {
                code: CLOSE_NORMAL,
                reason: String::new(),
            });
        }
    }

    /// Send a request
    pub fn send(&mut self, request: Request) -> Result<()> {
        self.send_frame(request.into_frame())
    }

    fn send_frame(&mut self, frame: Frame) -> Result<()> {
        if !self.state.is_open() {
            return Err(KnotError::NotConnected);
        }
        let Some(handle) = self.handle.as_mut() else {
            return Err(KnotError::NotConnected);
        };

        let payload = frame.encode()?;
        debug!(kind = %frame.kind, "Sending frame");
        handle.send(payload)?;
        self.metrics.increment_sent();
        Ok(())
    }

    /// Process a notification from a transport handle
    pub fn handle_transport_event(&mut self, generation: u64, event: TransportEvent) {
        if generation != self.generation {
            debug!(
                generation,
                current = self.generation,
                "Dropping notification from retired handle"
            );
            return;
        }

        if let TransportEvent::Message(raw) = &event {
            self.on_message(raw);
            return;
        }

        if let Some(proxied) = ClientEvent::proxied(&event) {
            self.router.emit(proxied);
        }

        match event {
            TransportEvent::Opened => self.on_open(),
            TransportEvent::Closed { code, reason } => self.on_close(code, &reason),
            TransportEvent::Pong(_) => self.keepalive.record_pong(Instant::now()),
            TransportEvent::Error(err) => error!("Transport error: {}", err),
            TransportEvent::UnexpectedResponse { status } => {
                warn!(status, "Unexpected response to handshake")
            }
            TransportEvent::Ping(_) | TransportEvent::Message(_) => {}
        }
    }

    fn on_open(&mut self) {
        info!(generation = self.generation, "Connected, sending identity");
        self.set_state(ConnectionState::Authenticating);

        let identity = Request::Identity(self.options.credentials());
        match self.send(identity) {
            Ok(()) => {
                self.strategy.reset();
                self.set_state(ConnectionState::Ready);
            }
            Err(e) => {
                error!("Failed to send identity: {}", e);
                self.router.emit(ClientEvent::Error(e));
            }
        }

        let supports_ping = self
            .handle
            .as_ref()
            .map(|handle| handle.supports_ping())
            .unwrap_or(false);
        match self.keepalive.start(supports_ping, Instant::now()) {
            KeepaliveStart::Started => {}
            KeepaliveStart::AlreadyRunning => debug!("Keepalive already running"),
            KeepaliveStart::Unsupported => warn!(
                generation = self.generation,
                "Transport has no ping primitive, keepalive unavailable"
            ),
        }
    }

    fn on_close(&mut self, code: u16, reason: &str) {
        if code == CLOSE_NORMAL {
            info!(generation = self.generation, "Connection closed normally");
            self.retire_handle();
            self.set_state(ConnectionState::Closed);
            return;
        }

        warn!(code, reason, "Connection closed abnormally");
        self.schedule_reconnect();
    }

    fn on_message(&mut self, raw: &str) {
        self.metrics.increment_received();

        let frame = match Frame::decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Decode error: {}", e);
                self.router.emit(ClientEvent::Error(e));
                return;
            }
        };

        debug!(kind = %frame.kind, "Received frame");
        match route_frame(frame, raw) {
            Routed::Emit(event) => self.router.emit(event),
            Routed::Reconnect { code } => {
                warn!(code = %code, "Server reported a transient failure, reconnecting");
                self.schedule_reconnect();
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        self.retire_handle();

        let attempt = self.strategy.retry_count().saturating_add(1);
        let delay = self.strategy.next_delay();
        self.router.emit(ClientEvent::Reconnect { attempt, delay });

        info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting in {:?}",
            delay
        );
        self.pending_reconnect = Some(PendingReconnect {
            generation: self.generation,
            deadline: Instant::now() + delay,
        });
        self.metrics.increment_reconnects();
        self.set_state(ConnectionState::Reconnecting);
    }

    /// Run a reconnect scheduled under `generation`
    ///
    /// Stale timers (the lifecycle was closed or reconnected meanwhile) are
    /// ignored.
    pub fn fire_reconnect(&mut self, generation: u64) {
        match self.pending_reconnect {
            Some(pending) if pending.generation == generation && generation == self.generation => {}
            _ => {
                debug!(generation, "Ignoring stale reconnect timer");
                return;
            }
        }
        self.pending_reconnect = None;

        if let Err(e) = self.connect() {
            self.router.emit(ClientEvent::Error(e));
            self.schedule_reconnect();
        }
    }

    /// Run a keepalive probe if one is due
    pub fn on_keepalive_tick(&mut self) {
        let Some(probe) = self.keepalive.on_tick(Instant::now()) else {
            return;
        };

        if let Some(idle) = probe.idle_timeout {
            self.router.emit(ClientEvent::Error(KnotError::LivenessTimeout { idle }));
        }

        let result = match self.handle.as_mut() {
            Some(handle) => handle.ping(),
            None => Err(KnotError::NotConnected),
        };
        if let Err(e) = result {
            warn!("Failed to send ping: {}", e);
            self.router.emit(ClientEvent::Error(KnotError::Probe(e.to_string())));
        }
    }

    /// Stop keepalive, close the handle and retire its generation
    fn retire_handle(&mut self) {
        self.keepalive.stop();
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::commands::Credentials;
    use crate::core::config::Scheme;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::time::Duration;
    use url::Url;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Open(String),
        Send(u64, String),
        Ping(u64),
        Close(u64),
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Op>>>);

    impl Recorder {
        fn push(&self, op: Op) {
            self.0.lock().push(op);
        }

        fn ops(&self) -> Vec<Op> {
            self.0.lock().clone()
        }

        fn sent(&self) -> Vec<Value> {
            self.ops()
                .into_iter()
                .filter_map(|op| match op {
                    Op::Send(_, payload) => serde_json::from_str(&payload).ok(),
                    _ => None,
                })
                .collect()
        }
    }

    struct MockTransport {
        recorder: Recorder,
        supports_ping: bool,
    }

    struct MockHandle {
        generation: u64,
        recorder: Recorder,
        supports_ping: bool,
    }

    impl Transport for MockTransport {
        fn open(
            &mut self,
            uri: &Url,
            _options: &OpenOptions,
            sink: EventSink,
        ) -> Result<Box<dyn TransportHandle>> {
            self.recorder.push(Op::Open(uri.to_string()));
            Ok(Box::new(MockHandle {
                generation: sink.generation(),
                recorder: self.recorder.clone(),
                supports_ping: self.supports_ping,
            }))
        }
    }

    impl TransportHandle for MockHandle {
        fn send(&mut self, payload: String) -> Result<()> {
            self.recorder.push(Op::Send(self.generation, payload));
            Ok(())
        }

        fn supports_ping(&self) -> bool {
            self.supports_ping
        }

        fn ping(&mut self) -> Result<()> {
            self.recorder.push(Op::Ping(self.generation));
            Ok(())
        }

        fn close(&mut self) {
            self.recorder.push(Op::Close(self.generation));
        }
    }

    fn lifecycle(supports_ping: bool) -> (Lifecycle, Recorder) {
        let recorder = Recorder::default();
        let options = ConnectionOptions::new("localhost")
            .with_port(3004)
            .with_scheme(Scheme::Ws)
            .with_credentials("dev-1", "tok-abc");
        let transport = MockTransport {
            recorder: recorder.clone(),
            supports_ping,
        };
        let strategy = ExponentialBackoff::seeded(1.0, 32.0, 42);
        let (lifecycle, _events) = Lifecycle::new(options, Box::new(transport), Box::new(strategy));
        (lifecycle, recorder)
    }

    fn open(lifecycle: &mut Lifecycle) {
        lifecycle.connect().unwrap();
        let generation = lifecycle.generation();
        lifecycle.handle_transport_event(generation, TransportEvent::Opened);
    }

    fn abnormal_close(lifecycle: &mut Lifecycle) {
        let generation = lifecycle.generation();
        lifecycle.handle_transport_event(
            generation,
            TransportEvent::Closed { code: CLOSE_ABNORMAL, reason: String::new() },
        );
    }

    #[test]
    fn test_identity_is_first_frame() {
        let (mut lifecycle, recorder) = lifecycle(false);
        open(&mut lifecycle);

        assert_eq!(lifecycle.state(), ConnectionState::Ready);
        assert_eq!(recorder.ops()[0], Op::Open("ws://localhost:3004/ws".into()));
        let sent = recorder.sent();
        assert_eq!(sent[0], json!({ "type": "identity", "data": { "id": "dev-1", "token": "tok-abc" } }));
    }

    #[test]
    fn test_connect_closes_existing_handle_first() {
        let (mut lifecycle, recorder) = lifecycle(false);
        lifecycle.connect().unwrap();
        let first = lifecycle.generation();
        lifecycle.connect().unwrap();

        let ops = recorder.ops();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[1], Op::Close(first));
        assert!(matches!(ops[2], Op::Open(_)));
        assert_ne!(lifecycle.generation(), first);
    }

    #[test]
    fn test_close_when_closed_is_noop() {
        let (mut lifecycle, recorder) = lifecycle(false);
        let events = lifecycle.subscribe_all();

        lifecycle.close();

        assert!(recorder.ops().is_empty());
        assert!(events.try_recv().is_err());
        assert_eq!(lifecycle.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_close_tears_down() {
        let (mut lifecycle, recorder) = lifecycle(true);
        open(&mut lifecycle);
        let generation = lifecycle.generation();
        assert!(lifecycle.keepalive().is_running());

        lifecycle.close();

        assert_eq!(lifecycle.state(), ConnectionState::Closed);
        assert!(!lifecycle.has_handle());
        assert!(!lifecycle.keepalive().is_running());
        assert_eq!(recorder.ops().last(), Some(&Op::Close(generation)));
    }

    #[test]
    fn test_close_emits_normal_close_once() {
        let (mut lifecycle, _recorder) = lifecycle(false);
        let closes = lifecycle.subscribe("close");
        open(&mut lifecycle);
        let generation = lifecycle.generation();

        lifecycle.close();
        // The retired handle's own close notification arrives late
        lifecycle.handle_transport_event(
            generation,
            TransportEvent::Closed { code: CLOSE_NORMAL, reason: String::new() },
        );
        lifecycle.close();

        assert_eq!(
            closes.try_iter().collect::<Vec<_>>(),
            vec![ClientEvent::Close { code: CLOSE_NORMAL, reason: String::new() }]
        );
    }

    #[test]
    fn test_send_while_disconnected_fails() {
        let (mut lifecycle, recorder) = lifecycle(false);
        let result = lifecycle.send(Request::Activate { id: "abc".into() });
        assert_eq!(result, Err(KnotError::NotConnected));

        // Handle exists but has not opened yet
        lifecycle.connect().unwrap();
        let result = lifecycle.send(Request::Activate { id: "abc".into() });
        assert_eq!(result, Err(KnotError::NotConnected));
        assert!(recorder.sent().is_empty());
    }

    #[test]
    fn test_normal_close_is_terminal() {
        let (mut lifecycle, _recorder) = lifecycle(false);
        let reconnects = lifecycle.subscribe("reconnect");
        let closes = lifecycle.subscribe("close");
        open(&mut lifecycle);

        let generation = lifecycle.generation();
        lifecycle.handle_transport_event(
            generation,
            TransportEvent::Closed { code: CLOSE_NORMAL, reason: "bye".into() },
        );

        assert_eq!(lifecycle.state(), ConnectionState::Closed);
        assert!(lifecycle.pending_reconnect().is_none());
        assert!(reconnects.try_recv().is_err());
        assert_eq!(
            closes.try_recv().unwrap(),
            ClientEvent::Close { code: CLOSE_NORMAL, reason: "bye".into() }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_abnormal_close_schedules_reconnect() {
        let (mut lifecycle, recorder) = lifecycle(false);
        let reconnects = lifecycle.subscribe("reconnect");
        open(&mut lifecycle);
        let generation = lifecycle.generation();

        let before = Instant::now();
        abnormal_close(&mut lifecycle);

        assert_eq!(lifecycle.state(), ConnectionState::Reconnecting);
        assert_eq!(lifecycle.retry_count(), 1);
        assert_eq!(recorder.ops().last(), Some(&Op::Close(generation)));

        let pending = lifecycle.pending_reconnect().unwrap();
        assert!(pending.deadline - before < FIRST_RETRY_WINDOW);
        match reconnects.try_recv().unwrap() {
            ClientEvent::Reconnect { attempt, delay } => {
                assert_eq!(attempt, 1);
                assert_eq!(pending.deadline, before + delay);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        lifecycle.fire_reconnect(pending.generation);
        assert_eq!(lifecycle.state(), ConnectionState::Connecting);
        assert!(matches!(recorder.ops().last(), Some(Op::Open(_))));
    }

    #[test]
    fn test_authentication_resets_backoff() {
        let (mut lifecycle, _recorder) = lifecycle(false);
        open(&mut lifecycle);

        for _ in 0..4 {
            abnormal_close(&mut lifecycle);
            let pending = lifecycle.pending_reconnect().unwrap();
            lifecycle.fire_reconnect(pending.generation);
        }
        assert_eq!(lifecycle.retry_count(), 4);

        // Opening alone is not enough; the reset happens once identity is sent
        let generation = lifecycle.generation();
        lifecycle.handle_transport_event(generation, TransportEvent::Opened);
        assert_eq!(lifecycle.retry_count(), 0);
        assert_eq!(lifecycle.state(), ConnectionState::Ready);
    }

    #[test]
    fn test_close_cancels_pending_reconnect() {
        let (mut lifecycle, recorder) = lifecycle(false);
        open(&mut lifecycle);
        abnormal_close(&mut lifecycle);
        let pending = lifecycle.pending_reconnect().unwrap();

        lifecycle.close();
        let ops_after_close = recorder.ops().len();
        lifecycle.fire_reconnect(pending.generation);

        assert_eq!(lifecycle.state(), ConnectionState::Closed);
        assert_eq!(recorder.ops().len(), ops_after_close);
    }

    #[test]
    fn test_retired_handle_notifications_are_dropped() {
        let (mut lifecycle, _recorder) = lifecycle(false);
        let events = lifecycle.subscribe_all();
        open(&mut lifecycle);
        let old = lifecycle.generation();
        abnormal_close(&mut lifecycle);
        while events.try_recv().is_ok() {}

        lifecycle.handle_transport_event(old, TransportEvent::Message(r#"{"type":"late"}"#.into()));
        lifecycle.handle_transport_event(
            old,
            TransportEvent::Closed { code: CLOSE_ABNORMAL, reason: String::new() },
        );

        assert!(events.try_recv().is_err());
        assert_eq!(lifecycle.retry_count(), 1);
    }

    #[test]
    fn test_frames_are_emitted_by_type() {
        let (mut lifecycle, _recorder) = lifecycle(false);
        let registered = lifecycle.subscribe("registered");
        open(&mut lifecycle);

        let generation = lifecycle.generation();
        lifecycle.handle_transport_event(
            generation,
            TransportEvent::Message(r#"{"type":"registered","data":{"id":"abc"}}"#.into()),
        );

        assert_eq!(
            registered.try_recv().unwrap(),
            ClientEvent::Frame { kind: "registered".into(), data: json!({ "id": "abc" }) }
        );
    }

    #[test]
    fn test_decode_error_surfaces_only_error() {
        let (mut lifecycle, _recorder) = lifecycle(false);
        open(&mut lifecycle);
        let events = lifecycle.subscribe_all();

        let generation = lifecycle.generation();
        let raw = r#"{"data":{"id":"abc"}}"#;
        lifecycle.handle_transport_event(generation, TransportEvent::Message(raw.into()));

        match events.try_recv().unwrap() {
            ClientEvent::Error(KnotError::Decode { frame, .. }) => assert_eq!(frame, raw),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(events.try_recv().is_err());
        assert_eq!(lifecycle.state(), ConnectionState::Ready);
    }

    #[test]
    fn test_transient_error_frame_reconnects_without_error_event() {
        let (mut lifecycle, _recorder) = lifecycle(false);
        open(&mut lifecycle);
        let errors = lifecycle.subscribe("error");
        let reconnects = lifecycle.subscribe("reconnect");

        let generation = lifecycle.generation();
        lifecycle.handle_transport_event(
            generation,
            TransportEvent::Message(
                r#"{"type":"error","data":{"message":"refused","code":"ECONNREFUSED"}}"#.into(),
            ),
        );

        assert!(errors.try_recv().is_err());
        assert!(reconnects.try_recv().is_ok());
        assert_eq!(lifecycle.state(), ConnectionState::Reconnecting);
    }

    #[test]
    fn test_unrecognised_error_frame_is_surfaced() {
        let (mut lifecycle, _recorder) = lifecycle(false);
        open(&mut lifecycle);
        let errors = lifecycle.subscribe("error");

        let generation = lifecycle.generation();
        let raw = r#"{"type":"error","data":{"message":"Forbidden","code":"EPERM"}}"#;
        lifecycle.handle_transport_event(generation, TransportEvent::Message(raw.into()));

        let err = match errors.try_recv().unwrap() {
            ClientEvent::Error(err) => err,
            other => panic!("unexpected event: {:?}", other),
        };
        assert_eq!(err.frame(), Some(raw));
        assert_eq!(err.code(), Some("EPERM"));
        assert_eq!(lifecycle.state(), ConnectionState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_probes_and_records_pong() {
        let (mut lifecycle, recorder) = lifecycle(true);
        open(&mut lifecycle);
        let generation = lifecycle.generation();

        tokio::time::advance(Duration::from_secs(15)).await;
        lifecycle.on_keepalive_tick();
        assert_eq!(recorder.ops().last(), Some(&Op::Ping(generation)));

        lifecycle.handle_transport_event(generation, TransportEvent::Pong(vec![]));
        assert_eq!(lifecycle.keepalive().last_pong_at(), Some(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_timeout_is_reported_but_does_not_reconnect() {
        let (mut lifecycle, _recorder) = lifecycle(true);
        open(&mut lifecycle);
        let errors = lifecycle.subscribe("error");

        tokio::time::advance(Duration::from_secs(301)).await;
        lifecycle.on_keepalive_tick();

        assert!(matches!(
            errors.try_recv().unwrap(),
            ClientEvent::Error(KnotError::LivenessTimeout { .. })
        ));
        // Emit-only: the connection stays up until the transport itself gives up
        assert_eq!(lifecycle.state(), ConnectionState::Ready);
        assert!(lifecycle.pending_reconnect().is_none());
    }

    #[test]
    fn test_keepalive_unavailable_without_ping() {
        let (mut lifecycle, _recorder) = lifecycle(false);
        open(&mut lifecycle);
        assert!(!lifecycle.keepalive().is_running());
        assert_eq!(lifecycle.state(), ConnectionState::Ready);
    }

    #[test]
    fn test_identity_uses_current_credentials() {
        let (mut lifecycle, recorder) = lifecycle(false);
        lifecycle.options = lifecycle.options.clone().with_credentials("dev-2", "tok-new");
        open(&mut lifecycle);

        let identity: Credentials =
            serde_json::from_value(recorder.sent()[0]["data"].clone()).unwrap();
        assert_eq!(identity, Credentials::new("dev-2", "tok-new"));
    }
}
