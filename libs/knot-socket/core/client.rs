use super::commands::{Credentials, Request};
use super::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use super::lifecycle::{Lifecycle, TransportEvents};
use super::router::ClientEvent;
use crate::traits::*;
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde_json::Value;
use std::future::pending;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

/// Internal command messages for client control
#[derive(Debug)]
enum ClientCommand {
    /// Open (or reopen) the connection
    Connect(oneshot::Sender<Result<()>>),
    /// Close the connection
    Close(oneshot::Sender<()>),
    /// Send a request frame
    Send(Request, oneshot::Sender<Result<()>>),
    /// Register a subscriber (`None` = every event)
    Subscribe {
        name: Option<String>,
        tx: Sender<ClientEvent>,
    },
}

/// Client metrics snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metrics {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub reconnect_count: u64,
    pub connection_state: ConnectionState,
}

/// Handle to a KNoT connection
///
/// All lifecycle logic runs in one dedicated task; this handle forwards
/// commands to it and reads its state lock-free. Events are observed through
/// [`KnotClient::subscribe`] and [`KnotClient::subscribe_all`].
///
/// Build one with [`crate::builder()`].
pub struct KnotClient {
    command_tx: mpsc::UnboundedSender<ClientCommand>,
    state: Arc<AtomicConnectionState>,
    metrics: Arc<AtomicMetrics>,
    task_handle: JoinHandle<()>,
}

impl KnotClient {
    /// Spawn the lifecycle task on `runtime`
    pub(crate) fn spawn(
        lifecycle: Lifecycle,
        transport_events: TransportEvents,
        runtime: &tokio::runtime::Handle,
    ) -> Self {
        let state = lifecycle.shared_state();
        let metrics = lifecycle.metrics();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let task_handle = runtime.spawn(run_lifecycle(lifecycle, command_rx, transport_events));

        Self {
            command_tx,
            state,
            metrics,
            task_handle,
        }
    }

    fn dispatch(&self, command: ClientCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|e| KnotError::ChannelClosed(e.to_string()))
    }

    async fn request(&self, request: Request) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.dispatch(ClientCommand::Send(request, reply_tx))?;
        reply_rx.await.map_err(|e| KnotError::ChannelClosed(e.to_string()))?
    }

    /// Open the connection, closing any existing transport first
    ///
    /// Resolves once the transport handle is created; `open` and the
    /// identity exchange follow asynchronously.
    pub async fn connect(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.dispatch(ClientCommand::Connect(reply_tx))?;
        reply_rx.await.map_err(|e| KnotError::ChannelClosed(e.to_string()))?
    }

    /// Close the connection and cancel any pending reconnect
    ///
    /// Subscribers get a normal `close` event when a live socket was closed.
    pub async fn close(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.dispatch(ClientCommand::Close(reply_tx))?;
        reply_rx.await.map_err(|e| KnotError::ChannelClosed(e.to_string()))
    }

    /// Receive events named `name` (a frame type, or `open`, `close`,
    /// `error`, `unexpected-response`, `ping`, `pong`, `reconnect`)
    pub fn subscribe(&self, name: impl Into<String>) -> Receiver<ClientEvent> {
        let (tx, rx) = unbounded();
        // A stopped task drops the sender, which the receiver observes
        let _ = self.dispatch(ClientCommand::Subscribe {
            name: Some(name.into()),
            tx,
        });
        rx
    }

    /// Receive every event
    pub fn subscribe_all(&self) -> Receiver<ClientEvent> {
        let (tx, rx) = unbounded();
        let _ = self.dispatch(ClientCommand::Subscribe { name: None, tx });
        rx
    }

    /// Get current connection state
    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Check if frames can be sent
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    /// Get current metrics
    pub fn metrics(&self) -> Metrics {
        Metrics {
            frames_sent: self.metrics.frames_sent(),
            frames_received: self.metrics.frames_received(),
            reconnect_count: self.metrics.reconnect_count(),
            connection_state: self.state.get(),
        }
    }

    pub async fn identity(&self, credentials: Credentials) -> Result<()> {
        self.request(Request::Identity(credentials)).await
    }

    pub async fn register(&self, properties: Value) -> Result<()> {
        self.request(Request::Register(properties)).await
    }

    pub async fn update_metadata(&self, id: impl Into<String>, metadata: Value) -> Result<()> {
        self.request(Request::UpdateMetadata {
            id: id.into(),
            metadata,
        })
        .await
    }

    pub async fn get_devices(&self, query: Value) -> Result<()> {
        self.request(Request::GetDevices { query }).await
    }

    pub async fn unregister(&self, id: impl Into<String>) -> Result<()> {
        self.request(Request::Unregister { id: id.into() }).await
    }

    pub async fn create_session_token(&self, id: impl Into<String>) -> Result<()> {
        self.request(Request::CreateSessionToken { id: id.into() })
            .await
    }

    pub async fn revoke_session_token(
        &self,
        id: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<()> {
        self.request(Request::RevokeSessionToken {
            id: id.into(),
            token: token.into(),
        })
        .await
    }

    pub async fn update_schema(&self, schema: Value) -> Result<()> {
        self.request(Request::UpdateSchema { schema }).await
    }

    pub async fn activate(&self, id: impl Into<String>) -> Result<()> {
        self.request(Request::Activate { id: id.into() }).await
    }

    pub async fn publish_data(&self, id: impl Into<String>, data: Value) -> Result<()> {
        self.request(Request::PublishData { id: id.into(), data })
            .await
    }

    pub async fn get_data(&self, id: impl Into<String>, sensor_ids: Vec<u32>) -> Result<()> {
        self.request(Request::GetData {
            id: id.into(),
            sensor_ids,
        })
        .await
    }

    pub async fn set_data(&self, id: impl Into<String>, data: Value) -> Result<()> {
        self.request(Request::SetData { id: id.into(), data })
            .await
    }

    /// Close the connection and wait for the lifecycle task to exit
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down KNoT client");

        let Self {
            command_tx,
            task_handle,
            ..
        } = self;

        let (reply_tx, reply_rx) = oneshot::channel();
        if command_tx.send(ClientCommand::Close(reply_tx)).is_ok() {
            let _ = reply_rx.await;
        }

        // Dropping the last sender ends the task loop
        drop(command_tx);
        task_handle
            .await
            .map_err(|e| KnotError::ChannelClosed(e.to_string()))
    }
}

/// Sleep until `deadline`, or forever when there is none
async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

/// Lifecycle task loop
///
/// Every state transition happens here, one notification or timer at a time.
async fn run_lifecycle(
    mut lifecycle: Lifecycle,
    mut command_rx: mpsc::UnboundedReceiver<ClientCommand>,
    mut transport_rx: TransportEvents,
) {
    loop {
        let keepalive_at = lifecycle.keepalive().next_probe_at();
        let reconnect = lifecycle.pending_reconnect();

        tokio::select! {
            command = command_rx.recv() => match command {
                Some(command) => handle_command(&mut lifecycle, command),
                None => {
                    debug!("All client handles dropped, closing");
                    lifecycle.close();
                    break;
                }
            },

            Some((generation, event)) = transport_rx.recv() => {
                lifecycle.handle_transport_event(generation, event);
            }

            _ = sleep_until_deadline(keepalive_at) => {
                lifecycle.on_keepalive_tick();
            }

            _ = sleep_until_deadline(reconnect.map(|pending| pending.deadline)) => {
                if let Some(pending) = reconnect {
                    lifecycle.fire_reconnect(pending.generation);
                }
            }
        }
    }

    info!("Lifecycle task exiting");
}

fn handle_command(lifecycle: &mut Lifecycle, command: ClientCommand) {
    match command {
        ClientCommand::Connect(reply) => {
            let _ = reply.send(lifecycle.connect());
        }
        ClientCommand::Close(reply) => {
            lifecycle.close();
            let _ = reply.send(());
        }
        ClientCommand::Send(request, reply) => {
            let _ = reply.send(lifecycle.send(request));
        }
        ClientCommand::Subscribe { name, tx } => lifecycle.add_subscriber(name, tx),
    }
}
