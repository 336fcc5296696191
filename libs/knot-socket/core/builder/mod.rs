pub mod states;

use super::client::KnotClient;
use super::config::ConnectionOptions;
use super::lifecycle::Lifecycle;
use super::websocket::WsTransport;
use crate::traits::*;
use states::*;
use tracing::debug;

/// Type-state builder for KnotClient
///
/// Connection options are required; the transport (default [`WsTransport`])
/// and the reconnection strategy (default jittered [`ExponentialBackoff`]
/// built from the options) are optional.
pub struct KnotClientBuilder<O>
where
    O: OptionsState,
{
    _state: TypeState<O>,
    options: Option<ConnectionOptions>,
    transport: Option<Box<dyn Transport>>,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
}

impl KnotClientBuilder<NoOptions> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            options: None,
            transport: None,
            reconnect_strategy: None,
        }
    }

    /// Set the connection options
    pub fn options(self, options: ConnectionOptions) -> KnotClientBuilder<HasOptions> {
        KnotClientBuilder {
            _state: TypeState::new(),
            options: Some(options),
            transport: self.transport,
            reconnect_strategy: self.reconnect_strategy,
        }
    }
}

impl Default for KnotClientBuilder<NoOptions> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> KnotClientBuilder<O>
where
    O: OptionsState,
{
    /// Use a custom transport
    pub fn transport<T>(mut self, transport: T) -> Self
    where
        T: Transport,
    {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Use a custom reconnection strategy
    pub fn reconnect_strategy<S>(mut self, strategy: S) -> Self
    where
        S: ReconnectionStrategy + 'static,
    {
        self.reconnect_strategy = Some(Box::new(strategy));
        self
    }
}

impl KnotClientBuilder<HasOptions> {
    /// Validate the options and spawn the lifecycle task
    ///
    /// Must be called from within a tokio runtime. The client starts closed;
    /// call [`KnotClient::connect`] to open it.
    pub fn build(self) -> Result<KnotClient> {
        let options = self
            .options
            .ok_or_else(|| KnotError::Configuration("connection options are required".into()))?;
        options.validate()?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| KnotError::Configuration(format!("no tokio runtime: {}", e)))?;

        let strategy: Box<dyn ReconnectionStrategy> = match self.reconnect_strategy {
            Some(strategy) => strategy,
            None => Box::new(options.backoff()),
        };
        let transport: Box<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Box::new(WsTransport::new()),
        };

        debug!(uri = %options.uri()?, "Building KNoT client");
        let (lifecycle, transport_events) = Lifecycle::new(options, transport, strategy);
        Ok(KnotClient::spawn(lifecycle, transport_events, &runtime))
    }
}
