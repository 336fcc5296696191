use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Transport code for a refused TCP connection
pub const CONNECTION_REFUSED: &str = "ECONNREFUSED";

/// Transport code for a liveness probe that went unanswered
pub const PROBE_TIMEOUT: &str = "PING_TIMEOUT";

/// Transport code for an opening handshake that exceeded its deadline
pub const HANDSHAKE_TIMEOUT: &str = "ETIMEDOUT";

/// Error reported by the transport itself, below the frame protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    /// Machine-readable code such as `ECONNREFUSED`, when the transport knows one
    pub code: Option<String>,
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Whether this error describes a condition that reconnecting can fix
    pub fn is_transient(&self) -> bool {
        is_transient_code(self.code.as_deref())
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

/// Codes that trigger a reconnect instead of surfacing as errors
pub fn is_transient_code(code: Option<&str>) -> bool {
    matches!(code, Some(CONNECTION_REFUSED) | Some(PROBE_TIMEOUT))
}

/// Main error type for knot-socket
///
/// Every variant is `Clone` so a single failure can fan out to several
/// event subscribers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KnotError {
    /// A received payload was not a valid frame
    #[error("Invalid frame: {reason}")]
    Decode { reason: String, frame: String },

    /// The server answered with an `error` frame
    #[error("{message}")]
    Protocol {
        message: String,
        code: Option<String>,
        frame: String,
    },

    /// Transport-level failure, proxied verbatim
    #[error("Transport error: {0}")]
    Transport(TransportError),

    /// No liveness acknowledgment within the idle threshold
    #[error("No pong received for {idle:?}")]
    LivenessTimeout { idle: Duration },

    /// A liveness probe could not be sent
    #[error("Failed to send ping: {0}")]
    Probe(String),

    /// A frame was sent while no transport is open
    #[error("Not connected")]
    NotConnected,

    /// An outbound frame could not be serialized
    #[error("Encode error: {0}")]
    Encode(String),

    /// Invalid connection options
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The lifecycle task is gone
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

impl KnotError {
    /// Machine-readable code carried by protocol and transport errors
    pub fn code(&self) -> Option<&str> {
        match self {
            KnotError::Protocol { code, .. } => code.as_deref(),
            KnotError::Transport(err) => err.code.as_deref(),
            _ => None,
        }
    }

    /// Raw payload that caused a decode or protocol error
    pub fn frame(&self) -> Option<&str> {
        match self {
            KnotError::Decode { frame, .. } | KnotError::Protocol { frame, .. } => Some(frame),
            _ => None,
        }
    }
}

impl From<TransportError> for KnotError {
    fn from(err: TransportError) -> Self {
        KnotError::Transport(err)
    }
}

/// Result type for knot-socket operations
pub type Result<T> = std::result::Result<T, KnotError>;
