//! Error types for the newsdash sync engine
//!
//! Connectivity loss is not an error from a consumer's point of view: it is
//! surfaced as a `ConnectionStatus` change. The types below exist for the
//! layers that need to report *why* a link or an event was rejected, so the
//! reason can be logged before it is absorbed.

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Specific transport error types
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection to {endpoint} failed: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },
    #[error("Handshake with {endpoint} timed out after {duration_ms}ms")]
    HandshakeTimeout { endpoint: String, duration_ms: u64 },
    #[error("Protocol violation: {reason}")]
    ProtocolViolation { reason: String },
    #[error("No heartbeat from server for {silent_ms}ms")]
    HeartbeatTimeout { silent_ms: u64 },
    #[error("Link closed: {reason}")]
    LinkClosed { reason: String },
    #[error("Invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("WebSocket I/O error: {reason}")]
    WebSocket { reason: String },
}

/// Rejection reasons for inbound events that name a known kind but carry a
/// payload the reducers cannot accept
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Malformed {event} payload: {reason}")]
    MalformedPayload { event: String, reason: String },
}

/// Configuration validation failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Validation(String),
    #[error("Failed to load configuration: {0}")]
    Loading(String),
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Core error type for the newsdash sync engine
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Event error: {0}")]
    Event(#[from] EventError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The session was already closed when the call was made
    #[error("Session closed")]
    SessionClosed,
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl EventError {
    /// Create a malformed payload error for the given event name
    pub fn malformed<E: Into<String>, R: Into<String>>(event: E, reason: R) -> Self {
        EventError::MalformedPayload {
            event: event.into(),
            reason: reason.into(),
        }
    }
}

impl TransportError {
    /// Create a protocol violation error with a message
    pub fn protocol<T: Into<String>>(reason: T) -> Self {
        TransportError::ProtocolViolation {
            reason: reason.into(),
        }
    }

    /// Create a link-closed error with a message
    pub fn closed<T: Into<String>>(reason: T) -> Self {
        TransportError::LinkClosed {
            reason: reason.into(),
        }
    }
}

/// Result type for newsdash operations
pub type Result<T> = core::result::Result<T, SyncError>;
