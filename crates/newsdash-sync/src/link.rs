//! Connector and Link Trait Definitions
//!
//! A `Connector` performs the full handshake with the push backend and hands
//! back an established `Link`. The `ChannelTransport` owns the link from then
//! on and drives it from a single I/O task.
//!
//! ## Implementations
//!
//! - `WebSocketConnector` in the `websocket` module (Socket.IO or JSON framing)
//! - `ScriptedConnector` in the `testing` module, behind the `testing` feature

use async_trait::async_trait;
use newsdash_core::{RawMessage, TransportError};

// ----------------------------------------------------------------------------
// Link
// ----------------------------------------------------------------------------

/// An established, bidirectional event channel
#[async_trait]
pub trait Link: Send {
    /// Wait for the next inbound event
    ///
    /// Returns `None` once the remote side has closed the channel and an
    /// error once it has gone silent past its heartbeat. Protocol
    /// housekeeping (pings, noops) is handled internally and never surfaces.
    /// Must be cancel-safe: dropping the future before it resolves loses no
    /// event, and replies the server is owed are sent on the next call.
    async fn recv(&mut self) -> Option<Result<RawMessage, TransportError>>;

    /// Emit an outbound event
    async fn send(&mut self, message: RawMessage) -> Result<(), TransportError>;

    /// Close the channel gracefully. Errors are logged, not returned.
    async fn close(&mut self);
}

// ----------------------------------------------------------------------------
// Connector
// ----------------------------------------------------------------------------

/// Factory for links to an endpoint
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a link to `endpoint` and complete the protocol handshake
    ///
    /// The caller bounds this with the configured connect timeout.
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Link>, TransportError>;
}
