//! newsdash Sync Runtime
//!
//! Tokio half of the newsdash live dashboard. `DashboardSession` keeps a
//! push channel to the news backend open, feeds inbound events through the
//! core `Engine`, and reconnects with exponential backoff when the link
//! drops.
//!
//! ```no_run
//! # async fn demo() -> newsdash_core::Result<()> {
//! use newsdash_core::SyncConfig;
//! use newsdash_sync::DashboardSession;
//!
//! let session = DashboardSession::open(SyncConfig::local_development())?;
//! let subscription = session.subscribe(|state| {
//!     println!("v{} {} activities", state.version(), state.activities().len());
//! });
//! // ...
//! subscription.unsubscribe();
//! session.close().await;
//! # Ok(())
//! # }
//! ```

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod codec;
pub mod link;
pub mod reconnect;
pub mod session;
pub mod transport;
pub mod websocket;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use codec::Inbound;
pub use link::{Connector, Link};
pub use reconnect::ReconnectSupervisor;
pub use session::DashboardSession;
pub use transport::{ChannelTransport, MessageHandler, StatusHandler};
pub use websocket::{Heartbeat, WebSocketConnector, WebSocketLink};

#[cfg(any(test, feature = "testing"))]
pub use testing::{ScriptedConnector, ScriptedServer};
