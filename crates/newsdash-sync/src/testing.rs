//! Scripted in-memory connector for deterministic tests
//!
//! Each call to `ScriptedConnector::connect` consumes the next queued plan.
//! With no plan queued the connection is refused, so a bare connector models
//! a backend that is down.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use newsdash_core::{RawMessage, TransportError};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::link::{Connector, Link};

enum Plan {
    Accept(ScriptedLink),
    Hang,
}

#[derive(Debug)]
enum ServerFrame {
    Message(RawMessage),
    Drop,
}

// ----------------------------------------------------------------------------
// Connector
// ----------------------------------------------------------------------------

/// Connector whose outcomes are queued up front by the test
#[derive(Default)]
pub struct ScriptedConnector {
    plans: Mutex<VecDeque<Plan>>,
    attempts: AtomicU64,
}

impl std::fmt::Debug for ScriptedConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedConnector")
            .field("attempts", &self.attempts())
            .finish_non_exhaustive()
    }
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept the next connect; the returned handle plays the server
    pub fn accept_next(&self) -> ScriptedServer {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        self.queue(Plan::Accept(ScriptedLink {
            inbound: inbound_rx,
            sent: sent_tx,
        }));
        ScriptedServer {
            inbound: inbound_tx,
            sent: sent_rx,
        }
    }

    /// Let the next handshake hang until the caller gives up
    pub fn hang_next(&self) {
        self.queue(Plan::Hang);
    }

    /// Handshakes attempted so far, refused ones included
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn queue(&self, plan: Plan) {
        self.plans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(plan);
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Link>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let plan = self
            .plans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match plan {
            Some(Plan::Accept(link)) => Ok(Box::new(link)),
            Some(Plan::Hang) => std::future::pending().await,
            None => Err(TransportError::ConnectionFailed {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

// ----------------------------------------------------------------------------
// Link and Server Handle
// ----------------------------------------------------------------------------

struct ScriptedLink {
    inbound: mpsc::UnboundedReceiver<ServerFrame>,
    sent: mpsc::UnboundedSender<RawMessage>,
}

#[async_trait]
impl Link for ScriptedLink {
    async fn recv(&mut self) -> Option<Result<RawMessage, TransportError>> {
        match self.inbound.recv().await {
            Some(ServerFrame::Message(message)) => Some(Ok(message)),
            Some(ServerFrame::Drop) | None => None,
        }
    }

    async fn send(&mut self, message: RawMessage) -> Result<(), TransportError> {
        self.sent
            .send(message)
            .map_err(|_| TransportError::closed("scripted server gone"))
    }

    async fn close(&mut self) {
        self.inbound.close();
    }
}

/// Server side of one accepted scripted link
#[derive(Debug)]
pub struct ScriptedServer {
    inbound: mpsc::UnboundedSender<ServerFrame>,
    sent: mpsc::UnboundedReceiver<RawMessage>,
}

impl ScriptedServer {
    /// Push an event to the client
    pub fn push(&self, event: &str, payload: Value) {
        let _ = self
            .inbound
            .send(ServerFrame::Message(RawMessage::new(event, payload)));
    }

    /// Drop the link from the server side
    pub fn disconnect(&self) {
        let _ = self.inbound.send(ServerFrame::Drop);
    }

    /// Next event the client emitted, or `None` once the link is gone
    pub async fn next_sent(&mut self) -> Option<RawMessage> {
        self.sent.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::task;

    #[test]
    fn test_plans_are_consumed_in_order() {
        let connector = ScriptedConnector::new();
        connector.hang_next();

        let mut hanging = task::spawn(connector.connect("mem://feed"));
        assert!(hanging.poll().is_pending());
        drop(hanging);

        let mut refused = task::spawn(connector.connect("mem://feed"));
        assert!(matches!(refused.poll(), std::task::Poll::Ready(Err(_))));
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test]
    async fn test_server_push_and_client_send() {
        let connector = ScriptedConnector::new();
        let mut server = connector.accept_next();
        let mut link = connector.connect("mem://feed").await.unwrap();

        server.push("alert", json!({"x": 1}));
        let inbound = link.recv().await.unwrap().unwrap();
        assert_eq!(inbound, RawMessage::new("alert", json!({"x": 1})));

        link.send(RawMessage::new("request_stats", Value::Null)).await.unwrap();
        assert_eq!(server.next_sent().await.unwrap().event, "request_stats");

        server.disconnect();
        assert!(link.recv().await.is_none());
    }
}
