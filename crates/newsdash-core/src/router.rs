//! Event router
//!
//! Classifies raw push messages into a closed set of event kinds and decodes
//! their payloads for the state store. Unknown kinds and malformed payloads
//! stop here: they are logged and dropped, never propagated.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::errors::EventError;
use crate::store::StateStore;
use crate::types::{ActivityEntry, AlertEntry, EntryId, FeedEntry, StatsSnapshot};
use crate::{ACTIVITY_UPDATE_EVENT, ALERT_EVENT, STATS_UPDATE_EVENT};

// ----------------------------------------------------------------------------
// Raw Messages and Event Kinds
// ----------------------------------------------------------------------------

/// A named push event with its untyped payload, as delivered by a transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl RawMessage {
    pub fn new<E: Into<String>>(event: E, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

/// Closed set of inbound event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StatsUpdate,
    ActivityAppend,
    AlertAppend,
    Unknown,
}

impl EventKind {
    /// Classify an event name
    pub fn classify(event: &str) -> Self {
        match event {
            STATS_UPDATE_EVENT => EventKind::StatsUpdate,
            ACTIVITY_UPDATE_EVENT => EventKind::ActivityAppend,
            ALERT_EVENT => EventKind::AlertAppend,
            _ => EventKind::Unknown,
        }
    }
}

/// A decoded event ready for its reducer
#[derive(Debug, Clone, PartialEq)]
pub enum RoutedEvent {
    StatsUpdate(StatsSnapshot),
    ActivityAppend(ActivityEntry),
    AlertAppend(AlertEntry),
}

/// What became of one raw message
#[derive(Debug)]
pub enum RouteOutcome {
    /// Decoded and handed to the store; carries the new version number
    Applied { kind: EventKind, version: u64 },
    /// Event name outside the known set
    Unknown { event: String },
    /// Known event with a payload the reducers cannot accept
    Malformed(EventError),
}

// ----------------------------------------------------------------------------
// Entry Payload Decoding
// ----------------------------------------------------------------------------

/// Wire shape of `activity_update` / `alert` payloads. Also accepts the
/// field names the news backend emits (`type`, `title`, `message`, `time`).
#[derive(Debug, Deserialize)]
struct EntryPayload {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default = "default_kind", alias = "type")]
    kind: String,
    #[serde(alias = "title", alias = "message")]
    description: String,
    #[serde(alias = "time")]
    timestamp: String,
    #[serde(flatten)]
    attributes: Map<String, Value>,
}

fn default_kind() -> String {
    "info".to_string()
}

fn decode_entry_id(event: &str, id: Option<Value>) -> Result<EntryId, EventError> {
    match id {
        None | Some(Value::Null) => Ok(EntryId::generate()),
        Some(Value::String(s)) => Ok(EntryId::new(s)),
        Some(Value::Number(n)) => Ok(EntryId::new(n.to_string())),
        Some(other) => Err(EventError::malformed(
            event,
            format!("`id` must be a string or number, got {}", other),
        )),
    }
}

fn decode_entry(event: &str, payload: Value) -> Result<FeedEntry, EventError> {
    let raw: EntryPayload =
        serde_json::from_value(payload).map_err(|e| EventError::malformed(event, e.to_string()))?;

    Ok(FeedEntry {
        id: decode_entry_id(event, raw.id)?,
        kind: raw.kind,
        description: raw.description,
        timestamp: raw.timestamp,
        attributes: raw.attributes,
    })
}

// ----------------------------------------------------------------------------
// Event Router
// ----------------------------------------------------------------------------

/// Stateless classifier/decoder between the transport and the store
#[derive(Debug, Default, Clone, Copy)]
pub struct EventRouter;

impl EventRouter {
    pub fn new() -> Self {
        Self
    }

    /// Decode a raw message. `Ok(None)` means the kind is unknown.
    pub fn decode(&self, message: RawMessage) -> Result<Option<RoutedEvent>, EventError> {
        let RawMessage { event, payload } = message;
        match EventKind::classify(&event) {
            EventKind::StatsUpdate => match payload {
                Value::Object(fields) => Ok(Some(RoutedEvent::StatsUpdate(StatsSnapshot::new(fields)))),
                other => Err(EventError::malformed(
                    event,
                    format!("expected an object, got {}", json_type_name(&other)),
                )),
            },
            EventKind::ActivityAppend => decode_entry(&event, payload).map(|e| Some(RoutedEvent::ActivityAppend(e))),
            EventKind::AlertAppend => decode_entry(&event, payload).map(|e| Some(RoutedEvent::AlertAppend(e))),
            EventKind::Unknown => Ok(None),
        }
    }

    /// Route one message into the store, in the order it was received
    pub fn dispatch(&self, message: RawMessage, store: &StateStore) -> RouteOutcome {
        let event_name = message.event.clone();
        let kind = EventKind::classify(&event_name);

        match self.decode(message) {
            Ok(Some(routed)) => {
                let state = store.apply(routed);
                debug!(event = %event_name, version = state.version(), "Routed event");
                RouteOutcome::Applied {
                    kind,
                    version: state.version(),
                }
            }
            Ok(None) => {
                warn!(event = %event_name, "Dropping unknown event");
                RouteOutcome::Unknown { event: event_name }
            }
            Err(err) => {
                error!("Dropping event: {}", err);
                RouteOutcome::Malformed(err)
            }
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
