//! Value types shared by every layer of the dashboard engine

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ----------------------------------------------------------------------------
// Connection Status
// ----------------------------------------------------------------------------

/// Link health as reported by the channel transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionStatus {
    /// Whether a `connect` call should be ignored in this state
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connecting | ConnectionStatus::Connected | ConnectionStatus::Reconnecting
        )
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connecting => write!(f, "Connecting"),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

// ----------------------------------------------------------------------------
// Stats Snapshot
// ----------------------------------------------------------------------------

/// Latest system metrics pushed by the backend.
///
/// The record is opaque: the engine never merges two snapshots, it only
/// replaces one with the next.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatsSnapshot(Map<String, Value>);

impl StatsSnapshot {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for StatsSnapshot {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

// ----------------------------------------------------------------------------
// Feed Entries
// ----------------------------------------------------------------------------

/// Identifier of a feed entry as assigned by the backend (or generated
/// locally when the backend omitted one)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn new<T: Into<String>>(id: T) -> Self {
        Self(id.into())
    }

    /// Generate a random identifier for entries pushed without one
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One immutable line of the activity log or the alert queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub id: EntryId,
    pub kind: String,
    pub description: String,
    pub timestamp: String,
    /// Payload fields beyond the four above (`status`, `severity`, ...),
    /// kept for renderers and never interpreted here
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl FeedEntry {
    pub fn new<K, D, T>(id: EntryId, kind: K, description: D, timestamp: T) -> Self
    where
        K: Into<String>,
        D: Into<String>,
        T: Into<String>,
    {
        Self {
            id,
            kind: kind.into(),
            description: description.into(),
            timestamp: timestamp.into(),
            attributes: Map::new(),
        }
    }

    /// Attach an extra payload attribute
    pub fn with_attribute<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Entry of the activity log
pub type ActivityEntry = FeedEntry;
/// Entry of the alert queue; urgency is a rendering concern only
pub type AlertEntry = FeedEntry;
