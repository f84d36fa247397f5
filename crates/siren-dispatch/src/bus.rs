//! Topic broadcast half of the notification bus.
//!
//! One `tokio::sync::broadcast` channel carries every topic event; each
//! session subscribes once and filters by the topics it has joined. The bus
//! does not persist messages — a disconnected subscriber misses events
//! published while offline and must re-query the store on reconnect. The
//! state machine is the source of truth; the bus is a best-effort
//! accelerant.

use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};
use siren_core::{
  geo::Point,
  request::{RequestRecord, RequestStatus},
};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Capacity of the broadcast channel. Slow receivers that fall behind skip
/// messages (`RecvError::Lagged`).
const BROADCAST_CAPACITY: usize = 4096;

// ─── Topics ──────────────────────────────────────────────────────────────────

/// A logical real-time channel identifier. Any connection may subscribe to
/// a request's streams by id; `new-emergency` offers are not a topic — they
/// go over a responder's private channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
  StatusUpdate(Uuid),
  AmbulanceLocation(Uuid),
}

impl fmt::Display for Topic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::StatusUpdate(id) => write!(f, "status-update-{id}"),
      Self::AmbulanceLocation(id) => write!(f, "ambulance-location-{id}"),
    }
  }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown topic: {0:?}")]
pub struct ParseTopicError(String);

impl FromStr for Topic {
  type Err = ParseTopicError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if let Some(id) = s.strip_prefix("status-update-") {
      let id = Uuid::parse_str(id).map_err(|_| ParseTopicError(s.to_owned()))?;
      return Ok(Self::StatusUpdate(id));
    }
    if let Some(id) = s.strip_prefix("ambulance-location-") {
      let id = Uuid::parse_str(id).map_err(|_| ParseTopicError(s.to_owned()))?;
      return Ok(Self::AmbulanceLocation(id));
    }
    Err(ParseTopicError(s.to_owned()))
  }
}

// ─── Wire events ─────────────────────────────────────────────────────────────

/// Server→client events, both topic broadcasts and private pushes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
  /// Offer pushed to a specific responder's private channel.
  NewEmergency(RequestRecord),
  #[serde(rename_all = "camelCase")]
  StatusUpdate {
    request_id: Uuid,
    status:     RequestStatus,
    data:       serde_json::Value,
  },
  #[serde(rename_all = "camelCase")]
  AmbulanceLocation {
    request_id:  Uuid,
    coordinates: Point,
  },
}

/// A broadcast payload: the topic it belongs to plus the event itself.
#[derive(Debug, Clone)]
pub struct TopicEvent {
  pub topic: Topic,
  pub event: ServerEvent,
}

// ─── Broadcast hub ───────────────────────────────────────────────────────────

/// The global topic broadcast hub. Cloneable; store in shared state.
#[derive(Clone)]
pub struct StatusBroadcast {
  sender: broadcast::Sender<Arc<TopicEvent>>,
}

impl StatusBroadcast {
  pub fn new() -> Self {
    let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
    Self { sender }
  }

  /// Subscribe to the hub. Each session calls this once and filters by its
  /// joined topics.
  pub fn subscribe(&self) -> broadcast::Receiver<Arc<TopicEvent>> {
    self.sender.subscribe()
  }

  /// Publish an event to every subscriber of `topic`.
  /// No receivers is not an error.
  pub fn publish(&self, topic: Topic, event: ServerEvent) {
    let _ = self.sender.send(Arc::new(TopicEvent { topic, event }));
  }
}

impl Default for StatusBroadcast {
  fn default() -> Self { Self::new() }
}
