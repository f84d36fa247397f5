//! Private-channel half of the notification bus.
//!
//! An explicit registry of live session outboxes keyed by connection id,
//! replacing the original design's bare socket-id field on each responder.
//! [`ConnectionManager::remove`] is the mark-stale-on-disconnect hook: once
//! a session is removed, pushes to its id fail cleanly instead of landing
//! on a dead channel.

use std::{
  collections::HashMap,
  sync::{Arc, RwLock},
};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::bus::ServerEvent;

/// Registry of live connection outboxes. Cloneable; all clones share state.
#[derive(Clone, Default)]
pub struct ConnectionManager {
  inner: Arc<RwLock<HashMap<Uuid, mpsc::UnboundedSender<ServerEvent>>>>,
}

impl ConnectionManager {
  pub fn new() -> Self { Self::default() }

  /// Register a session's outbox under a fresh connection id.
  pub fn register(&self, connection_id: Uuid, sender: mpsc::UnboundedSender<ServerEvent>) {
    self.inner.write().unwrap().insert(connection_id, sender);
  }

  /// Drop a session's outbox. Subsequent sends to this id return `false`.
  pub fn remove(&self, connection_id: Uuid) {
    self.inner.write().unwrap().remove(&connection_id);
  }

  /// Best-effort push to one connection. Returns `false` for unknown ids
  /// and for sessions whose receive side has already dropped.
  pub fn send_to(&self, connection_id: Uuid, event: ServerEvent) -> bool {
    let guard = self.inner.read().unwrap();
    match guard.get(&connection_id) {
      Some(sender) => sender.send(event).is_ok(),
      None => false,
    }
  }

  pub fn is_connected(&self, connection_id: Uuid) -> bool {
    self.inner.read().unwrap().contains_key(&connection_id)
  }
}

#[cfg(test)]
mod tests {
  use siren_core::request::RequestStatus;

  use super::*;

  fn status_event() -> ServerEvent {
    ServerEvent::StatusUpdate {
      request_id: Uuid::new_v4(),
      status:     RequestStatus::Picked,
      data:       serde_json::Value::Null,
    }
  }

  #[tokio::test]
  async fn send_to_registered_connection_delivers() {
    let manager = ConnectionManager::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();

    manager.register(id, tx);
    assert!(manager.send_to(id, status_event()));
    assert!(matches!(
      rx.recv().await,
      Some(ServerEvent::StatusUpdate { .. })
    ));
  }

  #[test]
  fn send_to_unknown_connection_is_false_not_fatal() {
    let manager = ConnectionManager::new();
    assert!(!manager.send_to(Uuid::new_v4(), status_event()));
  }

  #[test]
  fn removed_connection_no_longer_receives() {
    let manager = ConnectionManager::new();
    let (tx, _rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();

    manager.register(id, tx);
    assert!(manager.is_connected(id));

    manager.remove(id);
    assert!(!manager.is_connected(id));
    assert!(!manager.send_to(id, status_event()));
  }

  #[test]
  fn send_to_dropped_receiver_is_false() {
    let manager = ConnectionManager::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();

    manager.register(id, tx);
    drop(rx);
    assert!(!manager.send_to(id, status_event()));
  }
}
