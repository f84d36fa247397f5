//! WebSocket session layer.
//!
//! Each connection gets a fresh connection id, a private outbox registered
//! with the [`ConnectionManager`], and one subscription to the broadcast
//! hub filtered by the topics the client has joined. On disconnect the
//! outbox is dropped and every registry binding for the connection is
//! cleared, so stale sessions are never offered to.

use std::collections::HashSet;

use axum::{
  extract::{
    State, WebSocketUpgrade,
    ws::{Message, WebSocket},
  },
  response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::Deserialize;
use siren_core::{
  geo::Point, notify::ContactNotifier, request::RequestStatus,
  responder::ResponderKind, store::ResponderRegistry,
};
use siren_dispatch::{DispatchStore, Dispatcher, ServerEvent, Topic};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::AppState;

// ─── Client events ────────────────────────────────────────────────────────────

/// Client→server events, mirroring the server event envelope.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
  /// Bind this connection to a registered responder.
  #[serde(rename_all = "camelCase")]
  Register {
    responder_id: Uuid,
    role:         ResponderKind,
  },
  /// Join a topic (`status-update-<id>` / `ambulance-location-<id>`).
  Subscribe { topic: String },
  Unsubscribe { topic: String },
  /// Live position push from an assigned ambulance.
  #[serde(rename_all = "camelCase")]
  LocationUpdate {
    request_id:  Uuid,
    coordinates: Point,
  },
  /// Operational milestone push from a responder.
  #[serde(rename_all = "camelCase")]
  StatusUpdate {
    request_id: Uuid,
    status:     RequestStatus,
    #[serde(default)]
    data:       serde_json::Value,
  },
}

// ─── Upgrade handler ──────────────────────────────────────────────────────────

/// `GET /ws`
pub async fn handler<S, N>(
  State(state): State<AppState<S, N>>,
  ws: WebSocketUpgrade,
) -> Response
where
  S: DispatchStore,
  N: ContactNotifier + 'static,
{
  ws.on_upgrade(move |socket| session(state.dispatcher, socket))
}

// ─── Session loop ─────────────────────────────────────────────────────────────

async fn session<S, N>(dispatcher: Dispatcher<S, N>, socket: WebSocket)
where
  S: DispatchStore,
  N: ContactNotifier + 'static,
{
  let connection_id = Uuid::new_v4();
  tracing::debug!(%connection_id, "websocket session opened");

  let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel();
  dispatcher.connections().register(connection_id, outbox_tx);
  let mut broadcast_rx = dispatcher.broadcast().subscribe();

  let (mut sink, mut stream) = socket.split();
  let mut subscribed: HashSet<Topic> = HashSet::new();

  loop {
    tokio::select! {
      // Private pushes (offers aimed at this responder).
      maybe = outbox_rx.recv() => {
        let Some(event) = maybe else { break };
        if send_event(&mut sink, &event).await.is_err() {
          break;
        }
      }

      // Topic broadcasts, filtered by this session's subscriptions.
      result = broadcast_rx.recv() => match result {
        Ok(topic_event) => {
          if subscribed.contains(&topic_event.topic)
            && send_event(&mut sink, &topic_event.event).await.is_err()
          {
            break;
          }
        }
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
          // Lossy bus: the client re-queries over HTTP to catch up.
          tracing::warn!(%connection_id, skipped, "session lagged behind broadcast");
        }
        Err(broadcast::error::RecvError::Closed) => break,
      },

      // Inbound client traffic.
      incoming = stream.next() => {
        let Some(Ok(message)) = incoming else { break };
        match message {
          Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => {
              handle_client_event(&dispatcher, connection_id, &mut subscribed, event)
                .await;
            }
            Err(e) => {
              tracing::debug!(%connection_id, error = %e, "unparseable client event");
            }
          },
          Message::Close(_) => break,
          _ => {}
        }
      }
    }
  }

  dispatcher.connections().remove(connection_id);
  if let Err(e) = dispatcher.store().unbind_connection(connection_id).await {
    tracing::warn!(%connection_id, error = %e, "failed to unbind connection");
  }
  tracing::debug!(%connection_id, "websocket session closed");
}

async fn send_event(
  sink: &mut SplitSink<WebSocket, Message>,
  event: &ServerEvent,
) -> Result<(), axum::Error> {
  let json = match serde_json::to_string(event) {
    Ok(json) => json,
    Err(e) => {
      tracing::error!(error = %e, "failed to serialise server event");
      return Ok(());
    }
  };
  sink.send(Message::Text(json.into())).await
}

async fn handle_client_event<S, N>(
  dispatcher: &Dispatcher<S, N>,
  connection_id: Uuid,
  subscribed: &mut HashSet<Topic>,
  event: ClientEvent,
) where
  S: DispatchStore,
  N: ContactNotifier + 'static,
{
  match event {
    ClientEvent::Register { responder_id, role } => {
      if let Err(e) = dispatcher
        .store()
        .bind_connection(responder_id, role, connection_id)
        .await
      {
        tracing::warn!(%connection_id, %responder_id, error = %e, "register failed");
      }
    }
    ClientEvent::Subscribe { topic } => match topic.parse::<Topic>() {
      Ok(topic) => {
        subscribed.insert(topic);
      }
      Err(e) => tracing::debug!(%connection_id, error = %e, "subscribe ignored"),
    },
    ClientEvent::Unsubscribe { topic } => {
      if let Ok(topic) = topic.parse::<Topic>() {
        subscribed.remove(&topic);
      }
    }
    ClientEvent::LocationUpdate { request_id, coordinates } => {
      dispatcher.record_location(request_id, coordinates).await;
    }
    ClientEvent::StatusUpdate { request_id, status, data } => {
      if let Err(e) = dispatcher.update_status(request_id, status, data).await {
        tracing::warn!(%connection_id, %request_id, error = %e, "status update failed");
      }
    }
  }
}
