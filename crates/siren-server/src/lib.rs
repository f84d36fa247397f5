//! HTTP and WebSocket surface for the Siren dispatch engine.
//!
//! Exposes an axum [`Router`] backed by any
//! [`siren_dispatch::DispatchStore`]. TLS and real authentication are the
//! deployment's responsibility; requester identity arrives pre-verified in
//! the `x-user-id` header.

pub mod error;
pub mod notify;
pub mod routes;
pub mod ws;

use std::path::PathBuf;

use axum::{
  Router,
  routing::{get, patch, post, put},
};
use serde::Deserialize;
use siren_core::notify::ContactNotifier;
use siren_dispatch::{DispatchStore, Dispatcher};
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use notify::LogNotifier;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and the
/// `SIREN_*` environment.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                String,
  #[serde(default = "default_port")]
  pub port:                u16,
  #[serde(default = "default_store_path")]
  pub store_path:          PathBuf,
  /// Radius of the nearest-ambulance offer fan-out.
  #[serde(default = "default_offer_radius")]
  pub offer_radius_meters: f64,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 4000 }
fn default_store_path() -> PathBuf { PathBuf::from("siren.db") }
fn default_offer_radius() -> f64 { 5_000.0 }

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                default_host(),
      port:                default_port(),
      store_path:          default_store_path(),
      offer_radius_meters: default_offer_radius(),
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S, N> {
  pub dispatcher: Dispatcher<S, N>,
}

impl<S, N> Clone for AppState<S, N> {
  fn clone(&self) -> Self {
    Self { dispatcher: self.dispatcher.clone() }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full HTTP + WebSocket router.
pub fn router<S, N>(state: AppState<S, N>) -> Router
where
  S: DispatchStore,
  N: ContactNotifier + 'static,
{
  Router::new()
    // Emergency lifecycle
    .route("/api/emergency/request", post(routes::submit::<S, N>))
    .route("/api/emergency/{request_id}", get(routes::get_one::<S, N>))
    .route(
      "/api/emergency/accept/ambulance/{request_id}",
      patch(routes::accept_ambulance::<S, N>),
    )
    .route(
      "/api/emergency/accept/hospital/{request_id}",
      patch(routes::accept_hospital::<S, N>),
    )
    .route(
      "/api/emergency/check-assigned-ambulance",
      post(routes::check_assigned::<S, N>),
    )
    // Responder registry
    .route("/api/responders/ambulance", post(routes::register_ambulance::<S, N>))
    .route("/api/responders/hospital", post(routes::register_hospital::<S, N>))
    .route(
      "/api/responders/hospital/{hospital_id}/beds",
      put(routes::set_bed_capacity::<S, N>),
    )
    // Account-system provisioning seam
    .route("/api/users/{user_id}", put(routes::upsert_user::<S, N>))
    // Real-time channel
    .route("/ws", get(ws::handler::<S, N>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use siren_store_sqlite::SqliteStore;
  use tower::ServiceExt;
  use uuid::Uuid;

  use super::*;
  use crate::notify::LogNotifier;

  async fn make_state() -> AppState<SqliteStore, LogNotifier> {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let dispatcher = Dispatcher::new(store, Arc::new(LogNotifier), 5_000.0);
    AppState { dispatcher }
  }

  async fn oneshot_json(
    state: AppState<SqliteStore, LogNotifier>,
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: Option<serde_json::Value>,
  ) -> axum::response::Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
      builder = builder.header("x-user-id", user);
    }
    let req = match body {
      Some(json) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };
    router(state).oneshot(req).await.unwrap()
  }

  async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  fn sos_body() -> serde_json::Value {
    serde_json::json!({ "coordinates": [88.40, 22.58] })
  }

  async fn register_ambulance(
    state: AppState<SqliteStore, LogNotifier>,
    name: &str,
  ) -> Uuid {
    let resp = oneshot_json(
      state,
      "POST",
      "/api/responders/ambulance",
      None,
      Some(serde_json::json!({
        "name": name,
        "phone": format!("+91-{name}"),
        "coordinates": [88.401, 22.58],
      })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let json = body_json(resp).await;
    json["ambulance_id"].as_str().unwrap().parse().unwrap()
  }

  // ── Submit ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn submit_without_identity_is_401() {
    let state = make_state().await;
    let resp = oneshot_json(
      state,
      "POST",
      "/api/emergency/request",
      None,
      Some(sos_body()),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn submit_creates_pending_request() {
    let state = make_state().await;
    let resp = oneshot_json(
      state,
      "POST",
      "/api/emergency/request",
      Some("user-1"),
      Some(sos_body()),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let json = body_json(resp).await;
    assert_eq!(json["status"], "pending");
    assert_eq!(json["user_id"], "user-1");
    assert!(json["ambulance_id"].is_null());
    assert!(json["events"].as_array().unwrap().is_empty());
  }

  #[tokio::test]
  async fn submit_with_out_of_range_coordinates_is_400() {
    let state = make_state().await;
    let resp = oneshot_json(
      state,
      "POST",
      "/api/emergency/request",
      Some("user-1"),
      Some(serde_json::json!({ "coordinates": [200.0, 0.0] })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  // ── Get one ─────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn get_unknown_request_is_404() {
    let state = make_state().await;
    let resp = oneshot_json(
      state,
      "GET",
      &format!("/api/emergency/{}", Uuid::new_v4()),
      None,
      None,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn submit_then_get_returns_the_record() {
    let state = make_state().await;
    let created = body_json(
      oneshot_json(
        state.clone(),
        "POST",
        "/api/emergency/request",
        Some("user-1"),
        Some(sos_body()),
      )
      .await,
    )
    .await;
    let request_id = created["request_id"].as_str().unwrap();

    let resp = oneshot_json(
      state,
      "GET",
      &format!("/api/emergency/{request_id}"),
      None,
      None,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["request_id"].as_str().unwrap(), request_id);
    assert_eq!(json["location"], serde_json::json!([88.40, 22.58]));
  }

  // ── Accept ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn first_ambulance_accept_wins_second_is_benign() {
    let state = make_state().await;
    let a1 = register_ambulance(state.clone(), "a1").await;
    let a2 = register_ambulance(state.clone(), "a2").await;

    let created = body_json(
      oneshot_json(
        state.clone(),
        "POST",
        "/api/emergency/request",
        Some("user-1"),
        Some(sos_body()),
      )
      .await,
    )
    .await;
    let request_id = created["request_id"].as_str().unwrap().to_string();

    let won = oneshot_json(
      state.clone(),
      "PATCH",
      &format!("/api/emergency/accept/ambulance/{request_id}"),
      None,
      Some(serde_json::json!({ "ambulanceId": a1 })),
    )
    .await;
    assert_eq!(won.status(), StatusCode::OK);
    let won = body_json(won).await;
    assert_eq!(won["assigned"], true);
    assert_eq!(won["ambulance_id"].as_str().unwrap(), a1.to_string());
    assert_eq!(won["status"], "ambulance_accepted");

    let lost = oneshot_json(
      state,
      "PATCH",
      &format!("/api/emergency/accept/ambulance/{request_id}"),
      None,
      Some(serde_json::json!({ "ambulanceId": a2 })),
    )
    .await;
    assert_eq!(lost.status(), StatusCode::OK);
    let lost = body_json(lost).await;
    assert_eq!(lost["assigned"], false);
    // The loser sees the authoritative record, not its own claim.
    assert_eq!(lost["ambulance_id"].as_str().unwrap(), a1.to_string());
  }

  #[tokio::test]
  async fn accept_on_unknown_request_is_404() {
    let state = make_state().await;
    let resp = oneshot_json(
      state,
      "PATCH",
      &format!("/api/emergency/accept/ambulance/{}", Uuid::new_v4()),
      None,
      Some(serde_json::json!({ "ambulanceId": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn hospital_accept_sets_assignment() {
    let state = make_state().await;
    let resp = oneshot_json(
      state.clone(),
      "POST",
      "/api/responders/hospital",
      None,
      Some(serde_json::json!({
        "name": "County General",
        "phone": "+913333333333",
        "coordinates": [88.41, 22.59],
      })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let hospital_id = body_json(resp).await["hospital_id"]
      .as_str()
      .unwrap()
      .to_string();

    let created = body_json(
      oneshot_json(
        state.clone(),
        "POST",
        "/api/emergency/request",
        Some("user-1"),
        Some(sos_body()),
      )
      .await,
    )
    .await;
    let request_id = created["request_id"].as_str().unwrap();

    let resp = oneshot_json(
      state,
      "PATCH",
      &format!("/api/emergency/accept/hospital/{request_id}"),
      None,
      Some(serde_json::json!({ "hospitalId": hospital_id })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["assigned"], true);
    assert_eq!(json["hospital_id"].as_str().unwrap(), hospital_id);
    assert_eq!(json["status"], "hospital_accepted");
  }

  // ── Check assignment ────────────────────────────────────────────────────────

  #[tokio::test]
  async fn check_assigned_reports_unassigned_request() {
    let state = make_state().await;
    let created = body_json(
      oneshot_json(
        state.clone(),
        "POST",
        "/api/emergency/request",
        Some("user-1"),
        Some(sos_body()),
      )
      .await,
    )
    .await;
    let request_id = created["request_id"].as_str().unwrap();

    let resp = oneshot_json(
      state,
      "POST",
      "/api/emergency/check-assigned-ambulance",
      None,
      Some(serde_json::json!({ "emergencyRequestId": request_id })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["assigned"], false);
    assert!(json.get("connectionId").is_none());
  }

  #[tokio::test]
  async fn check_assigned_unknown_request_is_404() {
    let state = make_state().await;
    let resp = oneshot_json(
      state,
      "POST",
      "/api/emergency/check-assigned-ambulance",
      None,
      Some(serde_json::json!({ "emergencyRequestId": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn bed_capacity_roundtrip_and_validation() {
    let state = make_state().await;
    let resp = oneshot_json(
      state.clone(),
      "POST",
      "/api/responders/hospital",
      None,
      Some(serde_json::json!({
        "name": "County General",
        "phone": "+913333333333",
        "coordinates": [88.41, 22.59],
      })),
    )
    .await;
    let hospital_id = body_json(resp).await["hospital_id"]
      .as_str()
      .unwrap()
      .to_string();

    let resp = oneshot_json(
      state.clone(),
      "PUT",
      &format!("/api/responders/hospital/{hospital_id}/beds"),
      None,
      Some(serde_json::json!({ "availableBeds": 12 })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = oneshot_json(
      state,
      "PUT",
      &format!("/api/responders/hospital/{hospital_id}/beds"),
      None,
      Some(serde_json::json!({ "availableBeds": -1 })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  // ── User provisioning ───────────────────────────────────────────────────────

  #[tokio::test]
  async fn upsert_user_returns_no_content() {
    let state = make_state().await;
    let resp = oneshot_json(
      state,
      "PUT",
      "/api/users/user-1",
      None,
      Some(serde_json::json!({
        "name": "Ira",
        "contacts": [{ "name": "Ma", "phone": "+911111111111" }],
      })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
  }
}
