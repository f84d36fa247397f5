//! Handlers for the `/api` endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `POST`  | `/api/emergency/request` | Requester identity from `x-user-id` |
//! | `GET`   | `/api/emergency/:request_id` | 404 if not found |
//! | `PATCH` | `/api/emergency/accept/ambulance/:request_id` | Body: `{"ambulanceId":…}` |
//! | `PATCH` | `/api/emergency/accept/hospital/:request_id` | Body: `{"hospitalId":…}` |
//! | `POST`  | `/api/emergency/check-assigned-ambulance` | Body: `{"emergencyRequestId":…}` |
//! | `POST`  | `/api/responders/ambulance` | Registers a new ambulance |
//! | `POST`  | `/api/responders/hospital` | Registers a new hospital |
//! | `PUT`   | `/api/users/:user_id` | Provisioning seam for the account system |

use axum::{
  Json,
  extract::{Path, State},
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use siren_core::{
  geo::Point,
  notify::ContactNotifier,
  request::{AssignmentStatus, RequestRecord},
  responder::{Ambulance, Hospital, NewResponder},
  store::{ContactDirectory, RequestStore, ResponderRegistry},
  user::{EmergencyContact, UserProfile},
};
use siren_dispatch::DispatchStore;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// Requester identity, as asserted by the upstream identity provider.
fn user_id_from_headers(headers: &HeaderMap) -> Result<String, ApiError> {
  headers
    .get("x-user-id")
    .and_then(|v| v.to_str().ok())
    .filter(|v| !v.is_empty())
    .map(str::to_owned)
    .ok_or_else(|| ApiError::Unauthorized("missing x-user-id header".into()))
}

// ─── Submit ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
  /// `[longitude, latitude]`.
  pub coordinates: Point,
}

/// `POST /api/emergency/request`
pub async fn submit<S, N>(
  State(state): State<AppState<S, N>>,
  headers: HeaderMap,
  Json(body): Json<SubmitBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DispatchStore,
  N: ContactNotifier + 'static,
{
  let user_id = user_id_from_headers(&headers)?;
  let record = state.dispatcher.submit_request(user_id, body.coordinates).await?;
  Ok((StatusCode::CREATED, Json(record)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /api/emergency/:request_id` — reconnect re-query: the full record
/// with its event log, for clients that missed broadcasts while offline.
pub async fn get_one<S, N>(
  State(state): State<AppState<S, N>>,
  Path(request_id): Path<Uuid>,
) -> Result<Json<RequestRecord>, ApiError>
where
  S: DispatchStore,
  N: ContactNotifier + 'static,
{
  let record = state
    .dispatcher
    .store()
    .get_request(request_id)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("request {request_id} not found")))?;
  Ok(Json(record))
}

// ─── Accept ───────────────────────────────────────────────────────────────────

/// Claim outcome on the wire. Losing a race is a 200 with `assigned: false`
/// and the authoritative record, never an error.
#[derive(Debug, Serialize)]
pub struct AcceptResponse {
  pub assigned: bool,
  #[serde(flatten)]
  pub record:   RequestRecord,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptAmbulanceBody {
  pub ambulance_id: Uuid,
}

/// `PATCH /api/emergency/accept/ambulance/:request_id`
pub async fn accept_ambulance<S, N>(
  State(state): State<AppState<S, N>>,
  Path(request_id): Path<Uuid>,
  Json(body): Json<AcceptAmbulanceBody>,
) -> Result<Json<AcceptResponse>, ApiError>
where
  S: DispatchStore,
  N: ContactNotifier + 'static,
{
  let outcome = state
    .dispatcher
    .accept_ambulance(request_id, body.ambulance_id)
    .await?;
  Ok(Json(AcceptResponse {
    assigned: outcome.is_assigned(),
    record:   outcome.into_record(),
  }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptHospitalBody {
  pub hospital_id: Uuid,
}

/// `PATCH /api/emergency/accept/hospital/:request_id`
pub async fn accept_hospital<S, N>(
  State(state): State<AppState<S, N>>,
  Path(request_id): Path<Uuid>,
  Json(body): Json<AcceptHospitalBody>,
) -> Result<Json<AcceptResponse>, ApiError>
where
  S: DispatchStore,
  N: ContactNotifier + 'static,
{
  let outcome = state
    .dispatcher
    .accept_hospital(request_id, body.hospital_id)
    .await?;
  Ok(Json(AcceptResponse {
    assigned: outcome.is_assigned(),
    record:   outcome.into_record(),
  }))
}

// ─── Check assignment ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckAssignedBody {
  pub emergency_request_id: Uuid,
}

/// `POST /api/emergency/check-assigned-ambulance`
pub async fn check_assigned<S, N>(
  State(state): State<AppState<S, N>>,
  Json(body): Json<CheckAssignedBody>,
) -> Result<Json<AssignmentStatus>, ApiError>
where
  S: DispatchStore,
  N: ContactNotifier + 'static,
{
  let status = state
    .dispatcher
    .check_assignment(body.emergency_request_id)
    .await?;
  Ok(Json(status))
}

// ─── Responder registration ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterResponderBody {
  pub name:        String,
  pub phone:       String,
  /// `[longitude, latitude]`.
  pub coordinates: Point,
}

impl RegisterResponderBody {
  fn into_input(self) -> Result<NewResponder, ApiError> {
    self.coordinates.validate().map_err(ApiError::from)?;
    Ok(NewResponder {
      name:     self.name,
      phone:    self.phone,
      location: self.coordinates,
    })
  }
}

/// `POST /api/responders/ambulance`
pub async fn register_ambulance<S, N>(
  State(state): State<AppState<S, N>>,
  Json(body): Json<RegisterResponderBody>,
) -> Result<(StatusCode, Json<Ambulance>), ApiError>
where
  S: DispatchStore,
  N: ContactNotifier + 'static,
{
  let ambulance = state
    .dispatcher
    .store()
    .register_ambulance(body.into_input()?)
    .await?;
  Ok((StatusCode::CREATED, Json(ambulance)))
}

/// `POST /api/responders/hospital`
pub async fn register_hospital<S, N>(
  State(state): State<AppState<S, N>>,
  Json(body): Json<RegisterResponderBody>,
) -> Result<(StatusCode, Json<Hospital>), ApiError>
where
  S: DispatchStore,
  N: ContactNotifier + 'static,
{
  let hospital = state
    .dispatcher
    .store()
    .register_hospital(body.into_input()?)
    .await?;
  Ok((StatusCode::CREATED, Json(hospital)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedCapacityBody {
  pub available_beds: i64,
}

/// `PUT /api/responders/hospital/:hospital_id/beds` — hospitals report free
/// beds from their dashboards; zero removes them from offer results.
pub async fn set_bed_capacity<S, N>(
  State(state): State<AppState<S, N>>,
  Path(hospital_id): Path<Uuid>,
  Json(body): Json<BedCapacityBody>,
) -> Result<StatusCode, ApiError>
where
  S: DispatchStore,
  N: ContactNotifier + 'static,
{
  if body.available_beds < 0 {
    return Err(ApiError::BadRequest("availableBeds must be non-negative".into()));
  }
  state
    .dispatcher
    .store()
    .set_bed_capacity(hospital_id, body.available_beds)
    .await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── User provisioning ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UpsertUserBody {
  pub name:     String,
  #[serde(default)]
  pub contacts: Vec<EmergencyContact>,
}

/// `PUT /api/users/:user_id` — called by the account system whenever a
/// profile or its emergency contacts change.
pub async fn upsert_user<S, N>(
  State(state): State<AppState<S, N>>,
  Path(user_id): Path<String>,
  Json(body): Json<UpsertUserBody>,
) -> Result<StatusCode, ApiError>
where
  S: DispatchStore,
  N: ContactNotifier + 'static,
{
  state
    .dispatcher
    .store()
    .upsert_user(UserProfile {
      user_id,
      name: body.name,
      contacts: body.contacts,
    })
    .await?;
  Ok(StatusCode::NO_CONTENT)
}
