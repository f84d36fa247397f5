//! Emergency request types — the unit of dispatch coordination.
//!
//! A request is created `Pending` and transitions through responder
//! acceptance and operational milestones. Every transition is recorded in
//! an append-only event log; the log, not the status field, is the
//! authoritative history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Result, geo::Point};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle status of an emergency request.
///
/// The closed variants cover the dispatch state machine; `Custom` preserves
/// the extensibility of free-form operational milestones without giving up
/// type safety on the known states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
  Pending,
  AmbulanceAccepted,
  HospitalAccepted,
  Picked,
  Arrived,
  Cancelled,
  #[serde(untagged)]
  Custom(String),
}

impl RequestStatus {
  /// The string stored in the `status` column and sent on the wire.
  pub fn as_str(&self) -> &str {
    match self {
      Self::Pending => "pending",
      Self::AmbulanceAccepted => "ambulance_accepted",
      Self::HospitalAccepted => "hospital_accepted",
      Self::Picked => "picked",
      Self::Arrived => "arrived",
      Self::Cancelled => "cancelled",
      Self::Custom(s) => s,
    }
  }

  /// Inverse of [`as_str`](Self::as_str); never fails — unknown strings
  /// become `Custom`.
  pub fn from_str_lossy(s: &str) -> Self {
    match s {
      "pending" => Self::Pending,
      "ambulance_accepted" => Self::AmbulanceAccepted,
      "hospital_accepted" => Self::HospitalAccepted,
      "picked" => Self::Picked,
      "arrived" => Self::Arrived,
      "cancelled" => Self::Cancelled,
      other => Self::Custom(other.to_owned()),
    }
  }

  /// Whether this status is a patient-facing milestone that warrants an
  /// out-of-band alert to the requester's emergency contacts.
  pub fn is_milestone(&self) -> bool {
    matches!(self, Self::Picked | Self::Arrived)
  }
}

impl std::fmt::Display for RequestStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Event log ───────────────────────────────────────────────────────────────

/// The typed payload of an event-log entry. The variant name serves as the
/// `kind` discriminant stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
  AmbulanceAccepted { ambulance_id: Uuid },
  HospitalAccepted { hospital_id: Uuid },
  LocationUpdate { coordinates: Point },
  StatusChange {
    status: RequestStatus,
    data:   serde_json::Value,
  },
}

impl EventPayload {
  /// The discriminant string stored in the `kind` column.
  /// Must match the `rename_all = "snake_case"` serde tags above.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::AmbulanceAccepted { .. } => "ambulance_accepted",
      Self::HospitalAccepted { .. } => "hospital_accepted",
      Self::LocationUpdate { .. } => "location_update",
      Self::StatusChange { .. } => "status_change",
    }
  }

  /// Serialise the inner payload (without the kind tag) for the `data_json`
  /// database column.
  pub fn to_json(&self) -> Result<serde_json::Value> {
    let full = serde_json::to_value(self)?;
    Ok(full.get("data").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Deserialise from the discriminant string and JSON payload stored in
  /// the database.
  pub fn from_parts(discriminant: &str, data: serde_json::Value) -> Result<Self> {
    let wrapped = serde_json::json!({ "kind": discriminant, "data": data });
    Ok(serde_json::from_value(wrapped)?)
  }
}

/// One row of a request's append-only event log. `seq` is 1-based and
/// strictly increasing within a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEvent {
  pub seq:         i64,
  #[serde(flatten)]
  pub payload:     EventPayload,
  pub recorded_at: DateTime<Utc>,
}

// ─── Request ─────────────────────────────────────────────────────────────────

/// A persisted SOS. Assignment fields are write-once: once `ambulance_id`
/// (or `hospital_id`) is set, no later accept may clear or replace it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyRequest {
  pub request_id:   Uuid,
  /// Requester identity as issued by the external identity provider.
  pub user_id:      String,
  pub location:     Point,
  pub status:       RequestStatus,
  pub ambulance_id: Option<Uuid>,
  pub hospital_id:  Option<Uuid>,
  pub created_at:   DateTime<Utc>,
}

/// A request bundled with its full event log — the wire shape returned to
/// API callers and pushed to offer candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
  #[serde(flatten)]
  pub request: EmergencyRequest,
  pub events:  Vec<RequestEvent>,
}

// ─── Claim outcome ───────────────────────────────────────────────────────────

/// Result of a first-claim-wins assignment attempt. Losing a race is not an
/// error; the loser receives the authoritative record.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
  /// This caller's claim won and the assignment is now durable.
  Assigned(RequestRecord),
  /// Another responder already holds the assignment; state is unchanged.
  AlreadyAssigned(RequestRecord),
}

impl ClaimOutcome {
  pub fn record(&self) -> &RequestRecord {
    match self {
      Self::Assigned(r) | Self::AlreadyAssigned(r) => r,
    }
  }

  pub fn into_record(self) -> RequestRecord {
    match self {
      Self::Assigned(r) | Self::AlreadyAssigned(r) => r,
    }
  }

  pub fn is_assigned(&self) -> bool { matches!(self, Self::Assigned(_)) }
}

/// Answer to a `check-assigned-ambulance` query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentStatus {
  pub assigned:      bool,
  /// Live-channel identity of the assigned ambulance, when reachable.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub connection_id: Option<Uuid>,
}
