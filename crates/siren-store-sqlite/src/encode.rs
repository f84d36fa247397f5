//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Event payloads are stored
//! as compact JSON next to their kind discriminant. UUIDs are stored as
//! hyphenated lowercase strings.

use chrono::{DateTime, Utc};
use siren_core::{
  Error, Result,
  geo::Point,
  request::{EmergencyRequest, EventPayload, RequestEvent, RequestStatus},
  responder::{Ambulance, Hospital},
};
use uuid::Uuid;

// ─── Error mapping ───────────────────────────────────────────────────────────

/// Backend failures surface as `StoreUnavailable`: fatal for the in-flight
/// operation, recoverable for the system.
pub fn db_err(e: tokio_rusqlite::Error) -> Error {
  Error::StoreUnavailable(e.to_string())
}

/// A stored value that no longer decodes is equivalent to the store being
/// unreadable for that operation.
fn corrupt(what: &str, detail: impl std::fmt::Display) -> Error {
  Error::StoreUnavailable(format!("corrupt {what} in store: {detail}"))
}

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> {
  Uuid::parse_str(s).map_err(|e| corrupt("uuid", e))
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| corrupt("timestamp", e))
}

// ─── Raw row types ───────────────────────────────────────────────────────────

/// A `requests` row as read from SQLite, before decoding.
pub struct RawRequest {
  pub request_id:   String,
  pub user_id:      String,
  pub lng:          f64,
  pub lat:          f64,
  pub status:       String,
  pub ambulance_id: Option<String>,
  pub hospital_id:  Option<String>,
  pub created_at:   String,
}

impl RawRequest {
  pub fn into_request(self) -> Result<EmergencyRequest> {
    Ok(EmergencyRequest {
      request_id:   decode_uuid(&self.request_id)?,
      user_id:      self.user_id,
      location:     Point::new(self.lng, self.lat),
      status:       RequestStatus::from_str_lossy(&self.status),
      ambulance_id: self.ambulance_id.as_deref().map(decode_uuid).transpose()?,
      hospital_id:  self.hospital_id.as_deref().map(decode_uuid).transpose()?,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// A `request_events` row as read from SQLite, before decoding.
pub struct RawEvent {
  pub seq:         i64,
  pub kind:        String,
  pub data_json:   String,
  pub recorded_at: String,
}

impl RawEvent {
  pub fn into_event(self) -> Result<RequestEvent> {
    let data: serde_json::Value = serde_json::from_str(&self.data_json)
      .map_err(|e| corrupt("event payload", e))?;
    Ok(RequestEvent {
      seq:         self.seq,
      payload:     EventPayload::from_parts(&self.kind, data)?,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

/// An `ambulances` row as read from SQLite, before decoding.
pub struct RawAmbulance {
  pub ambulance_id:  String,
  pub name:          String,
  pub phone:         String,
  pub lng:           f64,
  pub lat:           f64,
  pub available:     bool,
  pub connection_id: Option<String>,
}

impl RawAmbulance {
  pub fn into_ambulance(self) -> Result<Ambulance> {
    Ok(Ambulance {
      ambulance_id:  decode_uuid(&self.ambulance_id)?,
      name:          self.name,
      phone:         self.phone,
      location:      Point::new(self.lng, self.lat),
      available:     self.available,
      connection_id: self.connection_id.as_deref().map(decode_uuid).transpose()?,
    })
  }
}

/// A `hospitals` row as read from SQLite, before decoding.
pub struct RawHospital {
  pub hospital_id:    String,
  pub name:           String,
  pub phone:          String,
  pub lng:            f64,
  pub lat:            f64,
  pub available_beds: i64,
  pub connection_id:  Option<String>,
}

impl RawHospital {
  pub fn into_hospital(self) -> Result<Hospital> {
    Ok(Hospital {
      hospital_id:    decode_uuid(&self.hospital_id)?,
      name:           self.name,
      phone:          self.phone,
      location:       Point::new(self.lng, self.lat),
      available_beds: self.available_beds,
      connection_id:  self.connection_id.as_deref().map(decode_uuid).transpose()?,
    })
  }
}
