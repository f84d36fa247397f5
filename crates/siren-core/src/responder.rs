//! Responder types — the ambulances and hospitals a request can be matched
//! with.
//!
//! `connection_id` is the ephemeral live-channel binding. It is overwritten
//! on reconnect and cleared when the session drops; a `None` here means the
//! responder is unreachable for push and must be excluded from offers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::Point;

/// The role a live connection registers as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponderKind {
  Ambulance,
  Hospital,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ambulance {
  pub ambulance_id:  Uuid,
  pub name:          String,
  pub phone:         String,
  pub location:      Point,
  pub available:     bool,
  pub connection_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hospital {
  pub hospital_id:    Uuid,
  pub name:           String,
  pub phone:          String,
  pub location:       Point,
  /// Hospitals carry bed capacity instead of an availability flag.
  pub available_beds: i64,
  pub connection_id:  Option<Uuid>,
}

/// Either kind of responder, as returned by nearest-neighbor queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Responder {
  Ambulance(Ambulance),
  Hospital(Hospital),
}

impl Responder {
  pub fn id(&self) -> Uuid {
    match self {
      Self::Ambulance(a) => a.ambulance_id,
      Self::Hospital(h) => h.hospital_id,
    }
  }

  pub fn location(&self) -> Point {
    match self {
      Self::Ambulance(a) => a.location,
      Self::Hospital(h) => h.location,
    }
  }

  pub fn connection_id(&self) -> Option<Uuid> {
    match self {
      Self::Ambulance(a) => a.connection_id,
      Self::Hospital(h) => h.connection_id,
    }
  }
}

/// Input to responder registration; ids are assigned by the registry.
#[derive(Debug, Clone)]
pub struct NewResponder {
  pub name:     String,
  pub phone:    String,
  pub location: Point,
}
