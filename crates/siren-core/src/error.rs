//! Error types for `siren-core`.
//!
//! One taxonomy shared by every layer: `*NotFound` is recoverable and maps
//! to a client error, `InvalidCoordinates` is rejected before any mutation,
//! `StoreUnavailable` is fatal for the in-flight operation only.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("emergency request not found: {0}")]
  RequestNotFound(Uuid),

  #[error("ambulance not found: {0}")]
  AmbulanceNotFound(Uuid),

  #[error("hospital not found: {0}")]
  HospitalNotFound(Uuid),

  #[error("invalid coordinates: [{lng}, {lat}]")]
  InvalidCoordinates { lng: f64, lat: f64 },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// The backing store could not complete the operation. The request is
  /// left in its prior consistent state.
  #[error("store unavailable: {0}")]
  StoreUnavailable(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
