//! Geographic point type and distance math.
//!
//! Points serialise as `[lng, lat]` arrays — the GeoJSON coordinate order
//! used on the wire by every client. Distance is great-circle (haversine);
//! the registry filters candidates in process, so there is no dependency on
//! a geo-indexed backend.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS 84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
  pub lng: f64,
  pub lat: f64,
}

impl From<[f64; 2]> for Point {
  fn from([lng, lat]: [f64; 2]) -> Self { Self { lng, lat } }
}

impl From<Point> for [f64; 2] {
  fn from(p: Point) -> Self { [p.lng, p.lat] }
}

impl Point {
  pub fn new(lng: f64, lat: f64) -> Self { Self { lng, lat } }

  /// Reject out-of-range or non-finite coordinates before any mutation.
  pub fn validate(&self) -> Result<()> {
    let in_range = self.lng.is_finite()
      && self.lat.is_finite()
      && (-180.0..=180.0).contains(&self.lng)
      && (-90.0..=90.0).contains(&self.lat);
    if in_range {
      Ok(())
    } else {
      Err(Error::InvalidCoordinates { lng: self.lng, lat: self.lat })
    }
  }

  /// Great-circle distance to `other` in meters.
  pub fn distance_meters(&self, other: &Point) -> f64 {
    let phi1 = self.lat.to_radians();
    let phi2 = other.lat.to_radians();
    let d_phi = (other.lat - self.lat).to_radians();
    let d_lambda = (other.lng - self.lng).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
      + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
  }
}
