//! Storage trait seams for the dispatch engine.
//!
//! Implemented by storage backends (e.g. `siren-store-sqlite`). Higher
//! layers (`siren-dispatch`, `siren-server`) depend on these abstractions,
//! not on any concrete backend.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes (tokio with `axum`).

use std::future::Future;

use uuid::Uuid;

use crate::{
  Result,
  geo::Point,
  request::{ClaimOutcome, EventPayload, RequestRecord, RequestStatus},
  responder::{Ambulance, Hospital, NewResponder, Responder, ResponderKind},
  user::UserProfile,
};

// ─── Emergency Request Store ─────────────────────────────────────────────────

/// Durable record of each SOS: origin, lifecycle status, assignments, and
/// the append-only event log.
///
/// The `claim_*` methods are the concurrency-critical seam: the assignment
/// must be a single atomic conditional update ("set IF currently unset") at
/// the storage layer, never a read-then-write in the caller.
pub trait RequestStore: Send + Sync {
  /// Create a new request with status `pending`, empty assignment fields,
  /// and an empty event log.
  fn create_request(
    &self,
    user_id: String,
    origin: Point,
  ) -> impl Future<Output = Result<RequestRecord>> + Send + '_;

  /// Retrieve a request with its full event log. Returns `None` if not
  /// found.
  fn get_request(
    &self,
    request_id: Uuid,
  ) -> impl Future<Output = Result<Option<RequestRecord>>> + Send + '_;

  /// Append one event to the request's log and return the updated record.
  ///
  /// Fails with [`Error::RequestNotFound`](crate::Error::RequestNotFound)
  /// if the request does not exist.
  fn append_event(
    &self,
    request_id: Uuid,
    payload: EventPayload,
  ) -> impl Future<Output = Result<RequestRecord>> + Send + '_;

  /// Atomically set `ambulance_id` and status `ambulance_accepted` if no
  /// ambulance is assigned yet, appending the event in the same
  /// transaction. Exactly one concurrent caller observes
  /// [`ClaimOutcome::Assigned`].
  fn claim_ambulance(
    &self,
    request_id: Uuid,
    ambulance_id: Uuid,
  ) -> impl Future<Output = Result<ClaimOutcome>> + Send + '_;

  /// Analogous to [`claim_ambulance`](Self::claim_ambulance) for the
  /// hospital assignment.
  fn claim_hospital(
    &self,
    request_id: Uuid,
    hospital_id: Uuid,
  ) -> impl Future<Output = Result<ClaimOutcome>> + Send + '_;

  /// Generic status transition for operational states (`picked`,
  /// `arrived`, custom milestones); appends a `status_change` event.
  fn set_status(
    &self,
    request_id: Uuid,
    status: RequestStatus,
    data: serde_json::Value,
  ) -> impl Future<Output = Result<RequestRecord>> + Send + '_;
}

// ─── Geospatial Responder Registry ───────────────────────────────────────────

/// Tracks responder identity, live-connection binding, availability, and
/// last-known location; answers nearest-neighbor queries.
pub trait ResponderRegistry: Send + Sync {
  fn register_ambulance(
    &self,
    input: NewResponder,
  ) -> impl Future<Output = Result<Ambulance>> + Send + '_;

  fn register_hospital(
    &self,
    input: NewResponder,
  ) -> impl Future<Output = Result<Hospital>> + Send + '_;

  fn get_ambulance(
    &self,
    ambulance_id: Uuid,
  ) -> impl Future<Output = Result<Option<Ambulance>>> + Send + '_;

  fn get_hospital(
    &self,
    hospital_id: Uuid,
  ) -> impl Future<Output = Result<Option<Hospital>>> + Send + '_;

  /// Responders of `kind` within `radius_meters` of `origin`, nearest
  /// first. Must exclude unavailable responders and responders without a
  /// live connection — that is a correctness requirement, not an
  /// optimization.
  fn find_nearby(
    &self,
    origin: Point,
    radius_meters: f64,
    kind: ResponderKind,
  ) -> impl Future<Output = Result<Vec<Responder>>> + Send + '_;

  /// Bind a live connection to a responder. Idempotent; overwrites any
  /// prior handle (supports reconnect). Unknown responder ids are logged
  /// and ignored so a handshake can never fail a session.
  fn bind_connection(
    &self,
    responder_id: Uuid,
    kind: ResponderKind,
    connection_id: Uuid,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  /// Clear every binding that references `connection_id`. Called when a
  /// session drops so stale handles are never offered to.
  fn unbind_connection(
    &self,
    connection_id: Uuid,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  /// Flip an ambulance's availability flag (claim/release transitions).
  /// Hospitals carry bed capacity instead and are not covered here.
  fn set_availability(
    &self,
    ambulance_id: Uuid,
    available: bool,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  /// Record an ambulance's last-known location.
  fn update_location(
    &self,
    ambulance_id: Uuid,
    location: Point,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  /// Set a hospital's free-bed count. Hospitals report capacity from their
  /// dashboards; a count of zero removes them from nearest-neighbor results.
  fn set_bed_capacity(
    &self,
    hospital_id: Uuid,
    available_beds: i64,
  ) -> impl Future<Output = Result<()>> + Send + '_;
}

// ─── Contact directory ───────────────────────────────────────────────────────

/// Read side of the requester profile: name and emergency contacts.
/// Profiles are written by the external account system; `upsert_user` is
/// the provisioning seam it calls into.
pub trait ContactDirectory: Send + Sync {
  fn get_user(
    &self,
    user_id: String,
  ) -> impl Future<Output = Result<Option<UserProfile>>> + Send + '_;

  fn upsert_user(
    &self,
    profile: UserProfile,
  ) -> impl Future<Output = Result<()>> + Send + '_;
}
