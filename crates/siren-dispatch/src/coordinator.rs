//! [`Dispatcher`] — the dispatch coordination state machine.
//!
//! Owns every request mutation: creation, offer fan-out, first-claim-wins
//! assignment, operational status transitions, and the contact alerts that
//! shadow each patient-facing milestone. Core transitions report failure to
//! the caller; side effects (contact alerts, candidate pushes) are
//! fire-and-forget tasks with isolated failure handling — one unreachable
//! recipient never blocks the others and never fails the primary operation.

use std::sync::Arc;

use siren_core::{
  Error, Result,
  geo::Point,
  notify::ContactNotifier,
  request::{
    AssignmentStatus, ClaimOutcome, EventPayload, RequestRecord, RequestStatus,
  },
  responder::ResponderKind,
  store::{ContactDirectory, RequestStore, ResponderRegistry},
  user::UserProfile,
};
use uuid::Uuid;

use crate::{
  bus::{ServerEvent, StatusBroadcast, Topic},
  connections::ConnectionManager,
};

/// Everything the coordinator needs from storage, as one bound.
pub trait DispatchStore:
  RequestStore + ResponderRegistry + ContactDirectory + 'static
{
}

impl<T> DispatchStore for T where
  T: RequestStore + ResponderRegistry + ContactDirectory + 'static
{
}

// ─── Dispatcher ──────────────────────────────────────────────────────────────

/// The dispatch coordinator. Cloneable; all clones share the store, the
/// notifier gateway, and both halves of the notification bus.
pub struct Dispatcher<S, N> {
  store:               Arc<S>,
  notifier:            Arc<N>,
  connections:         ConnectionManager,
  broadcast:           StatusBroadcast,
  offer_radius_meters: f64,
}

// Manual impl: `S` and `N` live behind `Arc`s, so no bounds on them.
impl<S, N> Clone for Dispatcher<S, N> {
  fn clone(&self) -> Self {
    Self {
      store:               Arc::clone(&self.store),
      notifier:            Arc::clone(&self.notifier),
      connections:         self.connections.clone(),
      broadcast:           self.broadcast.clone(),
      offer_radius_meters: self.offer_radius_meters,
    }
  }
}

impl<S, N> Dispatcher<S, N>
where
  S: DispatchStore,
  N: ContactNotifier + 'static,
{
  pub fn new(store: Arc<S>, notifier: Arc<N>, offer_radius_meters: f64) -> Self {
    Self {
      store,
      notifier,
      connections: ConnectionManager::new(),
      broadcast: StatusBroadcast::new(),
      offer_radius_meters,
    }
  }

  /// The private-channel registry, shared with the session layer.
  pub fn connections(&self) -> &ConnectionManager { &self.connections }

  /// The topic broadcast hub, shared with the session layer.
  pub fn broadcast(&self) -> &StatusBroadcast { &self.broadcast }

  pub fn store(&self) -> &Arc<S> { &self.store }

  // ── SubmitRequest ─────────────────────────────────────────────────────────

  /// Create a new SOS and kick off the offer fan-out.
  ///
  /// The created request is returned immediately; pushing offers to nearby
  /// ambulances and alerting the requester's emergency contacts happen in
  /// detached tasks whose failures are logged, never surfaced.
  pub async fn submit_request(
    &self,
    user_id: String,
    origin: Point,
  ) -> Result<RequestRecord> {
    origin.validate()?;
    let record = self.store.create_request(user_id.clone(), origin).await?;
    tracing::info!(request_id = %record.request.request_id, %user_id, "emergency request created");

    self.spawn_contact_alert(user_id, move |user| {
      format!(
        "{} is in danger! Last known location: {}, {}",
        user.name, origin.lng, origin.lat
      )
    });

    let this = self.clone();
    let offer = record.clone();
    tokio::spawn(async move {
      this.offer_to_nearby(offer).await;
    });

    Ok(record)
  }

  /// Push a `new-emergency` offer to every available, reachable ambulance
  /// within the offer radius. One stale connection must not block the rest.
  async fn offer_to_nearby(&self, record: RequestRecord) {
    let request_id = record.request.request_id;
    let candidates = match self
      .store
      .find_nearby(
        record.request.location,
        self.offer_radius_meters,
        ResponderKind::Ambulance,
      )
      .await
    {
      Ok(c) => c,
      Err(e) => {
        tracing::warn!(%request_id, error = %e, "nearby-ambulance lookup failed");
        return;
      }
    };

    tracing::debug!(%request_id, candidates = candidates.len(), "offering to nearby ambulances");
    for candidate in candidates {
      let Some(connection_id) = candidate.connection_id() else {
        // find_nearby guarantees a handle; a missing one here is a bug.
        continue;
      };
      let delivered = self
        .connections
        .send_to(connection_id, ServerEvent::NewEmergency(record.clone()));
      if !delivered {
        tracing::warn!(
          %request_id,
          responder_id = %candidate.id(),
          "offer push failed: connection stale"
        );
      }
    }
  }

  // ── AcceptAmbulance / AcceptHospital ──────────────────────────────────────

  /// First-claim-wins ambulance assignment.
  ///
  /// The winning claim marks the ambulance unavailable, broadcasts the
  /// status topic, and alerts the requester's contacts with the driver's
  /// identity. A losing claim mutates nothing and returns the authoritative
  /// record.
  pub async fn accept_ambulance(
    &self,
    request_id: Uuid,
    ambulance_id: Uuid,
  ) -> Result<ClaimOutcome> {
    let outcome = self.store.claim_ambulance(request_id, ambulance_id).await?;

    if let ClaimOutcome::Assigned(record) = &outcome {
      // Claimed ambulances leave the offer pool until released.
      if let Err(e) = self.store.set_availability(ambulance_id, false).await {
        tracing::warn!(%ambulance_id, error = %e, "could not mark ambulance unavailable");
      }

      self.broadcast.publish(
        Topic::StatusUpdate(request_id),
        ServerEvent::StatusUpdate {
          request_id,
          status: RequestStatus::AmbulanceAccepted,
          data:   serde_json::json!({ "ambulanceId": ambulance_id }),
        },
      );

      let this = self.clone();
      let user_id = record.request.user_id.clone();
      tokio::spawn(async move {
        match this.store.get_ambulance(ambulance_id).await {
          Ok(Some(ambulance)) => this.spawn_contact_alert(user_id, move |user| {
            format!(
              "Ambulance assigned for {}. Driver: {} (id {}). Contact: {}",
              user.name, ambulance.name, ambulance.ambulance_id, ambulance.phone
            )
          }),
          Ok(None) => {
            tracing::warn!(%ambulance_id, "accepted ambulance missing from registry")
          }
          Err(e) => tracing::warn!(%ambulance_id, error = %e, "ambulance lookup failed"),
        }
      });

      tracing::info!(%request_id, %ambulance_id, "ambulance accepted");
    }

    Ok(outcome)
  }

  /// First-claim-wins hospital assignment. No nearest-neighbor step —
  /// hospitals claim from their own dashboards — but the same exclusivity
  /// contract applies.
  pub async fn accept_hospital(
    &self,
    request_id: Uuid,
    hospital_id: Uuid,
  ) -> Result<ClaimOutcome> {
    let outcome = self.store.claim_hospital(request_id, hospital_id).await?;

    if let ClaimOutcome::Assigned(record) = &outcome {
      self.broadcast.publish(
        Topic::StatusUpdate(request_id),
        ServerEvent::StatusUpdate {
          request_id,
          status: RequestStatus::HospitalAccepted,
          data:   serde_json::json!({ "hospitalId": hospital_id }),
        },
      );

      let this = self.clone();
      let user_id = record.request.user_id.clone();
      tokio::spawn(async move {
        match this.store.get_hospital(hospital_id).await {
          Ok(Some(hospital)) => this.spawn_contact_alert(user_id, move |user| {
            format!(
              "Hospital assigned for {}: {}. Contact: {}",
              user.name, hospital.name, hospital.phone
            )
          }),
          Ok(None) => {
            tracing::warn!(%hospital_id, "accepted hospital missing from registry")
          }
          Err(e) => tracing::warn!(%hospital_id, error = %e, "hospital lookup failed"),
        }
      });

      tracing::info!(%request_id, %hospital_id, "hospital accepted");
    }

    Ok(outcome)
  }

  // ── UpdateStatus ──────────────────────────────────────────────────────────

  /// Operational status transition (`picked`, `arrived`, custom
  /// milestones). Persists, broadcasts the request's status topic, and —
  /// for patient-facing milestones — alerts the emergency contacts.
  pub async fn update_status(
    &self,
    request_id: Uuid,
    status: RequestStatus,
    data: serde_json::Value,
  ) -> Result<RequestRecord> {
    let record = self
      .store
      .set_status(request_id, status.clone(), data.clone())
      .await?;

    self.broadcast.publish(
      Topic::StatusUpdate(request_id),
      ServerEvent::StatusUpdate { request_id, status: status.clone(), data },
    );

    if status.is_milestone() {
      let status_text = status.to_string();
      self.spawn_contact_alert(record.request.user_id.clone(), move |user| {
        format!("Status update for {}: {}", user.name, status_text)
      });
    }

    Ok(record)
  }

  // ── Live location ─────────────────────────────────────────────────────────

  /// Live location push from the assigned ambulance. Rebroadcast comes
  /// first; persistence (event append + registry refresh) is best-effort,
  /// matching the lossy-bus contract.
  pub async fn record_location(&self, request_id: Uuid, coordinates: Point) {
    self.broadcast.publish(
      Topic::AmbulanceLocation(request_id),
      ServerEvent::AmbulanceLocation { request_id, coordinates },
    );

    match self
      .store
      .append_event(request_id, EventPayload::LocationUpdate { coordinates })
      .await
    {
      Ok(record) => {
        if let Some(ambulance_id) = record.request.ambulance_id
          && let Err(e) = self.store.update_location(ambulance_id, coordinates).await
        {
          tracing::warn!(%ambulance_id, error = %e, "registry location refresh failed");
        }
      }
      Err(e) => {
        tracing::warn!(%request_id, error = %e, "failed to persist location update");
      }
    }
  }

  // ── CheckAssignment ───────────────────────────────────────────────────────

  /// Read-only: has an ambulance claimed this request, and on which live
  /// channel can it be reached?
  pub async fn check_assignment(&self, request_id: Uuid) -> Result<AssignmentStatus> {
    let record = self
      .store
      .get_request(request_id)
      .await?
      .ok_or(Error::RequestNotFound(request_id))?;

    let Some(ambulance_id) = record.request.ambulance_id else {
      return Ok(AssignmentStatus { assigned: false, connection_id: None });
    };

    let ambulance = self
      .store
      .get_ambulance(ambulance_id)
      .await?
      .ok_or(Error::AmbulanceNotFound(ambulance_id))?;

    Ok(AssignmentStatus {
      assigned:      true,
      connection_id: ambulance.connection_id,
    })
  }

  // ── Contact alerts ────────────────────────────────────────────────────────

  /// Fire-and-forget alert to every emergency contact of `user_id`.
  ///
  /// A user without a profile or without contacts alerts nobody — and that
  /// is not an error. Each contact gets its own task so one failing send
  /// cannot abort the rest.
  fn spawn_contact_alert<F>(&self, user_id: String, compose: F)
  where
    F: FnOnce(&UserProfile) -> String + Send + 'static,
  {
    let this = self.clone();
    tokio::spawn(async move {
      let user = match this.store.get_user(user_id.clone()).await {
        Ok(Some(user)) => user,
        Ok(None) => return,
        Err(e) => {
          tracing::warn!(%user_id, error = %e, "contact lookup failed");
          return;
        }
      };
      if user.contacts.is_empty() {
        return;
      }

      let message = compose(&user);
      for contact in user.contacts {
        let notifier = Arc::clone(&this.notifier);
        let message = message.clone();
        let label = contact.name.clone();
        tokio::spawn(async move {
          if let Err(e) = notifier.notify(contact, message).await {
            tracing::warn!(contact = %label, error = %e, "contact alert failed");
          }
        });
      }
    });
  }
}
