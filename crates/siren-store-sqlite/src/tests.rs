//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::Arc;

use siren_core::{
  Error,
  geo::Point,
  request::{ClaimOutcome, EventPayload, RequestStatus},
  responder::{NewResponder, Responder, ResponderKind},
  store::{ContactDirectory, RequestStore, ResponderRegistry},
  user::{EmergencyContact, UserProfile},
};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory().await.expect("in-memory store")
}

fn kolkata() -> Point { Point::new(88.40, 22.58) }

fn responder(name: &str, location: Point) -> NewResponder {
  NewResponder {
    name:     name.into(),
    phone:    "+910000000000".into(),
    location,
  }
}

// ─── Request lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn create_then_get_is_pending_and_unassigned() {
  let s = store().await;

  let created = s.create_request("user-1".into(), kolkata()).await.unwrap();
  let fetched = s
    .get_request(created.request.request_id)
    .await
    .unwrap()
    .unwrap();

  assert_eq!(fetched.request.status, RequestStatus::Pending);
  assert_eq!(fetched.request.ambulance_id, None);
  assert_eq!(fetched.request.hospital_id, None);
  assert_eq!(fetched.request.user_id, "user-1");
  assert!(fetched.events.is_empty());
}

#[tokio::test]
async fn get_missing_request_returns_none() {
  let s = store().await;
  assert!(s.get_request(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn append_event_grows_log_by_one_and_preserves_history() {
  let s = store().await;
  let created = s.create_request("user-1".into(), kolkata()).await.unwrap();
  let id = created.request.request_id;

  let mut seen: Vec<i64> = Vec::new();
  for i in 0..4 {
    let record = s
      .append_event(
        id,
        EventPayload::LocationUpdate {
          coordinates: Point::new(88.40 + f64::from(i) * 0.001, 22.58),
        },
      )
      .await
      .unwrap();

    assert_eq!(record.events.len(), (i + 1) as usize);
    let seqs: Vec<i64> = record.events.iter().map(|e| e.seq).collect();
    assert!(seqs.starts_with(&seen), "prior entries mutated: {seqs:?}");
    seen = seqs;
  }

  assert_eq!(seen, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn append_event_on_missing_request_errors() {
  let s = store().await;
  let err = s
    .append_event(
      Uuid::new_v4(),
      EventPayload::LocationUpdate { coordinates: kolkata() },
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::RequestNotFound(_)));
}

// ─── Claims ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_ambulance_claim_wins_and_appends_event() {
  let s = store().await;
  let created = s.create_request("user-1".into(), kolkata()).await.unwrap();
  let id = created.request.request_id;
  let ambulance = Uuid::new_v4();

  let outcome = s.claim_ambulance(id, ambulance).await.unwrap();
  let record = match outcome {
    ClaimOutcome::Assigned(r) => r,
    other => panic!("expected win: {other:?}"),
  };

  assert_eq!(record.request.status, RequestStatus::AmbulanceAccepted);
  assert_eq!(record.request.ambulance_id, Some(ambulance));

  let last = record.events.last().unwrap();
  assert!(matches!(
    last.payload,
    EventPayload::AmbulanceAccepted { ambulance_id } if ambulance_id == ambulance
  ));
}

#[tokio::test]
async fn second_ambulance_claim_is_benign_and_does_not_overwrite() {
  let s = store().await;
  let created = s.create_request("user-1".into(), kolkata()).await.unwrap();
  let id = created.request.request_id;
  let (a1, a2) = (Uuid::new_v4(), Uuid::new_v4());

  assert!(s.claim_ambulance(id, a1).await.unwrap().is_assigned());

  let loser = s.claim_ambulance(id, a2).await.unwrap();
  assert!(!loser.is_assigned());
  assert_eq!(loser.record().request.ambulance_id, Some(a1));

  // Exactly one accepted event in the log.
  let accepted = loser
    .record()
    .events
    .iter()
    .filter(|e| matches!(e.payload, EventPayload::AmbulanceAccepted { .. }))
    .count();
  assert_eq!(accepted, 1);
}

#[tokio::test]
async fn concurrent_claims_exactly_one_wins() {
  let s = Arc::new(store().await);
  let created = s.create_request("user-1".into(), kolkata()).await.unwrap();
  let id = created.request.request_id;

  let mut handles = Vec::new();
  for _ in 0..16 {
    let s = Arc::clone(&s);
    handles.push(tokio::spawn(async move {
      s.claim_ambulance(id, Uuid::new_v4()).await.unwrap()
    }));
  }

  let mut wins = 0;
  let mut winner = None;
  for handle in handles {
    let outcome = handle.await.unwrap();
    if outcome.is_assigned() {
      wins += 1;
      winner = outcome.record().request.ambulance_id;
    }
  }

  assert_eq!(wins, 1);
  let final_record = s.get_request(id).await.unwrap().unwrap();
  assert_eq!(final_record.request.ambulance_id, winner);
}

#[tokio::test]
async fn claim_on_missing_request_errors() {
  let s = store().await;
  let err = s
    .claim_ambulance(Uuid::new_v4(), Uuid::new_v4())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::RequestNotFound(_)));
}

#[tokio::test]
async fn hospital_claim_is_independent_of_ambulance_claim() {
  let s = store().await;
  let created = s.create_request("user-1".into(), kolkata()).await.unwrap();
  let id = created.request.request_id;
  let (ambulance, hospital) = (Uuid::new_v4(), Uuid::new_v4());

  assert!(s.claim_ambulance(id, ambulance).await.unwrap().is_assigned());
  let outcome = s.claim_hospital(id, hospital).await.unwrap();
  assert!(outcome.is_assigned());

  let record = outcome.into_record();
  assert_eq!(record.request.ambulance_id, Some(ambulance));
  assert_eq!(record.request.hospital_id, Some(hospital));
  assert_eq!(record.request.status, RequestStatus::HospitalAccepted);
}

// ─── Status transitions ──────────────────────────────────────────────────────

#[tokio::test]
async fn set_status_updates_field_and_appends_event() {
  let s = store().await;
  let created = s.create_request("user-1".into(), kolkata()).await.unwrap();
  let id = created.request.request_id;

  let record = s
    .set_status(id, RequestStatus::Picked, serde_json::json!({ "eta": 4 }))
    .await
    .unwrap();

  assert_eq!(record.request.status, RequestStatus::Picked);
  let last = record.events.last().unwrap();
  match &last.payload {
    EventPayload::StatusChange { status, data } => {
      assert_eq!(*status, RequestStatus::Picked);
      assert_eq!(data["eta"], 4);
    }
    other => panic!("unexpected payload: {other:?}"),
  }
}

#[tokio::test]
async fn set_status_accepts_custom_milestones() {
  let s = store().await;
  let created = s.create_request("user-1".into(), kolkata()).await.unwrap();

  let record = s
    .set_status(
      created.request.request_id,
      RequestStatus::Custom("diverted".into()),
      serde_json::Value::Null,
    )
    .await
    .unwrap();

  assert_eq!(record.request.status, RequestStatus::Custom("diverted".into()));
}

#[tokio::test]
async fn set_status_on_missing_request_errors() {
  let s = store().await;
  let err = s
    .set_status(Uuid::new_v4(), RequestStatus::Arrived, serde_json::Value::Null)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::RequestNotFound(_)));
}

// ─── Registry ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn find_nearby_filters_unavailable_and_unreachable() {
  let s = store().await;
  let conn_id = Uuid::new_v4();

  // Reachable and available: the only legitimate candidate.
  let near = s
    .register_ambulance(responder("near", Point::new(88.405, 22.58)))
    .await
    .unwrap();
  s.bind_connection(near.ambulance_id, ResponderKind::Ambulance, conn_id)
    .await
    .unwrap();

  // Available but never connected.
  s.register_ambulance(responder("offline", Point::new(88.401, 22.58)))
    .await
    .unwrap();

  // Connected but marked unavailable.
  let busy = s
    .register_ambulance(responder("busy", Point::new(88.402, 22.58)))
    .await
    .unwrap();
  s.bind_connection(busy.ambulance_id, ResponderKind::Ambulance, Uuid::new_v4())
    .await
    .unwrap();
  s.set_availability(busy.ambulance_id, false).await.unwrap();

  // Connected and available but far outside the radius.
  let far = s
    .register_ambulance(responder("far", Point::new(89.40, 23.58)))
    .await
    .unwrap();
  s.bind_connection(far.ambulance_id, ResponderKind::Ambulance, Uuid::new_v4())
    .await
    .unwrap();

  let found = s
    .find_nearby(kolkata(), 5_000.0, ResponderKind::Ambulance)
    .await
    .unwrap();

  assert_eq!(found.len(), 1);
  assert_eq!(found[0].id(), near.ambulance_id);
  assert_eq!(found[0].connection_id(), Some(conn_id));
}

#[tokio::test]
async fn find_nearby_orders_nearest_first() {
  let s = store().await;

  let farther = s
    .register_ambulance(responder("farther", Point::new(88.43, 22.58)))
    .await
    .unwrap();
  let nearest = s
    .register_ambulance(responder("nearest", Point::new(88.401, 22.58)))
    .await
    .unwrap();
  for id in [farther.ambulance_id, nearest.ambulance_id] {
    s.bind_connection(id, ResponderKind::Ambulance, Uuid::new_v4())
      .await
      .unwrap();
  }

  let found = s
    .find_nearby(kolkata(), 5_000.0, ResponderKind::Ambulance)
    .await
    .unwrap();

  let ids: Vec<Uuid> = found.iter().map(Responder::id).collect();
  assert_eq!(ids, vec![nearest.ambulance_id, farther.ambulance_id]);
}

#[tokio::test]
async fn find_nearby_hospitals_requires_free_beds() {
  let s = store().await;

  // register_hospital starts at zero beds, so even a connected hospital is
  // excluded until capacity is provisioned.
  let h = s
    .register_hospital(responder("county", Point::new(88.401, 22.58)))
    .await
    .unwrap();
  s.bind_connection(h.hospital_id, ResponderKind::Hospital, Uuid::new_v4())
    .await
    .unwrap();

  let found = s
    .find_nearby(kolkata(), 5_000.0, ResponderKind::Hospital)
    .await
    .unwrap();
  assert!(found.is_empty());

  // Provisioning capacity makes it eligible.
  s.set_bed_capacity(h.hospital_id, 12).await.unwrap();
  let found = s
    .find_nearby(kolkata(), 5_000.0, ResponderKind::Hospital)
    .await
    .unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].id(), h.hospital_id);
}

#[tokio::test]
async fn set_bed_capacity_unknown_hospital_errors() {
  let s = store().await;
  let err = s.set_bed_capacity(Uuid::new_v4(), 3).await.unwrap_err();
  assert!(matches!(err, Error::HospitalNotFound(_)));
}

#[tokio::test]
async fn bind_connection_overwrites_on_reconnect() {
  let s = store().await;
  let a = s
    .register_ambulance(responder("a1", kolkata()))
    .await
    .unwrap();

  let first = Uuid::new_v4();
  let second = Uuid::new_v4();
  s.bind_connection(a.ambulance_id, ResponderKind::Ambulance, first)
    .await
    .unwrap();
  s.bind_connection(a.ambulance_id, ResponderKind::Ambulance, second)
    .await
    .unwrap();

  let fetched = s.get_ambulance(a.ambulance_id).await.unwrap().unwrap();
  assert_eq!(fetched.connection_id, Some(second));
}

#[tokio::test]
async fn bind_connection_unknown_responder_is_a_noop() {
  let s = store().await;
  // Lenient by contract: no error, nothing bound.
  s.bind_connection(Uuid::new_v4(), ResponderKind::Ambulance, Uuid::new_v4())
    .await
    .unwrap();
}

#[tokio::test]
async fn unbind_connection_clears_stale_handles() {
  let s = store().await;
  let a = s
    .register_ambulance(responder("a1", kolkata()))
    .await
    .unwrap();
  let conn_id = Uuid::new_v4();
  s.bind_connection(a.ambulance_id, ResponderKind::Ambulance, conn_id)
    .await
    .unwrap();

  s.unbind_connection(conn_id).await.unwrap();

  let fetched = s.get_ambulance(a.ambulance_id).await.unwrap().unwrap();
  assert_eq!(fetched.connection_id, None);
}

#[tokio::test]
async fn set_availability_and_update_location_roundtrip() {
  let s = store().await;
  let a = s
    .register_ambulance(responder("a1", kolkata()))
    .await
    .unwrap();
  assert!(a.available);

  s.set_availability(a.ambulance_id, false).await.unwrap();
  s.update_location(a.ambulance_id, Point::new(88.45, 22.60))
    .await
    .unwrap();

  let fetched = s.get_ambulance(a.ambulance_id).await.unwrap().unwrap();
  assert!(!fetched.available);
  assert_eq!(fetched.location, Point::new(88.45, 22.60));
}

#[tokio::test]
async fn registry_lookups_on_unknown_ids_error_or_none() {
  let s = store().await;

  assert!(s.get_ambulance(Uuid::new_v4()).await.unwrap().is_none());
  assert!(s.get_hospital(Uuid::new_v4()).await.unwrap().is_none());

  let err = s.set_availability(Uuid::new_v4(), true).await.unwrap_err();
  assert!(matches!(err, Error::AmbulanceNotFound(_)));

  let err = s
    .update_location(Uuid::new_v4(), kolkata())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::AmbulanceNotFound(_)));
}

// ─── Contact directory ───────────────────────────────────────────────────────

#[tokio::test]
async fn user_profile_roundtrip() {
  let s = store().await;
  let profile = UserProfile {
    user_id:  "clerk-abc".into(),
    name:     "Ira".into(),
    contacts: vec![
      EmergencyContact { name: "Ma".into(), phone: "+911111111111".into() },
      EmergencyContact { name: "Bo".into(), phone: "+912222222222".into() },
    ],
  };

  s.upsert_user(profile.clone()).await.unwrap();
  let fetched = s.get_user("clerk-abc".into()).await.unwrap().unwrap();

  assert_eq!(fetched.name, "Ira");
  assert_eq!(fetched.contacts, profile.contacts);
}

#[tokio::test]
async fn upsert_user_replaces_contact_list() {
  let s = store().await;
  s.upsert_user(UserProfile {
    user_id:  "u".into(),
    name:     "Ira".into(),
    contacts: vec![EmergencyContact { name: "Ma".into(), phone: "+91".into() }],
  })
  .await
  .unwrap();

  s.upsert_user(UserProfile {
    user_id:  "u".into(),
    name:     "Ira K".into(),
    contacts: vec![],
  })
  .await
  .unwrap();

  let fetched = s.get_user("u".into()).await.unwrap().unwrap();
  assert_eq!(fetched.name, "Ira K");
  assert!(fetched.contacts.is_empty());
}

#[tokio::test]
async fn get_user_missing_returns_none() {
  let s = store().await;
  assert!(s.get_user("nobody".into()).await.unwrap().is_none());
}
