//! [`SqliteStore`] — the SQLite implementation of the dispatch store seams.

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use siren_core::{
  Error, Result,
  geo::Point,
  request::{
    ClaimOutcome, EmergencyRequest, EventPayload, RequestRecord, RequestStatus,
  },
  responder::{Ambulance, Hospital, NewResponder, Responder, ResponderKind},
  store::{ContactDirectory, RequestStore, ResponderRegistry},
  user::{EmergencyContact, UserProfile},
};

use crate::{
  encode::{
    RawAmbulance, RawEvent, RawHospital, RawRequest, db_err, encode_dt,
    encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A dispatch store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. All writes
/// funnel through one connection, which is what makes the conditional-UPDATE
/// claims atomic under concurrent callers.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await.map_err(db_err)?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory()
      .await
      .map_err(db_err)?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await
      .map_err(db_err)
  }

  /// Read a request row and its full event log, ordered by `seq`.
  async fn fetch_record(&self, request_id: Uuid) -> Result<Option<RequestRecord>> {
    let id_str = encode_uuid(request_id);

    let raw: Option<(RawRequest, Vec<RawEvent>)> = self
      .conn
      .call(move |conn| {
        let row = conn
          .query_row(
            "SELECT request_id, user_id, lng, lat, status,
                    ambulance_id, hospital_id, created_at
             FROM requests WHERE request_id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok(RawRequest {
                request_id:   row.get(0)?,
                user_id:      row.get(1)?,
                lng:          row.get(2)?,
                lat:          row.get(3)?,
                status:       row.get(4)?,
                ambulance_id: row.get(5)?,
                hospital_id:  row.get(6)?,
                created_at:   row.get(7)?,
              })
            },
          )
          .optional()?;

        let Some(request) = row else {
          return Ok(None);
        };

        let mut stmt = conn.prepare(
          "SELECT seq, kind, data_json, recorded_at
           FROM request_events WHERE request_id = ?1 ORDER BY seq",
        )?;
        let events = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawEvent {
              seq:         row.get(0)?,
              kind:        row.get(1)?,
              data_json:   row.get(2)?,
              recorded_at: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some((request, events)))
      })
      .await
      .map_err(db_err)?;

    let Some((raw_request, raw_events)) = raw else {
      return Ok(None);
    };

    Ok(Some(RequestRecord {
      request: raw_request.into_request()?,
      events:  raw_events
        .into_iter()
        .map(RawEvent::into_event)
        .collect::<Result<_>>()?,
    }))
  }

  /// Shared body of the two claim operations.
  ///
  /// One transaction: conditional UPDATE keyed on `column IS NULL`, event
  /// append only when the UPDATE took. Exactly one concurrent caller can
  /// observe a changed row.
  async fn claim(
    &self,
    request_id: Uuid,
    column: &'static str,
    responder_id: Uuid,
    status: RequestStatus,
    payload: EventPayload,
  ) -> Result<ClaimOutcome> {
    let req_str  = encode_uuid(request_id);
    let resp_str = encode_uuid(responder_id);
    let status_str = status.as_str().to_owned();
    let kind     = payload.discriminant().to_owned();
    let data_str = payload.to_json()?.to_string();
    let at_str   = encode_dt(Utc::now());

    let won: bool = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          &format!(
            "UPDATE requests SET {column} = ?2, status = ?3
             WHERE request_id = ?1 AND {column} IS NULL"
          ),
          rusqlite::params![req_str, resp_str, status_str],
        )?;
        if changed == 1 {
          let seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM request_events
             WHERE request_id = ?1",
            rusqlite::params![req_str],
            |r| r.get(0),
          )?;
          tx.execute(
            "INSERT INTO request_events (request_id, seq, kind, data_json, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![req_str, seq, kind, data_str, at_str],
          )?;
        }
        tx.commit()?;
        Ok(changed == 1)
      })
      .await
      .map_err(db_err)?;

    let record = self
      .fetch_record(request_id)
      .await?
      .ok_or(Error::RequestNotFound(request_id))?;

    if won {
      Ok(ClaimOutcome::Assigned(record))
    } else {
      Ok(ClaimOutcome::AlreadyAssigned(record))
    }
  }
}

// ─── RequestStore impl ───────────────────────────────────────────────────────

impl RequestStore for SqliteStore {
  async fn create_request(&self, user_id: String, origin: Point) -> Result<RequestRecord> {
    let request = EmergencyRequest {
      request_id:   Uuid::new_v4(),
      user_id,
      location:     origin,
      status:       RequestStatus::Pending,
      ambulance_id: None,
      hospital_id:  None,
      created_at:   Utc::now(),
    };

    let id_str   = encode_uuid(request.request_id);
    let user_str = request.user_id.clone();
    let (lng, lat) = (origin.lng, origin.lat);
    let at_str   = encode_dt(request.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO requests (request_id, user_id, lng, lat, status, created_at)
           VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
          rusqlite::params![id_str, user_str, lng, lat, at_str],
        )?;
        Ok(())
      })
      .await
      .map_err(db_err)?;

    Ok(RequestRecord { request, events: Vec::new() })
  }

  async fn get_request(&self, request_id: Uuid) -> Result<Option<RequestRecord>> {
    self.fetch_record(request_id).await
  }

  async fn append_event(
    &self,
    request_id: Uuid,
    payload: EventPayload,
  ) -> Result<RequestRecord> {
    let req_str  = encode_uuid(request_id);
    let kind     = payload.discriminant().to_owned();
    let data_str = payload.to_json()?.to_string();
    let at_str   = encode_dt(Utc::now());

    let exists: bool = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let exists: bool = tx
          .query_row(
            "SELECT 1 FROM requests WHERE request_id = ?1",
            rusqlite::params![req_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        if exists {
          let seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM request_events
             WHERE request_id = ?1",
            rusqlite::params![req_str],
            |r| r.get(0),
          )?;
          tx.execute(
            "INSERT INTO request_events (request_id, seq, kind, data_json, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![req_str, seq, kind, data_str, at_str],
          )?;
        }
        tx.commit()?;
        Ok(exists)
      })
      .await
      .map_err(db_err)?;

    if !exists {
      return Err(Error::RequestNotFound(request_id));
    }

    self
      .fetch_record(request_id)
      .await?
      .ok_or(Error::RequestNotFound(request_id))
  }

  async fn claim_ambulance(
    &self,
    request_id: Uuid,
    ambulance_id: Uuid,
  ) -> Result<ClaimOutcome> {
    self
      .claim(
        request_id,
        "ambulance_id",
        ambulance_id,
        RequestStatus::AmbulanceAccepted,
        EventPayload::AmbulanceAccepted { ambulance_id },
      )
      .await
  }

  async fn claim_hospital(
    &self,
    request_id: Uuid,
    hospital_id: Uuid,
  ) -> Result<ClaimOutcome> {
    self
      .claim(
        request_id,
        "hospital_id",
        hospital_id,
        RequestStatus::HospitalAccepted,
        EventPayload::HospitalAccepted { hospital_id },
      )
      .await
  }

  async fn set_status(
    &self,
    request_id: Uuid,
    status: RequestStatus,
    data: serde_json::Value,
  ) -> Result<RequestRecord> {
    let payload = EventPayload::StatusChange { status: status.clone(), data };
    let req_str    = encode_uuid(request_id);
    let status_str = status.as_str().to_owned();
    let kind       = payload.discriminant().to_owned();
    let data_str   = payload.to_json()?.to_string();
    let at_str     = encode_dt(Utc::now());

    let changed: bool = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          "UPDATE requests SET status = ?2 WHERE request_id = ?1",
          rusqlite::params![req_str, status_str],
        )?;
        if changed == 1 {
          let seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM request_events
             WHERE request_id = ?1",
            rusqlite::params![req_str],
            |r| r.get(0),
          )?;
          tx.execute(
            "INSERT INTO request_events (request_id, seq, kind, data_json, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![req_str, seq, kind, data_str, at_str],
          )?;
        }
        tx.commit()?;
        Ok(changed == 1)
      })
      .await
      .map_err(db_err)?;

    if !changed {
      return Err(Error::RequestNotFound(request_id));
    }

    self
      .fetch_record(request_id)
      .await?
      .ok_or(Error::RequestNotFound(request_id))
  }
}

// ─── ResponderRegistry impl ──────────────────────────────────────────────────

impl ResponderRegistry for SqliteStore {
  async fn register_ambulance(&self, input: NewResponder) -> Result<Ambulance> {
    let ambulance = Ambulance {
      ambulance_id:  Uuid::new_v4(),
      name:          input.name,
      phone:         input.phone,
      location:      input.location,
      available:     true,
      connection_id: None,
    };

    let id_str = encode_uuid(ambulance.ambulance_id);
    let name   = ambulance.name.clone();
    let phone  = ambulance.phone.clone();
    let (lng, lat) = (ambulance.location.lng, ambulance.location.lat);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO ambulances (ambulance_id, name, phone, lng, lat, available)
           VALUES (?1, ?2, ?3, ?4, ?5, 1)",
          rusqlite::params![id_str, name, phone, lng, lat],
        )?;
        Ok(())
      })
      .await
      .map_err(db_err)?;

    Ok(ambulance)
  }

  async fn register_hospital(&self, input: NewResponder) -> Result<Hospital> {
    let hospital = Hospital {
      hospital_id:    Uuid::new_v4(),
      name:           input.name,
      phone:          input.phone,
      location:       input.location,
      available_beds: 0,
      connection_id:  None,
    };

    let id_str = encode_uuid(hospital.hospital_id);
    let name   = hospital.name.clone();
    let phone  = hospital.phone.clone();
    let (lng, lat) = (hospital.location.lng, hospital.location.lat);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO hospitals (hospital_id, name, phone, lng, lat, available_beds)
           VALUES (?1, ?2, ?3, ?4, ?5, 0)",
          rusqlite::params![id_str, name, phone, lng, lat],
        )?;
        Ok(())
      })
      .await
      .map_err(db_err)?;

    Ok(hospital)
  }

  async fn get_ambulance(&self, ambulance_id: Uuid) -> Result<Option<Ambulance>> {
    let id_str = encode_uuid(ambulance_id);

    let raw: Option<RawAmbulance> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT ambulance_id, name, phone, lng, lat, available, connection_id
               FROM ambulances WHERE ambulance_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawAmbulance {
                  ambulance_id:  row.get(0)?,
                  name:          row.get(1)?,
                  phone:         row.get(2)?,
                  lng:           row.get(3)?,
                  lat:           row.get(4)?,
                  available:     row.get(5)?,
                  connection_id: row.get(6)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await
      .map_err(db_err)?;

    raw.map(RawAmbulance::into_ambulance).transpose()
  }

  async fn get_hospital(&self, hospital_id: Uuid) -> Result<Option<Hospital>> {
    let id_str = encode_uuid(hospital_id);

    let raw: Option<RawHospital> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT hospital_id, name, phone, lng, lat, available_beds, connection_id
               FROM hospitals WHERE hospital_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawHospital {
                  hospital_id:    row.get(0)?,
                  name:           row.get(1)?,
                  phone:          row.get(2)?,
                  lng:            row.get(3)?,
                  lat:            row.get(4)?,
                  available_beds: row.get(5)?,
                  connection_id:  row.get(6)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await
      .map_err(db_err)?;

    raw.map(RawHospital::into_hospital).transpose()
  }

  async fn find_nearby(
    &self,
    origin: Point,
    radius_meters: f64,
    kind: ResponderKind,
  ) -> Result<Vec<Responder>> {
    // SQLite has no geo index; pull the reachable candidates and filter by
    // great-circle distance in process.
    let mut candidates: Vec<Responder> = match kind {
      ResponderKind::Ambulance => {
        let raws: Vec<RawAmbulance> = self
          .conn
          .call(|conn| {
            let mut stmt = conn.prepare(
              "SELECT ambulance_id, name, phone, lng, lat, available, connection_id
               FROM ambulances
               WHERE available = 1 AND connection_id IS NOT NULL",
            )?;
            let rows = stmt
              .query_map([], |row| {
                Ok(RawAmbulance {
                  ambulance_id:  row.get(0)?,
                  name:          row.get(1)?,
                  phone:         row.get(2)?,
                  lng:           row.get(3)?,
                  lat:           row.get(4)?,
                  available:     row.get(5)?,
                  connection_id: row.get(6)?,
                })
              })?
              .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
          })
          .await
          .map_err(db_err)?;
        raws
          .into_iter()
          .map(|r| r.into_ambulance().map(Responder::Ambulance))
          .collect::<Result<_>>()?
      }
      ResponderKind::Hospital => {
        let raws: Vec<RawHospital> = self
          .conn
          .call(|conn| {
            let mut stmt = conn.prepare(
              "SELECT hospital_id, name, phone, lng, lat, available_beds, connection_id
               FROM hospitals
               WHERE available_beds > 0 AND connection_id IS NOT NULL",
            )?;
            let rows = stmt
              .query_map([], |row| {
                Ok(RawHospital {
                  hospital_id:    row.get(0)?,
                  name:           row.get(1)?,
                  phone:          row.get(2)?,
                  lng:            row.get(3)?,
                  lat:            row.get(4)?,
                  available_beds: row.get(5)?,
                  connection_id:  row.get(6)?,
                })
              })?
              .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
          })
          .await
          .map_err(db_err)?;
        raws
          .into_iter()
          .map(|r| r.into_hospital().map(Responder::Hospital))
          .collect::<Result<_>>()?
      }
    };

    candidates.retain(|r| origin.distance_meters(&r.location()) <= radius_meters);
    candidates.sort_by(|a, b| {
      let da = origin.distance_meters(&a.location());
      let db = origin.distance_meters(&b.location());
      da.total_cmp(&db)
    });
    Ok(candidates)
  }

  async fn bind_connection(
    &self,
    responder_id: Uuid,
    kind: ResponderKind,
    connection_id: Uuid,
  ) -> Result<()> {
    let id_str   = encode_uuid(responder_id);
    let conn_str = encode_uuid(connection_id);
    let sql = match kind {
      ResponderKind::Ambulance => {
        "UPDATE ambulances SET connection_id = ?2 WHERE ambulance_id = ?1"
      }
      ResponderKind::Hospital => {
        "UPDATE hospitals SET connection_id = ?2 WHERE hospital_id = ?1"
      }
    };

    let changed: usize = self
      .conn
      .call(move |conn| Ok(conn.execute(sql, rusqlite::params![id_str, conn_str])?))
      .await
      .map_err(db_err)?;

    // Lenient on unknown ids: a handshake must never fail a session.
    if changed == 0 {
      tracing::warn!(%responder_id, ?kind, "bind_connection: unknown responder");
    }
    Ok(())
  }

  async fn unbind_connection(&self, connection_id: Uuid) -> Result<()> {
    let conn_str = encode_uuid(connection_id);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE ambulances SET connection_id = NULL WHERE connection_id = ?1",
          rusqlite::params![conn_str],
        )?;
        conn.execute(
          "UPDATE hospitals SET connection_id = NULL WHERE connection_id = ?1",
          rusqlite::params![conn_str],
        )?;
        Ok(())
      })
      .await
      .map_err(db_err)
  }

  async fn set_availability(&self, ambulance_id: Uuid, available: bool) -> Result<()> {
    let id_str = encode_uuid(ambulance_id);

    let changed: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE ambulances SET available = ?2 WHERE ambulance_id = ?1",
          rusqlite::params![id_str, available],
        )?)
      })
      .await
      .map_err(db_err)?;

    if changed == 0 {
      return Err(Error::AmbulanceNotFound(ambulance_id));
    }
    Ok(())
  }

  async fn update_location(&self, ambulance_id: Uuid, location: Point) -> Result<()> {
    let id_str = encode_uuid(ambulance_id);
    let (lng, lat) = (location.lng, location.lat);

    let changed: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE ambulances SET lng = ?2, lat = ?3 WHERE ambulance_id = ?1",
          rusqlite::params![id_str, lng, lat],
        )?)
      })
      .await
      .map_err(db_err)?;

    if changed == 0 {
      return Err(Error::AmbulanceNotFound(ambulance_id));
    }
    Ok(())
  }

  async fn set_bed_capacity(&self, hospital_id: Uuid, available_beds: i64) -> Result<()> {
    let id_str = encode_uuid(hospital_id);

    let changed: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE hospitals SET available_beds = ?2 WHERE hospital_id = ?1",
          rusqlite::params![id_str, available_beds],
        )?)
      })
      .await
      .map_err(db_err)?;

    if changed == 0 {
      return Err(Error::HospitalNotFound(hospital_id));
    }
    Ok(())
  }
}

// ─── ContactDirectory impl ───────────────────────────────────────────────────

impl ContactDirectory for SqliteStore {
  async fn get_user(&self, user_id: String) -> Result<Option<UserProfile>> {
    let id_for_query = user_id.clone();

    let raw: Option<(String, Vec<(String, String)>)> = self
      .conn
      .call(move |conn| {
        let name: Option<String> = conn
          .query_row(
            "SELECT name FROM users WHERE user_id = ?1",
            rusqlite::params![id_for_query],
            |row| row.get(0),
          )
          .optional()?;

        let Some(name) = name else {
          return Ok(None);
        };

        let mut stmt = conn.prepare(
          "SELECT name, phone FROM contacts WHERE user_id = ?1",
        )?;
        let contacts = stmt
          .query_map(rusqlite::params![id_for_query], |row| {
            Ok((row.get(0)?, row.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some((name, contacts)))
      })
      .await
      .map_err(db_err)?;

    Ok(raw.map(|(name, contacts)| UserProfile {
      user_id,
      name,
      contacts: contacts
        .into_iter()
        .map(|(name, phone)| EmergencyContact { name, phone })
        .collect(),
    }))
  }

  async fn upsert_user(&self, profile: UserProfile) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO users (user_id, name) VALUES (?1, ?2)
           ON CONFLICT (user_id) DO UPDATE SET name = excluded.name",
          rusqlite::params![profile.user_id, profile.name],
        )?;
        tx.execute(
          "DELETE FROM contacts WHERE user_id = ?1",
          rusqlite::params![profile.user_id],
        )?;
        for contact in &profile.contacts {
          tx.execute(
            "INSERT INTO contacts (user_id, name, phone) VALUES (?1, ?2, ?3)",
            rusqlite::params![profile.user_id, contact.name, contact.phone],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await
      .map_err(db_err)
  }
}
