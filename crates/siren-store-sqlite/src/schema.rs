//! SQL schema for the Siren SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Requester profiles are owned by the external account system; this is the
-- projection the coordinator reads to fan out contact alerts.
CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    name    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS contacts (
    user_id TEXT NOT NULL REFERENCES users(user_id),
    name    TEXT NOT NULL,
    phone   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ambulances (
    ambulance_id  TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    phone         TEXT NOT NULL,
    lng           REAL NOT NULL,
    lat           REAL NOT NULL,
    available     INTEGER NOT NULL DEFAULT 1,
    connection_id TEXT              -- ephemeral; NULL means unreachable
);

CREATE TABLE IF NOT EXISTS hospitals (
    hospital_id    TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    phone          TEXT NOT NULL,
    lng            REAL NOT NULL,
    lat            REAL NOT NULL,
    available_beds INTEGER NOT NULL DEFAULT 0,
    connection_id  TEXT
);

-- Assignment fields are write-once: claims go through a conditional UPDATE
-- keyed on the field still being NULL. They are not foreign keys: responder
-- accounts are provisioned by an external system and a claim must record
-- whichever id accepted, registered locally or not.
CREATE TABLE IF NOT EXISTS requests (
    request_id   TEXT PRIMARY KEY,
    user_id      TEXT NOT NULL,
    lng          REAL NOT NULL,
    lat          REAL NOT NULL,
    status       TEXT NOT NULL DEFAULT 'pending',
    ambulance_id TEXT,
    hospital_id  TEXT,
    created_at   TEXT NOT NULL    -- ISO 8601 UTC; server-assigned
);

-- The event log is strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS request_events (
    request_id  TEXT NOT NULL REFERENCES requests(request_id),
    seq         INTEGER NOT NULL,  -- 1-based, assigned in the write txn
    kind        TEXT NOT NULL,     -- discriminant of EventPayload variant
    data_json   TEXT NOT NULL,     -- JSON payload (inner data only)
    recorded_at TEXT NOT NULL,
    PRIMARY KEY (request_id, seq)
);

CREATE INDEX IF NOT EXISTS requests_status_idx ON requests(status);
CREATE INDEX IF NOT EXISTS contacts_user_idx   ON contacts(user_id);

PRAGMA user_version = 1;
";
