//! # Schema Bootstrap
//!
//! The fleet database schema, applied idempotently on every open. Columns
//! mirror the durable entity records in `warden-core`; nested structures
//! (report summaries, service registrations, action lists, results) are
//! stored as JSON text, matching how the rest of the system treats them as
//! documents.
//!
//! Identifier columns are TEXT UUIDs; timestamps are RFC 3339 TEXT in UTC.

use sqlx::SqlitePool;

use warden_core::FleetError;

use crate::internal;

/// Idempotent DDL for all four entity tables.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS tokens (
        id           TEXT PRIMARY KEY,
        secret_hash  TEXT NOT NULL UNIQUE,
        role         TEXT,
        region       TEXT,
        max_uses     INTEGER NOT NULL DEFAULT 0,
        uses_so_far  INTEGER NOT NULL DEFAULT 0,
        expires_at   TEXT,
        created_at   TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS nodes (
        id                 TEXT PRIMARY KEY,
        name               TEXT NOT NULL,
        role               TEXT NOT NULL,
        region             TEXT,
        version            TEXT NOT NULL,
        fips_backend       TEXT NOT NULL,
        status             TEXT NOT NULL,
        compliance_status  TEXT NOT NULL,
        last_heartbeat_at  TEXT NOT NULL,
        api_key_hash       TEXT NOT NULL UNIQUE,
        report_summary     TEXT,
        service            TEXT,
        created_at         TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS reports (
        node_id      TEXT PRIMARY KEY REFERENCES nodes(id) ON DELETE CASCADE,
        body         TEXT NOT NULL,
        received_at  TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS remediations (
        id            TEXT PRIMARY KEY,
        node_id       TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
        actions       TEXT NOT NULL,
        dry_run       INTEGER NOT NULL DEFAULT 0,
        status        TEXT NOT NULL,
        created_at    TEXT NOT NULL,
        delivered_at  TEXT,
        completed_at  TEXT,
        result        TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_nodes_role ON nodes(role)",
    "CREATE INDEX IF NOT EXISTS idx_remediations_node_status
         ON remediations(node_id, status)",
];

/// Apply the schema. Safe to call on every open.
pub async fn ensure(pool: &SqlitePool) -> Result<(), FleetError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await.map_err(internal)?;
    }
    Ok(())
}
