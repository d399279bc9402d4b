use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::error::{Error, Result};
use crate::fields::FieldSchema;

/// Catalog layout version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS observations (
            observation_id  TEXT PRIMARY KEY,
            image_path      TEXT NOT NULL,
            image_hash      TEXT,
            image_time      TEXT,
            image_w         INTEGER,
            image_h         INTEGER,
            image_bytes     INTEGER,
            group_number    INTEGER NOT NULL DEFAULT 1,
            related         TEXT,
            related_time    TEXT,
            related_seconds INTEGER
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_observations_path_group
            ON observations(image_path, group_number);
        CREATE INDEX IF NOT EXISTS idx_observations_hash ON observations(image_hash);
        CREATE INDEX IF NOT EXISTS idx_observations_related ON observations(related);
        CREATE INDEX IF NOT EXISTS idx_observations_time ON observations(image_time, group_number);

        CREATE TABLE IF NOT EXISTS config (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

/// Stamp or check the layout version.
pub fn migrate(conn: &Connection) -> Result<()> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM config WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match stored.and_then(|v| v.parse::<u32>().ok()) {
        None => {
            conn.execute(
                "INSERT INTO config (key, value) VALUES ('schema_version', ?1)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![SCHEMA_VERSION.to_string()],
            )?;
        }
        Some(db) if db > SCHEMA_VERSION => {
            return Err(Error::SchemaTooNew {
                db,
                code: SCHEMA_VERSION,
            });
        }
        Some(_) => {}
    }
    Ok(())
}

/// Add a column for every declared field the table does not have yet.
/// Columns of fields no longer declared are kept with their data.
pub fn ensure_columns(conn: &Connection, schema: &FieldSchema) -> Result<Vec<String>> {
    let mut existing = table_columns(conn)?;
    let known: HashSet<String> = existing.iter().map(|c| c.to_ascii_lowercase()).collect();

    for field in schema.annotation_fields() {
        if known.contains(&field.name.to_ascii_lowercase()) {
            continue;
        }
        conn.execute_batch(&format!(
            "ALTER TABLE observations ADD COLUMN \"{}\" {}",
            field.name,
            field.kind.sql_type()
        ))?;
        info!(field = %field.name, "added catalog column");
        existing.push(field.name.clone());
    }
    Ok(existing)
}

pub fn table_columns(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA table_info(observations)")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}
