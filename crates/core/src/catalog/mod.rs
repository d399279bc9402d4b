pub mod schema;

use std::collections::BTreeSet;
use std::path::Path;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};

use crate::domain::{CatalogStats, FieldValue, Observation};
use crate::error::{Error, Result};
use crate::fields::FieldSchema;

/// Field writes for one observation, applied together.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub observation_id: String,
    pub fields: Vec<(String, FieldValue)>,
}

impl RecordUpdate {
    pub fn new(observation_id: &str) -> Self {
        Self {
            observation_id: observation_id.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn set(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.push((name.to_string(), value.into()));
        self
    }
}

/// Transactional table of observations, as consumed by the sync engine and
/// the relation linker.
///
/// Implementations are not expected to enforce path uniqueness or relation
/// symmetry; the engine maintains both.
pub trait RecordStore {
    fn insert(&mut self, observation: &Observation) -> Result<()>;

    fn record(&self, observation_id: &str) -> Result<Option<Observation>>;

    /// All observations of a file, ordered by `group_number`.
    fn records_by_path(&self, image_path: &str) -> Result<Vec<Observation>>;

    fn records_by_hash(&self, image_hash: &str) -> Result<Vec<Observation>>;

    /// Observations whose `related` points at `observation_id`, other than `exclude_id`.
    fn related_records(&self, observation_id: &str, exclude_id: &str) -> Result<Vec<Observation>>;

    /// Apply all updates atomically. Fails without writing anything if any
    /// observation is missing.
    fn update_batch(&mut self, updates: &[RecordUpdate]) -> Result<()>;

    fn update(&mut self, update: RecordUpdate) -> Result<()> {
        self.update_batch(std::slice::from_ref(&update))
    }

    /// Paths of all first observations.
    fn known_paths(&self) -> Result<BTreeSet<String>>;

    /// Every observation, chronologically; undated ones last.
    fn all_records(&self) -> Result<Vec<Observation>>;

    /// Move every observation of `from` to `to`. Returns how many moved.
    fn rename_path(&mut self, from: &str, to: &str) -> Result<usize>;
}

/// SQLite-backed observation catalog.
pub struct Catalog {
    conn: Connection,
    columns: Vec<String>,
}

impl Catalog {
    /// Open or create a catalog at the given path with WAL mode.
    pub fn open(path: &Path, fields: &FieldSchema) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::prepare(conn, fields)
    }

    /// Open an in-memory catalog (for testing).
    pub fn open_in_memory(fields: &FieldSchema) -> Result<Self> {
        Self::prepare(Connection::open_in_memory()?, fields)
    }

    fn prepare(conn: Connection, fields: &FieldSchema) -> Result<Self> {
        schema::initialize(&conn)?;
        schema::migrate(&conn)?;
        let columns = schema::ensure_columns(&conn, fields)?;
        Ok(Self { conn, columns })
    }

    /// Column names of the observations table, in table order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    fn select(&self, clause: &str, args: &[&dyn ToSql]) -> Result<Vec<Observation>> {
        let column_list = quoted_list(&self.columns);
        let sql = format!("SELECT {column_list} FROM observations {clause}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(args, |row| {
                (0..self.columns.len())
                    .map(|i| row.get::<_, FieldValue>(i))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|values| {
                let mut observation = Observation::new(String::new());
                for (name, value) in self.columns.iter().zip(values) {
                    observation.set(name, value)?;
                }
                Ok(observation)
            })
            .collect()
    }

    pub fn count_observations(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// All catalog statistics in a single query.
    pub fn stats(&self) -> Result<CatalogStats> {
        let stats = self.conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM observations WHERE group_number = 1),
                (SELECT COUNT(*) FROM observations),
                (SELECT COUNT(*) FROM observations WHERE related IS NOT NULL),
                (SELECT COUNT(*) FROM observations WHERE group_number = 1 AND image_time IS NULL)",
            [],
            |row| {
                Ok(CatalogStats {
                    total_files: row.get::<_, i64>(0)? as usize,
                    total_observations: row.get::<_, i64>(1)? as usize,
                    related_observations: row.get::<_, i64>(2)? as usize,
                    undated_files: row.get::<_, i64>(3)? as usize,
                })
            },
        )?;
        Ok(stats)
    }

    // ── Config ───────────────────────────────────────────────────

    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

impl RecordStore for Catalog {
    fn insert(&mut self, observation: &Observation) -> Result<()> {
        let values: Vec<FieldValue> = self.columns.iter().map(|c| observation.get(c)).collect();
        let placeholders = (1..=values.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "INSERT INTO observations ({}) VALUES ({placeholders})",
            quoted_list(&self.columns)
        );

        match self.conn.execute(&sql, params_from_iter(values.iter())) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                if self.record(&observation.observation_id)?.is_some() {
                    Err(Error::DuplicateObservation(observation.observation_id.clone()))
                } else {
                    Err(Error::DuplicatePath(observation.image_path.clone()))
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    fn record(&self, observation_id: &str) -> Result<Option<Observation>> {
        Ok(self
            .select("WHERE observation_id = ?1", &[&observation_id])?
            .into_iter()
            .next())
    }

    fn records_by_path(&self, image_path: &str) -> Result<Vec<Observation>> {
        self.select(
            "WHERE image_path = ?1 ORDER BY group_number",
            &[&image_path],
        )
    }

    fn records_by_hash(&self, image_hash: &str) -> Result<Vec<Observation>> {
        self.select(
            "WHERE image_hash = ?1 ORDER BY image_path, group_number",
            &[&image_hash],
        )
    }

    fn related_records(&self, observation_id: &str, exclude_id: &str) -> Result<Vec<Observation>> {
        self.select(
            "WHERE related = ?1 AND observation_id != ?2 ORDER BY image_time, group_number",
            &[&observation_id, &exclude_id],
        )
    }

    fn update_batch(&mut self, updates: &[RecordUpdate]) -> Result<()> {
        for update in updates {
            if let Some((name, _)) = update.fields.iter().find(|(n, _)| !self.has_column(n)) {
                return Err(Error::UnknownField(name.clone()));
            }
        }

        let tx = self.conn.transaction()?;
        for update in updates.iter().filter(|u| !u.fields.is_empty()) {
            let assignments = update
                .fields
                .iter()
                .enumerate()
                .map(|(i, (name, _))| format!("\"{name}\" = ?{}", i + 1))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "UPDATE observations SET {assignments} WHERE observation_id = ?{}",
                update.fields.len() + 1
            );
            let mut args: Vec<&dyn ToSql> = update
                .fields
                .iter()
                .map(|(_, v)| v as &dyn ToSql)
                .collect();
            args.push(&update.observation_id);

            if tx.execute(&sql, args.as_slice())? == 0 {
                // Dropping the transaction rolls back earlier updates.
                return Err(Error::RelationTargetNotFound(update.observation_id.clone()));
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn known_paths(&self) -> Result<BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT image_path FROM observations WHERE group_number = 1")?;
        let paths = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;
        Ok(paths)
    }

    fn all_records(&self) -> Result<Vec<Observation>> {
        self.select(
            "ORDER BY image_time IS NULL, image_time, image_path, group_number",
            &[],
        )
    }

    fn rename_path(&mut self, from: &str, to: &str) -> Result<usize> {
        let moved = self.conn.execute(
            "UPDATE observations SET image_path = ?2 WHERE image_path = ?1",
            params![from, to],
        )?;
        Ok(moved)
    }
}

fn quoted_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Null => ToSqlOutput::Owned(Value::Null),
            FieldValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            FieldValue::Real(r) => ToSqlOutput::Owned(Value::Real(*r)),
            FieldValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl FromSql for FieldValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(FieldValue::Null),
            ValueRef::Integer(i) => Ok(FieldValue::Integer(i)),
            ValueRef::Real(r) => Ok(FieldValue::Real(r)),
            ValueRef::Text(t) => Ok(FieldValue::Text(String::from_utf8_lossy(t).into_owned())),
            ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}
