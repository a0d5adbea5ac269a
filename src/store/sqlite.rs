use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use super::{BaselineStore, decode_document, encode_document};
use crate::{
    HarnessError,
    record::{Baseline, validate_baseline_name},
};

/// Baselines as rows of a single SQLite table, one JSON document per name.
pub struct SqliteBaselineStore {
    conn: Mutex<Connection>,
}

impl SqliteBaselineStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, HarnessError> {
        let conn = Connection::open(path).map_err(|e| HarnessError::storage(e.to_string()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, HarnessError> {
        let conn = Connection::open_in_memory().map_err(|e| HarnessError::storage(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, HarnessError> {
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn ensure_schema(conn: &Connection) -> Result<(), HarnessError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS baselines (
            name           TEXT PRIMARY KEY,
            format_version INTEGER NOT NULL,
            created_at     INTEGER NOT NULL,
            document       TEXT NOT NULL
        );
        "#,
    )
    .map_err(|e| HarnessError::storage(format!("schema: {e}")))
}

impl BaselineStore for SqliteBaselineStore {
    fn save(&self, baseline: &Baseline) -> Result<(), HarnessError> {
        validate_baseline_name(&baseline.name)?;
        let document = String::from_utf8(encode_document(baseline)?)
            .map_err(|e| HarnessError::serialization(e.to_string()))?;
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| HarnessError::storage(e.to_string()))?;
        tx.execute(
            "INSERT OR REPLACE INTO baselines(name, format_version, created_at, document) VALUES(?1, ?2, ?3, ?4)",
            params![
                baseline.name.as_str(),
                baseline.format_version,
                baseline.created_at as i64,
                document,
            ],
        )
        .map_err(|e| HarnessError::storage(e.to_string()))?;
        tx.commit()
            .map_err(|e| HarnessError::storage(e.to_string()))?;
        debug!(baseline = %baseline.name, records = baseline.len(), "baseline row written");
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Baseline, HarnessError> {
        validate_baseline_name(name)?;
        let document: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT document FROM baselines WHERE name=?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| HarnessError::storage(e.to_string()))?;
        match document {
            Some(document) => decode_document(name, document.as_bytes()),
            None => Err(HarnessError::baseline_not_found(name)),
        }
    }

    fn list_baselines(&self) -> Result<Vec<String>, HarnessError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT name FROM baselines ORDER BY name")
            .map_err(|e| HarnessError::storage(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| HarnessError::storage(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| HarnessError::storage(e.to_string()))
    }
}
