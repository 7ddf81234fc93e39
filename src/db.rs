// Store sink - NormalizedRecord -> one row in clean_records (SQLite)

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::SqlitePath;
use crate::error::PipelineError;
use crate::schema::{NormalizedRecord, StoredRecord};

/// How long a writer waits for the SQLite write lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // WAL lets readers proceed while one request holds the write lock.
    // In-memory databases report "memory" here, which is fine.
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS clean_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            document_type TEXT NOT NULL,
            client TEXT NOT NULL,
            amount REAL NOT NULL,
            currency TEXT NOT NULL,
            document_date TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_clean_records_source ON clean_records(source)",
        [],
    )?;

    Ok(())
}

/// Insert one record inside a transaction and return it with its new id.
///
/// Nothing is visible to other connections unless the commit succeeds.
pub fn store_record(conn: &mut Connection, record: &NormalizedRecord) -> Result<StoredRecord, PipelineError> {
    let created_at = Utc::now();

    // IMMEDIATE takes the write lock up front so concurrent writers queue on busy_timeout
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute(
        "INSERT INTO clean_records (
            source, document_type, client, amount, currency, document_date, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.source,
            record.document_type,
            record.client,
            record.amount,
            record.currency,
            record.document_date_iso(),
            created_at.to_rfc3339(),
        ],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;

    Ok(StoredRecord {
        id,
        record: record.clone(),
        created_at,
    })
}

pub fn get_record(conn: &Connection, id: i64) -> Result<Option<StoredRecord>, PipelineError> {
    let row = conn
        .query_row(
            "SELECT id, source, document_type, client, amount, currency, document_date, created_at
             FROM clean_records
             WHERE id = ?1",
            [id],
            |row| {
                let document_date: String = row.get(6)?;
                let created_at: String = row.get(7)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, String>(5)?,
                    document_date,
                    created_at,
                ))
            },
        )
        .optional()?;

    let Some((id, source, document_type, client, amount, currency, document_date, created_at)) = row else {
        return Ok(None);
    };

    let document_date = NaiveDate::parse_from_str(&document_date, "%Y-%m-%d")
        .map_err(|e| PipelineError::Persistence(format!("bad document_date in row {}: {}", id, e)))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| PipelineError::Persistence(format!("bad created_at in row {}: {}", id, e)))?
        .with_timezone(&Utc);

    Ok(Some(StoredRecord {
        id,
        record: NormalizedRecord {
            source,
            document_type,
            client,
            amount,
            currency,
            document_date,
        },
        created_at,
    }))
}

pub fn count_records(conn: &Connection) -> Result<i64, PipelineError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM clean_records", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// STORE SINK
// ============================================================================

#[derive(Clone)]
enum Backend {
    /// One connection per call, opened and dropped inside the call.
    File(PathBuf),
    /// In-memory databases vanish with their connection, so one is shared.
    Shared(Arc<Mutex<Connection>>),
}

/// Persists records into `clean_records`. Cheap to clone.
#[derive(Clone)]
pub struct StoreSink {
    backend: Backend,
}

impl StoreSink {
    /// Open (and create if needed) the database and ensure the table exists.
    pub fn open(location: &SqlitePath) -> Result<Self, PipelineError> {
        let backend = match location {
            SqlitePath::File(path) => {
                let conn = open_file(path)?;
                setup_database(&conn)?;
                Backend::File(path.clone())
            }
            SqlitePath::Memory => {
                let conn = Connection::open_in_memory()?;
                setup_database(&conn)?;
                Backend::Shared(Arc::new(Mutex::new(conn)))
            }
        };

        Ok(StoreSink { backend })
    }

    /// Blocking store. Callers on an async runtime should use [`StoreSink::store`].
    pub fn store_blocking(&self, record: &NormalizedRecord) -> Result<StoredRecord, PipelineError> {
        match &self.backend {
            Backend::File(path) => {
                let mut conn = open_file(path)?;
                store_record(&mut conn, record)
            }
            Backend::Shared(conn) => {
                let mut conn = conn
                    .lock()
                    .map_err(|_| PipelineError::Persistence("database mutex poisoned".to_string()))?;
                store_record(&mut conn, record)
            }
        }
    }

    pub async fn store(&self, record: NormalizedRecord) -> Result<StoredRecord, PipelineError> {
        let sink = self.clone();
        tokio::task::spawn_blocking(move || sink.store_blocking(&record))
            .await
            .map_err(|e| PipelineError::Persistence(format!("store task failed: {}", e)))?
    }

    /// Run a read-only closure against the database (tests, CLI stats).
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        match &self.backend {
            Backend::File(path) => f(&open_file(path)?),
            Backend::Shared(conn) => {
                let conn = conn
                    .lock()
                    .map_err(|_| PipelineError::Persistence("database mutex poisoned".to_string()))?;
                f(&conn)
            }
        }
    }
}

fn open_file(path: &Path) -> Result<Connection, PipelineError> {
    let conn = Connection::open(path)
        .map_err(|e| PipelineError::Persistence(format!("cannot open {}: {}", path.display(), e)))?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_record(source: &str) -> NormalizedRecord {
        NormalizedRecord {
            source: source.to_string(),
            document_type: "invoice".to_string(),
            client: "ACME GmbH".to_string(),
            amount: 1999.99,
            currency: "EUR".to_string(),
            document_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        }
    }

    fn file_sink(dir: &TempDir) -> StoreSink {
        StoreSink::open(&SqlitePath::File(dir.path().join("pipeline.db"))).unwrap()
    }

    #[test]
    fn test_store_returns_first_id_on_empty_table() {
        let dir = TempDir::new().unwrap();
        let sink = file_sink(&dir);

        let stored = sink.store_blocking(&create_test_record("invoice_scan_1")).unwrap();

        assert_eq!(stored.id, 1);
        assert_eq!(stored.record.source, "invoice_scan_1");
    }

    #[test]
    fn test_store_twice_gives_increasing_ids() {
        let dir = TempDir::new().unwrap();
        let sink = file_sink(&dir);
        let record = create_test_record("dup");

        let first = sink.store_blocking(&record).unwrap();
        let second = sink.store_blocking(&record).unwrap();

        assert!(second.id > first.id);
        assert_eq!(sink.with_connection(count_records).unwrap(), 2);
    }

    #[test]
    fn test_committed_row_matches_input() {
        let dir = TempDir::new().unwrap();
        let sink = file_sink(&dir);
        let record = create_test_record("roundtrip");

        let stored = sink.store_blocking(&record).unwrap();
        let loaded = sink
            .with_connection(|conn| get_record(conn, stored.id))
            .unwrap()
            .unwrap();

        assert_eq!(loaded.record, record);
        assert_eq!(loaded.created_at.timestamp(), stored.created_at.timestamp());
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let dir = TempDir::new().unwrap();
        let sink = file_sink(&dir);

        let first = sink.store_blocking(&create_test_record("a")).unwrap();
        sink.with_connection(|conn| {
            conn.execute("DELETE FROM clean_records WHERE id = ?1", [first.id])?;
            Ok(())
        })
        .unwrap();
        let second = sink.store_blocking(&create_test_record("b")).unwrap();

        assert!(second.id > first.id);
    }

    #[test]
    fn test_failed_insert_leaves_no_row() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        // Reject every insert so the transaction cannot commit
        conn.execute_batch(
            "CREATE TRIGGER reject BEFORE INSERT ON clean_records
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();

        let err = store_record(&mut conn, &create_test_record("x")).unwrap_err();

        assert!(matches!(err, PipelineError::Persistence(_)));
        assert_eq!(count_records(&conn).unwrap(), 0);
    }

    #[test]
    fn test_unopenable_path_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("nested").join("db.sqlite");

        let err = StoreSink::open(&SqlitePath::File(path)).err().unwrap();
        assert!(matches!(err, PipelineError::Persistence(_)));
    }

    #[test]
    fn test_memory_backend_keeps_rows_between_calls() {
        let sink = StoreSink::open(&SqlitePath::Memory).unwrap();

        sink.store_blocking(&create_test_record("a")).unwrap();
        let second = sink.store_blocking(&create_test_record("b")).unwrap();

        assert_eq!(second.id, 2);
    }

    #[test]
    fn test_get_missing_record() {
        let sink = StoreSink::open(&SqlitePath::Memory).unwrap();
        assert!(sink.with_connection(|c| get_record(c, 99)).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_stores_get_distinct_ids() {
        let dir = TempDir::new().unwrap();
        let sink = file_sink(&dir);

        let mut handles = Vec::new();
        for i in 0..8 {
            let sink = sink.clone();
            handles.push(tokio::spawn(async move {
                sink.store(create_test_record(&format!("src_{}", i))).await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.sort_unstable();
        ids.dedup();

        assert_eq!(ids.len(), 8);
    }
}
