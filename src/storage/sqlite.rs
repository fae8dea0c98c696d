//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the RepositoryStore trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RepositoryStore, StorageError, StorageResult};
use crate::storage::{PersistedRecord, RunRecord, RunStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

/// Ids per `IN (...)` lookup
const LOOKUP_CHUNK: usize = 500;

const RECORD_COLUMNS: &str = "id, name, star_count, updated_at, last_crawled_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// Raw column values of a repository row; timestamps are parsed outside rusqlite
type RecordRow = (String, String, u32, String, String);

fn read_record_row(row: &Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StorageError::InvalidTimestamp(value.to_string()))
}

fn into_record(row: RecordRow) -> StorageResult<PersistedRecord> {
    let (id, name, star_count, updated_at, last_crawled_at) = row;
    Ok(PersistedRecord {
        id,
        name,
        star_count,
        updated_at: parse_timestamp(&updated_at)?,
        last_crawled_at: parse_timestamp(&last_crawled_at)?,
    })
}

fn read_run_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let records_fetched: i64 = row.get(5)?;
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
        records_fetched: u64::try_from(records_fetched).unwrap_or(0),
    })
}

impl RepositoryStore for SqliteStorage {
    // ===== Repository records =====

    fn find_existing(&self, ids: &[String]) -> StorageResult<HashMap<String, PersistedRecord>> {
        let mut existing = HashMap::with_capacity(ids.len());

        for chunk in ids.chunks(LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT {} FROM repositories WHERE id IN ({})",
                RECORD_COLUMNS, placeholders
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter()), read_record_row)?
                .collect::<Result<Vec<_>, _>>()?;

            for row in rows {
                let record = into_record(row)?;
                existing.insert(record.id.clone(), record);
            }
        }

        Ok(existing)
    }

    fn apply_changes(
        &mut self,
        inserts: &[PersistedRecord],
        updates: &[PersistedRecord],
    ) -> StorageResult<()> {
        // Dropping the transaction without commit rolls it back
        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO repositories (id, name, star_count, updated_at, last_crawled_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for record in inserts {
                insert.execute(params![
                    record.id,
                    record.name,
                    record.star_count,
                    record.updated_at.to_rfc3339(),
                    record.last_crawled_at.to_rfc3339(),
                ])?;
            }

            let mut update = tx.prepare(
                "UPDATE repositories
                 SET name = ?2, star_count = ?3, updated_at = ?4, last_crawled_at = ?5
                 WHERE id = ?1",
            )?;
            for record in updates {
                let changed = update.execute(params![
                    record.id,
                    record.name,
                    record.star_count,
                    record.updated_at.to_rfc3339(),
                    record.last_crawled_at.to_rfc3339(),
                ])?;
                if changed != 1 {
                    return Err(StorageError::Database(format!(
                        "update of {} matched {} rows",
                        record.id, changed
                    )));
                }
            }
        }
        tx.commit()?;

        Ok(())
    }

    fn get_record(&self, id: &str) -> StorageResult<Option<PersistedRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM repositories WHERE id = ?1", RECORD_COLUMNS),
                params![id],
                read_record_row,
            )
            .optional()?;

        row.map(into_record).transpose()
    }

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM repositories", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn top_starred(&self, limit: usize) -> StorageResult<Vec<PersistedRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM repositories ORDER BY star_count DESC, name ASC LIMIT ?1",
            RECORD_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![limit as i64], read_record_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(into_record).collect()
    }

    // ===== Run tracking =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        records_fetched: u64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, records_fetched = ?3 WHERE id = ?4",
            params![
                status.to_db_string(),
                now,
                i64::try_from(records_fetched).unwrap_or(i64::MAX),
                run_id
            ],
        )?;
        Ok(())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status, records_fetched
                 FROM runs ORDER BY id DESC LIMIT 1",
                [],
                read_run_row,
            )
            .optional()?;

        Ok(run)
    }
}
