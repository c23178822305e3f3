// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Durable decision log (SQLite)

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::models::DecisionRecord;
use crate::{AblageError, Result};

/// Append-only log of resolved decisions (thread-safe wrapper)
#[derive(Clone)]
pub struct DecisionLog {
    conn: Arc<Mutex<Connection>>,
}

/// Decision log statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogStats {
    pub decisions: i64,
    pub matched_top: i64,
    pub degraded: i64,
    pub folders: Vec<(String, i64)>,
}

impl DecisionLog {
    /// Open or create the log
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let log = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        log.initialize()?;
        Ok(log)
    }

    /// Open an in-memory log (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let log = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        log.initialize()?;
        Ok(log)
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AblageError::Store("Decision log lock poisoned".to_string()))
    }

    /// Initialize database schema
    fn initialize(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS decisions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                item_path TEXT NOT NULL,
                file_name TEXT NOT NULL,
                summary TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                chosen_folder TEXT NOT NULL,
                top_folder TEXT,
                matched_top INTEGER NOT NULL,
                degraded INTEGER NOT NULL,
                decided_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_decisions_folder ON decisions(chosen_folder);
            CREATE INDEX IF NOT EXISTS idx_decisions_item ON decisions(item_path);
        "#,
        )?;
        Ok(())
    }

    /// Append a record
    pub fn append(&self, record: &DecisionRecord) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            r#"INSERT INTO decisions (id, item_path, file_name, summary, content_hash, chosen_folder,
                                      top_folder, matched_top, degraded, decided_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            params![
                record.id,
                record.item.to_string_lossy(),
                record.file_name,
                record.summary,
                record.content_hash,
                record.chosen_folder,
                record.top_folder,
                record.matched_top,
                record.degraded,
                record.decided_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// The most recent `limit` records, newest first
    pub fn recent(&self, limit: usize) -> Result<Vec<DecisionRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT id, item_path, file_name, summary, content_hash, chosen_folder,
                      top_folder, matched_top, degraded, decided_at
               FROM decisions ORDER BY seq DESC LIMIT ?1"#,
        )?;
        let records = stmt
            .query_map(params![limit as i64], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Latest record for a source path
    pub fn latest_for_item(&self, item: &Path) -> Result<Option<DecisionRecord>> {
        let conn = self.lock_conn()?;
        let record = conn
            .query_row(
                r#"SELECT id, item_path, file_name, summary, content_hash, chosen_folder,
                          top_folder, matched_top, degraded, decided_at
                   FROM decisions WHERE item_path = ?1 ORDER BY seq DESC LIMIT 1"#,
                params![item.to_string_lossy()],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// How often each folder was chosen, most frequent first
    pub fn folder_frequencies(&self) -> Result<Vec<(String, u64)>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT chosen_folder, COUNT(*) AS cnt FROM decisions
               GROUP BY chosen_folder ORDER BY cnt DESC, chosen_folder ASC"#,
        )?;
        let freq = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(freq)
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self.lock_conn()?;
        conn.query_row("SELECT COUNT(*) FROM decisions", [], |row| row.get(0))
            .map_err(Into::into)
    }

    /// Get log statistics
    pub fn stats(&self) -> Result<LogStats> {
        let folders = self
            .folder_frequencies()?
            .into_iter()
            .map(|(f, c)| (f, c as i64))
            .collect();
        let conn = self.lock_conn()?;
        let (decisions, matched_top, degraded) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(matched_top), 0), COALESCE(SUM(degraded), 0) FROM decisions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(LogStats {
            decisions,
            matched_top,
            degraded,
            folders,
        })
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<DecisionRecord> {
    let item: String = row.get(1)?;
    let decided_str: String = row.get(9)?;
    Ok(DecisionRecord {
        id: row.get(0)?,
        item: PathBuf::from(item),
        file_name: row.get(2)?,
        summary: row.get(3)?,
        content_hash: row.get(4)?,
        chosen_folder: row.get(5)?,
        top_folder: row.get(6)?,
        matched_top: row.get(7)?,
        degraded: row.get(8)?,
        decided_at: DateTime::parse_from_rfc3339(&decided_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}
