// Exchange log storage and retention

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One logged exchange
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExchangeRecord {
    pub id: i64,
    /// RFC 3339, set on insert when empty
    pub timestamp: String,
    pub endpoint: String,
    pub method: String,
    pub model: String,
    /// Human-readable summary of the request ("role: content" lines)
    pub prompt: String,
    /// Text accumulated from the increments sent to the client
    pub response: String,
    pub status_code: u16,
    pub latency_ms: u64,
    pub stream: bool,
    pub backend_type: String,
    pub error: String,
    pub frontend_url: String,
    pub backend_url: String,
    pub frontend_request: String,
    pub frontend_response: String,
    pub backend_request: String,
    pub backend_response: String,
    /// Last user message before any injection
    pub last_message: String,
}

/// Listing row: an exchange without its raw bodies
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeSummary {
    pub id: i64,
    pub timestamp: String,
    pub endpoint: String,
    pub method: String,
    pub model: String,
    pub status_code: u16,
    pub latency_ms: u64,
    pub stream: bool,
    pub backend_type: String,
    pub error: String,
    pub last_message: String,
}

const RECORD_COLUMNS: &str = "id, timestamp, endpoint, method, model, prompt, response, \
     status_code, latency_ms, stream, backend_type, error, frontend_url, backend_url, \
     frontend_request, frontend_response, backend_request, backend_response, last_message";

const SUMMARY_COLUMNS: &str = "id, timestamp, endpoint, method, model, status_code, latency_ms, \
     stream, backend_type, error, last_message";

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn text(row: &Row, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

fn record_from_row(row: &Row) -> rusqlite::Result<ExchangeRecord> {
    Ok(ExchangeRecord {
        id: row.get(0)?,
        timestamp: text(row, 1)?,
        endpoint: text(row, 2)?,
        method: text(row, 3)?,
        model: text(row, 4)?,
        prompt: text(row, 5)?,
        response: text(row, 6)?,
        status_code: row.get::<_, Option<u16>>(7)?.unwrap_or_default(),
        latency_ms: row.get::<_, Option<i64>>(8)?.unwrap_or_default().max(0) as u64,
        stream: row.get::<_, Option<bool>>(9)?.unwrap_or_default(),
        backend_type: text(row, 10)?,
        error: text(row, 11)?,
        frontend_url: text(row, 12)?,
        backend_url: text(row, 13)?,
        frontend_request: text(row, 14)?,
        frontend_response: text(row, 15)?,
        backend_request: text(row, 16)?,
        backend_response: text(row, 17)?,
        last_message: text(row, 18)?,
    })
}

fn summary_from_row(row: &Row) -> rusqlite::Result<ExchangeSummary> {
    Ok(ExchangeSummary {
        id: row.get(0)?,
        timestamp: text(row, 1)?,
        endpoint: text(row, 2)?,
        method: text(row, 3)?,
        model: text(row, 4)?,
        status_code: row.get::<_, Option<u16>>(5)?.unwrap_or_default(),
        latency_ms: row.get::<_, Option<i64>>(6)?.unwrap_or_default().max(0) as u64,
        stream: row.get::<_, Option<bool>>(7)?.unwrap_or_default(),
        backend_type: text(row, 8)?,
        error: text(row, 9)?,
        last_message: text(row, 10)?,
    })
}

/// Thread-safe database wrapper
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;

        // SQLite performance settings
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                endpoint TEXT NOT NULL,
                method TEXT NOT NULL,
                model TEXT,
                prompt TEXT,
                response TEXT,
                status_code INTEGER,
                latency_ms INTEGER DEFAULT 0,
                stream INTEGER NOT NULL DEFAULT 0,
                backend_type TEXT,
                error TEXT,
                frontend_url TEXT,
                backend_url TEXT,
                frontend_request TEXT,
                frontend_response TEXT,
                backend_request TEXT,
                backend_response TEXT,
                last_message TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_requests_timestamp ON requests(timestamp);
            CREATE INDEX IF NOT EXISTS idx_requests_endpoint ON requests(endpoint);
            CREATE INDEX IF NOT EXISTS idx_requests_model ON requests(model);",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // A panic while holding the lock leaves the connection itself usable.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn log_exchange(&self, record: &ExchangeRecord) -> Result<i64, rusqlite::Error> {
        let conn = self.lock();
        let timestamp = if record.timestamp.is_empty() {
            now_timestamp()
        } else {
            record.timestamp.clone()
        };

        conn.execute(
            "INSERT INTO requests (
                timestamp, endpoint, method, model, prompt, response, status_code, latency_ms,
                stream, backend_type, error, frontend_url, backend_url, frontend_request,
                frontend_response, backend_request, backend_response, last_message
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                ?17, ?18)",
            rusqlite::params![
                timestamp,
                record.endpoint,
                record.method,
                record.model,
                record.prompt,
                record.response,
                record.status_code,
                i64::try_from(record.latency_ms).unwrap_or(i64::MAX),
                record.stream,
                record.backend_type,
                record.error,
                record.frontend_url,
                record.backend_url,
                record.frontend_request,
                record.frontend_response,
                record.backend_request,
                record.backend_response,
                record.last_message,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Insert from async code without blocking the runtime. Failures are logged.
    pub async fn record(&self, record: ExchangeRecord) {
        let db = self.clone();
        let result = tokio::task::spawn_blocking(move || db.log_exchange(&record)).await;
        match result {
            Ok(Ok(id)) => tracing::debug!("[DB] Logged exchange {}", id),
            Ok(Err(e)) => tracing::error!("[DB] Failed to log exchange: {}", e),
            Err(e) => tracing::error!("[DB] Logging task failed: {}", e),
        }
    }

    /// Newest first
    pub fn recent_entries(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ExchangeSummary>, rusqlite::Error> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM requests ORDER BY id DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(rusqlite::params![limit, offset], summary_from_row)?;
        rows.collect()
    }

    pub fn entry_by_id(&self, id: i64) -> Result<Option<ExchangeRecord>, rusqlite::Error> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM requests WHERE id = ?1"),
            rusqlite::params![id],
            record_from_row,
        )
        .optional()
    }

    pub fn total_count(&self) -> Result<u64, rusqlite::Error> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM requests", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Keep only the newest `max_keep` rows
    pub fn cleanup_old_requests(&self, max_keep: u32) -> Result<usize, rusqlite::Error> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM requests WHERE id NOT IN (
                SELECT id FROM requests ORDER BY id DESC LIMIT ?1
            )",
            rusqlite::params![max_keep],
        )
    }

    /// Clean up rows older than `days` days
    pub fn cleanup_older_than(&self, days: u32) -> Result<usize, rusqlite::Error> {
        let conn = self.lock();
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        let cutoff_ts = cutoff.to_rfc3339_opts(SecondsFormat::Micros, true);

        conn.execute(
            "DELETE FROM requests WHERE timestamp < ?1",
            rusqlite::params![cutoff_ts],
        )
    }
}
