//! Append-only event storage on SQLite.
//!
//! Contract:
//! - `insert_event` is an atomic append; `(session_id, sequence_number)`
//!   collisions surface as [`StoreError::DuplicateSequence`].
//! - There is no update operation and no delete operation. The API does not
//!   expose them and the schema has no path to them.
//! - Chain-state reads and appends run on the caller's transaction so the
//!   check-and-append is atomic under the session lock.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use provlog_core::event::{ChainSeal, ChainState, EventType, SealedEvent};
use provlog_core::policy::ViolationRecord;

/// SQLite configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
    pub max_connections: u32,
    /// WAL journal mode for concurrent readers.
    pub wal_mode: bool,
    /// How long a writer waits on the session lock before the batch is
    /// rejected with a conflict.
    pub busy_timeout_secs: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:provlog.db?mode=rwc".to_string(),
            max_connections: 5,
            wal_mode: true,
            busy_timeout_secs: 30,
        }
    }
}

impl StoreConfig {
    /// In-memory database for tests. Single connection: an in-memory SQLite
    /// database is private to its connection.
    pub fn memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            wal_mode: false,
            busy_timeout_secs: 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("query error: {0}")]
    Query(String),
    #[error("row decode error: {0}")]
    Decode(String),
    #[error("sequence {sequence_number} already committed for session {session_id}")]
    DuplicateSequence {
        session_id: Uuid,
        sequence_number: u64,
    },
}

impl StoreError {
    fn from_sqlx(e: sqlx::Error) -> Self {
        Self::Query(e.to_string())
    }
}

/// A violation as persisted: the engine's record plus the identity and
/// timestamp assigned at commit.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoredViolation {
    pub id: Uuid,
    pub session_id: Uuid,
    pub event_id: Uuid,
    pub event_sequence_number: u64,
    pub policy_name: String,
    pub policy_version: String,
    pub policy_hash: String,
    pub severity: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: String,
}

/// Append-only event store.
#[derive(Debug, Clone)]
pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Self::with_config(StoreConfig {
            url: url.to_string(),
            ..Default::default()
        })
        .await
    }

    pub async fn with_config(config: StoreConfig) -> Result<Self, StoreError> {
        let mut options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .pragma("foreign_keys", "ON")
            .pragma("busy_timeout", (config.busy_timeout_secs * 1000).to_string());
        if config.wal_mode {
            options = options.pragma("journal_mode", "WAL");
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        init_schema(&pool).await?;

        info!(url = %config.url, wal = config.wal_mode, "event store ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn chain_state(&self, session_id: Uuid) -> Result<Option<ChainState>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from_sqlx)?;
        chain_state(&mut conn, session_id).await
    }

    pub async fn session_events(&self, session_id: Uuid) -> Result<Vec<SealedEvent>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from_sqlx)?;
        session_events(&mut conn, session_id).await
    }

    pub async fn event_at(
        &self,
        session_id: Uuid,
        sequence_number: u64,
    ) -> Result<Option<SealedEvent>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from_sqlx)?;
        event_at(&mut conn, session_id, sequence_number).await
    }

    pub async fn get_seal(&self, session_id: Uuid) -> Result<Option<ChainSeal>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from_sqlx)?;
        get_seal(&mut conn, session_id).await
    }

    pub async fn session_evidence_class(
        &self,
        session_id: Uuid,
    ) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT evidence_class FROM sessions WHERE session_id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(row.and_then(|r| r.try_get::<Option<String>, _>("evidence_class").ok().flatten()))
    }

    pub async fn session_violations(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<StoredViolation>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, session_id, event_id, event_sequence_number, policy_name, \
             policy_version, policy_hash, severity, description, metadata, created_at \
             FROM violations WHERE session_id = ? ORDER BY event_sequence_number ASC, id ASC",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        rows.iter().map(row_to_violation).collect()
    }
}

async fn init_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS events (
            event_id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            sequence_number INTEGER NOT NULL,
            timestamp_wall TEXT NOT NULL,
            timestamp_monotonic REAL,
            event_type TEXT NOT NULL,
            payload_canonical TEXT NOT NULL,
            payload_hash TEXT NOT NULL,
            prev_event_hash TEXT,
            event_hash TEXT NOT NULL,
            chain_authority TEXT NOT NULL,
            source_sdk_ver TEXT,
            schema_ver TEXT,
            ingested_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            UNIQUE (session_id, sequence_number)
        )
        "#,
        "CREATE INDEX IF NOT EXISTS ix_events_session \
         ON events (session_id, sequence_number)",
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'open',
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            last_batch_at TEXT,
            sealed_at TEXT,
            evidence_class TEXT
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS chain_seals (
            session_id TEXT PRIMARY KEY,
            sealing_authority_id TEXT NOT NULL,
            seal_timestamp TEXT NOT NULL,
            session_digest TEXT NOT NULL,
            final_event_hash TEXT NOT NULL,
            event_count INTEGER NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS violations (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            event_id TEXT NOT NULL,
            event_sequence_number INTEGER NOT NULL,
            policy_name TEXT NOT NULL,
            policy_version TEXT NOT NULL,
            policy_hash TEXT NOT NULL,
            severity TEXT NOT NULL,
            description TEXT NOT NULL,
            metadata TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    ];
    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(StoreError::from_sqlx)?;
    }
    Ok(())
}

/// Append one sealed event on the caller's connection.
pub async fn insert_event(
    conn: &mut SqliteConnection,
    event: &SealedEvent,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "INSERT INTO events (event_id, session_id, sequence_number, timestamp_wall, \
         timestamp_monotonic, event_type, payload_canonical, payload_hash, \
         prev_event_hash, event_hash, chain_authority, source_sdk_ver, schema_ver) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(event.event_id.to_string())
    .bind(event.session_id.to_string())
    .bind(event.sequence_number as i64)
    .bind(&event.timestamp_wall)
    .bind(event.timestamp_monotonic)
    .bind(event.event_type.as_str())
    .bind(&event.payload_canonical)
    .bind(&event.payload_hash)
    .bind(event.prev_event_hash.as_deref())
    .bind(&event.event_hash)
    .bind(&event.chain_authority)
    .bind(event.source_sdk_ver.as_deref())
    .bind(event.schema_ver.as_deref())
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) => {
            if e.as_database_error()
                .is_some_and(|db| db.is_unique_violation())
            {
                Err(StoreError::DuplicateSequence {
                    session_id: event.session_id,
                    sequence_number: event.sequence_number,
                })
            } else {
                Err(StoreError::from_sqlx(e))
            }
        }
    }
}

/// Read `{last_sequence, last_event_hash, closed}` for a session, or `None`
/// for a session with no committed events.
pub async fn chain_state(
    conn: &mut SqliteConnection,
    session_id: Uuid,
) -> Result<Option<ChainState>, StoreError> {
    let last = sqlx::query(
        "SELECT sequence_number, event_hash FROM events \
         WHERE session_id = ? ORDER BY sequence_number DESC LIMIT 1",
    )
    .bind(session_id.to_string())
    .fetch_optional(&mut *conn)
    .await
    .map_err(StoreError::from_sqlx)?;

    let Some(row) = last else {
        return Ok(None);
    };

    let closed: i64 = sqlx::query(
        "SELECT EXISTS (SELECT 1 FROM events WHERE session_id = ? \
         AND event_type IN ('SESSION_END', 'CHAIN_SEAL')) AS closed",
    )
    .bind(session_id.to_string())
    .fetch_one(&mut *conn)
    .await
    .map_err(StoreError::from_sqlx)?
    .try_get("closed")
    .map_err(StoreError::from_sqlx)?;

    Ok(Some(ChainState {
        session_id,
        last_sequence: row
            .try_get::<i64, _>("sequence_number")
            .map_err(StoreError::from_sqlx)? as u64,
        last_event_hash: row
            .try_get("event_hash")
            .map_err(StoreError::from_sqlx)?,
        closed: closed != 0,
    }))
}

/// All events of a session, ordered by sequence number ascending.
pub async fn session_events(
    conn: &mut SqliteConnection,
    session_id: Uuid,
) -> Result<Vec<SealedEvent>, StoreError> {
    let rows = sqlx::query(
        "SELECT * FROM events WHERE session_id = ? ORDER BY sequence_number ASC",
    )
    .bind(session_id.to_string())
    .fetch_all(&mut *conn)
    .await
    .map_err(StoreError::from_sqlx)?;

    rows.iter().map(row_to_event).collect()
}

pub async fn event_at(
    conn: &mut SqliteConnection,
    session_id: Uuid,
    sequence_number: u64,
) -> Result<Option<SealedEvent>, StoreError> {
    let row = sqlx::query("SELECT * FROM events WHERE session_id = ? AND sequence_number = ?")
        .bind(session_id.to_string())
        .bind(sequence_number as i64)
        .fetch_optional(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?;

    row.as_ref().map(row_to_event).transpose()
}

/// Create the session row if absent and touch it, taking the write lock that
/// serializes concurrent batches for this session.
pub async fn lock_session(
    conn: &mut SqliteConnection,
    session_id: Uuid,
    now: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO sessions (session_id, status, last_batch_at) VALUES (?, 'open', ?) \
         ON CONFLICT (session_id) DO UPDATE SET last_batch_at = excluded.last_batch_at",
    )
    .bind(session_id.to_string())
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(StoreError::from_sqlx)?;
    Ok(())
}

pub async fn session_status(
    conn: &mut SqliteConnection,
    session_id: Uuid,
) -> Result<Option<String>, StoreError> {
    let row = sqlx::query("SELECT status FROM sessions WHERE session_id = ?")
        .bind(session_id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?;
    row.map(|r| r.try_get("status").map_err(StoreError::from_sqlx))
        .transpose()
}

pub async fn mark_sealed(
    conn: &mut SqliteConnection,
    session_id: Uuid,
    sealed_at: &str,
    evidence_class: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE sessions SET status = 'sealed', sealed_at = ?, evidence_class = ? \
         WHERE session_id = ?",
    )
    .bind(sealed_at)
    .bind(evidence_class)
    .bind(session_id.to_string())
    .execute(&mut *conn)
    .await
    .map_err(StoreError::from_sqlx)?;
    Ok(())
}

pub async fn insert_seal(
    conn: &mut SqliteConnection,
    seal: &ChainSeal,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO chain_seals (session_id, sealing_authority_id, seal_timestamp, \
         session_digest, final_event_hash, event_count) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(seal.session_id.to_string())
    .bind(&seal.sealing_authority_id)
    .bind(&seal.seal_timestamp)
    .bind(&seal.session_digest)
    .bind(&seal.final_event_hash)
    .bind(seal.event_count as i64)
    .execute(&mut *conn)
    .await
    .map_err(StoreError::from_sqlx)?;
    Ok(())
}

pub async fn get_seal(
    conn: &mut SqliteConnection,
    session_id: Uuid,
) -> Result<Option<ChainSeal>, StoreError> {
    let row = sqlx::query("SELECT * FROM chain_seals WHERE session_id = ?")
        .bind(session_id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?;

    row.map(|r| {
        Ok(ChainSeal {
            session_id,
            sealing_authority_id: r
                .try_get("sealing_authority_id")
                .map_err(StoreError::from_sqlx)?,
            seal_timestamp: r.try_get("seal_timestamp").map_err(StoreError::from_sqlx)?,
            session_digest: r.try_get("session_digest").map_err(StoreError::from_sqlx)?,
            final_event_hash: r
                .try_get("final_event_hash")
                .map_err(StoreError::from_sqlx)?,
            event_count: r.try_get::<i64, _>("event_count").map_err(StoreError::from_sqlx)?
                as u64,
        })
    })
    .transpose()
}

pub async fn insert_violation(
    conn: &mut SqliteConnection,
    id: Uuid,
    record: &ViolationRecord,
    created_at: &str,
) -> Result<(), StoreError> {
    let metadata = serde_json::to_string(&record.metadata)
        .map_err(|e| StoreError::Decode(e.to_string()))?;
    sqlx::query(
        "INSERT INTO violations (id, session_id, event_id, event_sequence_number, \
         policy_name, policy_version, policy_hash, severity, description, metadata, \
         created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(record.session_id.to_string())
    .bind(record.event_id.to_string())
    .bind(record.event_sequence_number as i64)
    .bind(&record.policy_name)
    .bind(&record.policy_version)
    .bind(&record.policy_hash)
    .bind(record.severity.as_str())
    .bind(&record.description)
    .bind(metadata)
    .bind(created_at)
    .execute(&mut *conn)
    .await
    .map_err(StoreError::from_sqlx)?;
    Ok(())
}

pub(crate) fn now_iso() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

fn row_to_event(row: &SqliteRow) -> Result<SealedEvent, StoreError> {
    let event_id: String = row.try_get("event_id").map_err(StoreError::from_sqlx)?;
    let session_id: String = row.try_get("session_id").map_err(StoreError::from_sqlx)?;
    let event_type: String = row.try_get("event_type").map_err(StoreError::from_sqlx)?;

    Ok(SealedEvent {
        event_id: Uuid::parse_str(&event_id).map_err(|e| StoreError::Decode(e.to_string()))?,
        session_id: Uuid::parse_str(&session_id)
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        sequence_number: row
            .try_get::<i64, _>("sequence_number")
            .map_err(StoreError::from_sqlx)? as u64,
        timestamp_wall: row.try_get("timestamp_wall").map_err(StoreError::from_sqlx)?,
        event_type: EventType::parse(&event_type)
            .ok_or_else(|| StoreError::Decode(format!("unknown event type: {event_type}")))?,
        payload_canonical: row
            .try_get("payload_canonical")
            .map_err(StoreError::from_sqlx)?,
        payload_hash: row.try_get("payload_hash").map_err(StoreError::from_sqlx)?,
        prev_event_hash: row
            .try_get("prev_event_hash")
            .map_err(StoreError::from_sqlx)?,
        event_hash: row.try_get("event_hash").map_err(StoreError::from_sqlx)?,
        chain_authority: row
            .try_get("chain_authority")
            .map_err(StoreError::from_sqlx)?,
        timestamp_monotonic: row
            .try_get("timestamp_monotonic")
            .map_err(StoreError::from_sqlx)?,
        source_sdk_ver: row
            .try_get("source_sdk_ver")
            .map_err(StoreError::from_sqlx)?,
        schema_ver: row.try_get("schema_ver").map_err(StoreError::from_sqlx)?,
    })
}

fn row_to_violation(row: &SqliteRow) -> Result<StoredViolation, StoreError> {
    let id: String = row.try_get("id").map_err(StoreError::from_sqlx)?;
    let session_id: String = row.try_get("session_id").map_err(StoreError::from_sqlx)?;
    let event_id: String = row.try_get("event_id").map_err(StoreError::from_sqlx)?;
    let metadata: String = row.try_get("metadata").map_err(StoreError::from_sqlx)?;

    Ok(StoredViolation {
        id: Uuid::parse_str(&id).map_err(|e| StoreError::Decode(e.to_string()))?,
        session_id: Uuid::parse_str(&session_id)
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        event_id: Uuid::parse_str(&event_id).map_err(|e| StoreError::Decode(e.to_string()))?,
        event_sequence_number: row
            .try_get::<i64, _>("event_sequence_number")
            .map_err(StoreError::from_sqlx)? as u64,
        policy_name: row.try_get("policy_name").map_err(StoreError::from_sqlx)?,
        policy_version: row
            .try_get("policy_version")
            .map_err(StoreError::from_sqlx)?,
        policy_hash: row.try_get("policy_hash").map_err(StoreError::from_sqlx)?,
        severity: row.try_get("severity").map_err(StoreError::from_sqlx)?,
        description: row.try_get("description").map_err(StoreError::from_sqlx)?,
        metadata: serde_json::from_str(&metadata)
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        created_at: row.try_get("created_at").map_err(StoreError::from_sqlx)?,
    })
}
