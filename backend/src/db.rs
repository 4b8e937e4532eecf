use crate::errors::ApiError;
use chrono::{DateTime, Utc};
use okr_core::events::LedgerEvent;
use okr_core::types::{Ciphertext, EncryptedRecord, OwnerId, RecordId, RequestId, TeamId};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};

pub type Db = Pool<Sqlite>;

pub async fn connect(db_url: &str) -> Result<Db, ApiError> {
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .map_err(|_| ApiError::Internal)
}

pub async fn init_schema(db: &Db) -> Result<(), ApiError> {
    // The journal mirrors the in-memory ledger for the dashboard and for replay on boot.
    // The core ledger stays authoritative; rows are written only after an operation
    // succeeded there.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS records (
  id INTEGER PRIMARY KEY,
  owner TEXT NOT NULL,
  team_id TEXT NOT NULL,
  created_at TEXT NOT NULL,
  enc_objective_b64 TEXT NOT NULL,
  enc_key_results_b64 TEXT NOT NULL,
  enc_progress_b64 TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  created_at TEXT NOT NULL,
  kind TEXT NOT NULL,
  payload_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS decryptions (
  request_id TEXT PRIMARY KEY,
  team_id TEXT NOT NULL,
  created_at TEXT NOT NULL,
  cleartext INTEGER NOT NULL
);
"#,
    )
    .execute(db)
    .await
    .map_err(|_| ApiError::Internal)?;

    Ok(())
}

pub async fn insert_record(db: &Db, record: &EncryptedRecord) -> Result<(), ApiError> {
    sqlx::query(
        r#"INSERT INTO records
           (id, owner, team_id, created_at, enc_objective_b64, enc_key_results_b64, enc_progress_b64)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(record.id.0 as i64)
    .bind(&record.owner.0)
    .bind(&record.team.0)
    .bind(record.created_at.to_rfc3339())
    .bind(record.encrypted_objective.to_b64())
    .bind(record.encrypted_key_results.to_b64())
    .bind(record.encrypted_progress.to_b64())
    .execute(db)
    .await
    .map_err(|_| ApiError::Internal)?;

    Ok(())
}

/// All journaled records in id order, for rebuilding the ledger on startup.
pub async fn load_records(db: &Db) -> Result<Vec<EncryptedRecord>, ApiError> {
    let rows = sqlx::query(
        r#"SELECT id, owner, team_id, created_at, enc_objective_b64, enc_key_results_b64, enc_progress_b64
           FROM records ORDER BY id"#,
    )
    .fetch_all(db)
    .await
    .map_err(|_| ApiError::Internal)?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.get(0);
        let owner: String = row.get(1);
        let team_id: String = row.get(2);
        let created_at: String = row.get(3);
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|_| ApiError::Internal)?
            .with_timezone(&Utc);

        let objective: String = row.get(4);
        let key_results: String = row.get(5);
        let progress: String = row.get(6);

        out.push(EncryptedRecord {
            id: RecordId(id as u64),
            owner: OwnerId(owner),
            team: TeamId(team_id),
            encrypted_objective: Ciphertext::from_b64(&objective).map_err(|_| ApiError::Internal)?,
            encrypted_key_results: Ciphertext::from_b64(&key_results)
                .map_err(|_| ApiError::Internal)?,
            encrypted_progress: Ciphertext::from_b64(&progress).map_err(|_| ApiError::Internal)?,
            created_at,
        });
    }

    Ok(out)
}

pub async fn insert_event(db: &Db, event: &LedgerEvent) -> Result<(), ApiError> {
    let payload_json = serde_json::to_string(event).map_err(|_| ApiError::Internal)?;

    sqlx::query(r#"INSERT INTO events (created_at, kind, payload_json) VALUES (?, ?, ?)"#)
        .bind(Utc::now().to_rfc3339())
        .bind(event.kind())
        .bind(payload_json)
        .execute(db)
        .await
        .map_err(|_| ApiError::Internal)?;

    Ok(())
}

/// Record a fulfilled decryption. Keyed by request id and inserted idempotently so a
/// repeated oracle callback cannot double-apply.
pub async fn insert_decryption(
    db: &Db,
    request_id: RequestId,
    team_id: &TeamId,
    cleartext: u64,
) -> Result<(), ApiError> {
    sqlx::query(
        r#"INSERT OR IGNORE INTO decryptions (request_id, team_id, created_at, cleartext)
           VALUES (?, ?, ?, ?)"#,
    )
    .bind(request_id.0.to_string())
    .bind(&team_id.0)
    .bind(Utc::now().to_rfc3339())
    .bind(cleartext as i64)
    .execute(db)
    .await
    .map_err(|_| ApiError::Internal)?;

    Ok(())
}

pub async fn get_decryption(db: &Db, request_id: RequestId) -> Result<Option<u64>, ApiError> {
    let row = sqlx::query(r#"SELECT cleartext FROM decryptions WHERE request_id = ?"#)
        .bind(request_id.0.to_string())
        .fetch_optional(db)
        .await
        .map_err(|_| ApiError::Internal)?;

    Ok(row.map(|r| {
        let v: i64 = r.get(0);
        v as u64
    }))
}
