mod api;
mod db;
mod errors;
mod models;
mod oracle;
mod state;

use crate::errors::ApiError;
use crate::state::{AppState, ChannelSink, HostPolicy, OracleMode};
use okr_core::bfv::{BfvOracle, BfvRuntime};
use okr_core::ledger::Ledger;
use okr_core::oracle::Retention;
use okr_core::store::MembershipMode;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // Store local state under backend/data (ignored by git).
    let data_dir = PathBuf::from("data");
    std::fs::create_dir_all(&data_dir).map_err(|_| ApiError::Internal)?;

    let db_path = data_dir.join("ledger.sqlite");
    let db_url = format!("sqlite:{}", db_path.to_string_lossy());

    let db = db::connect(&db_url).await?;
    db::init_schema(&db).await?;

    let seed = state::ensure_seed(&data_dir)?;
    let oracle = Arc::new(BfvOracle::from_seed(seed)?);
    let runtime = Arc::new(BfvRuntime::new()?);

    let oracle_mode = match std::env::var("ORACLE_MODE").as_deref() {
        Ok("external") => OracleMode::External,
        _ => OracleMode::Local,
    };
    let membership_mode = match std::env::var("MEMBERSHIP_MODE").as_deref() {
        Ok("unique") => MembershipMode::Unique,
        _ => MembershipMode::Ledger,
    };
    let retention = match std::env::var("RETENTION_SECS").ok().and_then(|s| s.parse::<i64>().ok()) {
        Some(secs) if secs > 0 => Retention::PurgeFulfilledAfter(chrono::Duration::seconds(secs)),
        _ => Retention::KeepForever,
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    // Rebuild the in-memory ledger from the submission journal.
    let records = db::load_records(&db).await?;
    let replayed = records.len();
    let ledger = Ledger::from_records(
        runtime,
        Arc::new(HostPolicy),
        Arc::new(ChannelSink(event_tx)),
        membership_mode,
        retention,
        records,
    )?;
    if replayed > 0 {
        tracing::info!(replayed, "ledger rebuilt from journal");
    }

    let state = AppState {
        db: db.clone(),
        ledger: Arc::new(Mutex::new(ledger)),
        oracle,
        oracle_mode,
    };

    // Journal writer: drains emitted events into SQLite for the dashboard.
    {
        let db = db.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if db::insert_event(&db, &event).await.is_err() {
                    tracing::warn!(kind = event.kind(), "failed to journal event");
                }
            }
        });
    }

    // Retention sweep for fulfilled decryption requests.
    if matches!(retention, Retention::PurgeFulfilledAfter(_)) {
        let ledger = state.ledger.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(60));
            loop {
                tick.tick().await;
                let purged = ledger.lock().await.purge_fulfilled();
                if purged > 0 {
                    tracing::info!(purged, "purged fulfilled decryption requests");
                }
            }
        });
    }

    let app = api::router(state);

    let addr = std::env::var("BACKEND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|_| ApiError::Internal)?;

    tracing::info!(%addr, mode = ?oracle_mode, "backend listening");

    axum::serve(listener, app).await.map_err(|_| ApiError::Internal)?;

    Ok(())
}
