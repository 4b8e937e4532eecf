//! Local oracle mode: fulfill decryption requests in-process.
//!
//! This is the dev/demo stand-in for an external key holder. It feeds the result through
//! the same callback path the external endpoint uses, proof included, so the core cannot
//! tell the difference.

use crate::db;
use crate::errors::ApiError;
use crate::state::AppState;
use okr_core::oracle::DecryptionRequest;
use tracing::warn;

pub async fn fulfill_local(state: AppState, request: DecryptionRequest) {
    let request_id = request.request_id;
    if let Err(e) = fulfill_local_inner(state, request).await {
        warn!(%request_id, "local oracle fulfillment failed: {e}");
    }
}

async fn fulfill_local_inner(state: AppState, request: DecryptionRequest) -> Result<(), ApiError> {
    let oracle = state.oracle.clone();
    let request_id = request.request_id;
    let payload = request.payload.clone();

    // BFV decryption is CPU-bound; keep it off the async workers.
    let (cleartext, proof) = tokio::task::spawn_blocking(move || {
        oracle.fulfill(request_id, &payload)
    })
    .await
    .map_err(|_| ApiError::Internal)?
    .map_err(ApiError::from)?;

    let team = {
        let mut ledger = state.ledger.lock().await;
        ledger.on_callback(request_id, cleartext, &proof)?;
        ledger
            .decryption_state(request_id)
            .map(|(team, _)| team.clone())
            .ok_or(ApiError::Internal)?
    };

    db::insert_decryption(&state.db, request_id, &team, cleartext).await?;
    Ok(())
}
