use crate::db;
use crate::errors::ApiError;
use crate::models::*;
use crate::state::{AppState, OracleMode};
use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use okr_core::constants::{BFV_DEGREE, BFV_PLAINTEXT_MODULUS};
use okr_core::oracle::RequestState;
use okr_core::types::{Ciphertext, OwnerId, RecordId, RequestId, TeamId};
use tower_http::cors::{Any, CorsLayer};

pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/v1/records", post(submit_record))
        .route("/api/v1/teams/:team/recompute", post(recompute))
        .route("/api/v1/teams/:team/decryption-requests", post(request_decryption))
        .route("/api/v1/oracle/callbacks", post(oracle_callback))
        .layer(middleware::from_fn(auth_middleware));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/records/:id", get(get_record))
        .route("/api/v1/teams/:team/aggregate", get(get_aggregate))
        .route("/api/v1/decryptions/:request_id", get(get_decryption))
        .route("/api/v1/fhe/public-key", get(get_public_key))
        .merge(protected_routes)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // In production, this should be a strong secret from environment.
    let expected_key = std::env::var("API_KEY").unwrap_or_else(|_| "dev-secret-key".to_string());

    if let Some(provided_key) = headers.get("X-API-KEY") {
        if provided_key == expected_key.as_str() {
            return Ok(next.run(request).await);
        }
    }

    tracing::warn!("unauthorized access attempt");
    Err(StatusCode::UNAUTHORIZED)
}

/// Caller identity for policy checks. The prototype trusts a header once the API key has
/// passed; a deployment replaces this with a real principal from its auth layer.
fn caller_from(headers: &HeaderMap) -> Result<OwnerId, ApiError> {
    let value = headers
        .get("X-CALLER-ID")
        .ok_or_else(|| ApiError::BadRequest("missing X-CALLER-ID header".to_string()))?;
    let s = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("invalid X-CALLER-ID header".to_string()))?;
    Ok(OwnerId(s.to_string()))
}

fn decode_ciphertext(field: &str, b64: &str) -> Result<Ciphertext, ApiError> {
    Ciphertext::from_b64(b64).map_err(|_| ApiError::BadRequest(format!("invalid {field}")))
}

async fn submit_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let caller = caller_from(&headers)?;

    // Host rule: submissions are made on one's own behalf.
    if caller != req.owner {
        return Err(ApiError::Unauthorized(
            "submitter must equal owner".to_string(),
        ));
    }

    let objective = decode_ciphertext("encrypted_objective_b64", &req.encrypted_objective_b64)?;
    let key_results =
        decode_ciphertext("encrypted_key_results_b64", &req.encrypted_key_results_b64)?;
    let progress = decode_ciphertext("encrypted_progress_b64", &req.encrypted_progress_b64)?;

    let record = {
        let mut ledger = state.ledger.lock().await;
        let id = ledger.submit(
            &caller,
            req.owner,
            req.team_id,
            objective,
            key_results,
            progress,
        )?;
        ledger.get_record(id)?.clone()
    };

    let record_id = record.id;
    db::insert_record(&state.db, &record).await?;

    Ok(Json(SubmitResponse { record_id }))
}

async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<RecordGetResponse>, ApiError> {
    let ledger = state.ledger.lock().await;
    let record = ledger.get_record(RecordId(id))?;

    Ok(Json(RecordGetResponse {
        record_id: record.id,
        owner: record.owner.clone(),
        team_id: record.team.clone(),
        created_at: record.created_at,
        encrypted_objective_b64: record.encrypted_objective.to_b64(),
        encrypted_key_results_b64: record.encrypted_key_results.to_b64(),
        encrypted_progress_b64: record.encrypted_progress.to_b64(),
    }))
}

async fn recompute(
    State(state): State<AppState>,
    Path(team): Path<String>,
) -> Result<Json<RecomputeResponse>, ApiError> {
    let team = TeamId(team);

    let mut ledger = state.ledger.lock().await;
    ledger.recompute(&team)?;
    let aggregate = ledger.get_aggregate(&team)?;

    Ok(Json(RecomputeResponse {
        team_id: team.clone(),
        last_updated: aggregate.last_updated,
    }))
}

async fn get_aggregate(
    State(state): State<AppState>,
    Path(team): Path<String>,
) -> Result<Json<AggregateGetResponse>, ApiError> {
    let team = TeamId(team);
    let ledger = state.ledger.lock().await;
    let aggregate = ledger.get_aggregate(&team)?;

    Ok(Json(AggregateGetResponse {
        team_id: team.clone(),
        encrypted_sum_b64: aggregate.encrypted_sum.to_b64(),
        last_updated: aggregate.last_updated,
    }))
}

async fn request_decryption(
    State(state): State<AppState>,
    Path(team): Path<String>,
    headers: HeaderMap,
) -> Result<Json<DecryptionRequestResponse>, ApiError> {
    let caller = caller_from(&headers)?;
    let team = TeamId(team);

    let request = {
        let mut ledger = state.ledger.lock().await;
        ledger.request_decryption(&caller, &team)?
    };

    // The request is recorded; fulfillment is asynchronous either way.
    if state.oracle_mode == OracleMode::Local {
        tokio::spawn(crate::oracle::fulfill_local(state.clone(), request.clone()));
    }

    Ok(Json(DecryptionRequestResponse {
        request_id: request.request_id,
        team_id: request.team,
        payload_b64: base64::engine::general_purpose::STANDARD.encode(&request.payload),
    }))
}

async fn oracle_callback(
    State(state): State<AppState>,
    Json(req): Json<OracleCallbackRequest>,
) -> Result<Json<OracleCallbackResponse>, ApiError> {
    let proof = hex::decode(&req.proof_hex)
        .map_err(|_| ApiError::BadRequest("invalid proof_hex".to_string()))?;

    let team = {
        let mut ledger = state.ledger.lock().await;
        ledger.on_callback(req.request_id, req.cleartext, &proof)?;
        ledger
            .decryption_state(req.request_id)
            .map(|(team, _)| team.clone())
            .ok_or(ApiError::Internal)?
    };

    db::insert_decryption(&state.db, req.request_id, &team, req.cleartext).await?;

    Ok(Json(OracleCallbackResponse { ok: true }))
}

async fn get_decryption(
    State(state): State<AppState>,
    Path(request_id): Path<uuid::Uuid>,
) -> Result<Json<DecryptionStatusResponse>, ApiError> {
    let request_id = RequestId(request_id);
    let ledger = state.ledger.lock().await;
    let (team, request_state) = ledger
        .decryption_state(request_id)
        .ok_or_else(|| ApiError::NotFound(format!("decryption request {request_id}")))?;

    let (status, cleartext) = match request_state {
        RequestState::Pending => ("pending", None),
        RequestState::Fulfilled { cleartext, .. } => ("fulfilled", Some(*cleartext)),
    };

    Ok(Json(DecryptionStatusResponse {
        request_id,
        team_id: team.clone(),
        status: status.to_string(),
        cleartext,
    }))
}

async fn get_public_key(
    State(state): State<AppState>,
) -> Result<Json<PublicKeyResponse>, ApiError> {
    let b64 = base64::engine::general_purpose::STANDARD.encode(state.oracle.public_key_bytes());

    Ok(Json(PublicKeyResponse {
        scheme: "bfv".to_string(),
        degree: BFV_DEGREE as u64,
        plaintext_modulus: BFV_PLAINTEXT_MODULUS,
        public_key_b64: b64,
    }))
}
