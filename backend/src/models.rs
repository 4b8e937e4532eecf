use chrono::{DateTime, Utc};
use okr_core::types::{OwnerId, RecordId, RequestId, TeamId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub owner: OwnerId,
    pub team_id: TeamId,

    /// Ciphertexts produced client-side against the published public key (see
    /// `GET /api/v1/fhe/public-key`), base64 encoded.
    pub encrypted_objective_b64: String,
    pub encrypted_key_results_b64: String,
    pub encrypted_progress_b64: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub record_id: RecordId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordGetResponse {
    pub record_id: RecordId,
    pub owner: OwnerId,
    pub team_id: TeamId,
    pub created_at: DateTime<Utc>,
    pub encrypted_objective_b64: String,
    pub encrypted_key_results_b64: String,
    pub encrypted_progress_b64: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecomputeResponse {
    pub team_id: TeamId,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AggregateGetResponse {
    pub team_id: TeamId,
    pub encrypted_sum_b64: String,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DecryptionRequestResponse {
    pub request_id: RequestId,
    pub team_id: TeamId,

    /// Transport payload for the oracle. In local oracle mode the backend fulfills this
    /// itself; in external mode whoever holds the key POSTs the callback endpoint.
    pub payload_b64: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OracleCallbackRequest {
    pub request_id: RequestId,
    pub cleartext: u64,
    pub proof_hex: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OracleCallbackResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DecryptionStatusResponse {
    pub request_id: RequestId,
    pub team_id: TeamId,
    pub status: String,
    pub cleartext: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    pub scheme: String,
    pub degree: u64,
    pub plaintext_modulus: u64,
    pub public_key_b64: String,
}
