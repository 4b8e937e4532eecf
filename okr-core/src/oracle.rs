//! Client side of the asynchronous decryption-oracle handshake.

use crate::capability::CiphertextOps;
use crate::errors::LedgerError;
use crate::types::{RequestId, TeamAggregate, TeamId};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// Retention policy for fulfilled decryption requests.
///
/// The ledger-faithful default keeps every entry forever, which is an unbounded leak for
/// long-lived hosts; configure a purge horizon and call
/// [`DecryptionOracleClient::purge_fulfilled`] periodically to bound it.
#[derive(Clone, Copy, Debug, Default)]
pub enum Retention {
    #[default]
    KeepForever,
    PurgeFulfilledAfter(Duration),
}

/// Lifecycle of one request: `Pending` from issue until a valid callback, `Fulfilled`
/// afterwards. There is no timeout or cancellation; a callback that never arrives leaves
/// the entry pending indefinitely.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestState {
    Pending,
    Fulfilled { cleartext: u64, at: DateTime<Utc> },
}

/// A decryption request as handed to the host for delivery to the oracle.
#[derive(Clone, Debug, Serialize)]
pub struct DecryptionRequest {
    pub request_id: RequestId,
    pub team: TeamId,
    /// Transport form of the aggregate ciphertext at issue time. Proof verification is
    /// bound to exactly these bytes, not to whatever the aggregate becomes later.
    pub payload: Vec<u8>,
}

struct RequestEntry {
    team: TeamId,
    payload: Vec<u8>,
    state: RequestState,
}

/// Tracks issued decryption requests and validates the oracle's callbacks.
#[derive(Default)]
pub struct DecryptionOracleClient {
    retention: Retention,
    requests: HashMap<RequestId, RequestEntry>,
}

impl DecryptionOracleClient {
    pub fn new(retention: Retention) -> Self {
        Self {
            retention,
            requests: HashMap::new(),
        }
    }

    /// Package `aggregate` for the oracle and record the pending mapping.
    ///
    /// Does not block: delivery to the oracle is the host's job, and the callback arrives
    /// whenever the oracle gets around to it.
    pub fn issue(
        &mut self,
        runtime: &dyn CiphertextOps,
        aggregate: &TeamAggregate,
    ) -> DecryptionRequest {
        let request_id = RequestId::fresh();
        let payload = runtime.to_transport(&aggregate.encrypted_sum);
        self.requests.insert(
            request_id,
            RequestEntry {
                team: aggregate.team.clone(),
                payload: payload.clone(),
                state: RequestState::Pending,
            },
        );
        DecryptionRequest {
            request_id,
            team: aggregate.team.clone(),
            payload,
        }
    }

    /// Validate and consume an oracle callback.
    ///
    /// Returns `Ok(Some(team))` when the request transitions to fulfilled, `Ok(None)` for
    /// the safe no-op on an already-fulfilled request. An invalid proof leaves the request
    /// pending so the oracle may resubmit a correct one later.
    pub fn apply_callback(
        &mut self,
        runtime: &dyn CiphertextOps,
        request_id: RequestId,
        cleartext: u64,
        proof: &[u8],
    ) -> Result<Option<TeamId>, LedgerError> {
        let entry = self.requests.get_mut(&request_id).ok_or_else(|| {
            warn!(%request_id, "callback for a request this client never issued");
            LedgerError::UnknownRequest(request_id)
        })?;

        if let RequestState::Fulfilled { .. } = entry.state {
            return Ok(None);
        }

        if !runtime.verify_decryption(request_id, &entry.payload, cleartext, proof) {
            warn!(%request_id, "decryption proof rejected");
            return Err(LedgerError::InvalidProof(request_id));
        }

        entry.state = RequestState::Fulfilled {
            cleartext,
            at: Utc::now(),
        };
        Ok(Some(entry.team.clone()))
    }

    pub fn state(&self, request_id: RequestId) -> Option<(&TeamId, &RequestState)> {
        self.requests
            .get(&request_id)
            .map(|e| (&e.team, &e.state))
    }

    /// Drop fulfilled entries older than the configured horizon. Pending entries are never
    /// purged. Returns how many entries were removed.
    pub fn purge_fulfilled(&mut self, now: DateTime<Utc>) -> usize {
        let Retention::PurgeFulfilledAfter(horizon) = self.retention else {
            return 0;
        };
        let before = self.requests.len();
        self.requests.retain(|_, entry| match entry.state {
            RequestState::Fulfilled { at, .. } => now - at < horizon,
            RequestState::Pending => true,
        });
        before - self.requests.len()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
