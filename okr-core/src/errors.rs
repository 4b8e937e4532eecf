use crate::types::{OwnerId, RequestId, TeamId};
use thiserror::Error;

/// Errors surfaced by ledger operations.
///
/// Every variant leaves ledger state untouched: operations validate before they mutate.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {caller} may not {action} for team {team}")]
    Unauthorized {
        caller: OwnerId,
        team: TeamId,
        action: &'static str,
    },

    #[error("team {0} has no computed aggregate")]
    EmptyAggregate(TeamId),

    #[error("invalid decryption proof for request {0}")]
    InvalidProof(RequestId),

    #[error("unknown decryption request {0}")]
    UnknownRequest(RequestId),

    #[error("ciphertext capability: {0}")]
    Capability(String),

    #[error("journal replay: {0}")]
    Replay(String),
}
