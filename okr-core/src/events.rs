//! Events surfaced to the host. The dashboard/indexer collaborator consumes these; the
//! ledger itself never reads them back.

use crate::types::{OwnerId, RecordId, RequestId, TeamId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    RecordSubmitted {
        id: RecordId,
        owner: OwnerId,
        timestamp: DateTime<Utc>,
    },
    AggregateComputed {
        team: TeamId,
        timestamp: DateTime<Utc>,
    },
    DecryptionRequested {
        request_id: RequestId,
    },
    AggregateDecrypted {
        team: TeamId,
        cleartext: u64,
    },
}

impl LedgerEvent {
    /// Stable tag used for journal rows and log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::RecordSubmitted { .. } => "record_submitted",
            LedgerEvent::AggregateComputed { .. } => "aggregate_computed",
            LedgerEvent::DecryptionRequested { .. } => "decryption_requested",
            LedgerEvent::AggregateDecrypted { .. } => "aggregate_decrypted",
        }
    }
}

/// Where the ledger hands off emitted events. Must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LedgerEvent);
}

/// Sink that drops everything, for hosts that poll state instead of consuming events.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: LedgerEvent) {}
}
