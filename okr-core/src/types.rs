//! Data model shared between the ledger core and its hosts.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a submitting participant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Team identifier. Teams exist implicitly: the first submission naming a team creates it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub String);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sequential record identifier. The first record gets id 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a decryption request issued to the oracle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque ciphertext handle.
///
/// The ledger stores and moves these bytes but never inspects them; all arithmetic and
/// validity checks go through the injected ciphertext capability.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Ciphertext(pub Vec<u8>);

impl Ciphertext {
    pub fn from_b64(s: &str) -> Result<Self, base64::DecodeError> {
        Ok(Self(base64::engine::general_purpose::STANDARD.decode(s)?))
    }

    pub fn to_b64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.0)
    }
}

impl fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Blobs are large and meaningless in logs; print the length only.
        write!(f, "Ciphertext({} bytes)", self.0.len())
    }
}

/// One encrypted OKR submission. Immutable after creation: a follow-up submission is a
/// new record with a fresh id, never an in-place update.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedRecord {
    pub id: RecordId,
    pub owner: OwnerId,
    pub team: TeamId,
    pub encrypted_objective: Ciphertext,
    pub encrypted_key_results: Ciphertext,
    pub encrypted_progress: Ciphertext,
    pub created_at: DateTime<Utc>,
}

/// A team's homomorphic progress sum as of `last_updated`.
///
/// Each recompute replaces the whole value; no incremental merge state survives between
/// calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TeamAggregate {
    pub team: TeamId,
    pub encrypted_sum: Ciphertext,
    pub last_updated: DateTime<Utc>,
}
