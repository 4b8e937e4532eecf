//! Test doubles shared by the core unit tests and the backend's integration tests.

use crate::capability::{decryption_commitment, AccessPolicy, CiphertextOps};
use crate::errors::LedgerError;
use crate::events::{EventSink, LedgerEvent};
use crate::types::{Ciphertext, OwnerId, RequestId, TeamId};
use std::sync::Mutex;

const TAG: &[u8; 4] = b"pln1";

/// Plaintext-mirroring fake of the ciphertext capability.
///
/// A "ciphertext" is a tagged little-endian u64, addition is wrapping addition on the
/// mirrored plaintexts, and proofs use the same commitment scheme as the BFV runtime so
/// callback verification takes the identical path in tests.
pub struct PlainRuntime;

impl PlainRuntime {
    pub fn encrypt(value: u64) -> Ciphertext {
        let mut bytes = TAG.to_vec();
        bytes.extend_from_slice(&value.to_le_bytes());
        Ciphertext(bytes)
    }

    pub fn decrypt(bytes: &[u8]) -> Option<u64> {
        let rest = bytes.strip_prefix(TAG)?;
        Some(u64::from_le_bytes(rest.try_into().ok()?))
    }

    /// What the oracle would answer for `payload`: the cleartext plus a proof bound to the
    /// request and the payload bytes.
    pub fn fulfill(request_id: RequestId, payload: &[u8]) -> Option<(u64, Vec<u8>)> {
        let cleartext = Self::decrypt(payload)?;
        Some((cleartext, decryption_commitment(request_id, payload, cleartext)))
    }
}

impl CiphertextOps for PlainRuntime {
    fn zero(&self) -> Ciphertext {
        Self::encrypt(0)
    }

    fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, LedgerError> {
        match (Self::decrypt(&a.0), Self::decrypt(&b.0)) {
            (Some(x), Some(y)) => Ok(Self::encrypt(x.wrapping_add(y))),
            _ => Err(LedgerError::Capability(
                "malformed plain ciphertext".to_string(),
            )),
        }
    }

    fn is_initialized(&self, ct: &Ciphertext) -> bool {
        Self::decrypt(&ct.0).is_some()
    }

    fn to_transport(&self, ct: &Ciphertext) -> Vec<u8> {
        ct.0.clone()
    }

    fn verify_decryption(
        &self,
        request_id: RequestId,
        ciphertext: &[u8],
        cleartext: u64,
        proof: &[u8],
    ) -> bool {
        proof == decryption_commitment(request_id, ciphertext, cleartext).as_slice()
    }
}

/// Policy that admits every caller.
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn can_submit(&self, _caller: &OwnerId, _team: &TeamId) -> bool {
        true
    }

    fn can_request_decryption(&self, _caller: &OwnerId, _team: &TeamId) -> bool {
        true
    }
}

/// Policy that denies every caller, for exercising the authorization seam.
pub struct DenyAll;

impl AccessPolicy for DenyAll {
    fn can_submit(&self, _caller: &OwnerId, _team: &TeamId) -> bool {
        false
    }

    fn can_request_decryption(&self, _caller: &OwnerId, _team: &TeamId) -> bool {
        false
    }
}

/// Sink that records every emitted event for assertions.
#[derive(Default)]
pub struct CollectingSink(Mutex<Vec<LedgerEvent>>);

impl CollectingSink {
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: LedgerEvent) {
        self.0.lock().unwrap().push(event);
    }
}
