//! Collaborator seams injected into the ledger.

use crate::constants::PROOF_DOMAIN;
use crate::errors::LedgerError;
use crate::types::{Ciphertext, OwnerId, RequestId, TeamId};
use sha2::{Digest, Sha256};

/// Opaque encrypted-integer capability supplied by an FHE runtime.
///
/// The ledger performs no cryptographic arithmetic of its own: it combines ciphertexts
/// through this interface, never decrypts, and never branches on plaintext content.
pub trait CiphertextOps: Send + Sync {
    /// The additive identity. Must be deterministic: repeated calls return the same bytes,
    /// so that recomputing an unchanged aggregate yields a bit-identical result.
    fn zero(&self) -> Ciphertext;

    /// Homomorphic addition of two ciphertexts.
    fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, LedgerError>;

    /// Whether `ct` is a well-formed ciphertext this runtime can operate on.
    fn is_initialized(&self, ct: &Ciphertext) -> bool;

    /// Serialize `ct` for delivery to the decryption oracle.
    fn to_transport(&self, ct: &Ciphertext) -> Vec<u8>;

    /// Check the oracle's proof that `cleartext` is the decryption of `ciphertext` for
    /// the given request.
    fn verify_decryption(
        &self,
        request_id: RequestId,
        ciphertext: &[u8],
        cleartext: u64,
        proof: &[u8],
    ) -> bool;
}

/// Host-supplied authorization policy, consulted before any mutating operation.
///
/// The ledger imposes no rule of its own. Hosts choose the concrete rule set, e.g.
/// "submitter must equal owner" or "requester must be a recorded team member".
pub trait AccessPolicy: Send + Sync {
    fn can_submit(&self, caller: &OwnerId, team: &TeamId) -> bool;
    fn can_request_decryption(&self, caller: &OwnerId, team: &TeamId) -> bool;
}

/// Commitment binding a decryption result to the ciphertext it was derived from.
///
/// This is the verification primitive shared by the bundled runtimes: the oracle computes
/// `SHA-256(domain || request_id || len(ct) || ct || cleartext)` over the transport bytes it
/// decrypted, and `verify_decryption` recomputes it. A production deployment substitutes a
/// KMS that returns a real proof of correct decryption; the binding shape stays the same.
pub fn decryption_commitment(request_id: RequestId, ciphertext: &[u8], cleartext: u64) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(PROOF_DOMAIN);
    hasher.update(request_id.0.as_bytes());
    hasher.update((ciphertext.len() as u64).to_le_bytes());
    hasher.update(ciphertext);
    hasher.update(cleartext.to_le_bytes());
    hasher.finalize().to_vec()
}
