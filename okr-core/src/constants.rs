//! Crate-wide constants for the BFV runtime and the decryption-proof commitment.

/// BFV polynomial ring degree.
///
/// The standard 2048/1032193 parameter set: additions over small integers at a reasonable
/// security level, with single-modulus ciphertexts small enough for transport payloads.
pub const BFV_DEGREE: usize = 2048;

/// BFV plaintext modulus. Team progress sums must stay below this bound; individual
/// progress values are percentages, so even very large teams fit comfortably.
pub const BFV_PLAINTEXT_MODULUS: u64 = 1_032_193;

/// Ciphertext moduli for the parameter set above.
pub const BFV_MODULI: [u64; 1] = [0x3FFFFFFF000001];

/// Domain separator for decryption-proof commitments.
pub const PROOF_DOMAIN: &[u8; 16] = b"okr-ledger/dec/1";
