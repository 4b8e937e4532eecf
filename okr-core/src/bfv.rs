//! BFV-backed ciphertext capability and oracle-side key holder (fhe.rs).
//!
//! The ledger sees only [`CiphertextOps`]; everything scheme-specific lives here. Transport
//! bytes are fhe.rs's own ciphertext serialization, with one extension: the empty byte
//! string is the additive identity. BFV's in-memory zero ciphertext has no serialized
//! form, so the identity never round-trips through the scheme and `add` resolves it
//! structurally instead.

use crate::capability::{decryption_commitment, CiphertextOps};
use crate::constants::{BFV_DEGREE, BFV_MODULI, BFV_PLAINTEXT_MODULUS};
use crate::errors::LedgerError;
use crate::types::{Ciphertext, RequestId};
use fhe::bfv::{
    BfvParameters, BfvParametersBuilder, Ciphertext as BfvCiphertext, Encoding, Plaintext,
    PublicKey, SecretKey,
};
use fhe_traits::{
    DeserializeParametrized, FheDecoder, FheDecrypter, FheEncoder, FheEncrypter,
    Serialize as FheSerialize,
};
use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::sync::Arc;

fn capability_err<E: std::fmt::Display>(e: E) -> LedgerError {
    LedgerError::Capability(e.to_string())
}

/// Build the crate's standard BFV parameter set.
pub fn params() -> Result<Arc<BfvParameters>, LedgerError> {
    BfvParametersBuilder::new()
        .set_degree(BFV_DEGREE)
        .set_plaintext_modulus(BFV_PLAINTEXT_MODULUS)
        .set_moduli(&BFV_MODULI)
        .build_arc()
        .map_err(capability_err)
}

/// The public half of the runtime: everything the ledger needs to aggregate, and nothing
/// that could decrypt.
pub struct BfvRuntime {
    params: Arc<BfvParameters>,
}

impl BfvRuntime {
    pub fn new() -> Result<Self, LedgerError> {
        Ok(Self { params: params()? })
    }

    fn parse(&self, ct: &Ciphertext) -> Result<BfvCiphertext, LedgerError> {
        BfvCiphertext::from_bytes(&ct.0, &self.params).map_err(capability_err)
    }
}

impl CiphertextOps for BfvRuntime {
    fn zero(&self) -> Ciphertext {
        Ciphertext(Vec::new())
    }

    fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, LedgerError> {
        // The identity element carries no polynomials, so it is resolved here rather than
        // handed to the scheme.
        match (a.0.is_empty(), b.0.is_empty()) {
            (true, true) => Ok(self.zero()),
            (true, false) => Ok(b.clone()),
            (false, true) => Ok(a.clone()),
            (false, false) => {
                let mut sum = self.parse(a)?;
                let rhs = self.parse(b)?;
                sum += &rhs;
                Ok(Ciphertext(sum.to_bytes()))
            }
        }
    }

    fn is_initialized(&self, ct: &Ciphertext) -> bool {
        !ct.0.is_empty() && self.parse(ct).is_ok()
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

/// Client-side encryptor, for participants producing submissions.
pub struct BfvClient {
    params: Arc<BfvParameters>,
    pk: PublicKey,
}

impl BfvClient {
    /// Construct from the oracle's published public key bytes.
    pub fn from_public_key(bytes: &[u8]) -> Result<Self, LedgerError> {
        let params = params()?;
        let pk = PublicKey::from_bytes(bytes, &params).map_err(capability_err)?;
        Ok(Self { params, pk })
    }

    pub fn encrypt_u64<R: RngCore + CryptoRng>(
        &self,
        value: u64,
        rng: &mut R,
    ) -> Result<Ciphertext, LedgerError> {
        let pt = Plaintext::try_encode(&[value], Encoding::poly(), &self.params)
            .map_err(capability_err)?;
        let ct: BfvCiphertext = self.pk.try_encrypt(&pt, rng).map_err(capability_err)?;
        Ok(Ciphertext(ct.to_bytes()))
    }
}

/// Oracle-side key holder: decrypts aggregate payloads and attests the results.
///
/// Key material is derived from a 32-byte seed so a host can persist its oracle identity
/// as a single small secret. The proof is the commitment from [`decryption_commitment`],
/// a prototype stand-in for a KMS proof of correct decryption.
pub struct BfvOracle {
    params: Arc<BfvParameters>,
    sk: SecretKey,
    pk: PublicKey,
}

impl BfvOracle {
    pub fn from_seed(seed: [u8; 32]) -> Result<Self, LedgerError> {
        let params = params()?;
        let mut rng = ChaCha20Rng::from_seed(seed);
        let sk = SecretKey::random(&params, &mut rng);
        let pk = PublicKey::new(&sk, &mut rng);
        Ok(Self { params, sk, pk })
    }

    /// Public key participants encrypt against.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.pk.to_bytes()
    }

    pub fn client(&self) -> BfvClient {
        BfvClient {
            params: self.params.clone(),
            pk: self.pk.clone(),
        }
    }

    /// Decrypt an aggregate payload and produce the callback proof.
    pub fn fulfill(
        &self,
        request_id: RequestId,
        payload: &[u8],
    ) -> Result<(u64, Vec<u8>), LedgerError> {
        // An empty payload is the additive identity: a team whose every contribution was
        // the zero value.
        let cleartext = if payload.is_empty() {
            0
        } else {
            let ct = BfvCiphertext::from_bytes(payload, &self.params).map_err(capability_err)?;
            let pt = self.sk.try_decrypt(&ct).map_err(capability_err)?;
            let values = Vec::<u64>::try_decode(&pt, Encoding::poly()).map_err(capability_err)?;
            values.first().copied().unwrap_or(0)
        };
        let proof = decryption_commitment(request_id, payload, cleartext);
        Ok((cleartext, proof))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use rand::TryRngCore;

    fn oracle() -> BfvOracle {
        BfvOracle::from_seed([7u8; 32]).unwrap()
    }

    #[test]
    fn zero_is_deterministic_and_uninitialized() {
        let runtime = BfvRuntime::new().unwrap();
        assert_eq!(runtime.zero(), runtime.zero());
        assert!(!runtime.is_initialized(&runtime.zero()));
        assert!(!runtime.is_initialized(&Ciphertext(vec![0, 1, 2])));
    }

    #[test]
    fn adding_zero_is_identity() {
        let oracle = oracle();
        let client = oracle.client();
        let runtime = BfvRuntime::new().unwrap();

        let ct = client.encrypt_u64(40, &mut OsRng.unwrap_err()).unwrap();
        assert!(runtime.is_initialized(&ct));

        let left = runtime.add(&runtime.zero(), &ct).unwrap();
        let right = runtime.add(&ct, &runtime.zero()).unwrap();
        assert_eq!(left, ct);
        assert_eq!(right, ct);
    }

    #[test]
    fn homomorphic_sum_decrypts_to_plaintext_sum() {
        let oracle = oracle();
        let client = oracle.client();
        let runtime = BfvRuntime::new().unwrap();
        let mut rng = OsRng.unwrap_err();

        let a = client.encrypt_u64(40, &mut rng).unwrap();
        let b = client.encrypt_u64(60, &mut rng).unwrap();
        let mut sum = runtime.zero();
        sum = runtime.add(&sum, &a).unwrap();
        sum = runtime.add(&sum, &b).unwrap();

        let request_id = RequestId::fresh();
        let payload = runtime.to_transport(&sum);
        let (cleartext, proof) = oracle.fulfill(request_id, &payload).unwrap();
        assert_eq!(cleartext, 100);
        assert!(runtime.verify_decryption(request_id, &payload, cleartext, &proof));
    }

    #[test]
    fn empty_payload_decrypts_to_zero() {
        let oracle = oracle();
        let runtime = BfvRuntime::new().unwrap();

        let request_id = RequestId::fresh();
        let (cleartext, proof) = oracle.fulfill(request_id, &[]).unwrap();
        assert_eq!(cleartext, 0);
        assert!(runtime.verify_decryption(request_id, &[], cleartext, &proof));
    }

    #[test]
    fn transport_round_trips_through_public_key() {
        let oracle = oracle();
        let client = BfvClient::from_public_key(&oracle.public_key_bytes()).unwrap();
        let runtime = BfvRuntime::new().unwrap();

        let ct = client.encrypt_u64(25, &mut OsRng.unwrap_err()).unwrap();
        let request_id = RequestId::fresh();
        let payload = runtime.to_transport(&ct);
        let (cleartext, _proof) = oracle.fulfill(request_id, &payload).unwrap();
        assert_eq!(cleartext, 25);
    }

    #[test]
    fn tampered_proof_is_rejected() {
        let oracle = oracle();
        let client = oracle.client();
        let runtime = BfvRuntime::new().unwrap();

        let ct = client.encrypt_u64(40, &mut OsRng.unwrap_err()).unwrap();
        let request_id = RequestId::fresh();
        let payload = runtime.to_transport(&ct);
        let (cleartext, mut proof) = oracle.fulfill(request_id, &payload).unwrap();
        proof[0] ^= 1;
        assert!(!runtime.verify_decryption(request_id, &payload, cleartext, &proof));
    }
}
