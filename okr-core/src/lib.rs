//! Core of the confidential OKR ledger.
//!
//! This crate contains:
//! - An append-only ledger of encrypted OKR submissions and the per-team membership it implies.
//! - A homomorphic aggregation engine that sums each member's latest encrypted progress.
//! - The asynchronous decryption-oracle client state machine (request, callback, proof check).
//! - A BFV runtime (fhe.rs) implementing the opaque ciphertext capability the ledger consumes.
//!
//! The ledger never decrypts anything itself and never branches on plaintext content; all
//! ciphertext arithmetic goes through the injected [`capability::CiphertextOps`] seam.

pub mod aggregate;
pub mod bfv;
pub mod capability;
pub mod constants;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod oracle;
pub mod store;
pub mod testing;
pub mod types;
