use crate::db::Db;
use crate::errors::ApiError;
use okr_core::bfv::BfvOracle;
use okr_core::capability::AccessPolicy;
use okr_core::events::{EventSink, LedgerEvent};
use okr_core::ledger::Ledger;
use okr_core::types::{OwnerId, TeamId};
use rand::{RngCore, TryRngCore};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Who fulfills decryption requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OracleMode {
    /// The backend decrypts in-process with its own key. Demo/dev setting.
    Local,
    /// An external key holder POSTs the callback endpoint.
    External,
}

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    /// The ledger owns all protocol state. The mutex is the total-order sequencer:
    /// every core operation runs to completion under it.
    pub ledger: Arc<Mutex<Ledger>>,
    pub oracle: Arc<BfvOracle>,
    pub oracle_mode: OracleMode,
}

/// Authorization rule supplied to the core.
///
/// The HTTP layer already gates mutating routes behind the API key and pins the submit
/// owner to the caller, so this policy admits every authenticated caller. Deployments
/// with per-team rules swap this implementation.
pub struct HostPolicy;

impl AccessPolicy for HostPolicy {
    fn can_submit(&self, _caller: &OwnerId, _team: &TeamId) -> bool {
        true
    }

    fn can_request_decryption(&self, _caller: &OwnerId, _team: &TeamId) -> bool {
        true
    }
}

/// Non-blocking sink handed to the core: events go onto an unbounded channel that the
/// journal-writer task drains into SQLite.
pub struct ChannelSink(pub mpsc::UnboundedSender<LedgerEvent>);

impl EventSink for ChannelSink {
    fn emit(&self, event: LedgerEvent) {
        // A closed channel only happens during shutdown; dropping the event is fine then.
        let _ = self.0.send(event);
    }
}

/// Load the oracle key seed from disk, creating it on first boot.
///
/// The BFV key pair is derived deterministically from this seed, so a restart keeps the
/// same oracle identity and previously published ciphertexts stay decryptable.
pub fn ensure_seed(data_dir: &Path) -> Result<[u8; 32], ApiError> {
    let keys_dir = data_dir.join("keys");
    std::fs::create_dir_all(&keys_dir).map_err(|_| ApiError::Internal)?;

    let seed_path = keys_dir.join("fhe_seed.bin");
    if seed_path.exists() {
        let bytes = std::fs::read(&seed_path).map_err(|_| ApiError::Internal)?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| ApiError::Internal)?;
        return Ok(seed);
    }

    let mut seed = [0u8; 32];
    rand::rngs::OsRng.unwrap_err().fill_bytes(&mut seed);
    std::fs::write(&seed_path, seed).map_err(|_| ApiError::Internal)?;
    Ok(seed)
}
