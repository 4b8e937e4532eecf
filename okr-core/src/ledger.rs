//! The ledger facade: owns all core state and exposes the public operations.

use crate::aggregate::AggregationEngine;
use crate::capability::{AccessPolicy, CiphertextOps};
use crate::errors::LedgerError;
use crate::events::{EventSink, LedgerEvent};
use crate::oracle::{DecryptionOracleClient, DecryptionRequest, RequestState, Retention};
use crate::store::{EncryptedRecordStore, MembershipMode, MembershipRegistry};
use crate::types::{Ciphertext, EncryptedRecord, OwnerId, RecordId, RequestId, TeamAggregate, TeamId};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// The confidential OKR ledger.
///
/// Owns the record store, membership, aggregates and oracle-request state exclusively;
/// hosts only read through the query operations or observe emitted events. Each operation
/// validates before it mutates, so an error never leaves partial state behind. Calls must
/// be totally ordered by the host (`&mut self`); the ledger does not lock internally.
pub struct Ledger {
    runtime: Arc<dyn CiphertextOps>,
    policy: Arc<dyn AccessPolicy>,
    sink: Arc<dyn EventSink>,
    store: EncryptedRecordStore,
    membership: MembershipRegistry,
    engine: AggregationEngine,
    oracle: DecryptionOracleClient,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").finish_non_exhaustive()
    }
}

impl Ledger {
    pub fn new(
        runtime: Arc<dyn CiphertextOps>,
        policy: Arc<dyn AccessPolicy>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self::with_options(
            runtime,
            policy,
            sink,
            MembershipMode::Ledger,
            Retention::KeepForever,
        )
    }

    pub fn with_options(
        runtime: Arc<dyn CiphertextOps>,
        policy: Arc<dyn AccessPolicy>,
        sink: Arc<dyn EventSink>,
        membership_mode: MembershipMode,
        retention: Retention,
    ) -> Self {
        Self {
            runtime,
            policy,
            sink,
            store: EncryptedRecordStore::new(),
            membership: MembershipRegistry::new(membership_mode),
            engine: AggregationEngine::new(),
            oracle: DecryptionOracleClient::new(retention),
        }
    }

    /// Rebuild a ledger from a journal of previously submitted records, in id order.
    ///
    /// Replay bypasses the policy (the records were authorized when first accepted) and
    /// emits no events (the journal already carries them). Ids must be contiguous from 1.
    pub fn from_records(
        runtime: Arc<dyn CiphertextOps>,
        policy: Arc<dyn AccessPolicy>,
        sink: Arc<dyn EventSink>,
        membership_mode: MembershipMode,
        retention: Retention,
        records: Vec<EncryptedRecord>,
    ) -> Result<Self, LedgerError> {
        let mut ledger = Self::with_options(runtime, policy, sink, membership_mode, retention);
        for record in records {
            let expected = RecordId(ledger.store.len() as u64 + 1);
            if record.id != expected {
                return Err(LedgerError::Replay(format!(
                    "journal out of order: got record {}, expected {expected}",
                    record.id
                )));
            }
            let owner = record.owner.clone();
            let team = record.team.clone();
            ledger.store.append(
                record.owner,
                record.team,
                record.encrypted_objective,
                record.encrypted_key_results,
                record.encrypted_progress,
                record.created_at,
            );
            ledger.membership.append(&team, &owner);
        }
        Ok(ledger)
    }

    /// Store a new encrypted submission and grow the team's membership.
    ///
    /// Ciphertext contents are not validated; the store cannot inspect plaintext.
    pub fn submit(
        &mut self,
        caller: &OwnerId,
        owner: OwnerId,
        team: TeamId,
        encrypted_objective: Ciphertext,
        encrypted_key_results: Ciphertext,
        encrypted_progress: Ciphertext,
    ) -> Result<RecordId, LedgerError> {
        if !self.policy.can_submit(caller, &team) {
            warn!(%caller, %team, "submit denied by policy");
            return Err(LedgerError::Unauthorized {
                caller: caller.clone(),
                team,
                action: "submit",
            });
        }

        let created_at = Utc::now();
        let id = self.store.append(
            owner.clone(),
            team.clone(),
            encrypted_objective,
            encrypted_key_results,
            encrypted_progress,
            created_at,
        );
        self.membership.append(&team, &owner);
        info!(record_id = id.0, %owner, %team, "record submitted");
        self.sink.emit(LedgerEvent::RecordSubmitted {
            id,
            owner,
            timestamp: created_at,
        });
        Ok(id)
    }

    /// Recompute `team`'s homomorphic progress sum from current ledger state.
    pub fn recompute(&mut self, team: &TeamId) -> Result<(), LedgerError> {
        let timestamp =
            self.engine
                .recompute(self.runtime.as_ref(), &self.store, &self.membership, team)?;
        info!(%team, "aggregate recomputed");
        self.sink.emit(LedgerEvent::AggregateComputed {
            team: team.clone(),
            timestamp,
        });
        Ok(())
    }

    /// Issue a decryption request for `team`'s current aggregate.
    ///
    /// Returns immediately with the request the host delivers to the oracle; the cleartext
    /// arrives later through [`on_callback`](Self::on_callback), if at all.
    pub fn request_decryption(
        &mut self,
        caller: &OwnerId,
        team: &TeamId,
    ) -> Result<DecryptionRequest, LedgerError> {
        if !self.policy.can_request_decryption(caller, team) {
            warn!(%caller, %team, "decryption request denied by policy");
            return Err(LedgerError::Unauthorized {
                caller: caller.clone(),
                team: team.clone(),
                action: "request decryption",
            });
        }
        let aggregate = self
            .engine
            .get(team)
            .ok_or_else(|| LedgerError::EmptyAggregate(team.clone()))?;

        let request = self.oracle.issue(self.runtime.as_ref(), aggregate);
        info!(request_id = %request.request_id, %team, "decryption requested");
        self.sink.emit(LedgerEvent::DecryptionRequested {
            request_id: request.request_id,
        });
        Ok(request)
    }

    /// Consume the oracle's callback for an issued request.
    ///
    /// A repeated callback for an already-fulfilled request is a safe no-op: no event is
    /// re-emitted and the stored cleartext does not change.
    pub fn on_callback(
        &mut self,
        request_id: RequestId,
        cleartext: u64,
        proof: &[u8],
    ) -> Result<(), LedgerError> {
        match self
            .oracle
            .apply_callback(self.runtime.as_ref(), request_id, cleartext, proof)?
        {
            Some(team) => {
                info!(%request_id, %team, cleartext, "aggregate decrypted");
                self.sink.emit(LedgerEvent::AggregateDecrypted { team, cleartext });
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn get_record(&self, id: RecordId) -> Result<&EncryptedRecord, LedgerError> {
        self.store
            .get(id)
            .ok_or_else(|| LedgerError::NotFound(format!("record {id}")))
    }

    pub fn get_aggregate(&self, team: &TeamId) -> Result<&TeamAggregate, LedgerError> {
        self.engine
            .get(team)
            .ok_or_else(|| LedgerError::NotFound(format!("aggregate for team {team}")))
    }

    pub fn membership(&self, team: &TeamId) -> &[OwnerId] {
        self.membership.list(team)
    }

    pub fn decryption_state(&self, request_id: RequestId) -> Option<(&TeamId, &RequestState)> {
        self.oracle.state(request_id)
    }

    /// Apply the configured retention policy to fulfilled decryption requests.
    pub fn purge_fulfilled(&mut self) -> usize {
        self.oracle.purge_fulfilled(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{AllowAll, CollectingSink, DenyAll, PlainRuntime};

    fn owner(s: &str) -> OwnerId {
        OwnerId(s.to_string())
    }

    fn team(s: &str) -> TeamId {
        TeamId(s.to_string())
    }

    fn ledger_with_sink() -> (Ledger, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::default());
        let ledger = Ledger::new(Arc::new(PlainRuntime), Arc::new(AllowAll), sink.clone());
        (ledger, sink)
    }

    fn submit(ledger: &mut Ledger, who: &str, which: &str, progress: u64) -> RecordId {
        ledger
            .submit(
                &owner(who),
                owner(who),
                team(which),
                PlainRuntime::encrypt(0),
                PlainRuntime::encrypt(0),
                PlainRuntime::encrypt(progress),
            )
            .unwrap()
    }

    #[test]
    fn end_to_end_submit_recompute_request_callback() {
        let (mut ledger, sink) = ledger_with_sink();
        let t1 = team("t1");

        assert_eq!(submit(&mut ledger, "alice", "t1", 40), RecordId(1));
        assert_eq!(submit(&mut ledger, "bob", "t1", 60), RecordId(2));
        ledger.recompute(&t1).unwrap();

        let request = ledger.request_decryption(&owner("alice"), &t1).unwrap();
        let (cleartext, proof) = PlainRuntime::fulfill(request.request_id, &request.payload).unwrap();
        assert_eq!(cleartext, 100);
        ledger.on_callback(request.request_id, cleartext, &proof).unwrap();

        let kinds: Vec<_> = sink.events().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "record_submitted",
                "record_submitted",
                "aggregate_computed",
                "decryption_requested",
                "aggregate_decrypted",
            ]
        );
        assert!(sink.events().contains(&LedgerEvent::AggregateDecrypted {
            team: t1.clone(),
            cleartext: 100,
        }));
    }

    #[test]
    fn request_before_recompute_is_empty_aggregate() {
        let (mut ledger, _sink) = ledger_with_sink();
        submit(&mut ledger, "alice", "t2", 40);
        let err = ledger
            .request_decryption(&owner("alice"), &team("t2"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::EmptyAggregate(_)));
    }

    #[test]
    fn policy_denial_changes_nothing() {
        let sink = Arc::new(CollectingSink::default());
        let mut ledger = Ledger::new(Arc::new(PlainRuntime), Arc::new(DenyAll), sink.clone());

        let err = ledger
            .submit(
                &owner("alice"),
                owner("alice"),
                team("t1"),
                PlainRuntime::encrypt(0),
                PlainRuntime::encrypt(0),
                PlainRuntime::encrypt(40),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { .. }));
        assert!(ledger.get_record(RecordId(1)).is_err());
        assert!(ledger.membership(&team("t1")).is_empty());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn invalid_proof_emits_nothing_and_allows_retry() {
        let (mut ledger, sink) = ledger_with_sink();
        let t1 = team("t1");
        submit(&mut ledger, "alice", "t1", 40);
        ledger.recompute(&t1).unwrap();
        let request = ledger.request_decryption(&owner("alice"), &t1).unwrap();

        let err = ledger
            .on_callback(request.request_id, 40, b"garbage")
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidProof(_)));
        let events_before = sink.events().len();

        // The request stayed pending, so a correct proof still goes through.
        let (cleartext, proof) = PlainRuntime::fulfill(request.request_id, &request.payload).unwrap();
        ledger.on_callback(request.request_id, cleartext, &proof).unwrap();
        assert_eq!(sink.events().len(), events_before + 1);
    }

    #[test]
    fn duplicate_callback_does_not_reemit() {
        let (mut ledger, sink) = ledger_with_sink();
        let t1 = team("t1");
        submit(&mut ledger, "alice", "t1", 40);
        ledger.recompute(&t1).unwrap();
        let request = ledger.request_decryption(&owner("alice"), &t1).unwrap();
        let (cleartext, proof) = PlainRuntime::fulfill(request.request_id, &request.payload).unwrap();

        ledger.on_callback(request.request_id, cleartext, &proof).unwrap();
        let events_after_first = sink.events().len();
        ledger.on_callback(request.request_id, cleartext, &proof).unwrap();
        assert_eq!(sink.events().len(), events_after_first);
    }

    #[test]
    fn callbacks_for_different_teams_fulfill_in_any_order() {
        let (mut ledger, _sink) = ledger_with_sink();
        submit(&mut ledger, "alice", "t1", 40);
        submit(&mut ledger, "bob", "t2", 25);
        ledger.recompute(&team("t1")).unwrap();
        ledger.recompute(&team("t2")).unwrap();

        let r1 = ledger.request_decryption(&owner("alice"), &team("t1")).unwrap();
        let r2 = ledger.request_decryption(&owner("bob"), &team("t2")).unwrap();

        // Fulfill the second request first; nothing orders oracle completions.
        let (c2, p2) = PlainRuntime::fulfill(r2.request_id, &r2.payload).unwrap();
        ledger.on_callback(r2.request_id, c2, &p2).unwrap();
        let (c1, p1) = PlainRuntime::fulfill(r1.request_id, &r1.payload).unwrap();
        ledger.on_callback(r1.request_id, c1, &p1).unwrap();

        assert!(matches!(
            ledger.decryption_state(r1.request_id),
            Some((_, RequestState::Fulfilled { cleartext: 40, .. }))
        ));
        assert!(matches!(
            ledger.decryption_state(r2.request_id),
            Some((_, RequestState::Fulfilled { cleartext: 25, .. }))
        ));
    }

    #[test]
    fn aggregate_snapshot_survives_later_submissions() {
        // The payload handed to the oracle is the aggregate at issue time; submitting more
        // records before the callback must not invalidate the proof.
        let (mut ledger, _sink) = ledger_with_sink();
        let t1 = team("t1");
        submit(&mut ledger, "alice", "t1", 40);
        ledger.recompute(&t1).unwrap();
        let request = ledger.request_decryption(&owner("alice"), &t1).unwrap();

        submit(&mut ledger, "bob", "t1", 60);
        ledger.recompute(&t1).unwrap();

        let (cleartext, proof) = PlainRuntime::fulfill(request.request_id, &request.payload).unwrap();
        assert_eq!(cleartext, 40);
        ledger.on_callback(request.request_id, cleartext, &proof).unwrap();
    }

    #[test]
    fn replay_rebuilds_records_and_membership() {
        let (mut ledger, _sink) = ledger_with_sink();
        submit(&mut ledger, "alice", "t1", 40);
        submit(&mut ledger, "bob", "t1", 60);
        submit(&mut ledger, "alice", "t1", 70);

        let records: Vec<_> = (1..=3)
            .map(|i| ledger.get_record(RecordId(i)).unwrap().clone())
            .collect();

        let restored = Ledger::from_records(
            Arc::new(PlainRuntime),
            Arc::new(AllowAll),
            Arc::new(crate::events::NullSink),
            MembershipMode::Ledger,
            Retention::KeepForever,
            records,
        )
        .unwrap();

        assert_eq!(
            restored.membership(&team("t1")),
            ledger.membership(&team("t1"))
        );
        for i in 1..=3 {
            let a = ledger.get_record(RecordId(i)).unwrap();
            let b = restored.get_record(RecordId(i)).unwrap();
            assert_eq!(a.id, b.id);
            assert_eq!(a.owner, b.owner);
            assert_eq!(a.created_at, b.created_at);
            assert_eq!(a.encrypted_progress, b.encrypted_progress);
        }
    }

    #[test]
    fn replay_rejects_gaps() {
        let (mut ledger, _sink) = ledger_with_sink();
        submit(&mut ledger, "alice", "t1", 40);
        submit(&mut ledger, "bob", "t1", 60);

        let records = vec![ledger.get_record(RecordId(2)).unwrap().clone()];
        let err = Ledger::from_records(
            Arc::new(PlainRuntime),
            Arc::new(AllowAll),
            Arc::new(crate::events::NullSink),
            MembershipMode::Ledger,
            Retention::KeepForever,
            records,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Replay(_)));
    }
}
