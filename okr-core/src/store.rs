//! Append-only record store and the membership it implies.

use crate::types::{Ciphertext, EncryptedRecord, OwnerId, RecordId, TeamId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Append-only ledger of encrypted submissions, keyed by a strictly increasing id.
///
/// There is no update or delete: a participant revising their OKR submits a new record,
/// and aggregation resolves the latest one per owner.
#[derive(Default)]
pub struct EncryptedRecordStore {
    // records[i].id == i + 1, so lookups are O(1) without a second map.
    records: Vec<EncryptedRecord>,
    // owner -> id of that owner's most recent record, across all teams.
    latest_by_owner: HashMap<OwnerId, RecordId>,
}

impl EncryptedRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new record under the next sequential id (starting at 1).
    ///
    /// Ciphertext contents are not validated here: the store cannot inspect plaintext,
    /// so a malformed blob is only discovered by the capability during aggregation.
    pub fn append(
        &mut self,
        owner: OwnerId,
        team: TeamId,
        encrypted_objective: Ciphertext,
        encrypted_key_results: Ciphertext,
        encrypted_progress: Ciphertext,
        created_at: DateTime<Utc>,
    ) -> RecordId {
        let id = RecordId(self.records.len() as u64 + 1);
        self.latest_by_owner.insert(owner.clone(), id);
        self.records.push(EncryptedRecord {
            id,
            owner,
            team,
            encrypted_objective,
            encrypted_key_results,
            encrypted_progress,
            created_at,
        });
        id
    }

    pub fn get(&self, id: RecordId) -> Option<&EncryptedRecord> {
        if id.0 == 0 {
            return None;
        }
        self.records.get(id.0 as usize - 1)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The owner's most recent record, via the maintained owner -> latest-id index.
    pub fn latest_for_owner(&self, owner: &OwnerId) -> Option<&EncryptedRecord> {
        self.latest_by_owner
            .get(owner)
            .and_then(|id| self.get(*id))
    }

    /// Full-scan variant of [`latest_for_owner`](Self::latest_for_owner): greatest id among
    /// all records owned by `owner`. O(total records) per call, O(members x records) per
    /// aggregation pass. The index above is the drop-in replacement actually used; the two
    /// must agree, which the tests check.
    pub fn latest_for_owner_scan(&self, owner: &OwnerId) -> Option<&EncryptedRecord> {
        self.records.iter().rev().find(|r| &r.owner == owner)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EncryptedRecord> {
        self.records.iter()
    }
}

/// How membership entries accumulate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MembershipMode {
    /// Every submission appends an entry, duplicates included. This mirrors the observed
    /// ledger behavior: an owner submitting twice is counted twice by the aggregation scan.
    #[default]
    Ledger,
    /// Idempotent membership: an owner appears at most once per team, in first-submission
    /// order.
    Unique,
}

/// Per-team ordered list of participant identities, built from submissions.
///
/// Growth is monotonic; nothing is ever removed.
#[derive(Default)]
pub struct MembershipRegistry {
    mode: MembershipMode,
    teams: HashMap<TeamId, Vec<OwnerId>>,
}

impl MembershipRegistry {
    pub fn new(mode: MembershipMode) -> Self {
        Self {
            mode,
            teams: HashMap::new(),
        }
    }

    pub fn append(&mut self, team: &TeamId, owner: &OwnerId) {
        let entries = self.teams.entry(team.clone()).or_default();
        if self.mode == MembershipMode::Unique && entries.contains(owner) {
            return;
        }
        entries.push(owner.clone());
    }

    /// Ordered membership of `team`, possibly with repeats in [`MembershipMode::Ledger`].
    /// Unknown teams have empty membership.
    pub fn list(&self, team: &TeamId) -> &[OwnerId] {
        self.teams.get(team).map(Vec::as_slice).unwrap_or(&[])
    }
}
