// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::Path;

use appchain_relayer_types::{
    Action, ActionType, Commitment, CommitmentStatus, CursorKind, Session,
    SessionStatus,
};
use appchain_relayer_utils::Error;

use super::{
    commitment_key, ActionStore, CommitmentStore, HistoryStore, SessionStore,
};

const CURSORS: &str = "cursors";
const COMMITMENTS: &str = "commitments";
const ACTIONS: &str = "actions";
const SESSIONS: &str = "sessions";

/// SledStore is a store that keeps the relayer state in a [Sled](https://sled.rs)-based database.
///
/// Every mutation is flushed before returning, so a write either lands before the next read
/// or not at all.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish()
    }
}

impl SledStore {
    /// Opens (or creates) a SledStore at `path` that outlives the process.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        Self::with_config(path, false)
    }
    /// Creates a temporary SledStore, removed once the last handle drops.
    pub fn temporary() -> crate::Result<Self> {
        let dir = tempfile::tempdir()?;
        Self::with_config(dir.path(), true)
    }

    fn with_config<P: AsRef<Path>>(
        path: P,
        temporary: bool,
    ) -> crate::Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .temporary(temporary)
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Ok(Self { db })
    }

    /// Gets the total amount of data stored on disk
    pub fn get_data_stored_size(&self) -> u64 {
        self.db.size_on_disk().unwrap_or_default()
    }

    fn read_u64(bytes: &[u8]) -> crate::Result<u64> {
        let output: [u8; 8] = bytes
            .try_into()
            .map_err(|_| Error::Generic("corrupted cursor value"))?;
        Ok(u64::from_be_bytes(output))
    }
}

impl HistoryStore for SledStore {
    #[tracing::instrument(skip(self))]
    fn set_cursor(
        &self,
        kind: CursorKind,
        height: u64,
    ) -> crate::Result<Option<u64>> {
        let tree = self.db.open_tree(CURSORS)?;
        let old = tree.insert(kind.as_key(), &height.to_be_bytes())?;
        tree.flush()?;
        old.map(|v| Self::read_u64(&v)).transpose()
    }

    #[tracing::instrument(skip(self))]
    fn get_cursor(&self, kind: CursorKind) -> crate::Result<Option<u64>> {
        let tree = self.db.open_tree(CURSORS)?;
        tree.get(kind.as_key())?
            .map(|v| Self::read_u64(&v))
            .transpose()
    }
}

impl CommitmentStore for SledStore {
    #[tracing::instrument(skip_all, fields(commitment = %commitment))]
    fn insert_commitment(&self, commitment: &Commitment) -> crate::Result<bool> {
        let tree = self.db.open_tree(COMMITMENTS)?;
        let key = commitment_key(commitment.height, &commitment.commitment_ref);
        let value = serde_json::to_vec(commitment)?;
        let inserted = tree
            .compare_and_swap(key, None as Option<&[u8]>, Some(value))?
            .is_ok();
        if inserted {
            tree.flush()?;
        }
        Ok(inserted)
    }

    #[tracing::instrument(skip(self))]
    fn get_commitment(
        &self,
        height: u64,
        commitment_ref: &[u8],
    ) -> crate::Result<Option<Commitment>> {
        let tree = self.db.open_tree(COMMITMENTS)?;
        match tree.get(commitment_key(height, commitment_ref))? {
            Some(v) => Ok(Some(serde_json::from_slice(&v)?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    fn unresolved_commitments(
        &self,
        from_height: u64,
        max_height: u64,
    ) -> crate::Result<Vec<Commitment>> {
        if from_height > max_height {
            return Ok(vec![]);
        }
        let tree = self.db.open_tree(COMMITMENTS)?;
        let start = from_height.to_be_bytes();
        let iter = match max_height.checked_add(1) {
            Some(end) => tree.range(start..end.to_be_bytes()),
            None => tree.range(start..),
        };
        let mut commitments = vec![];
        for entry in iter {
            let (_, v) = entry?;
            let commitment: Commitment = serde_json::from_slice(&v)?;
            if !commitment.is_resolved() {
                commitments.push(commitment);
            }
        }
        Ok(commitments)
    }

    #[tracing::instrument(skip(self))]
    fn mark_commitment(
        &self,
        height: u64,
        commitment_ref: &[u8],
        status: CommitmentStatus,
        tx_id: Option<String>,
        now: u64,
    ) -> crate::Result<Commitment> {
        let tree = self.db.open_tree(COMMITMENTS)?;
        let key = commitment_key(height, commitment_ref);
        let mut commitment: Commitment = match tree.get(&key)? {
            Some(v) => serde_json::from_slice(&v)?,
            None => return Err(Error::Generic("commitment not found")),
        };
        commitment.status = status;
        commitment.tx_id = tx_id;
        commitment.updated_at = now;
        tree.insert(key, serde_json::to_vec(&commitment)?)?;
        tree.flush()?;
        Ok(commitment)
    }
}

impl ActionStore for SledStore {
    #[tracing::instrument(skip(self))]
    fn get_action(
        &self,
        action_type: ActionType,
    ) -> crate::Result<Option<Action>> {
        let tree = self.db.open_tree(ACTIONS)?;
        match tree.get(action_type.as_key())? {
            Some(v) => Ok(Some(serde_json::from_slice(&v)?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    fn put_action(&self, action: &Action) -> crate::Result<()> {
        let tree = self.db.open_tree(ACTIONS)?;
        tree.insert(action.action_type.as_key(), serde_json::to_vec(action)?)?;
        tree.flush()?;
        Ok(())
    }
}

impl SessionStore for SledStore {
    #[tracing::instrument(skip(self))]
    fn store_session(&self, height: u64) -> crate::Result<bool> {
        let tree = self.db.open_tree(SESSIONS)?;
        let value = serde_json::to_vec(&Session::new(height))?;
        let inserted = tree
            .compare_and_swap(
                height.to_be_bytes(),
                None as Option<&[u8]>,
                Some(value),
            )?
            .is_ok();
        if inserted {
            tree.flush()?;
        }
        Ok(inserted)
    }

    #[tracing::instrument(skip(self))]
    fn first_pending_session(
        &self,
        height: u64,
    ) -> crate::Result<Option<Session>> {
        let tree = self.db.open_tree(SESSIONS)?;
        for entry in tree.range(..=height.to_be_bytes()) {
            let (_, v) = entry?;
            let session: Session = serde_json::from_slice(&v)?;
            if session.status == SessionStatus::Pending {
                return Ok(Some(session));
            }
        }
        Ok(None)
    }

    #[tracing::instrument(skip(self))]
    fn cover_sessions(&self, height: u64) -> crate::Result<usize> {
        let tree = self.db.open_tree(SESSIONS)?;
        let mut changed = 0;
        for entry in tree.range(..=height.to_be_bytes()) {
            let (k, v) = entry?;
            let mut session: Session = serde_json::from_slice(&v)?;
            if session.status == SessionStatus::Pending {
                session.status = SessionStatus::Covered;
                session.failed_at = None;
                tree.insert(k, serde_json::to_vec(&session)?)?;
                changed += 1;
            }
        }
        if changed > 0 {
            tree.flush()?;
        }
        Ok(changed)
    }

    #[tracing::instrument(skip(self))]
    fn fail_session(&self, height: u64, now: u64) -> crate::Result<()> {
        let tree = self.db.open_tree(SESSIONS)?;
        let key = height.to_be_bytes();
        if let Some(v) = tree.get(key)? {
            let mut session: Session = serde_json::from_slice(&v)?;
            session.failed_at = Some(now);
            tree.insert(key, serde_json::to_vec(&session)?)?;
            tree.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_should_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let store = SledStore::open(tmp.path()).unwrap();
            assert_eq!(store.get_cursor(CursorKind::Scan).unwrap(), None);
            assert_eq!(store.set_cursor(CursorKind::Scan, 20).unwrap(), None);
            assert_eq!(
                store.set_cursor(CursorKind::Scan, 40).unwrap(),
                Some(20)
            );
            assert_eq!(store.get_cursor(CursorKind::Relay).unwrap(), None);
        }
        let store = SledStore::open(tmp.path()).unwrap();
        assert_eq!(store.get_cursor(CursorKind::Scan).unwrap(), Some(40));
        assert_eq!(store.get_cursor(CursorKind::Relay).unwrap(), None);
    }

    #[test]
    fn commitments_should_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let store = SledStore::open(tmp.path()).unwrap();
            let c = Commitment::new(100, vec![7], 1);
            assert!(store.insert_commitment(&c).unwrap());
        }
        let store = SledStore::open(tmp.path()).unwrap();
        assert!(!store
            .insert_commitment(&Commitment::new(100, vec![7], 2))
            .unwrap());
    }

    #[test]
    fn inserting_the_same_commitment_twice_keeps_one_row() {
        let store = SledStore::temporary().unwrap();
        let c = Commitment::new(100, vec![1, 2, 3], 1);
        assert!(store.insert_commitment(&c).unwrap());
        store
            .mark_commitment(
                100,
                &[1, 2, 3],
                CommitmentStatus::Relayed,
                Some("abc".into()),
                2,
            )
            .unwrap();
        // a re-scan must not reset the status.
        assert!(!store.insert_commitment(&c).unwrap());
        let stored = store.get_commitment(100, &[1, 2, 3]).unwrap().unwrap();
        assert_eq!(stored.status, CommitmentStatus::Relayed);
        assert_eq!(stored.tx_id.as_deref(), Some("abc"));
    }

    #[test]
    fn unresolved_commitments_are_height_ordered_and_bounded() {
        let store = SledStore::temporary().unwrap();
        for h in [300u64, 5, 256, 100, 101] {
            store
                .insert_commitment(&Commitment::new(h, vec![0xff], 0))
                .unwrap();
        }
        store
            .mark_commitment(101, &[0xff], CommitmentStatus::Failed, None, 1)
            .unwrap();
        let heights = store
            .unresolved_commitments(0, 256)
            .unwrap()
            .into_iter()
            .map(|c| c.height)
            .collect::<Vec<_>>();
        assert_eq!(heights, vec![5, 100, 256]);
        assert_eq!(
            store.unresolved_commitments(0, u64::MAX).unwrap().len(),
            4
        );
        let heights = store
            .unresolved_commitments(100, u64::MAX)
            .unwrap()
            .into_iter()
            .map(|c| c.height)
            .collect::<Vec<_>>();
        assert_eq!(heights, vec![100, 256, 300]);
        assert!(store.unresolved_commitments(301, u64::MAX).unwrap().is_empty());
        assert!(store.unresolved_commitments(200, 100).unwrap().is_empty());
    }

    #[test]
    fn marking_an_unknown_commitment_fails() {
        let store = SledStore::temporary().unwrap();
        let res = store.mark_commitment(
            1,
            &[0],
            CommitmentStatus::Relayed,
            None,
            0,
        );
        assert!(res.is_err());
    }

    #[test]
    fn actions_follow_pending_failed_completed() {
        let store = SledStore::temporary().unwrap();
        assert!(store.pending_actions().unwrap().is_empty());
        store.upsert_pending_action(ActionType::PlanNewEra, 1).unwrap();
        let failed = store
            .fail_action(ActionType::PlanNewEra, Some("tx".into()), 5)
            .unwrap();
        assert_eq!(failed.failed_at, Some(5));
        // upserting again keeps the failure so the cool-down still applies.
        let again =
            store.upsert_pending_action(ActionType::PlanNewEra, 6).unwrap();
        assert_eq!(again.failed_at, Some(5));
        assert_eq!(store.pending_actions().unwrap().len(), 1);
        store.complete_action(ActionType::PlanNewEra, 7).unwrap();
        assert!(store.pending_actions().unwrap().is_empty());
        let done = store.get_action(ActionType::PlanNewEra).unwrap().unwrap();
        assert_eq!(done.failed_at, None);
    }

    #[test]
    fn sessions_are_covered_up_to_a_height() {
        let store = SledStore::temporary().unwrap();
        assert!(store.store_session(10).unwrap());
        assert!(!store.store_session(10).unwrap());
        store.store_session(20).unwrap();
        store.store_session(30).unwrap();
        assert_eq!(store.first_pending_session(5).unwrap(), None);
        assert_eq!(
            store.first_pending_session(25).unwrap().map(|s| s.height),
            Some(10)
        );
        assert_eq!(store.cover_sessions(20).unwrap(), 2);
        assert_eq!(store.first_pending_session(25).unwrap(), None);
        store.fail_session(30, 99).unwrap();
        let s = store.first_pending_session(30).unwrap().unwrap();
        assert_eq!((s.height, s.failed_at), (30, Some(99)));
    }
}
