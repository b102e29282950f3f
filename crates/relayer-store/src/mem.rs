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

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use appchain_relayer_types::{
    Action, ActionType, Commitment, CommitmentStatus, CursorKind, Session,
    SessionStatus,
};
use appchain_relayer_utils::Error;

use super::{ActionStore, CommitmentStore, HistoryStore, SessionStore};

type CommitmentKey = (u64, Vec<u8>);

/// InMemoryStore is a store that keeps the relayer state in memory.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    cursors: Arc<RwLock<HashMap<CursorKind, u64>>>,
    commitments: Arc<RwLock<BTreeMap<CommitmentKey, Commitment>>>,
    actions: Arc<RwLock<HashMap<ActionType, Action>>>,
    sessions: Arc<RwLock<BTreeMap<u64, Session>>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish()
    }
}

impl HistoryStore for InMemoryStore {
    #[tracing::instrument(skip(self))]
    fn set_cursor(
        &self,
        kind: CursorKind,
        height: u64,
    ) -> crate::Result<Option<u64>> {
        Ok(self.cursors.write().insert(kind, height))
    }

    #[tracing::instrument(skip(self))]
    fn get_cursor(&self, kind: CursorKind) -> crate::Result<Option<u64>> {
        Ok(self.cursors.read().get(&kind).copied())
    }
}

impl CommitmentStore for InMemoryStore {
    #[tracing::instrument(skip_all, fields(commitment = %commitment))]
    fn insert_commitment(&self, commitment: &Commitment) -> crate::Result<bool> {
        let mut guard = self.commitments.write();
        let key = (commitment.height, commitment.commitment_ref.clone());
        if guard.contains_key(&key) {
            return Ok(false);
        }
        guard.insert(key, commitment.clone());
        Ok(true)
    }

    fn get_commitment(
        &self,
        height: u64,
        commitment_ref: &[u8],
    ) -> crate::Result<Option<Commitment>> {
        let guard = self.commitments.read();
        Ok(guard.get(&(height, commitment_ref.to_vec())).cloned())
    }

    #[tracing::instrument(skip(self))]
    fn unresolved_commitments(
        &self,
        from_height: u64,
        max_height: u64,
    ) -> crate::Result<Vec<Commitment>> {
        let guard = self.commitments.read();
        Ok(guard
            .range((from_height, vec![])..)
            .map(|(_, c)| c)
            .take_while(|c| c.height <= max_height)
            .filter(|c| !c.is_resolved())
            .cloned()
            .collect())
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
        let mut guard = self.commitments.write();
        let commitment = guard
            .get_mut(&(height, commitment_ref.to_vec()))
            .ok_or(Error::Generic("commitment not found"))?;
        commitment.status = status;
        commitment.tx_id = tx_id;
        commitment.updated_at = now;
        Ok(commitment.clone())
    }
}

impl ActionStore for InMemoryStore {
    fn get_action(
        &self,
        action_type: ActionType,
    ) -> crate::Result<Option<Action>> {
        Ok(self.actions.read().get(&action_type).cloned())
    }

    #[tracing::instrument(skip(self))]
    fn put_action(&self, action: &Action) -> crate::Result<()> {
        self.actions
            .write()
            .insert(action.action_type, action.clone());
        Ok(())
    }
}

impl SessionStore for InMemoryStore {
    #[tracing::instrument(skip(self))]
    fn store_session(&self, height: u64) -> crate::Result<bool> {
        let mut guard = self.sessions.write();
        if guard.contains_key(&height) {
            return Ok(false);
        }
        guard.insert(height, Session::new(height));
        Ok(true)
    }

    fn first_pending_session(
        &self,
        height: u64,
    ) -> crate::Result<Option<Session>> {
        let guard = self.sessions.read();
        Ok(guard
            .range(..=height)
            .map(|(_, s)| s)
            .find(|s| s.status == SessionStatus::Pending)
            .cloned())
    }

    #[tracing::instrument(skip(self))]
    fn cover_sessions(&self, height: u64) -> crate::Result<usize> {
        let mut guard = self.sessions.write();
        let mut changed = 0;
        for (_, session) in guard.range_mut(..=height) {
            if session.status == SessionStatus::Pending {
                session.status = SessionStatus::Covered;
                session.failed_at = None;
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn fail_session(&self, height: u64, now: u64) -> crate::Result<()> {
        if let Some(session) = self.sessions.write().get_mut(&height) {
            session.failed_at = Some(now);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_commitments_skip_resolved_rows() {
        let store = InMemoryStore::default();
        for h in [3u64, 1, 2, 4] {
            store
                .insert_commitment(&Commitment::new(h, vec![h as u8], 0))
                .unwrap();
        }
        store
            .mark_commitment(1, &[1], CommitmentStatus::Relayed, None, 1)
            .unwrap();
        let heights = store
            .unresolved_commitments(0, 2)
            .unwrap()
            .into_iter()
            .map(|c| c.height)
            .collect::<Vec<_>>();
        assert_eq!(heights, vec![2]);
        let heights = store
            .unresolved_commitments(3, u64::MAX)
            .unwrap()
            .into_iter()
            .map(|c| c.height)
            .collect::<Vec<_>>();
        assert_eq!(heights, vec![3, 4]);
    }

    #[test]
    fn clones_share_state() {
        let store = InMemoryStore::default();
        let other = store.clone();
        store.set_cursor(CursorKind::Relay, 9).unwrap();
        assert_eq!(other.get_cursor(CursorKind::Relay).unwrap(), Some(9));
    }
}
