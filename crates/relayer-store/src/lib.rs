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

//! # Relayer Store Module 🕸️
//!
//! A module for managing the storage of the relayer.
//!
//! ## Overview
//!
//! The relayer store keeps the commitments discovered on the source chain with their relay
//! status, the administrative actions pending on the target chain, the authority set change
//! markers and the processing cursors. Everything here must survive a restart.
//!
use std::fmt::Debug;

use appchain_relayer_types::{
    Action, ActionType, Commitment, CommitmentStatus, CursorKind, Session,
};
use appchain_relayer_utils::Result;

/// A module for managing in-memory storage of the relayer.
pub mod mem;
/// A module for setting up and managing a [Sled](https://sled.rs)-based database.
#[cfg(feature = "sled")]
pub mod sled;

/// A store that uses [`sled`](https://sled.rs) as the backend.
#[cfg(feature = "sled")]
pub use self::sled::SledStore;
/// A store that uses in memory data structures as the backend.
pub use mem::InMemoryStore;

/// HistoryStore is a simple trait for storing and retrieving the processing cursors.
pub trait HistoryStore: Clone + Send + Sync {
    /// Sets the cursor and returns the old value, if any.
    fn set_cursor(&self, kind: CursorKind, height: u64) -> Result<Option<u64>>;
    /// Last height fully processed for `kind`.
    fn get_cursor(&self, kind: CursorKind) -> Result<Option<u64>>;
}

/// Storage of [`Commitment`]s, keyed by `(height, commitment_ref)`.
pub trait CommitmentStore: HistoryStore {
    /// Inserts the commitment unless one with the same key exists.
    ///
    /// Returns `true` if it was inserted, an existing row is never overwritten.
    fn insert_commitment(&self, commitment: &Commitment) -> Result<bool>;

    fn get_commitment(
        &self,
        height: u64,
        commitment_ref: &[u8],
    ) -> Result<Option<Commitment>>;

    /// Commitments still [`CommitmentStatus::Received`] with a height in
    /// `from_height..=max_height`, in ascending height order.
    fn unresolved_commitments(
        &self,
        from_height: u64,
        max_height: u64,
    ) -> Result<Vec<Commitment>>;

    /// Sets the status of a known commitment and returns the updated row.
    fn mark_commitment(
        &self,
        height: u64,
        commitment_ref: &[u8],
        status: CommitmentStatus,
        tx_id: Option<String>,
        now: u64,
    ) -> Result<Commitment>;
}

/// Storage of [`Action`]s, one record per [`ActionType`].
pub trait ActionStore: Clone + Send + Sync {
    fn get_action(&self, action_type: ActionType) -> Result<Option<Action>>;

    /// Inserts or replaces the record of `action.action_type`.
    fn put_action(&self, action: &Action) -> Result<()>;

    /// All actions that are not completed yet.
    fn pending_actions(&self) -> Result<Vec<Action>> {
        let mut pending = vec![];
        for ty in ActionType::ALL {
            if let Some(action) = self.get_action(ty)? {
                if action.is_pending() {
                    pending.push(action);
                }
            }
        }
        Ok(pending)
    }

    /// Marks the action as pending, keeping the failure record of an already pending one.
    fn upsert_pending_action(
        &self,
        action_type: ActionType,
        now: u64,
    ) -> Result<Action> {
        let action = match self.get_action(action_type)? {
            Some(action) if action.is_pending() => action,
            _ => Action::pending(action_type, now),
        };
        self.put_action(&action)?;
        Ok(action)
    }

    /// Marks the action as completed and clears its failure record.
    fn complete_action(
        &self,
        action_type: ActionType,
        now: u64,
    ) -> Result<Action> {
        let action = Action {
            action_type,
            status: appchain_relayer_types::ActionStatus::Completed,
            failed_at: None,
            tx_id: None,
            updated_at: now,
        };
        self.put_action(&action)?;
        Ok(action)
    }

    /// Records a failed attempt, which restarts the cool-down of the action.
    fn fail_action(
        &self,
        action_type: ActionType,
        tx_id: Option<String>,
        now: u64,
    ) -> Result<Action> {
        let mut action = Action::pending(action_type, now);
        action.failed_at = Some(now);
        action.tx_id = tx_id;
        self.put_action(&action)?;
        Ok(action)
    }
}

/// Storage of authority set change markers.
pub trait SessionStore: Clone + Send + Sync {
    /// Records a session boundary at `height`, returns `false` if already known.
    fn store_session(&self, height: u64) -> Result<bool>;

    /// The lowest session at or below `height` that is not covered yet.
    fn first_pending_session(&self, height: u64) -> Result<Option<Session>>;

    /// Marks every session at or below `height` as covered, returns how many changed.
    fn cover_sessions(&self, height: u64) -> Result<usize>;

    /// Records that a light client update covering the session at `height` failed.
    fn fail_session(&self, height: u64, now: u64) -> Result<()>;
}

/// Everything the relay pipeline persists.
pub trait RelayerStore:
    CommitmentStore + ActionStore + SessionStore + Debug + 'static
{
}

impl<T> RelayerStore for T where
    T: CommitmentStore + ActionStore + SessionStore + Debug + 'static
{
}

/// Commitment keys sort by height first.
pub(crate) fn commitment_key(height: u64, commitment_ref: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + commitment_ref.len());
    key.extend_from_slice(&height.to_be_bytes());
    key.extend_from_slice(commitment_ref);
    key
}
