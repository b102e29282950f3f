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

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::PayloadType;

/// The kind of an administrative action, one logical record per kind.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
pub enum ActionType {
    /// Completing a beefy light client state update.
    #[display(fmt = "update_state")]
    UpdateState,
    /// Switching the validator set to a new era.
    #[display(fmt = "plan_new_era")]
    PlanNewEra,
    /// Distributing the era rewards.
    #[display(fmt = "era_payout")]
    EraPayout,
    /// Processing the relayed messages queued in the anchor contract.
    #[display(fmt = "process_messages")]
    ProcessMessages,
}

impl ActionType {
    /// All action types, in the order the tracker visits them.
    pub const ALL: [ActionType; 4] = [
        ActionType::UpdateState,
        ActionType::PlanNewEra,
        ActionType::EraPayout,
        ActionType::ProcessMessages,
    ];

    /// The target chain method that drives this action to completion.
    pub fn completion_method(&self) -> &'static str {
        match self {
            Self::UpdateState => {
                "try_complete_updating_state_of_beefy_light_client"
            }
            Self::PlanNewEra => "try_complete_switching_era",
            Self::EraPayout => "try_complete_distributing_reward",
            Self::ProcessMessages => "process_appchain_messages",
        }
    }

    /// The action a relayed message of the given kind leaves behind, if any.
    pub fn implied_by(payload_type: PayloadType) -> Option<Self> {
        match payload_type {
            PayloadType::PlanNewEra => Some(Self::PlanNewEra),
            PayloadType::EraPayout => Some(Self::EraPayout),
            _ => None,
        }
    }

    /// Stable key used by the stores.
    pub fn as_key(&self) -> &'static [u8] {
        match self {
            Self::UpdateState => b"update_state",
            Self::PlanNewEra => b"plan_new_era",
            Self::EraPayout => b"era_payout",
            Self::ProcessMessages => b"process_messages",
        }
    }
}

/// Completion status of an [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    Pending,
    Completed,
}

/// An administrative operation the target chain must complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub action_type: ActionType,
    pub status: ActionStatus,
    /// When the last attempt failed with a transaction outcome (unix millis).
    pub failed_at: Option<u64>,
    /// The transaction of the last failed attempt.
    pub tx_id: Option<String>,
    pub updated_at: u64,
}

impl Action {
    /// A new pending action.
    pub fn pending(action_type: ActionType, now: u64) -> Self {
        Self {
            action_type,
            status: ActionStatus::Pending,
            failed_at: None,
            tx_id: None,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ActionStatus::Pending
    }

    /// Whether the action may be attempted at `now`.
    ///
    /// True if it never failed, is already completed, or the last failure is at least
    /// `min_interval` old.
    pub fn is_healthy_at(&self, now: u64, min_interval: Duration) -> bool {
        match (self.status, self.failed_at) {
            (ActionStatus::Completed, _) | (_, None) => true,
            (ActionStatus::Pending, Some(failed_at)) => {
                now.saturating_sub(failed_at) >= min_interval.as_millis() as u64
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cool_down_after_failure() {
        let min = Duration::from_millis(6_000);
        let mut action = Action::pending(ActionType::PlanNewEra, 0);
        assert!(action.is_healthy_at(0, min));
        action.failed_at = Some(10_000);
        assert!(!action.is_healthy_at(10_000, min));
        assert!(!action.is_healthy_at(15_999, min));
        assert!(action.is_healthy_at(16_000, min));
        action.status = ActionStatus::Completed;
        assert!(action.is_healthy_at(10_001, min));
    }

    #[test]
    fn only_era_messages_imply_actions() {
        assert_eq!(
            ActionType::implied_by(PayloadType::EraPayout),
            Some(ActionType::EraPayout)
        );
        assert_eq!(ActionType::implied_by(PayloadType::Lock), None);
        assert_eq!(ActionType::implied_by(PayloadType::BurnAsset), None);
    }
}
