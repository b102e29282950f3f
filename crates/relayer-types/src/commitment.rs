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

use serde::{Deserialize, Serialize};

/// The prefix of the off-chain storage key holding the messages of a commitment.
pub const OFFCHAIN_KEY_PREFIX: &[u8] = b"commitment";

/// Relay status of a [`Commitment`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
pub enum CommitmentStatus {
    /// Discovered, not yet relayed.
    #[display(fmt = "received")]
    Received,
    /// Accepted by the target chain.
    #[display(fmt = "relayed")]
    Relayed,
    /// Rejected by the target chain, never retried automatically.
    #[display(fmt = "failed")]
    Failed,
}

/// A source chain block that carries a digest of an off-chain message batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commitment {
    pub height: u64,
    /// The digest found in the block header.
    pub commitment_ref: Vec<u8>,
    pub status: CommitmentStatus,
    /// Target chain transaction that resolved this commitment.
    pub tx_id: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Commitment {
    /// A freshly discovered commitment.
    pub fn new(height: u64, commitment_ref: Vec<u8>, now: u64) -> Self {
        Self {
            height,
            commitment_ref,
            status: CommitmentStatus::Received,
            tx_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The key of the message batch in the source chain off-chain storage.
    pub fn offchain_key(&self) -> Vec<u8> {
        let mut key = OFFCHAIN_KEY_PREFIX.to_vec();
        key.extend_from_slice(&self.commitment_ref);
        key
    }

    /// Relayed and Failed are terminal.
    pub fn is_resolved(&self) -> bool {
        self.status != CommitmentStatus::Received
    }
}

impl std::fmt::Display for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} (0x{})", self.height, hex::encode(&self.commitment_ref))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offchain_key_is_prefixed_digest() {
        let c = Commitment::new(7, vec![0xab, 0xcd], 1);
        assert_eq!(c.offchain_key(), b"commitment\xab\xcd".to_vec());
        assert!(!c.is_resolved());
        assert_eq!(c.to_string(), "#7 (0xabcd)");
    }
}
