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

/// Inclusion proof of one authority address in the authority set Merkle tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorMerkleProof {
    /// Sibling hashes from the leaf up to the root.
    pub proof: Vec<[u8; 32]>,
    pub number_of_leaves: u32,
    pub leaf_index: u32,
    /// The 20 bytes authority address (not its hash).
    pub leaf: Vec<u8>,
}

/// The arguments of a light client state update on the target chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightClientState {
    /// SCALE encoded signed commitment, as received from the finality stream.
    pub signed_commitment: Vec<u8>,
    pub validator_proofs: Vec<ValidatorMerkleProof>,
    pub mmr_leaf: Vec<u8>,
    pub mmr_proof: Vec<u8>,
}

/// A light client state whose finality proof is known to be valid for `block_number`.
///
/// Message batches at heights strictly below `block_number` can be proven against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedLightClientState {
    pub block_number: u64,
    pub state: LightClientState,
}

impl TrustedLightClientState {
    /// Whether a commitment at `height` can be proven against this state.
    pub fn covers(&self, height: u64) -> bool {
        self.block_number > height
    }
}

/// An MMR proof as generated by the source chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MmrLeafProof {
    /// SCALE encoded leaves.
    pub leaves: Vec<u8>,
    /// SCALE encoded proof.
    pub proof: Vec<u8>,
}

/// The arguments of a message batch submission on the target chain.
///
/// In witness mode the header and MMR fields stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageProof {
    pub header: Vec<u8>,
    pub encoded_messages: Vec<u8>,
    pub mmr_leaf: Vec<u8>,
    pub mmr_proof: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light_client_state: Option<LightClientState>,
    /// Signature of a co-signing verification proxy, if one is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_proxy_signature: Option<Vec<u8>>,
}

impl MessageProof {
    /// A proof-less bundle, only accepted by a target chain in witness mode.
    pub fn witness(encoded_messages: Vec<u8>) -> Self {
        Self {
            encoded_messages,
            ..Default::default()
        }
    }

    pub fn is_witness(&self) -> bool {
        self.header.is_empty()
            && self.mmr_leaf.is_empty()
            && self.mmr_proof.is_empty()
            && self.light_client_state.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn witness_bundle_serializes_empty_proof_fields() {
        let proof = MessageProof::witness(vec![1, 2]);
        assert!(proof.is_witness());
        let v = serde_json::to_value(&proof).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "header": [],
                "encoded_messages": [1, 2],
                "mmr_leaf": [],
                "mmr_proof": [],
            })
        );
    }

    #[test]
    fn trusted_state_covers_strictly_lower_heights() {
        let state = TrustedLightClientState {
            block_number: 150,
            state: LightClientState {
                signed_commitment: vec![],
                validator_proofs: vec![],
                mmr_leaf: vec![],
                mmr_proof: vec![],
            },
        };
        assert!(state.covers(100));
        assert!(!state.covers(150));
    }
}
