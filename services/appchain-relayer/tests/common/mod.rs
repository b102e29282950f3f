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

//! Shared fixtures of the relay pipeline tests.
#![allow(dead_code)]

use std::sync::Arc;

use codec::Encode;

use appchain_chain_clients::mocked::{MockedSourceChain, MockedTargetChain};
use appchain_proof_generation::codec::BeefyCommitment;
use appchain_relayer::service::Pipeline;
use appchain_relayer_config::{
    AppchainRelayerConfig, RelayConfig, SourceConfig, TargetConfig,
};
use appchain_relayer_context::RelayerContext;
use appchain_relayer_store::{CommitmentStore, InMemoryStore};
use appchain_relayer_types::private_key::PrivateKey;
use appchain_relayer_types::{
    AuthorityKey, Commitment, LightClientState, Message, PayloadType,
    TrustedLightClientState,
};

pub const RELAY_METHOD: &str = "verify_and_apply_appchain_messages";
pub const UPDATE_METHOD: &str = "start_updating_state_of_beefy_light_client";
pub const COMPLETE_UPDATE_METHOD: &str =
    "try_complete_updating_state_of_beefy_light_client";

/// Compressed secp256k1 keys of `G`, `2G` and `3G`.
pub fn authorities() -> Vec<AuthorityKey> {
    [
        "0279BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798",
        "02C6047F9441ED7D6D3045406E95C07CD85C778E4B8CEF3CA7ABAC09B95C709EE5",
        "02F9308A019258C31049344F85F89D5229B531C845836F99B08601F113BCE036F9",
    ]
    .iter()
    .map(|k| {
        hex::decode(k)
            .unwrap()
            .try_into()
            .expect("33 bytes compressed key")
    })
    .collect()
}

pub fn config(relay: RelayConfig) -> AppchainRelayerConfig {
    AppchainRelayerConfig {
        port: 9955,
        source: SourceConfig {
            ws_endpoint: "ws://127.0.0.1:9944".parse().unwrap(),
            start_block_height: 1,
        },
        target: TargetConfig {
            rpc_endpoint: "http://127.0.0.1:3030".parse().unwrap(),
            signer_account_id: String::from("relayer.testnet"),
            anchor_contract_id: String::from("anchor.testnet"),
            private_key: Some(PrivateKey::parse(&format!("0x{}", "01".repeat(32))).unwrap()),
            gas: 300_000_000_000_000,
        },
        relay,
    }
}

/// A commitment header digest item.
pub fn commitment_log(digest: &[u8]) -> Vec<u8> {
    let mut raw = vec![0u8];
    digest.to_vec().encode_to(&mut raw);
    raw
}

/// A BEEFY authorities change header digest item.
pub fn authorities_change_log() -> Vec<u8> {
    let mut raw = vec![4u8];
    b"BEEF".encode_to(&mut raw);
    vec![1u8, 0].encode_to(&mut raw);
    raw
}

pub fn signed_commitment(block_number: u32) -> Vec<u8> {
    BeefyCommitment {
        payload: vec![(*b"mh", vec![0; 32])],
        block_number,
        validator_set_id: 0,
    }
    .encode()
}

pub fn messages(types: &[PayloadType]) -> Vec<u8> {
    types
        .iter()
        .enumerate()
        .map(|(i, payload_type)| Message {
            nonce: i as u64 + 1,
            payload_type: *payload_type,
            payload: vec![i as u8],
        })
        .collect::<Vec<_>>()
        .encode()
}

pub fn trusted_state(block_number: u64) -> TrustedLightClientState {
    TrustedLightClientState {
        block_number,
        state: LightClientState {
            signed_commitment: signed_commitment(block_number as u32),
            validator_proofs: vec![],
            mmr_leaf: vec![1],
            mmr_proof: vec![2],
        },
    }
}

/// The relay pipeline over mocked chains and an in-memory store.
pub struct Harness {
    pub ctx: RelayerContext,
    pub store: Arc<InMemoryStore>,
    pub source: Arc<MockedSourceChain>,
    pub target: Arc<MockedTargetChain>,
    pub pipeline: Pipeline<InMemoryStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_relay_config(RelayConfig {
            update_state_min_interval_ms: 0,
            confirm_retry_interval_ms: 1,
            max_confirm_attempts: 3,
            ..RelayConfig::default()
        })
    }

    pub fn with_relay_config(relay: RelayConfig) -> Self {
        let ctx = RelayerContext::new(config(relay)).unwrap();
        let store = Arc::new(InMemoryStore::default());
        let source = Arc::new(MockedSourceChain::default());
        let target = Arc::new(MockedTargetChain::default());
        let pipeline =
            Pipeline::new(&ctx, store.clone(), source.clone(), target.clone());
        Self {
            ctx,
            store,
            source,
            target,
            pipeline,
        }
    }

    /// Records a commitment at `height` whose messages are in the off-chain storage, as
    /// the scanner would.
    pub fn commitment(&self, height: u64, digest: &[u8], types: &[PayloadType]) -> Commitment {
        let commitment = Commitment::new(height, digest.to_vec(), 0);
        self.store.insert_commitment(&commitment).unwrap();
        self.pipeline.tracker.advance(height).unwrap();
        self.source
            .insert_block(height, vec![commitment_log(digest)]);
        self.source
            .insert_offchain(commitment.offchain_key(), messages(types));
        commitment
    }

    /// Makes `height` finalized for the relay loop.
    pub fn finalize(&self, height: u64) {
        self.source.set_finalized(height);
        self.pipeline.tracker.observe_finalized(height);
    }

    pub fn trust(&self, block_number: u64) {
        self.ctx
            .relay_state()
            .cache_trusted_state(trusted_state(block_number));
    }

    pub fn commitment_row(&self, commitment: &Commitment) -> Commitment {
        self.store
            .get_commitment(commitment.height, &commitment.commitment_ref)
            .unwrap()
            .unwrap()
    }
}
