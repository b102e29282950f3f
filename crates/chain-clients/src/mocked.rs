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

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;

use appchain_relayer_types::{AuthorityKey, MmrLeafProof, SourceBlock};
use appchain_relayer_utils::{Error, Result};

use appchain_proof_generation::codec::encode_header;

use crate::{CallOutcome, ResultStream, SourceChainClient, TargetChainClient};

#[derive(Default)]
struct SourceState {
    finalized: u64,
    blocks: BTreeMap<u64, SourceBlock>,
    broken_blocks: HashSet<u64>,
    offchain: HashMap<Vec<u8>, Vec<u8>>,
    authorities: BTreeMap<u64, Vec<AuthorityKey>>,
    signed_commitments: Vec<Vec<u8>>,
    mmr_requests: Vec<(Vec<u64>, u64)>,
    unreachable: bool,
}

fn block_hash(height: u64) -> [u8; 32] {
    let mut hash = [0u8; 32];
    hash[..8].copy_from_slice(&height.to_be_bytes());
    hash
}

/// A source chain held in memory.
#[derive(Default)]
pub struct MockedSourceChain {
    state: Mutex<SourceState>,
}

impl MockedSourceChain {
    /// Sets the latest finalized height.
    pub fn set_finalized(&self, height: u64) {
        self.state.lock().finalized = height;
    }

    /// Adds a block with the given SCALE encoded digest items.
    pub fn insert_block(&self, height: u64, digest_logs: Vec<Vec<u8>>) {
        let hash = block_hash(height);
        let encoded_header = encode_header(
            &block_hash(height.saturating_sub(1)),
            height as u32,
            &[0u8; 32],
            &[0u8; 32],
            &digest_logs,
        );
        self.state.lock().blocks.insert(
            height,
            SourceBlock {
                height,
                hash,
                encoded_header,
                digest_logs,
            },
        );
    }

    /// Makes fetching the block at `height` fail with a transport error.
    pub fn break_block(&self, height: u64) {
        self.state.lock().broken_blocks.insert(height);
    }

    /// Undoes [`MockedSourceChain::break_block`].
    pub fn repair_block(&self, height: u64) {
        self.state.lock().broken_blocks.remove(&height);
    }

    /// Stores an off-chain value.
    pub fn insert_offchain(&self, key: Vec<u8>, value: Vec<u8>) {
        self.state.lock().offchain.insert(key, value);
    }

    /// Sets the authority set active from `height` on.
    pub fn set_authorities(&self, height: u64, keys: Vec<AuthorityKey>) {
        self.state.lock().authorities.insert(height, keys);
    }

    /// Queues a signed commitment for the finality stream.
    pub fn push_signed_commitment(&self, encoded: Vec<u8>) {
        self.state.lock().signed_commitments.push(encoded);
    }

    /// Every MMR proof request seen so far, as `(block numbers, best known)`.
    pub fn mmr_requests(&self) -> Vec<(Vec<u64>, u64)> {
        self.state.lock().mmr_requests.clone()
    }

    /// Makes every request fail.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    fn check_reachable(&self) -> Result<()> {
        if self.state.lock().unreachable {
            return Err(Error::Generic("source chain unreachable"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SourceChainClient for MockedSourceChain {
    async fn finalized_height(&self) -> Result<u64> {
        self.check_reachable()?;
        Ok(self.state.lock().finalized)
    }

    async fn subscribe_finalized_heights(&self) -> Result<ResultStream<u64>> {
        let height = self.finalized_height().await?;
        Ok(futures::stream::iter(vec![Ok(height)])
            .chain(futures::stream::pending())
            .boxed())
    }

    async fn block(&self, height: u64) -> Result<Option<SourceBlock>> {
        self.check_reachable()?;
        let state = self.state.lock();
        if state.broken_blocks.contains(&height) {
            return Err(Error::Generic("connection reset"));
        }
        Ok(state.blocks.get(&height).cloned())
    }

    async fn offchain_data(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_reachable()?;
        Ok(self.state.lock().offchain.get(key).cloned())
    }

    async fn generate_batch_mmr_proof(
        &self,
        block_numbers: &[u64],
        best_known: u64,
    ) -> Result<MmrLeafProof> {
        self.check_reachable()?;
        self.state
            .lock()
            .mmr_requests
            .push((block_numbers.to_vec(), best_known));
        Ok(MmrLeafProof {
            leaves: block_numbers.iter().flat_map(|n| n.to_le_bytes()).collect(),
            proof: vec![0xaa; 4],
        })
    }

    async fn authorities(&self, height: u64) -> Result<Vec<AuthorityKey>> {
        self.check_reachable()?;
        self.state
            .lock()
            .authorities
            .range(..=height)
            .next_back()
            .map(|(_, keys)| keys.clone())
            .ok_or(Error::Generic("beefy is not running at this block"))
    }

    async fn subscribe_signed_commitments(
        &self,
    ) -> Result<ResultStream<Vec<u8>>> {
        self.check_reachable()?;
        let queued = std::mem::take(&mut self.state.lock().signed_commitments);
        Ok(futures::stream::iter(queued.into_iter().map(Ok))
            .chain(futures::stream::pending())
            .boxed())
    }
}

/// A canned answer of the mocked target chain to a call.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// The call succeeded with a transaction id and a return value.
    Success(String, Option<Value>),
    /// The transaction executed and failed.
    Failure(String),
    /// The transaction failed and the contract left witness mode meanwhile.
    FailureExitingWitnessMode(String),
    /// The request never reached the chain.
    Transport,
}

#[derive(Default)]
struct TargetState {
    calls: Vec<(String, Value)>,
    responses: HashMap<String, VecDeque<MockResponse>>,
    views: HashMap<String, Value>,
    tx_counter: u64,
}

/// A target chain that records calls and answers with queued responses.
///
/// Calls without a queued response succeed with a fresh transaction id and return `"Ok"`.
#[derive(Default)]
pub struct MockedTargetChain {
    state: Mutex<TargetState>,
}

impl MockedTargetChain {
    /// Queues the answer of the next call to `method`.
    pub fn push_response(&self, method: &str, response: MockResponse) {
        self.state
            .lock()
            .responses
            .entry(method.to_owned())
            .or_default()
            .push_back(response);
    }

    /// Sets what the view `method` returns.
    pub fn set_view(&self, method: &str, value: Value) {
        self.state.lock().views.insert(method.to_owned(), value);
    }

    /// Switches the contract in or out of witness mode.
    pub fn set_witness_mode(&self, enabled: bool) {
        self.set_view(
            "get_anchor_settings",
            serde_json::json!({ "beefy_light_client_witness_mode": enabled }),
        );
    }

    /// Sets the height of the latest accepted light client commitment.
    pub fn set_latest_commitment(&self, height: u64) {
        self.set_view(
            "get_latest_commitment_of_appchain",
            serde_json::json!({ "block_number": height }),
        );
    }

    /// Every call seen so far.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.state.lock().calls.clone()
    }

    /// The arguments of every call to `method`.
    pub fn calls_to(&self, method: &str) -> Vec<Value> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, args)| args.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl TargetChainClient for MockedTargetChain {
    async fn call(
        &self,
        method: &str,
        args: Value,
        _gas: u64,
    ) -> Result<CallOutcome> {
        let mut state = self.state.lock();
        state.calls.push((method.to_owned(), args));
        state.tx_counter += 1;
        let tx_counter = state.tx_counter;
        let response = state
            .responses
            .get_mut(method)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                MockResponse::Success(
                    format!("tx-{tx_counter}"),
                    Some(Value::from("Ok")),
                )
            });
        match response {
            MockResponse::Success(tx_id, value) => Ok(CallOutcome { tx_id, value }),
            MockResponse::Failure(tx_id) => Err(Error::TransactionFailed {
                tx_id,
                reason: String::from("mocked failure"),
            }),
            MockResponse::FailureExitingWitnessMode(tx_id) => {
                state.views.insert(
                    String::from("get_anchor_settings"),
                    serde_json::json!({ "beefy_light_client_witness_mode": false }),
                );
                Err(Error::TransactionFailed {
                    tx_id,
                    reason: String::from("mocked failure"),
                })
            }
            MockResponse::Transport => Err(Error::Generic("connection reset")),
        }
    }

    async fn view(&self, method: &str, _args: Value) -> Result<Value> {
        Ok(self
            .state
            .lock()
            .views
            .get(method)
            .cloned()
            .unwrap_or(Value::Null))
    }
}
