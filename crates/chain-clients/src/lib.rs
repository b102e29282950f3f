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

#![warn(missing_docs)]
//! # Chain Clients 🕸️
//!
//! The relay pipeline only talks to the chains through two traits:
//!
//! * [`SourceChainClient`]: finalized heads, blocks, off-chain storage, MMR proofs, the BEEFY
//!   authority set and the BEEFY finality stream of the Substrate source chain.
//! * [`TargetChainClient`]: signed function calls and view calls on the target chain, with
//!   the anchor contract methods layered on top by [`AnchorContract`].

use appchain_relayer_types::{
    ActionType, AuthorityKey, LightClientState, MessageProof, MmrLeafProof,
    SourceBlock,
};
use appchain_relayer_utils::Result;

/// In-memory clients for tests.
#[cfg(any(test, feature = "mocked"))]
pub mod mocked;
/// NEAR JSON-RPC target chain client.
pub mod near;
/// Substrate JSON-RPC source chain client.
pub mod substrate;

pub use near::NearClient;
pub use substrate::SubstrateClient;

/// A boxed stream of results, as returned by the subscriptions.
pub type ResultStream<T> = futures::stream::BoxStream<'static, Result<T>>;

/// The gas attached to every anchor contract call (300 Tgas).
pub const DEFAULT_GAS: u64 = 300_000_000_000_000;

/// The source chain, as seen by the relayer.
#[async_trait::async_trait]
pub trait SourceChainClient: Send + Sync {
    /// The number of the latest finalized block.
    async fn finalized_height(&self) -> Result<u64>;

    /// A stream of finalized block numbers, ending when the connection drops.
    async fn subscribe_finalized_heights(&self) -> Result<ResultStream<u64>>;

    /// The block at `height`, `None` if the chain does not know it yet.
    async fn block(&self, height: u64) -> Result<Option<SourceBlock>>;

    /// A value of the persistent off-chain storage.
    async fn offchain_data(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// MMR proof of several blocks against the MMR at `best_known` block.
    async fn generate_batch_mmr_proof(
        &self,
        block_numbers: &[u64],
        best_known: u64,
    ) -> Result<MmrLeafProof>;

    /// MMR proof of a single block against the MMR at `best_known` block.
    async fn generate_mmr_proof(
        &self,
        block_number: u64,
        best_known: u64,
    ) -> Result<MmrLeafProof> {
        self.generate_batch_mmr_proof(&[block_number], best_known)
            .await
    }

    /// The BEEFY authority set active at `height`.
    async fn authorities(&self, height: u64) -> Result<Vec<AuthorityKey>>;

    /// A stream of SCALE encoded BEEFY signed commitments.
    async fn subscribe_signed_commitments(
        &self,
    ) -> Result<ResultStream<Vec<u8>>>;
}

/// The result of a successful target chain call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    /// The transaction id.
    pub tx_id: String,
    /// The JSON value the method returned, if any.
    pub value: Option<serde_json::Value>,
}

/// The target chain, as seen by the relayer.
#[async_trait::async_trait]
pub trait TargetChainClient: Send + Sync {
    /// Calls `method` of the anchor contract in a signed transaction.
    ///
    /// A transaction that executed and failed is reported as
    /// [`appchain_relayer_utils::Error::TransactionFailed`], any other error means the
    /// outcome is unknown.
    async fn call(
        &self,
        method: &str,
        args: serde_json::Value,
        gas: u64,
    ) -> Result<CallOutcome>;

    /// Calls the read-only `method` of the anchor contract.
    async fn view(
        &self,
        method: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value>;

    /// The gas attached to calls.
    fn gas_budget(&self) -> u64 {
        DEFAULT_GAS
    }
}

/// What a multi-step completion call answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The action is complete.
    Done,
    /// More calls are needed (for example `NeedMoreGas`).
    Incomplete(String),
    /// The contract reported an error.
    Error(String),
}

impl Completion {
    fn from_value(value: Option<&serde_json::Value>) -> Self {
        match value {
            Some(serde_json::Value::String(s)) if s == "Ok" => Self::Done,
            Some(serde_json::Value::Object(o)) if o.contains_key("Error") => {
                Self::Error(o["Error"].to_string())
            }
            Some(v) => Self::Incomplete(v.to_string()),
            None => Self::Incomplete(String::from("no return value")),
        }
    }
}

/// The anchor contract methods, available on every [`TargetChainClient`].
#[async_trait::async_trait]
pub trait AnchorContract: TargetChainClient {
    /// Submits a batch of messages with its proof.
    async fn relay_messages(&self, proof: &MessageProof) -> Result<CallOutcome> {
        let args = serde_json::to_value(proof)?;
        self.call("verify_and_apply_appchain_messages", args, self.gas_budget())
            .await
    }

    /// Starts updating the beefy light client state.
    async fn start_updating_state(
        &self,
        state: &LightClientState,
    ) -> Result<CallOutcome> {
        let args = serde_json::to_value(state)?;
        self.call(
            "start_updating_state_of_beefy_light_client",
            args,
            self.gas_budget(),
        )
        .await
    }

    /// Drives a multi-step action one call further.
    async fn try_complete(
        &self,
        action: ActionType,
    ) -> Result<(CallOutcome, Completion)> {
        let outcome = self
            .call(
                action.completion_method(),
                serde_json::json!({}),
                self.gas_budget(),
            )
            .await?;
        let completion = Completion::from_value(outcome.value.as_ref());
        Ok((outcome, completion))
    }

    /// The height of the latest commitment the light client accepted.
    async fn latest_commitment_height(&self) -> Result<Option<u64>> {
        let v = self
            .view("get_latest_commitment_of_appchain", serde_json::json!({}))
            .await?;
        Ok(v.get("block_number").and_then(serde_json::Value::as_u64))
    }

    /// Whether the contract accepts messages without a finality proof.
    async fn is_witness_mode(&self) -> Result<bool> {
        let v = self
            .view("get_anchor_settings", serde_json::json!({}))
            .await?;
        Ok(v.get("beefy_light_client_witness_mode")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false))
    }
}

impl<T: TargetChainClient + ?Sized> AnchorContract for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn completion_values() {
        assert_eq!(Completion::from_value(Some(&json!("Ok"))), Completion::Done);
        assert_eq!(
            Completion::from_value(Some(&json!("NeedMoreGas"))),
            Completion::Incomplete(String::from("\"NeedMoreGas\""))
        );
        assert_eq!(
            Completion::from_value(Some(&json!({ "Error": "boom" }))),
            Completion::Error(String::from("\"boom\""))
        );
        assert!(matches!(
            Completion::from_value(None),
            Completion::Incomplete(_)
        ));
    }
}
