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

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use borsh::BorshSerialize;
use ed25519_dalek::Signer;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use appchain_relayer_types::private_key::PrivateKey;
use appchain_relayer_types::rpc_url::RpcUrl;
use appchain_relayer_utils::{Error, Result};

use crate::{CallOutcome, TargetChainClient, DEFAULT_GAS};

const ED25519: u8 = 0;
const FUNCTION_CALL_ACTION: u8 = 2;

struct PublicKey([u8; 32]);

impl BorshSerialize for PublicKey {
    fn serialize<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        ED25519.serialize(writer)?;
        self.0.serialize(writer)
    }
}

struct Signature([u8; 64]);

impl BorshSerialize for Signature {
    fn serialize<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        ED25519.serialize(writer)?;
        self.0.serialize(writer)
    }
}

struct FunctionCall {
    method_name: String,
    args: Vec<u8>,
    gas: u64,
    deposit: u128,
}

impl BorshSerialize for FunctionCall {
    fn serialize<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        FUNCTION_CALL_ACTION.serialize(writer)?;
        self.method_name.serialize(writer)?;
        self.args.serialize(writer)?;
        self.gas.serialize(writer)?;
        self.deposit.serialize(writer)
    }
}

#[derive(BorshSerialize)]
struct Transaction {
    signer_id: String,
    public_key: PublicKey,
    nonce: u64,
    receiver_id: String,
    block_hash: [u8; 32],
    actions: Vec<FunctionCall>,
}

#[derive(BorshSerialize)]
struct SignedTransaction {
    transaction: Transaction,
    signature: Signature,
}

#[derive(Debug, Deserialize)]
struct CallFunctionView {
    result: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct AccessKeyView {
    nonce: u64,
    block_hash: String,
}

#[derive(Debug, Deserialize)]
enum FinalExecutionStatus {
    NotStarted,
    Started,
    Failure(serde_json::Value),
    SuccessValue(String),
}

#[derive(Debug, Deserialize)]
struct OutcomeWithId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FinalExecutionOutcome {
    status: FinalExecutionStatus,
    transaction_outcome: OutcomeWithId,
}

impl FinalExecutionOutcome {
    fn into_call_outcome(self) -> Result<CallOutcome> {
        let tx_id = self.transaction_outcome.id;
        match self.status {
            FinalExecutionStatus::SuccessValue(v) if v.is_empty() => {
                Ok(CallOutcome { tx_id, value: None })
            }
            FinalExecutionStatus::SuccessValue(v) => {
                let bytes = BASE64
                    .decode(v)
                    .map_err(|_| Error::Generic("invalid base64 return value"))?;
                let value = serde_json::from_slice(&bytes).ok();
                Ok(CallOutcome { tx_id, value })
            }
            FinalExecutionStatus::Failure(reason) => Err(Error::TransactionFailed {
                tx_id,
                reason: reason.to_string(),
            }),
            FinalExecutionStatus::NotStarted | FinalExecutionStatus::Started => {
                Err(Error::Generic("transaction did not finish"))
            }
        }
    }
}

/// A [`TargetChainClient`] that signs function calls to the anchor contract on NEAR.
pub struct NearClient {
    rpc: HttpClient,
    signer_account_id: String,
    contract_id: String,
    key: PrivateKey,
    gas: u64,
    // one transaction at a time, they share the access key nonce.
    nonce_lock: Mutex<()>,
}

impl std::fmt::Debug for NearClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NearClient")
            .field("signer_account_id", &self.signer_account_id)
            .field("contract_id", &self.contract_id)
            .finish()
    }
}

impl NearClient {
    /// Creates a client for `contract_id`, signing as `signer_account_id`.
    pub fn new(
        url: &RpcUrl,
        signer_account_id: String,
        contract_id: String,
        key: PrivateKey,
        gas: Option<u64>,
    ) -> Result<Self> {
        let rpc = HttpClientBuilder::default().build(url.as_str())?;
        Ok(Self {
            rpc,
            signer_account_id,
            contract_id,
            key,
            gas: gas.unwrap_or(DEFAULT_GAS),
            nonce_lock: Mutex::new(()),
        })
    }

    async fn query<T: serde::de::DeserializeOwned>(
        &self,
        fields: &[(&str, serde_json::Value)],
    ) -> Result<T> {
        let mut params = ObjectParams::new();
        params.insert("finality", "final")?;
        for (name, value) in fields {
            params.insert(name, value)?;
        }
        Ok(self.rpc.request("query", params).await?)
    }

    async fn access_key(&self) -> Result<AccessKeyView> {
        self.query(&[
            ("request_type", "view_access_key".into()),
            ("account_id", self.signer_account_id.clone().into()),
            ("public_key", self.key.public_key_string().into()),
        ])
        .await
    }

    fn sign(&self, transaction: Transaction) -> Result<String> {
        let bytes = borsh::to_vec(&transaction)?;
        let hash = Sha256::digest(&bytes);
        let signature = self.key.sign(hash.as_slice());
        let signed = SignedTransaction {
            transaction,
            signature: Signature(signature.to_bytes()),
        };
        Ok(BASE64.encode(borsh::to_vec(&signed)?))
    }
}

#[async_trait::async_trait]
impl TargetChainClient for NearClient {
    #[tracing::instrument(skip(self, args), fields(contract = %self.contract_id))]
    async fn call(
        &self,
        method: &str,
        args: serde_json::Value,
        gas: u64,
    ) -> Result<CallOutcome> {
        let _guard = self.nonce_lock.lock().await;
        let access_key = self.access_key().await?;
        let block_hash: [u8; 32] = bs58::decode(&access_key.block_hash)
            .into_vec()
            .ok()
            .and_then(|v| v.try_into().ok())
            .ok_or(Error::Generic("invalid block hash"))?;
        let transaction = Transaction {
            signer_id: self.signer_account_id.clone(),
            public_key: PublicKey(self.key.verifying_key().to_bytes()),
            nonce: access_key.nonce + 1,
            receiver_id: self.contract_id.clone(),
            block_hash,
            actions: vec![FunctionCall {
                method_name: method.to_owned(),
                args: serde_json::to_vec(&args)?,
                gas,
                deposit: 0,
            }],
        };
        let signed = self.sign(transaction)?;
        let outcome: FinalExecutionOutcome = self
            .rpc
            .request("broadcast_tx_commit", rpc_params![signed])
            .await?;
        tracing::trace!(tx_id = %outcome.transaction_outcome.id, "{} executed", method);
        outcome.into_call_outcome()
    }

    async fn view(
        &self,
        method: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let view: CallFunctionView = self
            .query(&[
                ("request_type", "call_function".into()),
                ("account_id", self.contract_id.clone().into()),
                ("method_name", method.into()),
                (
                    "args_base64",
                    BASE64.encode(serde_json::to_vec(&args)?).into(),
                ),
            ])
            .await?;
        if view.result.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_slice(&view.result)?)
    }

    fn gas_budget(&self) -> u64 {
        self.gas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_carry_the_transaction_id() {
        let outcome: FinalExecutionOutcome =
            serde_json::from_value(serde_json::json!({
                "status": { "Failure": { "ActionError": { "index": 0 } } },
                "transaction_outcome": { "id": "xyz", "outcome": {} },
                "receipts_outcome": [],
            }))
            .unwrap();
        let err = outcome.into_call_outcome().unwrap_err();
        assert_eq!(err.tx_id(), Some("xyz"));
    }

    #[test]
    fn success_value_is_json_decoded() {
        let outcome: FinalExecutionOutcome =
            serde_json::from_value(serde_json::json!({
                "status": { "SuccessValue": BASE64.encode(b"\"Ok\"") },
                "transaction_outcome": { "id": "abc" },
            }))
            .unwrap();
        let outcome = outcome.into_call_outcome().unwrap();
        assert_eq!(outcome.tx_id, "abc");
        assert_eq!(outcome.value, Some(serde_json::json!("Ok")));
    }

    #[test]
    fn function_call_layout() {
        let call = FunctionCall {
            method_name: "m".into(),
            args: vec![1],
            gas: 2,
            deposit: 3,
        };
        let bytes = borsh::to_vec(&call).unwrap();
        let mut expected = vec![FUNCTION_CALL_ACTION];
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.push(b'm');
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.push(1);
        expected.extend_from_slice(&2u64.to_le_bytes());
        expected.extend_from_slice(&3u128.to_le_bytes());
        assert_eq!(bytes, expected);
    }
}
