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

use std::sync::Arc;

use futures::StreamExt;
use jsonrpsee::core::client::{ClientT, SubscriptionClientT};
use jsonrpsee::rpc_params;
use jsonrpsee::ws_client::{WsClient, WsClientBuilder};
use serde::Deserialize;

use appchain_proof_generation::codec::{
    decode_hex, decode_validator_set, encode_header,
};
use appchain_relayer_types::rpc_url::RpcUrl;
use appchain_relayer_types::{AuthorityKey, MmrLeafProof, SourceBlock};
use appchain_relayer_utils::{DecodeError, Error, Result};

use crate::{ResultStream, SourceChainClient};

/// Header as returned by `chain_getHeader`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcHeader {
    parent_hash: String,
    number: String,
    state_root: String,
    extrinsics_root: String,
    digest: RpcDigest,
}

#[derive(Debug, Clone, Deserialize)]
struct RpcDigest {
    logs: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcMmrProof {
    leaves: String,
    proof: String,
}

fn parse_number(value: &str) -> std::result::Result<u64, DecodeError> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|_| DecodeError::InvalidHex {
            what: "block number",
        })
}

fn parse_hash(
    what: &'static str,
    value: &str,
) -> std::result::Result<[u8; 32], DecodeError> {
    decode_hex(what, value)?
        .as_slice()
        .try_into()
        .map_err(|_| DecodeError::InvalidHex { what })
}

impl RpcHeader {
    fn into_block(self, hash: [u8; 32]) -> Result<SourceBlock> {
        let height = parse_number(&self.number)?;
        let number = u32::try_from(height)
            .map_err(|_| Error::Generic("block number overflows u32"))?;
        let digest_logs = self
            .digest
            .logs
            .iter()
            .map(|log| decode_hex("digest item", log))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let encoded_header = encode_header(
            &parse_hash("parent hash", &self.parent_hash)?,
            number,
            &parse_hash("state root", &self.state_root)?,
            &parse_hash("extrinsics root", &self.extrinsics_root)?,
            &digest_logs,
        );
        Ok(SourceBlock {
            height,
            hash,
            encoded_header,
            digest_logs,
        })
    }
}

/// A [`SourceChainClient`] over a Substrate node websocket JSON-RPC endpoint.
#[derive(Clone)]
pub struct SubstrateClient {
    rpc: Arc<WsClient>,
}

impl std::fmt::Debug for SubstrateClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubstrateClient").finish()
    }
}

impl SubstrateClient {
    /// Connects to the node at `url`.
    pub async fn connect(url: &RpcUrl) -> Result<Self> {
        let rpc = WsClientBuilder::default()
            .max_notifs_per_subscription(4096)
            .build(url.as_str())
            .await?;
        tracing::debug!("Connected to the source chain at {}", url);
        Ok(Self { rpc: Arc::new(rpc) })
    }

    /// Whether the websocket connection is still alive.
    pub fn is_connected(&self) -> bool {
        self.rpc.is_connected()
    }

    async fn block_hash(&self, height: u64) -> Result<Option<String>> {
        let hash: Option<String> = self
            .rpc
            .request("chain_getBlockHash", rpc_params![height])
            .await?;
        Ok(hash)
    }
}

#[async_trait::async_trait]
impl SourceChainClient for SubstrateClient {
    async fn finalized_height(&self) -> Result<u64> {
        let hash: String = self
            .rpc
            .request("chain_getFinalizedHead", rpc_params![])
            .await?;
        let header: RpcHeader = self
            .rpc
            .request("chain_getHeader", rpc_params![hash])
            .await?;
        Ok(parse_number(&header.number)?)
    }

    async fn subscribe_finalized_heights(&self) -> Result<ResultStream<u64>> {
        let sub = self
            .rpc
            .subscribe::<RpcHeader, _>(
                "chain_subscribeFinalizedHeads",
                rpc_params![],
                "chain_unsubscribeFinalizedHeads",
            )
            .await?;
        Ok(sub
            .map(|header| -> Result<u64> {
                Ok(parse_number(&header?.number)?)
            })
            .boxed())
    }

    #[tracing::instrument(skip(self))]
    async fn block(&self, height: u64) -> Result<Option<SourceBlock>> {
        let hash = match self.block_hash(height).await? {
            Some(hash) => hash,
            None => return Ok(None),
        };
        let header: Option<RpcHeader> = self
            .rpc
            .request("chain_getHeader", rpc_params![&hash])
            .await?;
        header
            .map(|h| h.into_block(parse_hash("block hash", &hash)?))
            .transpose()
    }

    async fn offchain_data(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value: Option<String> = self
            .rpc
            .request(
                "offchain_localStorageGet",
                rpc_params!["PERSISTENT", format!("0x{}", hex::encode(key))],
            )
            .await?;
        Ok(value
            .map(|v| decode_hex("off-chain data", &v))
            .transpose()?)
    }

    #[tracing::instrument(skip(self))]
    async fn generate_batch_mmr_proof(
        &self,
        block_numbers: &[u64],
        best_known: u64,
    ) -> Result<MmrLeafProof> {
        let proof: RpcMmrProof = self
            .rpc
            .request(
                "mmr_generateProof",
                rpc_params![block_numbers, Some(best_known)],
            )
            .await?;
        Ok(MmrLeafProof {
            leaves: decode_hex("mmr leaves", &proof.leaves)?,
            proof: decode_hex("mmr proof", &proof.proof)?,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn authorities(&self, height: u64) -> Result<Vec<AuthorityKey>> {
        let hash = self
            .block_hash(height)
            .await?
            .ok_or(Error::Generic("unknown block"))?;
        let result: String = self
            .rpc
            .request("state_call", rpc_params!["BeefyApi_validator_set", "0x", hash])
            .await?;
        match decode_validator_set(&decode_hex("validator set", &result)?)? {
            Some((keys, _set_id)) => Ok(keys),
            None => Err(Error::Generic("beefy is not running at this block")),
        }
    }

    async fn subscribe_signed_commitments(
        &self,
    ) -> Result<ResultStream<Vec<u8>>> {
        let sub = self
            .rpc
            .subscribe::<String, _>(
                "beefy_subscribeJustifications",
                rpc_params![],
                "beefy_unsubscribeJustifications",
            )
            .await?;
        Ok(sub
            .map(|encoded| -> Result<Vec<u8>> {
                Ok(decode_hex("signed commitment", &encoded?)?)
            })
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_header_becomes_a_source_block() {
        let header: RpcHeader = serde_json::from_value(serde_json::json!({
            "parentHash": format!("0x{}", "11".repeat(32)),
            "number": "0x64",
            "stateRoot": format!("0x{}", "22".repeat(32)),
            "extrinsicsRoot": format!("0x{}", "33".repeat(32)),
            "digest": { "logs": ["0x000c010203"] },
        }))
        .unwrap();
        let block = header.into_block([9; 32]).unwrap();
        assert_eq!(block.height, 100);
        assert_eq!(block.digest_logs, vec![vec![0, 0x0c, 1, 2, 3]]);
        assert_eq!(&block.encoded_header[..32], &[0x11; 32][..]);
    }

    #[test]
    fn malformed_numbers_are_decode_errors() {
        assert!(parse_number("0xzz").is_err());
        assert_eq!(parse_number("0x10").unwrap(), 16);
        assert!(parse_hash("block hash", "0x1234").is_err());
    }
}
