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

use codec::{Compact, Decode, Encode, Input};

use appchain_relayer_types::{AuthorityKey, Message};
use appchain_relayer_utils::DecodeError;

/// Consensus engine id of BEEFY digest items.
pub const BEEFY_ENGINE_ID: [u8; 4] = *b"BEEF";
/// Payload id of the MMR root in a BEEFY commitment.
pub const MMR_ROOT_PAYLOAD_ID: [u8; 2] = *b"mh";

const DIGEST_OTHER: u8 = 0;
const DIGEST_CONSENSUS: u8 = 4;
const BEEFY_AUTHORITIES_CHANGE: u8 = 1;
const VERSIONED_FINALITY_PROOF_V1: u8 = 1;

/// A header digest item, only the kinds the relayer cares about are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestItem {
    /// Opaque data put in the header by the runtime. Carries commitment digests.
    Other(Vec<u8>),
    /// A message from the runtime to a consensus engine.
    Consensus([u8; 4], Vec<u8>),
    /// Any other digest item kind.
    Unsupported(u8),
}

impl DigestItem {
    /// Whether this item announces a new BEEFY authority set.
    pub fn is_authorities_change(&self) -> bool {
        matches!(
            self,
            Self::Consensus(engine, data)
                if *engine == BEEFY_ENGINE_ID
                    && data.first() == Some(&BEEFY_AUTHORITIES_CHANGE)
        )
    }

    /// The commitment digest carried by this item, if any.
    pub fn as_commitment(&self) -> Option<&[u8]> {
        match self {
            Self::Other(data) => Some(data),
            _ => None,
        }
    }
}

impl Decode for DigestItem {
    fn decode<I: Input>(input: &mut I) -> Result<Self, codec::Error> {
        match input.read_byte()? {
            DIGEST_OTHER => Ok(Self::Other(Vec::<u8>::decode(input)?)),
            DIGEST_CONSENSUS => {
                let engine = <[u8; 4]>::decode(input)?;
                Ok(Self::Consensus(engine, Vec::<u8>::decode(input)?))
            }
            other => Ok(Self::Unsupported(other)),
        }
    }
}

/// The commitment a BEEFY signed commitment signs.
#[derive(Debug, Clone, PartialEq, Eq, Decode, Encode)]
pub struct BeefyCommitment {
    /// `(payload id, SCALE encoded value)` pairs.
    pub payload: Vec<([u8; 2], Vec<u8>)>,
    /// The block this commitment finalizes.
    pub block_number: u32,
    /// The authority set that signed it.
    pub validator_set_id: u64,
}

impl BeefyCommitment {
    /// The MMR root included in the payload.
    pub fn mmr_root(&self) -> Option<&[u8]> {
        self.payload
            .iter()
            .find(|(id, _)| *id == MMR_ROOT_PAYLOAD_ID)
            .map(|(_, v)| v.as_slice())
    }
}

/// A signed commitment from the finality stream, decoded just enough to be scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCommitment {
    /// The decoded commitment.
    pub commitment: BeefyCommitment,
    /// The bytes as received, they are submitted unchanged.
    pub encoded: Vec<u8>,
}

impl SignedCommitment {
    /// Block number of the commitment.
    pub fn block_number(&self) -> u64 {
        u64::from(self.commitment.block_number)
    }
}

fn invalid(what: &'static str, e: codec::Error) -> DecodeError {
    DecodeError::Invalid {
        what,
        reason: e.to_string(),
    }
}

fn decode_all<T: Decode>(
    what: &'static str,
    bytes: &[u8],
) -> Result<T, DecodeError> {
    let mut input = bytes;
    let value = T::decode(&mut input).map_err(|e| invalid(what, e))?;
    if !input.is_empty() {
        return Err(DecodeError::TrailingBytes {
            what,
            remaining: input.len(),
        });
    }
    Ok(value)
}

/// Decodes a SCALE encoded header digest item.
pub fn decode_digest_item(bytes: &[u8]) -> Result<DigestItem, DecodeError> {
    let mut input = bytes;
    DigestItem::decode(&mut input).map_err(|e| invalid("digest item", e))
}

/// Decodes a signed commitment from the finality stream.
///
/// Both the bare signed commitment and its `VersionedFinalityProof::V1` wrapping are
/// accepted. Only the commitment is decoded, the signatures are left to the target chain.
pub fn decode_signed_commitment(
    bytes: &[u8],
) -> Result<SignedCommitment, DecodeError> {
    let mut input = bytes;
    // a bare commitment starts with the compact length of its payload, whose lowest
    // bits are never 0b01 for a realistic payload count.
    if input.first() == Some(&VERSIONED_FINALITY_PROOF_V1) {
        input = &input[1..];
    } else if let Some(version) =
        input.first().filter(|b| **b & 0b11 == 0b01).copied()
    {
        return Err(DecodeError::UnsupportedVersion {
            what: "finality proof",
            version,
        });
    }
    let commitment = BeefyCommitment::decode(&mut input)
        .map_err(|e| invalid("signed commitment", e))?;
    Ok(SignedCommitment {
        commitment,
        encoded: bytes.to_vec(),
    })
}

/// Decodes the result of `BeefyApi_validator_set`: the authority keys and the set id.
///
/// `None` means BEEFY is not running at that block.
pub fn decode_validator_set(
    bytes: &[u8],
) -> Result<Option<(Vec<AuthorityKey>, u64)>, DecodeError> {
    decode_all("validator set", bytes)
}

/// Decodes the message batch stored off-chain for a commitment.
pub fn decode_messages(bytes: &[u8]) -> Result<Vec<Message>, DecodeError> {
    decode_all("messages", bytes)
}

/// Parses a `0x` prefixed hex string.
pub fn decode_hex(
    what: &'static str,
    value: &str,
) -> Result<Vec<u8>, DecodeError> {
    hex::decode(value.trim_start_matches("0x"))
        .map_err(|_| DecodeError::InvalidHex { what })
}

/// SCALE encodes a header from its parts, `digest_logs` being already encoded items.
pub fn encode_header(
    parent_hash: &[u8; 32],
    number: u32,
    state_root: &[u8; 32],
    extrinsics_root: &[u8; 32],
    digest_logs: &[Vec<u8>],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        32 * 3 + 8 + digest_logs.iter().map(Vec::len).sum::<usize>(),
    );
    parent_hash.encode_to(&mut out);
    Compact(number).encode_to(&mut out);
    state_root.encode_to(&mut out);
    extrinsics_root.encode_to(&mut out);
    Compact(digest_logs.len() as u32).encode_to(&mut out);
    for log in digest_logs {
        out.extend_from_slice(log);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use appchain_relayer_types::PayloadType;

    fn other_item(data: &[u8]) -> Vec<u8> {
        let mut raw = vec![DIGEST_OTHER];
        data.to_vec().encode_to(&mut raw);
        raw
    }

    #[test]
    fn digest_items_are_classified() {
        let item = decode_digest_item(&other_item(&[9; 32])).unwrap();
        assert_eq!(item.as_commitment(), Some(&[9u8; 32][..]));
        assert!(!item.is_authorities_change());

        let mut raw = vec![DIGEST_CONSENSUS];
        BEEFY_ENGINE_ID.encode_to(&mut raw);
        vec![BEEFY_AUTHORITIES_CHANGE, 0, 0].encode_to(&mut raw);
        let item = decode_digest_item(&raw).unwrap();
        assert!(item.is_authorities_change());
        assert_eq!(item.as_commitment(), None);

        // a seal is neither.
        let item = decode_digest_item(&[5, 1, 2]).unwrap();
        assert_eq!(item, DigestItem::Unsupported(5));
    }

    #[test]
    fn messages_decode_and_fail_closed() {
        let messages = vec![
            Message {
                nonce: 1,
                payload_type: PayloadType::Lock,
                payload: vec![1, 2, 3],
            },
            Message {
                nonce: 2,
                payload_type: PayloadType::EraPayout,
                payload: vec![],
            },
        ];
        let encoded = messages.encode();
        assert_eq!(decode_messages(&encoded).unwrap(), messages);

        let mut trailing = encoded.clone();
        trailing.push(0);
        assert_eq!(
            decode_messages(&trailing),
            Err(DecodeError::TrailingBytes {
                what: "messages",
                remaining: 1
            })
        );

        // an unknown payload kind is rejected.
        let mut unknown = encoded;
        // vec len (1 byte) + nonce (8 bytes), then the kind.
        unknown[9] = 42;
        assert!(matches!(
            decode_messages(&unknown),
            Err(DecodeError::Invalid { .. })
        ));
    }

    #[test]
    fn signed_commitment_in_both_forms() {
        let commitment = BeefyCommitment {
            payload: vec![(MMR_ROOT_PAYLOAD_ID, vec![7; 32])],
            block_number: 150,
            validator_set_id: 3,
        };
        let mut bare = commitment.encode();
        // signatures are not decoded.
        bare.extend_from_slice(&[0xde, 0xad]);
        let decoded = decode_signed_commitment(&bare).unwrap();
        assert_eq!(decoded.block_number(), 150);
        assert_eq!(decoded.commitment.mmr_root(), Some(&[7u8; 32][..]));
        assert_eq!(decoded.encoded, bare);

        let mut versioned = vec![VERSIONED_FINALITY_PROOF_V1];
        versioned.extend_from_slice(&bare);
        let decoded = decode_signed_commitment(&versioned).unwrap();
        assert_eq!(decoded.commitment, commitment);

        assert!(decode_signed_commitment(&[]).is_err());
    }

    #[test]
    fn validator_set_decodes() {
        let keys: Vec<AuthorityKey> = vec![[2; 33], [3; 33]];
        let encoded = Some((keys.clone(), 7u64)).encode();
        assert_eq!(decode_validator_set(&encoded).unwrap(), Some((keys, 7)));
        assert_eq!(decode_validator_set(&[0]).unwrap(), None);
    }

    #[test]
    fn header_encoding_layout() {
        let logs = vec![other_item(&[1, 2])];
        let encoded = encode_header(&[1; 32], 100, &[2; 32], &[3; 32], &logs);
        // 32 + compact(100) 2 bytes + 32 + 32 + compact(1) + item
        assert_eq!(encoded.len(), 32 + 2 + 32 + 32 + 1 + logs[0].len());
        assert_eq!(&encoded[32..34], &Compact(100u32).encode()[..]);
    }
}
