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

use appchain_relayer_types::{AuthorityKey, ValidatorMerkleProof};
use appchain_relayer_utils::{Error, Result};

use crate::keccak_256;

/// The root of an authority set Merkle tree and one inclusion proof per authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthoritySetProof {
    /// The Merkle root.
    pub root: [u8; 32],
    /// Proofs in the order of the authority keys.
    pub proofs: Vec<ValidatorMerkleProof>,
}

/// Builds Merkle proofs over a BEEFY authority set.
///
/// Each compressed secp256k1 key is mapped to its 20 bytes Ethereum style address, the leaf
/// is `keccak256(address)` and an inner node is `keccak256(left ++ right)` without sorting.
/// On a level with an odd number of nodes the last node is promoted to the next level
/// unchanged, which is how the target chain verifier walks the proof.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthoritySetProver;

impl AuthoritySetProver {
    /// Builds the tree over `keys` and returns its root with a proof for every key.
    pub fn prove(&self, keys: &[AuthorityKey]) -> Result<AuthoritySetProof> {
        if keys.is_empty() {
            return Err(Error::Generic("empty authority set"));
        }
        let addresses = keys
            .iter()
            .map(authority_address)
            .collect::<Result<Vec<_>>>()?;
        let leaves = addresses
            .iter()
            .map(|a| keccak_256(a))
            .collect::<Vec<_>>();
        let root =
            compute_root(&leaves).ok_or(Error::Generic("empty merkle tree"))?;
        let number_of_leaves = addresses.len() as u32;
        let proofs = addresses
            .into_iter()
            .enumerate()
            .map(|(i, address)| {
                let proof = compute_proof(&leaves, i)
                    .ok_or(Error::Generic("leaf index out of range"))?;
                Ok(ValidatorMerkleProof {
                    proof,
                    number_of_leaves,
                    leaf_index: i as u32,
                    leaf: address.to_vec(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(AuthoritySetProof { root, proofs })
    }
}

/// The Ethereum style address of a compressed secp256k1 key: the last 20 bytes of the
/// keccak256 of the uncompressed key without its `0x04` prefix.
pub fn authority_address(key: &AuthorityKey) -> Result<[u8; 20]> {
    let public = libsecp256k1::PublicKey::parse_compressed(key)?;
    let uncompressed = public.serialize();
    let hash = keccak_256(&uncompressed[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    Ok(address)
}

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left);
    buf[32..].copy_from_slice(right);
    keccak_256(&buf)
}

/// The level above `hashes`, a trailing odd node is promoted as is.
fn next_level(hashes: &[[u8; 32]]) -> Vec<[u8; 32]> {
    hashes
        .chunks(2)
        .map(|pair| match pair.get(1) {
            Some(right) => hash_pair(&pair[0], right),
            None => pair[0],
        })
        .collect()
}

/// Merkle root over already hashed leaves, `None` when there are none.
pub fn compute_root(leaves: &[[u8; 32]]) -> Option<[u8; 32]> {
    let mut hashes = leaves.to_vec();
    while hashes.len() > 1 {
        hashes = next_level(&hashes);
    }
    hashes.first().copied()
}

/// The sibling hashes needed to recompute the root from the leaf at `index`.
///
/// A promoted node has no sibling on its level, so nothing is pushed for it.
pub fn compute_proof(leaves: &[[u8; 32]], index: usize) -> Option<Vec<[u8; 32]>> {
    if index >= leaves.len() {
        return None;
    }
    let mut hashes = leaves.to_vec();
    let mut proof = Vec::new();
    let mut idx = index;
    while hashes.len() > 1 {
        let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
        if let Some(sibling) = hashes.get(sibling_idx) {
            proof.push(*sibling);
        }
        hashes = next_level(&hashes);
        idx /= 2;
    }
    Some(proof)
}

/// Recomputes the root from a leaf hash and its proof, the way the target chain does.
pub fn verify_proof(
    leaf: [u8; 32],
    proof: &[[u8; 32]],
    index: u32,
    number_of_leaves: u32,
    root: &[u8; 32],
) -> bool {
    if index >= number_of_leaves {
        return false;
    }
    let mut current = leaf;
    let mut idx = index;
    let mut width = number_of_leaves;
    let mut siblings = proof.iter();
    while width > 1 {
        let has_sibling = idx % 2 == 1 || idx + 1 < width;
        if has_sibling {
            let Some(sibling) = siblings.next() else {
                return false;
            };
            current = if idx % 2 == 0 {
                hash_pair(&current, sibling)
            } else {
                hash_pair(sibling, &current)
            };
        }
        idx /= 2;
        width = (width + 1) / 2;
    }
    siblings.next().is_none() && current == *root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority(seed: u8) -> AuthorityKey {
        let secret = libsecp256k1::SecretKey::parse(&[seed; 32]).unwrap();
        libsecp256k1::PublicKey::from_secret_key(&secret).serialize_compressed()
    }

    #[test]
    fn address_of_the_generator_point() {
        let mut one = [0u8; 32];
        one[31] = 1;
        let secret = libsecp256k1::SecretKey::parse(&one).unwrap();
        let key = libsecp256k1::PublicKey::from_secret_key(&secret)
            .serialize_compressed();
        assert_eq!(
            hex::encode(authority_address(&key).unwrap()),
            "7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn every_proof_recomputes_the_root() {
        for n in 1..=9u8 {
            let keys = (1..=n).map(authority).collect::<Vec<_>>();
            let AuthoritySetProof { root, proofs } =
                AuthoritySetProver.prove(&keys).unwrap();
            assert_eq!(proofs.len(), n as usize);
            for p in &proofs {
                assert!(
                    verify_proof(
                        keccak_256(&p.leaf),
                        &p.proof,
                        p.leaf_index,
                        p.number_of_leaves,
                        &root,
                    ),
                    "proof {} of {} does not verify",
                    p.leaf_index,
                    n
                );
            }
        }
    }

    #[test]
    fn single_authority_root_is_its_leaf() {
        let keys = vec![authority(1)];
        let proof = AuthoritySetProver.prove(&keys).unwrap();
        let address = authority_address(&keys[0]).unwrap();
        assert_eq!(proof.root, keccak_256(&address));
        assert!(proof.proofs[0].proof.is_empty());
    }

    #[test]
    fn odd_leaf_is_promoted() {
        let leaves = vec![[1u8; 32], [2u8; 32], [3u8; 32]];
        let left = hash_pair(&leaves[0], &leaves[1]);
        assert_eq!(next_level(&leaves), vec![left, leaves[2]]);
        let root = hash_pair(&left, &leaves[2]);
        assert_eq!(compute_root(&leaves), Some(root));
        assert_eq!(compute_proof(&leaves, 2), Some(vec![left]));
        assert_eq!(compute_proof(&leaves, 0), Some(vec![leaves[1], leaves[2]]));
        assert!(verify_proof(leaves[2], &[left], 2, 3, &root));
        assert_eq!(compute_proof(&leaves, 3), None);
        assert_eq!(compute_root(&[]), None);
    }

    #[test]
    fn tampered_proofs_are_rejected() {
        let keys = (1..=5).map(authority).collect::<Vec<_>>();
        let AuthoritySetProof { root, proofs } =
            AuthoritySetProver.prove(&keys).unwrap();
        let p = &proofs[1];
        let leaf = keccak_256(&p.leaf);
        assert!(verify_proof(leaf, &p.proof, 1, p.number_of_leaves, &root));
        assert!(!verify_proof(leaf, &p.proof, 2, p.number_of_leaves, &root));
        let mut bad = p.proof.clone();
        bad[0][0] ^= 1;
        assert!(!verify_proof(leaf, &bad, 1, p.number_of_leaves, &root));
        assert!(!verify_proof(leaf, &p.proof, 7, p.number_of_leaves, &root));
    }

    #[test]
    fn empty_or_invalid_sets_are_errors() {
        assert!(AuthoritySetProver.prove(&[]).is_err());
        assert!(AuthoritySetProver.prove(&[[0u8; 33]]).is_err());
    }
}
