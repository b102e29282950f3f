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
//! # Proof Generation 🕸️
//!
//! Everything needed to turn source chain data into the arguments the target chain
//! verifies:
//!
//! * [`codec`] decodes the SCALE payloads of the source chain (digest items, signed
//!   commitments, authority sets, message batches) and fails closed on malformed input.
//! * [`authority`] builds the authority set Merkle tree and its per-authority proofs.

/// Authority set Merkle proofs.
pub mod authority;
/// Source chain wire formats.
pub mod codec;

pub use authority::{AuthoritySetProof, AuthoritySetProver};

/// Keccak-256 of `data`.
pub fn keccak_256(data: &[u8]) -> [u8; 32] {
    use tiny_keccak::{Hasher, Keccak};
    let mut keccak = Keccak::v256();
    let mut output = [0u8; 32];
    keccak.update(data);
    keccak.finalize(&mut output);
    output
}
