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

//! # Relayer Types 🕸️
//!
//! Records persisted by the relayer store and the values exchanged with the source and
//! target chains.

/// Administrative actions tracked on the target chain.
pub mod action;
/// Commitments discovered on the source chain.
pub mod commitment;
/// Persisted processing cursors.
pub mod cursor;
/// Light client states and message proofs submitted to the target chain.
pub mod light_client;
/// Cross-chain messages carried by a commitment.
pub mod message;
pub mod private_key;
pub mod rpc_url;
/// Authority set change markers.
pub mod session;

pub use action::{Action, ActionStatus, ActionType};
pub use commitment::{Commitment, CommitmentStatus};
pub use cursor::{CursorKind, HeightCursor};
pub use light_client::{
    LightClientState, MessageProof, MmrLeafProof, TrustedLightClientState,
    ValidatorMerkleProof,
};
pub use message::{Message, PayloadType};
pub use session::{Session, SessionStatus};

/// A compressed secp256k1 BEEFY authority public key.
pub type AuthorityKey = [u8; 33];

/// A finalized source chain block, as seen by the block scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBlock {
    /// Block number.
    pub height: u64,
    /// Block hash.
    pub hash: [u8; 32],
    /// The SCALE encoded header.
    pub encoded_header: Vec<u8>,
    /// SCALE encoded digest items of the header, in order.
    pub digest_logs: Vec<Vec<u8>>,
}
