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

use codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// The kind of a cross-chain message.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Encode,
    Decode,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
pub enum PayloadType {
    #[codec(index = 0)]
    #[display(fmt = "Lock")]
    Lock,
    #[codec(index = 1)]
    #[display(fmt = "BurnAsset")]
    BurnAsset,
    #[codec(index = 2)]
    #[display(fmt = "PlanNewEra")]
    PlanNewEra,
    #[codec(index = 3)]
    #[display(fmt = "EraPayout")]
    EraPayout,
    #[codec(index = 4)]
    #[display(fmt = "LockNft")]
    LockNft,
}

/// A single message of a commitment's off-chain batch.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Message {
    pub nonce: u64,
    pub payload_type: PayloadType,
    pub payload: Vec<u8>,
}
