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

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// The authority set change is not yet known to the target chain.
    Pending,
    /// A light client state at or above this height was accepted.
    Covered,
}

/// A source chain block at which the authority set changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub height: u64,
    pub status: SessionStatus,
    /// When the last light client update covering this session failed.
    pub failed_at: Option<u64>,
}

impl Session {
    pub fn new(height: u64) -> Self {
        Self {
            height,
            status: SessionStatus::Pending,
            failed_at: None,
        }
    }
}
