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

/// Which unit of work a [`HeightCursor`] tracks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
pub enum CursorKind {
    /// Last source chain block fully scanned for commitments.
    #[display(fmt = "scan")]
    Scan,
    /// Highest commitment height that reached a terminal state, in order.
    #[display(fmt = "relay")]
    Relay,
}

impl CursorKind {
    /// Stable key used by the stores.
    pub fn as_key(&self) -> &'static [u8] {
        match self {
            Self::Scan => b"scan",
            Self::Relay => b"relay",
        }
    }
}

/// Last height fully processed for a [`CursorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightCursor {
    pub height: u64,
    pub kind: CursorKind,
}
