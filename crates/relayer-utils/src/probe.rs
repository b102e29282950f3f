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

use derive_more::Display;
/// Target for logger
pub const TARGET: &str = "appchain_probe";

/// The Kind of the Probe.
///
/// Every state transition of the pipeline is logged under [`TARGET`] with one of these kinds,
/// so the history of a commitment or an action can be rebuilt from the logs alone.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// When the Lifecycle of the Relayer changes, like starting or shutting down.
    #[display(fmt = "lifecycle")]
    Lifecycle,
    /// Block scanning progress on the source chain.
    #[display(fmt = "sync")]
    Sync,
    /// A commitment changed its status (received, relayed, failed, deferred).
    #[display(fmt = "commitment")]
    Commitment,
    /// The beefy light client state on the target chain.
    #[display(fmt = "light_client")]
    LightClient,
    /// An administrative action changed its status.
    #[display(fmt = "action")]
    Action,
    /// The watchdog fired.
    #[display(fmt = "watchdog")]
    Watchdog,
    /// When the relayer will retry to do something.
    #[display(fmt = "retry")]
    Retry,
}
