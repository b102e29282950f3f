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

#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Appchain Relayer Crate 🕸️
//!
//! A crate relaying cross-chain messages from a Substrate appchain to its anchor contract
//! on the target chain.
//!
//! ## Overview
//!
//! The appchain puts a commitment digest in the header of every block that carries
//! cross-chain messages, the messages themselves sit in its off-chain storage. BEEFY signs
//! the finalized blocks, and the MMR over the block headers lets a later signed commitment
//! prove an earlier header.
//!
//! The relayer is made of a few loops sharing a store:
//!
//!   1. [`height_tracker`] follows the finalized heads and keeps the processing cursors.
//!   2. [`block_scanner`] walks the finalized blocks in order and records every commitment
//!      and every authority set change.
//!   3. [`light_client_sync`] turns the BEEFY signed commitments into light client states,
//!      and updates the light client of the target chain when it has to.
//!   4. [`commitment_relay`] proves every commitment against a trusted light client state and
//!      submits the messages, lowest height first, at most once.
//!   5. [`action_tracker`] drives the multi-step calls the target chain needs after an update
//!      or a relayed batch (era switch, reward payout, message processing) to completion,
//!      with a cool-down after every failure.
//!
//! #### Witness mode
//!
//! While the anchor contract runs in witness mode it accepts message batches without any
//! proof. The light client is left alone and the commitments are relayed as they are.
//!
//! The relayer metrics are served by [`handlers`] on the configured `port`.
//!
//! #### Liveness
//!
//! The scan and relay cycles run under a [`watchdog::Watchdog`]. A stalled cycle with an
//! unreachable source chain, or a source chain that stays disconnected, ends the process
//! with a fatal error so a supervisor can restart it.

/// Administrative actions of the target chain.
pub mod action_tracker;
/// Commitment discovery.
pub mod block_scanner;
/// The commitment relay pipeline.
pub mod commitment_relay;
/// The metrics endpoint.
pub mod handlers;
/// Processing cursors and the finalized watermark.
pub mod height_tracker;
/// Beefy light client state updates.
pub mod light_client_sync;
/// Wiring of the long-running loops.
pub mod service;
/// Time bound of the loop cycles.
pub mod watchdog;

pub use action_tracker::{ActionTracker, Confirmation};
pub use block_scanner::{BlockScanner, ScanStep};
pub use commitment_relay::{
    CommitmentRelay, ProofCosigner, RelayOutcome, RelayPass,
};
pub use height_tracker::HeightTracker;
pub use light_client_sync::{LightClientSync, SyncOutcome, SyncState};
pub use watchdog::Watchdog;
