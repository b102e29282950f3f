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

//! # Relayer Configuration Module 🕸️
//!
//! A module for configuring the relayer.
//!
//! ## Overview
//!
//! * `port`: The port the relayer serves its metrics on. Defaults to 9955
//!
//! The rest of the configuration is split in three sections:
//! * `source`: how to reach the Substrate source chain and where to start scanning.
//! * `target`: the target chain endpoint, the anchor contract and the signer.
//! * `relay`: intervals, batch sizes, cool-downs and watchdog timeouts of the pipeline.
//!
//! See [config/example](../../config/example) for an example.

/// CLI configuration
#[cfg(feature = "cli")]
pub mod cli;
/// Default values of the optional configuration keys
pub mod defaults;
/// Utils for processing configuration
pub mod utils;

use std::time::Duration;

use appchain_relayer_types::{private_key::PrivateKey, rpc_url::RpcUrl};
use serde::{Deserialize, Serialize};

/// AppchainRelayerConfig is the configuration for the appchain relayer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AppchainRelayerConfig {
    /// WebServer configuration
    #[serde(default = "defaults::relayer_port", skip_serializing)]
    pub port: u16,
    /// The Substrate based source chain.
    pub source: SourceConfig,
    /// The target chain and its anchor contract.
    pub target: TargetConfig,
    /// Tuning of the relay pipeline.
    #[serde(default)]
    pub relay: RelayConfig,
}

impl AppchainRelayerConfig {
    /// Makes sure that the config is valid, by going
    /// through the whole config and doing some basic checks.
    pub fn verify(&self) -> appchain_relayer_utils::Result<()> {
        // every relayed batch is a signed transaction.
        if self.target.private_key.is_none() {
            return Err(appchain_relayer_utils::Error::MissingSecrets);
        }
        if self.relay.block_sync_size == 0 {
            return Err(appchain_relayer_utils::Error::Generic(
                "block-sync-size must be greater than zero",
            ));
        }
        if self.target.signer_account_id.is_empty()
            || self.target.anchor_contract_id.is_empty()
        {
            return Err(appchain_relayer_utils::Error::Generic(
                "signer-account-id and anchor-contract-id must not be empty",
            ));
        }
        Ok(())
    }
}

/// SourceConfig is the configuration of the Substrate source chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    /// Websocket Endpoint for long living connections.
    pub ws_endpoint: RpcUrl,
    /// The height to start scanning from when nothing was scanned before.
    #[serde(default)]
    pub start_block_height: u64,
}

/// TargetConfig is the configuration of the target chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetConfig {
    /// Http(s) JSON-RPC endpoint.
    pub rpc_endpoint: RpcUrl,
    /// The account that signs every call.
    pub signer_account_id: String,
    /// The anchor contract of the appchain.
    pub anchor_contract_id: String,
    /// The signer key, either a hex encoded ed25519 seed or `ed25519:<base58>`.
    ///
    /// Could be also loaded from the environment with `$NAME`.
    #[serde(skip_serializing)]
    pub private_key: Option<PrivateKey>,
    /// Gas attached to every call.
    #[serde(default = "defaults::gas")]
    pub gas: u64,
}

/// RelayConfig tunes the relay pipeline.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RelayConfig {
    /// Maximum number of blocks scanned per batch.
    #[serde(default = "defaults::block_sync_size")]
    pub block_sync_size: u64,
    /// Pause between scan passes once caught up.
    #[serde(default = "defaults::scan_interval_ms")]
    pub scan_interval_ms: u64,
    /// Pause between relay passes.
    #[serde(default = "defaults::relay_interval_ms")]
    pub relay_interval_ms: u64,
    /// How often pending actions are polled.
    #[serde(default = "defaults::action_poll_interval_ms")]
    pub action_poll_interval_ms: u64,
    /// Cool-down after a failed action and minimum spacing between light client updates.
    #[serde(default = "defaults::update_state_min_interval_ms")]
    pub update_state_min_interval_ms: u64,
    /// Maximum number of blocks the light client may lag behind before it is updated.
    #[serde(default = "defaults::update_state_max_gap")]
    pub update_state_max_gap: u64,
    /// Bounded retries of a multi-step completion call.
    #[serde(default = "defaults::max_confirm_attempts")]
    pub max_confirm_attempts: usize,
    /// Pause between two completion calls.
    #[serde(default = "defaults::confirm_retry_interval_ms")]
    pub confirm_retry_interval_ms: u64,
    /// A loop cycle that takes longer than this triggers a liveness probe.
    #[serde(default = "defaults::watchdog_timeout_secs")]
    pub watchdog_timeout_secs: u64,
    /// How long the liveness probe may take.
    #[serde(default = "defaults::liveness_probe_timeout_secs")]
    pub liveness_probe_timeout_secs: u64,
    /// How long the source chain may stay disconnected.
    #[serde(default = "defaults::disconnect_grace_secs")]
    pub disconnect_grace_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            block_sync_size: defaults::block_sync_size(),
            scan_interval_ms: defaults::scan_interval_ms(),
            relay_interval_ms: defaults::relay_interval_ms(),
            action_poll_interval_ms: defaults::action_poll_interval_ms(),
            update_state_min_interval_ms:
                defaults::update_state_min_interval_ms(),
            update_state_max_gap: defaults::update_state_max_gap(),
            max_confirm_attempts: defaults::max_confirm_attempts(),
            confirm_retry_interval_ms: defaults::confirm_retry_interval_ms(),
            watchdog_timeout_secs: defaults::watchdog_timeout_secs(),
            liveness_probe_timeout_secs: defaults::liveness_probe_timeout_secs(
            ),
            disconnect_grace_secs: defaults::disconnect_grace_secs(),
        }
    }
}

/// The intervals above as [`Duration`]s.
#[allow(missing_docs)]
impl RelayConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn relay_interval(&self) -> Duration {
        Duration::from_millis(self.relay_interval_ms)
    }

    pub fn action_poll_interval(&self) -> Duration {
        Duration::from_millis(self.action_poll_interval_ms)
    }

    pub fn update_state_min_interval(&self) -> Duration {
        Duration::from_millis(self.update_state_min_interval_ms)
    }

    pub fn confirm_retry_interval(&self) -> Duration {
        Duration::from_millis(self.confirm_retry_interval_ms)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs(self.watchdog_timeout_secs)
    }

    pub fn liveness_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_probe_timeout_secs)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace_secs)
    }
}
