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

use std::time::{SystemTime, UNIX_EPOCH};

/// Metrics functionality
pub mod metric;
/// A module used for debugging relayer lifecycle, sync state, or other relayer state.
pub mod probe;
/// Retry functionality
pub mod retry;

/// An enum of all possible errors that could be encountered during the execution of the
/// Appchain Relayer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Error while decoding a hex string.
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),
    /// Secp256k1 error occurred.
    #[error(transparent)]
    Secp256k1(#[from] libsecp256k1::Error),
    /// JSON-RPC client error, either a transport failure or an error response.
    #[error(transparent)]
    Rpc(#[from] jsonrpsee::core::Error),
    /// Sled database error.
    #[error(transparent)]
    Sled(#[from] sled::Error),
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    /// A wire payload could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Missing Secrets in the config, the signer private key.
    #[error("Missing required private-key in the config")]
    MissingSecrets,
    /// The off-chain storage of the source chain has no payload for the given commitment.
    #[error("No off-chain data found for commitment 0x{}", hex::encode(.0))]
    MissingOffchainData(Vec<u8>),
    /// A target chain transaction was executed and failed.
    ///
    /// Unlike transport errors, this carries the outcome id of the transaction, so it
    /// must be recorded against the commitment or action that produced it.
    #[error("Transaction {tx_id} failed: {reason}")]
    TransactionFailed {
        /// The transaction outcome id.
        tx_id: String,
        /// Failure reason as reported by the target chain.
        reason: String,
    },
    /// a backgorund task failed and force restarted.
    #[error("Task Force Restarted from an error")]
    ForceRestart,
    /// The relayer can not make progress anymore and must be restarted by its supervisor.
    #[error("Fatal: {}", _0)]
    Fatal(&'static str),
}

impl Error {
    /// Returns true if this error carries a target chain transaction outcome.
    pub fn is_transaction_failure(&self) -> bool {
        matches!(self, Self::TransactionFailed { .. })
    }

    /// The transaction outcome id, if any.
    pub fn tx_id(&self) -> Option<&str> {
        match self {
            Self::TransactionFailed { tx_id, .. } => Some(tx_id),
            _ => None,
        }
    }

    /// Returns true if the process should exit.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Errors raised while decoding source chain payloads.
///
/// Decoding always fails closed: a malformed payload is never partially relayed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The SCALE bytes did not match the expected layout.
    #[error("invalid {what}: {reason}")]
    Invalid {
        /// What was being decoded.
        what: &'static str,
        /// The codec error message.
        reason: String,
    },
    /// The payload was decoded but left unread bytes behind.
    #[error("{what} has {remaining} trailing bytes")]
    TrailingBytes {
        /// What was being decoded.
        what: &'static str,
        /// How many bytes were left.
        remaining: usize,
    },
    /// A hex string could not be parsed.
    #[error("invalid hex in {what}")]
    InvalidHex {
        /// What was being decoded.
        what: &'static str,
    },
    /// Unsupported versioned payload.
    #[error("unsupported {what} version {version}")]
    UnsupportedVersion {
        /// What was being decoded.
        what: &'static str,
        /// The version byte.
        version: u8,
    },
}

/// A type alias for the result for appchain relayer, that uses the `Error` enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Milliseconds elapsed since the unix epoch.
pub fn unix_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
