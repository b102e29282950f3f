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

use config::{Config, File};
use std::path::{Path, PathBuf};

use super::*;

/// The prefix of the environment variables merged into the configuration.
pub const ENV_PREFIX: &str = "APPCHAIN_RELAYER";

/// A helper function that will search for all config files in the given directory and return them as a vec
/// of the paths.
///
/// Supported file extensions are:
/// - `.toml`.
/// - `.json`.
pub fn search_config_files<P: AsRef<Path>>(
    base_dir: P,
) -> appchain_relayer_utils::Result<Vec<PathBuf>> {
    let toml_pattern = format!("{}/**/*.toml", base_dir.as_ref().display());
    let json_pattern = format!("{}/**/*.json", base_dir.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let toml_files = glob::glob(&toml_pattern)?;
    let json_files = glob::glob(&json_pattern)?;
    toml_files
        .chain(json_files)
        .map(|v| v.map_err(appchain_relayer_utils::Error::from))
        .collect()
}

/// Try to parse the [`AppchainRelayerConfig`] from the given config file(s).
///
/// Environment variables such as `APPCHAIN_RELAYER_TARGET__GAS` override the files.
pub fn parse_from_files(
    files: &[PathBuf],
) -> appchain_relayer_utils::Result<AppchainRelayerConfig> {
    let mut builder = Config::builder();
    for config_file in files {
        tracing::trace!("Loading config file: {}", config_file.display());
        let ext = config_file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        builder = builder
            .add_source(File::from(config_file.as_path()).format(format));
    }

    let builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );
    let cfg = builder.build()?;
    let config: Result<
        AppchainRelayerConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Load the configuration files and
///
/// it is the same as using the [`search_config_files`] and [`parse_from_files`] functions combined.
pub fn load<P: AsRef<Path>>(
    path: P,
) -> appchain_relayer_utils::Result<AppchainRelayerConfig> {
    parse_from_files(&search_config_files(path)?)
}

/// The postloading_process exists to validate configuration and standardize
/// the format of the configuration
pub fn postloading_process(
    mut config: AppchainRelayerConfig,
) -> appchain_relayer_utils::Result<AppchainRelayerConfig> {
    tracing::trace!("Checking configration sanity ...");
    config.target.signer_account_id =
        config.target.signer_account_id.trim().to_lowercase();
    config.target.anchor_contract_id =
        config.target.anchor_contract_id.trim().to_lowercase();
    if config.relay.max_confirm_attempts == 0 {
        tracing::warn!(
            "!!WARNING!!: max-confirm-attempts is 0, completion calls will run once"
        );
        config.relay.max_confirm_attempts = 1;
    }
    if config.relay.update_state_max_gap == 0 {
        tracing::warn!(
            "!!WARNING!!: update-state-max-gap is 0, the light client will be updated for every commitment"
        );
    }
    config.verify()?;

    tracing::trace!(
        "postloaded config: {}",
        serde_json::to_string_pretty(&config)?
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str =
        "0x9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn full_config() -> String {
        format!(
            r#"
[source]
ws-endpoint = "ws://127.0.0.1:9944"
start-block-height = 42

[target]
rpc-endpoint = "http://127.0.0.1:3030"
signer-account-id = "Relayer.Testnet"
anchor-contract-id = "anchor.testnet"
private-key = "{SEED}"

[relay]
update-state-max-gap = 50
"#
        )
    }

    #[test]
    fn loads_toml_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.toml", &full_config());
        let config = load(dir.path()).unwrap();
        assert_eq!(config.source.start_block_height, 42);
        assert_eq!(config.port, defaults::relayer_port());
        assert_eq!(config.target.signer_account_id, "relayer.testnet");
        assert_eq!(config.target.gas, defaults::gas());
        assert_eq!(config.relay.update_state_max_gap, 50);
        assert_eq!(config.relay.block_sync_size, 20);
        assert_eq!(config.relay.action_poll_interval_ms, 200);
        assert_eq!(config.relay.watchdog_timeout_secs, 120);
    }

    #[test]
    fn missing_private_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let content = full_config()
            .lines()
            .filter(|l| !l.starts_with("private-key"))
            .collect::<Vec<_>>()
            .join("\n");
        write(dir.path(), "main.toml", &content);
        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, appchain_relayer_utils::Error::MissingSecrets));
    }

    #[test]
    fn missing_endpoint_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "main.toml",
            "[target]\nsigner-account-id = \"a\"\nanchor-contract-id = \"b\"\n",
        );
        assert!(load(dir.path()).is_err());
    }

    #[test]
    fn sections_can_be_split_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let content = full_config();
        let (source, target) = content.split_at(
            content.find("[target]").unwrap(),
        );
        write(dir.path(), "source.toml", source);
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        write(&nested, "target.toml", target);
        let files = search_config_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        let config = parse_from_files(&files).unwrap();
        assert_eq!(config.target.anchor_contract_id, "anchor.testnet");
    }
}
