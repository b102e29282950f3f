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

use ed25519_dalek::SigningKey;
use serde::Deserialize;

use crate::rpc_url::resolve_env;

/// The ed25519 key the relayer signs target chain transactions with.
///
/// Accepted formats:
/// * `0x` followed by the 32 bytes seed in hex.
/// * `ed25519:` followed by the base58 encoded 64 bytes keypair (seed then public key).
/// * `$VAR` to read any of the above from the environment.
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl PrivateKey {
    /// Parses a key from one of the supported formats (without `$VAR` resolution).
    pub fn parse(value: &str) -> Result<Self, String> {
        if let Some(hex_seed) = value.strip_prefix("0x") {
            let bytes = hex::decode(hex_seed).map_err(|e| e.to_string())?;
            let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                format!(
                    "expected a 66 chars string (including the 0x prefix) but found {} chars",
                    value.len()
                )
            })?;
            Ok(Self(SigningKey::from_bytes(&seed)))
        } else if let Some(b58) = value.strip_prefix("ed25519:") {
            let bytes = bs58::decode(b58).into_vec().map_err(|e| e.to_string())?;
            if bytes.len() != 64 && bytes.len() != 32 {
                return Err(format!(
                    "expected a 32 or 64 bytes ed25519 key but found {} bytes",
                    bytes.len()
                ));
            }
            let mut seed = [0u8; 32];
            seed.copy_from_slice(&bytes[..32]);
            Ok(Self(SigningKey::from_bytes(&seed)))
        } else {
            Err(String::from(
                "expected a 0x prefixed hex seed or an ed25519: prefixed base58 key",
            ))
        }
    }

    /// The public key in the `ed25519:<base58>` form.
    pub fn public_key_string(&self) -> String {
        format!(
            "ed25519:{}",
            bs58::encode(self.0.verifying_key().as_bytes()).into_string()
        )
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey")
            .field(&self.public_key_string())
            .finish()
    }
}

impl std::ops::Deref for PrivateKey {
    type Target = SigningKey;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PrivateKeyVistor;
        impl<'de> serde::de::Visitor<'de> for PrivateKeyVistor {
            type Value = PrivateKey;

            fn expecting(
                &self,
                formatter: &mut std::fmt::Formatter,
            ) -> std::fmt::Result {
                formatter.write_str(
                    "hex seed, ed25519 key or an env var containing one of them",
                )
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let value = resolve_env::<E>(value)?;
                PrivateKey::parse(&value).map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_str(PrivateKeyVistor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_and_base58_forms_agree() {
        let seed = [7u8; 32];
        let from_hex =
            PrivateKey::parse(&format!("0x{}", hex::encode(seed))).unwrap();
        let mut pair = seed.to_vec();
        pair.extend_from_slice(from_hex.verifying_key().as_bytes());
        let from_b58 = PrivateKey::parse(&format!(
            "ed25519:{}",
            bs58::encode(&pair).into_string()
        ))
        .unwrap();
        assert_eq!(from_hex.public_key_string(), from_b58.public_key_string());
    }

    #[test]
    fn rejects_short_seeds() {
        assert!(PrivateKey::parse("0x1234").is_err());
        assert!(PrivateKey::parse("mnemonic words").is_err());
    }
}
