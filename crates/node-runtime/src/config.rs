//! # Node Configuration
//!
//! A network preset from `omne-consensus` plus `OMNE_*` environment overrides.
//!
//! | Variable               | Meaning                                          |
//! |------------------------|--------------------------------------------------|
//! | `OMNE_NETWORK`         | `mainnet`, `testnet` or `devnet` (default)       |
//! | `OMNE_DATA_DIR`        | Directory of the slashing-protection store       |
//! | `OMNE_VALIDATOR_SEED`  | 32-byte Ed25519 seed, hex. Unset = ephemeral key |
//! | `OMNE_STAKE`           | Stake of the local validator                     |
//! | `OMNE_GENESIS_TIME_MS` | Slot zero, Unix milliseconds                     |

use omne_consensus::{ConsensusConfig, ConsensusError};
use std::path::PathBuf;
use thiserror::Error;

pub const ENV_NETWORK: &str = "OMNE_NETWORK";
pub const ENV_DATA_DIR: &str = "OMNE_DATA_DIR";
pub const ENV_VALIDATOR_SEED: &str = "OMNE_VALIDATOR_SEED";
pub const ENV_STAKE: &str = "OMNE_STAKE";
pub const ENV_GENESIS_TIME_MS: &str = "OMNE_GENESIS_TIME_MS";

const DEFAULT_STAKE: u128 = 32;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: {reason}")]
    InvalidVar { var: &'static str, reason: String },

    #[error("consensus config: {0}")]
    Consensus(#[from] ConsensusError),
}

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Preset name the consensus config was built from.
    pub network: String,
    pub data_dir: PathBuf,
    /// Local validator seed; `None` generates an ephemeral key at startup.
    pub validator_seed: Option<[u8; 32]>,
    pub stake: u128,
    pub consensus: ConsensusConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: "devnet".to_string(),
            data_dir: PathBuf::from("./data"),
            validator_seed: None,
            stake: DEFAULT_STAKE,
            consensus: ConsensusConfig::devnet(),
        }
    }
}

impl NodeConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load using `lookup` to resolve variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(network) = lookup(ENV_NETWORK) {
            config.consensus = ConsensusConfig::for_network(&network)?;
            config.network = network.to_ascii_lowercase();
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(seed) = lookup(ENV_VALIDATOR_SEED) {
            config.validator_seed = Some(parse_seed(&seed)?);
        }
        if let Some(stake) = lookup(ENV_STAKE) {
            config.stake = stake.parse().map_err(|e| ConfigError::InvalidVar {
                var: ENV_STAKE,
                reason: format!("{}", e),
            })?;
        }
        if let Some(ms) = lookup(ENV_GENESIS_TIME_MS) {
            config.consensus.genesis_time_ms =
                ms.parse().map_err(|e| ConfigError::InvalidVar {
                    var: ENV_GENESIS_TIME_MS,
                    reason: format!("{}", e),
                })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.consensus.validate()?;
        if self.stake == 0 {
            return Err(ConfigError::InvalidVar {
                var: ENV_STAKE,
                reason: "stake must be non-zero".into(),
            });
        }
        Ok(())
    }

    /// Path of the slashing-protection store.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("consensus.db")
    }
}

fn parse_seed(value: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = hex::decode(value.trim_start_matches("0x")).map_err(|e| {
        ConfigError::InvalidVar {
            var: ENV_VALIDATOR_SEED,
            reason: format!("not hex: {}", e),
        }
    })?;
    bytes.try_into().map_err(|b: Vec<u8>| ConfigError::InvalidVar {
        var: ENV_VALIDATOR_SEED,
        reason: format!("expected 32 bytes, got {}", b.len()),
    })
}
