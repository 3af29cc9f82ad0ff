//! Network profiles
//!
//! Every consensus function receives the active [`NetworkProfile`] explicitly;
//! nothing in the kernel reads process-wide network state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::constants::COIN;
use crate::crypto::Hash;
use crate::U256;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read profile: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse profile: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid profile value for '{0}': {1}")]
    InvalidValue(&'static str, String),
}

/// Which network a profile describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Main,
    Test,
    Regtest,
    Unittest,
}

impl Network {
    /// Test-style networks skip modifier checkpoints
    pub fn is_test_network(&self) -> bool {
        !matches!(self, Network::Main)
    }
}

/// Kernel protocol generation in force for a given stake origin height
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolEpoch {
    /// 256-bit rolling modifier, outpoint-based kernel, unscaled weight
    Legacy,
    /// 64-bit selected modifier, uniqueness-based kernel, weight / 100
    Current,
}

/// Immutable consensus parameters of one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProfile {
    pub network: Network,
    pub genesis_hash: Hash,
    #[serde(with = "u256_hex")]
    pub pow_limit: U256,
    #[serde(with = "u256_hex")]
    pub pos_limit: U256,
    /// Seconds
    pub target_timespan: i64,
    /// Seconds
    pub target_spacing: i64,
    /// Seconds a coin must age before it can stake
    pub stake_min_age: i64,
    /// Seconds between stake modifier recomputations
    pub modifier_interval: i64,
    /// Ratio of the last to the first selection round length
    pub modifier_interval_ratio: i64,
    pub new_protocols_start_height: u64,
    pub last_pow_block: u64,
    pub skip_pow_check: bool,
    pub max_money: u64,
    pub coinbase_maturity: u64,
    pub zerocoin_start_height: u64,
    pub max_zerocoin_spends_per_tx: usize,
    pub zerocoin_required_stake_depth: u64,
    /// Number of timestamps tried per stake search
    pub stake_hash_drift: u32,
    pub stake_timestamp_mask: u32,
    /// Expected stake modifier checksums by height
    pub modifier_checkpoints: BTreeMap<u64, u32>,
}

const MAIN_GENESIS: &str = "0000ec93e0a3fe0aafa3be7dafe1290f5fca039a4037dd5174bc3dd7a35d67f0";
const TESTNET_GENESIS: &str = "c72af97ceb4c7a5fc7b5ee366f13c0593c77a61f9eff73345184c36f0a8e2003";
const REGTEST_GENESIS: &str = "fbad85e5cf94df45faedc704d20c0bd74047def68a1b93058e740e58458ea00b";

impl NetworkProfile {
    pub fn main() -> Self {
        let mut modifier_checkpoints = BTreeMap::new();
        modifier_checkpoints.insert(0, 0xfd11_f4e7);

        Self {
            network: Network::Main,
            genesis_hash: Hash::from_hex(MAIN_GENESIS).unwrap_or_default(),
            pow_limit: U256::max_value() >> 16u32,
            pos_limit: U256::max_value() >> 48u32,
            target_timespan: 60,
            target_spacing: 60,
            stake_min_age: 60 * 60,
            modifier_interval: 60,
            modifier_interval_ratio: 3,
            new_protocols_start_height: 257_790,
            last_pow_block: 450,
            skip_pow_check: false,
            max_money: 120_000_000 * COIN,
            coinbase_maturity: 100,
            zerocoin_start_height: 257_790,
            max_zerocoin_spends_per_tx: 7,
            zerocoin_required_stake_depth: 200,
            stake_hash_drift: 30,
            stake_timestamp_mask: 15,
            modifier_checkpoints,
        }
    }

    pub fn testnet() -> Self {
        Self {
            network: Network::Test,
            genesis_hash: Hash::from_hex(TESTNET_GENESIS).unwrap_or_default(),
            new_protocols_start_height: 500,
            zerocoin_start_height: 500,
            coinbase_maturity: 15,
            modifier_checkpoints: BTreeMap::new(),
            ..Self::main()
        }
    }

    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            genesis_hash: Hash::from_hex(REGTEST_GENESIS).unwrap_or_default(),
            pow_limit: U256::max_value() >> 1u32,
            stake_min_age: 60,
            skip_pow_check: true,
            ..Self::testnet()
        }
    }

    /// Main-network rules with knobs tests are expected to override
    pub fn unittest() -> Self {
        Self {
            network: Network::Unittest,
            ..Self::main()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let profile: Self = serde_json::from_str(json)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject profiles that would break consensus arithmetic or weaken main net
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network == Network::Main && self.skip_pow_check {
            return Err(ConfigError::InvalidValue(
                "skip_pow_check",
                "cannot be enabled on the main network".to_string(),
            ));
        }
        if self.target_spacing <= 0 || self.target_timespan < self.target_spacing {
            return Err(ConfigError::InvalidValue(
                "target_spacing",
                format!("spacing {} timespan {}", self.target_spacing, self.target_timespan),
            ));
        }
        if self.modifier_interval <= 0 {
            return Err(ConfigError::InvalidValue(
                "modifier_interval",
                self.modifier_interval.to_string(),
            ));
        }
        if self.modifier_interval_ratio < 1 {
            return Err(ConfigError::InvalidValue(
                "modifier_interval_ratio",
                self.modifier_interval_ratio.to_string(),
            ));
        }
        if self.pow_limit.is_zero() || self.pos_limit.is_zero() {
            return Err(ConfigError::InvalidValue("pow_limit", "zero limit".to_string()));
        }
        Ok(())
    }

    /// Kernel protocol for a stake whose origin block is at `height`
    pub fn epoch_for_stake(&self, height: u64) -> ProtocolEpoch {
        if height > self.new_protocols_start_height {
            ProtocolEpoch::Current
        } else {
            ProtocolEpoch::Legacy
        }
    }

    /// Modifier selection hashing switches one block before the kernel does
    pub fn epoch_for_selection(&self, height: u64) -> ProtocolEpoch {
        self.epoch_for_stake(height.saturating_add(1))
    }

    pub fn is_zerocoin_active(&self, height: u64) -> bool {
        height >= self.zerocoin_start_height
    }

    /// Blocks expected within one timespan
    pub fn retarget_interval(&self) -> i64 {
        self.target_timespan / self.target_spacing
    }
}

impl Default for NetworkProfile {
    fn default() -> Self {
        Self::main()
    }
}

mod u256_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::U256;

    pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{:x}", value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        let text = text.strip_prefix("0x").unwrap_or(&text);
        U256::from_str_radix(text, 16).map_err(|e| serde::de::Error::custom(format!("{:?}", e)))
    }
}
