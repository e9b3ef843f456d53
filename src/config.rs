use std::{path::Path, str::FromStr, time::Duration};

use evm_tracer::TraceOptions;
use revm::primitives::hardfork::SpecId;
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub throttle: ThrottleConfig,
    pub estimate: EstimateConfig,
    pub trace: TraceOptions,
    pub evm: EvmConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries_per_contract: usize,
    pub max_contracts: usize,
    pub expire_after_access: Duration,
    pub batch_enabled: bool,
    pub batch_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries_per_contract: 1000,
            max_contracts: 10_000,
            expire_after_access: Duration::from_secs(30 * 60),
            batch_enabled: false,
            batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub gas_capacity: u64,
    pub refund_percent: u64,
    /// Zero disables refill.
    pub refill_per_second: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            gas_capacity: 7_500_000_000,
            refund_percent: 10,
            refill_per_second: 7_500_000_000,
        }
    }
}

/// Tolerance at which the gas search stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Absolute(u64),
    Percent(u8),
}

impl Precision {
    /// Acceptable `hi - lo` gap for the current upper bound.
    pub fn threshold(&self, hi: u64) -> u64 {
        match *self {
            Self::Absolute(gas) => gas.max(1),
            Self::Percent(pct) => (hi / 100).saturating_mul(pct as u64).max(1),
        }
    }
}

impl Default for Precision {
    fn default() -> Self {
        Self::Percent(10)
    }
}

impl FromStr for Precision {
    type Err = Error;

    /// `10%` is a percentage of the upper bound, a bare number is absolute gas.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::Config(format!("invalid precision '{s}'"));
        match s.trim().strip_suffix('%') {
            Some(pct) => {
                let pct = pct.trim().parse::<u8>().map_err(|_| invalid())?;
                if pct > 100 {
                    return Err(invalid());
                }
                Ok(Self::Percent(pct))
            }
            None => s.trim().parse().map(Self::Absolute).map_err(|_| invalid()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimateConfig {
    pub gas_ceiling: u64,
    pub precision: Precision,
    pub max_attempts: u32,
}

impl Default for EstimateConfig {
    fn default() -> Self {
        Self {
            gas_ceiling: 15_000_000,
            precision: Precision::default(),
            max_attempts: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvmConfig {
    pub chain_id: u64,
    /// Gas charged for a token read view answered from ledger state.
    pub token_call_gas: u64,
    pub spec: Hardfork,
}

impl Default for EvmConfig {
    fn default() -> Self {
        Self {
            chain_id: 295,
            token_call_gas: 2_600,
            spec: Hardfork::default(),
        }
    }
}

/// Rule set the VM executes under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hardfork {
    Shanghai,
    #[default]
    Cancun,
    Prague,
}

impl Hardfork {
    pub fn spec_id(&self) -> SpecId {
        match self {
            Self::Shanghai => SpecId::SHANGHAI,
            Self::Cancun => SpecId::CANCUN,
            Self::Prague => SpecId::PRAGUE,
        }
    }
}

impl FromStr for Hardfork {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shanghai" => Ok(Self::Shanghai),
            "cancun" => Ok(Self::Cancun),
            "prague" => Ok(Self::Prague),
            _ => Err(Error::Config(format!("unsupported hardfork '{s}'"))),
        }
    }
}

fn parse<T: FromStr>(key: &str, value: String) -> Result<T, Error> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid value for {key}: '{value}'")))
}

impl Config {
    /// Reads `RETROCALL_*` variables, after loading `.env` if present.
    pub fn from_env() -> Result<Self, Error> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whichever keys `lookup` resolves.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        macro_rules! set {
            ($key:literal => $field:expr) => {
                if let Some(value) = get($key) {
                    $field = parse($key, value)?;
                }
            };
        }

        set!("RETROCALL_CACHE_MAX_ENTRIES_PER_CONTRACT" => config.cache.max_entries_per_contract);
        set!("RETROCALL_CACHE_MAX_CONTRACTS" => config.cache.max_contracts);
        set!("RETROCALL_CACHE_BATCH_ENABLED" => config.cache.batch_enabled);
        set!("RETROCALL_CACHE_BATCH_SIZE" => config.cache.batch_size);
        if let Some(value) = get("RETROCALL_CACHE_EXPIRE_SECS") {
            config.cache.expire_after_access =
                Duration::from_secs(parse("RETROCALL_CACHE_EXPIRE_SECS", value)?);
        }

        set!("RETROCALL_THROTTLE_GAS_CAPACITY" => config.throttle.gas_capacity);
        set!("RETROCALL_THROTTLE_REFUND_PERCENT" => config.throttle.refund_percent);
        set!("RETROCALL_THROTTLE_REFILL_PER_SECOND" => config.throttle.refill_per_second);

        set!("RETROCALL_ESTIMATE_GAS_CEILING" => config.estimate.gas_ceiling);
        set!("RETROCALL_ESTIMATE_PRECISION" => config.estimate.precision);
        set!("RETROCALL_ESTIMATE_MAX_ATTEMPTS" => config.estimate.max_attempts);

        set!("RETROCALL_TRACE_STACK" => config.trace.stack);
        set!("RETROCALL_TRACE_MEMORY" => config.trace.memory);
        set!("RETROCALL_TRACE_STORAGE" => config.trace.storage);

        set!("RETROCALL_EVM_CHAIN_ID" => config.evm.chain_id);
        set!("RETROCALL_EVM_TOKEN_CALL_GAS" => config.evm.token_call_gas);
        set!("RETROCALL_EVM_SPEC" => config.evm.spec);

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.throttle.refund_percent > 100 {
            return Err(Error::Config(format!(
                "refund_percent must be at most 100, got {}",
                self.throttle.refund_percent
            )));
        }
        if let Precision::Percent(pct) = self.estimate.precision
            && pct > 100
        {
            return Err(Error::Config(format!(
                "precision percent must be at most 100, got {pct}"
            )));
        }
        if self.cache.max_entries_per_contract == 0 || self.cache.max_contracts == 0 {
            return Err(Error::Config("cache capacities must be non-zero".into()));
        }
        Ok(())
    }
}
