//! Runtime configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Bounds of the pacing controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Initial delay between blocks.
    pub baseline: Duration,
    pub floor: Duration,
    pub ceiling: Duration,
    /// Amount added or removed after each block.
    pub step: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            baseline: Duration::from_millis(100),
            floor: Duration::from_millis(50),
            ceiling: Duration::from_millis(1000),
            step: Duration::from_millis(50),
        }
    }
}

/// Configuration for a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Node JSON-RPC endpoint.
    pub rpc_url: String,
    /// `memory`, or a SQLite path / `sqlite:` URL.
    pub store_url: String,
    /// Table holding every item.
    pub table_name: String,
    /// Chain label written to the `CHAIN` attribute.
    pub chain: String,
    /// Resume override; wins when larger than `watermark + 1`.
    pub start_block: Option<u64>,
    /// RPC method used to fetch a block with its transactions.
    pub block_method: String,
    /// How often to snapshot council staking info. `None` disables it.
    pub council_interval: Option<Duration>,
    /// How long resolved token metadata stays cached.
    pub metadata_ttl: Duration,
    /// Delay between retries of failed node or store calls.
    pub retry_backoff: Duration,
    pub pacing: PacingConfig,
    /// Give up on a block after this many failed attempts. `None` retries forever.
    pub max_block_attempts: Option<u32>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8551".into(),
            store_url: "sqlite:tokensync.db".into(),
            table_name: "tokensync".into(),
            chain: "KAIA".into(),
            start_block: None,
            block_method: "eth_getBlockByNumber".into(),
            council_interval: Some(Duration::from_millis(900_000)),
            metadata_ttl: Duration::from_secs(3600),
            retry_backoff: Duration::from_millis(200),
            pacing: PacingConfig::default(),
            max_block_attempts: None,
        }
    }
}

impl SyncConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let rpc_url = var("RPC_URL")
            .or_else(|| var("BASE_NODE_RPC"))
            .ok_or_else(|| SyncError::Config("RPC_URL is not set".into()))?;

        let millis = |key: &str, default: Duration| -> Result<Duration, SyncError> {
            match var(key) {
                Some(v) => parse_num::<u64>(key, &v).map(Duration::from_millis),
                None => Ok(default),
            }
        };

        let council_interval = match var("GC_INFO_INTERVAL") {
            Some(v) => match parse_num::<u64>("GC_INFO_INTERVAL", &v)? {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            None => defaults.council_interval,
        };

        let cfg = Self {
            rpc_url,
            store_url: var("STORE_URL").unwrap_or(defaults.store_url),
            table_name: var("TABLE_NAME").unwrap_or(defaults.table_name),
            chain: var("CHAIN").unwrap_or(defaults.chain),
            start_block: var("START_BLOCK")
                .map(|v| parse_num::<u64>("START_BLOCK", &v))
                .transpose()?,
            block_method: var("BLOCK_METHOD").unwrap_or(defaults.block_method),
            council_interval,
            metadata_ttl: match var("METADATA_TTL_SECS") {
                Some(v) => Duration::from_secs(parse_num::<u64>("METADATA_TTL_SECS", &v)?),
                None => defaults.metadata_ttl,
            },
            retry_backoff: millis("RETRY_BACKOFF_MS", defaults.retry_backoff)?,
            pacing: PacingConfig {
                baseline: millis("PACING_BASELINE_MS", defaults.pacing.baseline)?,
                floor: millis("PACING_FLOOR_MS", defaults.pacing.floor)?,
                ceiling: millis("PACING_CEILING_MS", defaults.pacing.ceiling)?,
                step: millis("PACING_STEP_MS", defaults.pacing.step)?,
            },
            max_block_attempts: var("MAX_BLOCK_ATTEMPTS")
                .map(|v| parse_num::<u32>("MAX_BLOCK_ATTEMPTS", &v))
                .transpose()?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject inconsistent settings.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.pacing.floor > self.pacing.ceiling {
            return Err(SyncError::Config(format!(
                "pacing floor {:?} exceeds ceiling {:?}",
                self.pacing.floor, self.pacing.ceiling
            )));
        }
        if self.pacing.step.is_zero() {
            return Err(SyncError::Config("pacing step must be non-zero".into()));
        }
        if self.max_block_attempts == Some(0) {
            return Err(SyncError::Config("MAX_BLOCK_ATTEMPTS must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SyncError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| SyncError::Config(format!("{key}={value:?}: {e}")))
}
