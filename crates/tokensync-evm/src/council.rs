//! Council staking snapshot (`GC_INFO`).
//!
//! Runs at most once per interval from the driver loop. Failures are logged
//! and never stop block processing.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokensync_core::record::council_item;
use tokensync_core::{KvStore, SyncError};
use tokensync_rpc::NodeClient;

/// Raw `kaia_getStakingInfo` fields used for aggregation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StakingInfo {
    #[serde(default)]
    council_staking_addrs: Vec<String>,
    #[serde(default)]
    council_reward_addrs: Vec<String>,
    #[serde(default)]
    council_staking_amounts: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delegate {
    pub delegate_addr: String,
    pub staking: f64,
}

/// Stake grouped under one reward address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouncilMember {
    pub total_staking: f64,
    pub delegates: Vec<Delegate>,
}

/// Group staking entries by reward address.
pub fn aggregate(info: &Value) -> Result<BTreeMap<String, CouncilMember>, SyncError> {
    let info: StakingInfo = serde_json::from_value(info.clone())
        .map_err(|e| SyncError::Payload(format!("staking info: {e}")))?;

    let mut members: BTreeMap<String, CouncilMember> = BTreeMap::new();
    for (i, reward) in info.council_reward_addrs.iter().enumerate() {
        let staking = info.council_staking_amounts.get(i).copied().unwrap_or_default();
        let member = members.entry(reward.clone()).or_default();
        member.total_staking += staking;
        member.delegates.push(Delegate {
            delegate_addr: info.council_staking_addrs.get(i).cloned().unwrap_or_default(),
            staking,
        });
    }
    Ok(members)
}

pub struct CouncilPoller {
    node: NodeClient,
    store: Arc<dyn KvStore>,
    chain: String,
    interval: Option<Duration>,
    last_run: Option<Instant>,
}

impl CouncilPoller {
    /// `interval = None` disables polling.
    pub fn new(
        node: NodeClient,
        store: Arc<dyn KvStore>,
        chain: impl Into<String>,
        interval: Option<Duration>,
    ) -> Self {
        Self {
            node,
            store,
            chain: chain.into(),
            interval,
            last_run: None,
        }
    }

    fn due(&self) -> bool {
        match (self.interval, self.last_run) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(every), Some(at)) => at.elapsed() >= every,
        }
    }

    /// Poll if the interval has elapsed. Returns `true` when a snapshot was
    /// attempted.
    pub async fn maybe_poll(&mut self) -> bool {
        if !self.due() {
            return false;
        }
        self.last_run = Some(Instant::now());
        if let Err(e) = self.poll().await {
            tracing::warn!(error = %e, "council info snapshot failed");
        }
        true
    }

    /// Fetch, aggregate and store one snapshot.
    pub async fn poll(&self) -> Result<(), SyncError> {
        let info = self
            .node
            .staking_info()
            .await
            .map_err(|e| SyncError::Rpc(e.to_string()))?;
        let members = aggregate(&info)?;
        let payload =
            serde_json::to_value(&members).map_err(|e| SyncError::Payload(e.to_string()))?;
        self.store
            .put_item(council_item(&payload, chrono::Utc::now().timestamp(), &self.chain)?)
            .await?;
        tracing::info!(members = members.len(), "council info stored");
        Ok(())
    }
}
