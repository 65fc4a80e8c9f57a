//! Group/raid tunables loaded from data/config/group.toml with env overrides.

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct GroupCfg {
    /// Seconds a disconnected leader keeps their position before the first
    /// online member is promoted.
    pub leader_grace_secs: Option<u64>,
    /// Voting window for a loot roll, in milliseconds.
    pub roll_timeout_ms: Option<u64>,
    /// Fixed seed for the roll RNG. Unset means seed from entropy.
    pub roll_seed: Option<u64>,
}

impl Default for GroupCfg {
    fn default() -> Self {
        Self {
            leader_grace_secs: Some(180),
            roll_timeout_ms: Some(60_000),
            roll_seed: None,
        }
    }
}

impl GroupCfg {
    pub fn leader_grace_secs(&self) -> u64 {
        self.leader_grace_secs.unwrap_or(180)
    }
    pub fn roll_timeout_ms(&self) -> u64 {
        self.roll_timeout_ms.unwrap_or(60_000)
    }
}

pub fn load_default() -> Result<GroupCfg> {
    let path = crate::data_root().join("config/group.toml");
    let mut cfg = if path.is_file() {
        let txt = std::fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        toml::from_str::<GroupCfg>(&txt).context("parse group TOML")?
    } else {
        GroupCfg::default()
    };
    if let Some(v) = std::env::var("LEADER_GRACE_SECS").ok().and_then(|v| v.parse().ok()) {
        cfg.leader_grace_secs = Some(v);
    }
    if let Some(v) = std::env::var("ROLL_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()) {
        cfg.roll_timeout_ms = Some(v);
    }
    if let Some(v) = std::env::var("ROLL_SEED").ok().and_then(|v| v.parse().ok()) {
        cfg.roll_seed = Some(v);
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = GroupCfg::default();
        assert_eq!(cfg.leader_grace_secs(), 180);
        assert_eq!(cfg.roll_timeout_ms(), 60_000);
        assert!(cfg.roll_seed.is_none());
    }

    #[test]
    fn parses_partial_toml() {
        let cfg: GroupCfg = toml::from_str("roll_timeout_ms = 5000").unwrap();
        assert_eq!(cfg.roll_timeout_ms(), 5000);
        assert_eq!(cfg.leader_grace_secs(), 180);
    }
}
