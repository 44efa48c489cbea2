// src/config/models.rs
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckMode {
    Sequential,
    #[default]
    Concurrent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mode: CheckMode,

    /// Upper bound for one check cycle. Unset means wait for every checker.
    #[serde(default)]
    pub deadline_ms: Option<u64>,

    /// Static metadata merged into every aggregate.
    #[serde(default)]
    pub info: BTreeMap<String, serde_json::Value>,
}

impl Config {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.deadline_ms == Some(0) {
            bail!("deadline_ms must be greater than zero");
        }

        if self.info.keys().any(|key| key.trim().is_empty()) {
            bail!("info keys must not be empty");
        }

        Ok(())
    }
}
