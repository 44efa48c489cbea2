// src/health/aggregator.rs
use async_trait::async_trait;
use std::sync::Arc;

use super::checker::Checker;
use super::composite::CompositeChecker;
use super::concurrent::ConcurrentCompositeChecker;
use super::status::{HealthStatus, Info};
use crate::config::{CheckMode, Config};
use crate::metrics::MetricsCollector;

/// A composite whose evaluation strategy is picked at wiring time.
pub enum Aggregator {
    Sequential(CompositeChecker),
    Concurrent(ConcurrentCompositeChecker),
}

impl Aggregator {
    pub fn new(mode: CheckMode) -> Self {
        match mode {
            CheckMode::Sequential => Aggregator::Sequential(CompositeChecker::new()),
            CheckMode::Concurrent => Aggregator::Concurrent(ConcurrentCompositeChecker::new()),
        }
    }

    /// Builds an empty aggregator with the configured mode, deadline and info.
    pub fn from_config(config: &Config) -> Self {
        let mut aggregator = Self::new(config.mode);

        if let Some(deadline) = config.deadline() {
            aggregator = match aggregator {
                Aggregator::Sequential(c) => Aggregator::Sequential(c.with_deadline(deadline)),
                Aggregator::Concurrent(c) => Aggregator::Concurrent(c.with_deadline(deadline)),
            };
        }

        for (key, value) in &config.info {
            aggregator.add_info(key.clone(), value.clone());
        }

        tracing::debug!(
            "Configured {:?} aggregator (deadline: {:?}, {} info entries)",
            config.mode,
            config.deadline(),
            config.info.len()
        );
        aggregator
    }

    pub fn mode(&self) -> CheckMode {
        match self {
            Aggregator::Sequential(_) => CheckMode::Sequential,
            Aggregator::Concurrent(_) => CheckMode::Concurrent,
        }
    }

    pub fn add_checker<C: Checker + 'static>(&mut self, name: impl Into<String>, checker: C) {
        match self {
            Aggregator::Sequential(c) => c.add_checker(name, checker),
            Aggregator::Concurrent(c) => c.add_checker(name, checker),
        }
    }

    pub fn add_info(&mut self, key: impl Into<String>, value: impl Into<Info>) -> &mut Self {
        match self {
            Aggregator::Sequential(c) => {
                c.add_info(key, value);
            }
            Aggregator::Concurrent(c) => {
                c.add_info(key, value);
            }
        }
        self
    }

    pub fn with_metrics(self, metrics: Arc<MetricsCollector>) -> Self {
        match self {
            Aggregator::Sequential(c) => Aggregator::Sequential(c.with_metrics(metrics)),
            Aggregator::Concurrent(c) => Aggregator::Concurrent(c.with_metrics(metrics)),
        }
    }

    pub fn deadline(&self) -> Option<std::time::Duration> {
        match self {
            Aggregator::Sequential(c) => c.deadline(),
            Aggregator::Concurrent(c) => c.deadline(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Aggregator::Sequential(c) => c.len(),
            Aggregator::Concurrent(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Checker for Aggregator {
    async fn check(&self) -> HealthStatus {
        match self {
            Aggregator::Sequential(c) => c.check().await,
            Aggregator::Concurrent(c) => c.check().await,
        }
    }
}
