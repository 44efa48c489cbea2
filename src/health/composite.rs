// src/health/composite.rs
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::{timeout_at, Duration, Instant};
use tracing::{debug, info, warn};

use super::checker::{CheckError, Checker};
use super::status::{HealthStatus, Info};
use crate::metrics::MetricsCollector;

pub(crate) struct CheckerEntry {
    pub(crate) name: String,
    pub(crate) checker: Arc<dyn Checker>,
}

/// Aggregates named checkers, evaluating them one after another.
///
/// The aggregate is up only if every registered checker reports up. Each
/// sub-result is stored in the aggregate's info under its checker name, and
/// the composite's own info is merged on top, winning any key collision.
#[derive(Default)]
pub struct CompositeChecker {
    pub(crate) checkers: Vec<CheckerEntry>,
    pub(crate) info: BTreeMap<String, Info>,
    pub(crate) deadline: Option<Duration>,
    pub(crate) metrics: Option<Arc<MetricsCollector>>,
}

impl CompositeChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a checker. Names are not deduplicated: the last checker
    /// registered under a name shadows earlier ones in the results.
    pub fn add_checker<C: Checker + 'static>(&mut self, name: impl Into<String>, checker: C) {
        self.checkers.push(CheckerEntry {
            name: name.into(),
            checker: Arc::new(checker),
        });
    }

    pub fn add_info(&mut self, key: impl Into<String>, value: impl Into<Info>) -> &mut Self {
        self.info.insert(key.into(), value.into());
        self
    }

    /// Bounds each cycle: checkers still pending when it expires count as down.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    /// Registered names in insertion order, duplicates included.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checkers.iter().map(|entry| entry.name.as_str())
    }

    pub(crate) fn merge_info(&self, aggregate: &mut HealthStatus) {
        for (key, value) in &self.info {
            aggregate.add_info(key.clone(), value.clone());
        }
    }

    pub(crate) fn finish_cycle(&self, mode: &str, aggregate: &HealthStatus, elapsed: Duration) {
        let down = aggregate
            .info()
            .values()
            .filter_map(Info::as_health)
            .filter(|health| health.is_down())
            .count();

        info!(
            "{} health check complete in {:?}: {} ({} checkers, {} down)",
            mode,
            elapsed,
            aggregate.status(),
            self.checkers.len(),
            down
        );

        if let Some(metrics) = &self.metrics {
            metrics.observe_cycle(mode, aggregate, elapsed);
        }
    }
}

/// Applies the down-latch for one sub-result: once any sub-result is down the
/// aggregate stays down for the rest of the cycle.
pub(crate) fn latch(aggregate: &mut HealthStatus, name: &str, result: &HealthStatus) {
    if !result.is_up() && !aggregate.is_down() {
        aggregate.down();
    }

    if result.is_up() {
        debug!("Checker {} is up", name);
    } else {
        warn!("Checker {} is down: {:?}", name, result.get("error"));
    }
}

fn record(aggregate: &mut HealthStatus, name: &str, result: HealthStatus) {
    latch(aggregate, name, &result);
    aggregate.add_info(name, result);
}

#[async_trait]
impl Checker for CompositeChecker {
    async fn check(&self) -> HealthStatus {
        let started = Instant::now();
        let expires = self.deadline.map(|deadline| (started + deadline, deadline));

        let mut aggregate = HealthStatus::new();
        aggregate.up();

        for entry in &self.checkers {
            let checker_started = Instant::now();
            let result = match expires {
                Some((expires, deadline)) => match timeout_at(expires, entry.checker.check()).await {
                    Ok(result) => result,
                    Err(_) => {
                        let error = CheckError::DeadlineExceeded(deadline);
                        if let Some(metrics) = &self.metrics {
                            metrics.record_fault(&entry.name, &error);
                        }
                        HealthStatus::from_error(&error)
                    }
                },
                None => entry.checker.check().await,
            };

            if let Some(metrics) = &self.metrics {
                metrics.observe_checker(&entry.name, &result, checker_started.elapsed());
            }
            record(&mut aggregate, &entry.name, result);
        }

        self.merge_info(&mut aggregate);
        self.finish_cycle("sequential", &aggregate, started.elapsed());
        aggregate
    }
}
