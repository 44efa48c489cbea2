// src/health/concurrent.rs
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Duration, Instant};
use tracing::error;

use super::checker::{CheckError, Checker};
use super::composite::{latch, CompositeChecker};
use super::status::{HealthStatus, Info};
use crate::metrics::MetricsCollector;

/// Same aggregation as [`CompositeChecker`], but every checker runs in its
/// own Tokio task so a cycle takes as long as the slowest checker.
///
/// A checker that panics is recorded as down (`error_kind = "panic"`); its
/// siblings still complete. Dropping the `check()` future aborts every
/// checker task of that cycle.
#[derive(Default)]
pub struct ConcurrentCompositeChecker {
    base: CompositeChecker,
}

impl ConcurrentCompositeChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_checker<C: Checker + 'static>(&mut self, name: impl Into<String>, checker: C) {
        self.base.add_checker(name, checker);
    }

    pub fn add_info(&mut self, key: impl Into<String>, value: impl Into<Info>) -> &mut Self {
        self.base.add_info(key, value);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.base = self.base.with_deadline(deadline);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.base = self.base.with_metrics(metrics);
        self
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.base.deadline()
    }

    pub fn len(&self) -> usize {
        self.base.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.base.names()
    }
}

/// In-progress state shared by the tasks of one cycle.
#[derive(Default)]
struct Cycle {
    aggregate: HealthStatus,
    // Registration index of the entry currently stored under each name.
    writers: HashMap<String, usize>,
}

impl Cycle {
    fn record(&mut self, index: usize, name: &str, result: HealthStatus) {
        latch(&mut self.aggregate, name, &result);

        // Tasks finish in any order; a later registration still shadows an
        // earlier one with the same name.
        if self.writers.get(name).map_or(true, |&writer| index > writer) {
            self.writers.insert(name.to_string(), index);
            self.aggregate.add_info(name, result);
        }
    }
}

async fn run_checker(
    checker: Arc<dyn Checker>,
    name: &str,
    expires: Option<(Instant, Duration)>,
    metrics: Option<&MetricsCollector>,
) -> HealthStatus {
    let started = Instant::now();
    let result = match expires {
        Some((expires, deadline)) => match timeout_at(expires, checker.check()).await {
            Ok(result) => result,
            Err(_) => {
                let fault = CheckError::DeadlineExceeded(deadline);
                error!("Checker {} did not finish: {}", name, fault);
                if let Some(metrics) = metrics {
                    metrics.record_fault(name, &fault);
                }
                HealthStatus::from_error(&fault)
            }
        },
        None => checker.check().await,
    };

    if let Some(metrics) = metrics {
        metrics.observe_checker(name, &result, started.elapsed());
    }
    result
}

#[async_trait]
impl Checker for ConcurrentCompositeChecker {
    async fn check(&self) -> HealthStatus {
        let started = Instant::now();
        // One deadline for the whole cycle, however late a task gets polled.
        let expires = self.base.deadline.map(|deadline| (started + deadline, deadline));

        let mut cycle = Cycle::default();
        cycle.aggregate.up();
        let shared = Arc::new(Mutex::new(cycle));

        // Tasks are aborted if this future is dropped before the barrier.
        let mut tasks = JoinSet::new();
        let mut indices = HashMap::with_capacity(self.base.checkers.len());
        for (index, entry) in self.base.checkers.iter().enumerate() {
            let checker = entry.checker.clone();
            let name = entry.name.clone();
            let metrics = self.base.metrics.clone();
            let shared = shared.clone();

            let handle = tasks.spawn(async move {
                let result = run_checker(checker, &name, expires, metrics.as_deref()).await;

                let mut cycle = shared.lock().await;
                cycle.record(index, &name, result);
            });
            indices.insert(handle.id(), index);
        }

        // Barrier: every task has either recorded its result or failed.
        let mut failures = Vec::new();
        while let Some(outcome) = tasks.join_next().await {
            if let Err(join_error) = outcome {
                match indices.get(&join_error.id()) {
                    Some(&index) => failures.push((index, CheckError::from_join_error(join_error))),
                    None => error!("Unknown checker task failed: {}", join_error),
                }
            }
        }

        let mut cycle = shared.lock().await;
        for (index, fault) in failures {
            let entry = &self.base.checkers[index];
            error!("Checker {} failed: {}", entry.name, fault);

            let result = HealthStatus::from_error(&fault);
            if let Some(metrics) = &self.base.metrics {
                metrics.record_fault(&entry.name, &fault);
                metrics.observe_checker(&entry.name, &result, started.elapsed());
            }
            cycle.record(index, &entry.name, result);
        }
        let mut aggregate = std::mem::take(&mut cycle.aggregate);
        drop(cycle);

        self.base.merge_info(&mut aggregate);
        self.base.finish_cycle("concurrent", &aggregate, started.elapsed());
        aggregate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::CheckerFn;
    use crate::metrics::MetricsRegistry;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn delayed(millis: u64, up: bool) -> impl Checker {
        CheckerFn::new(move || async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            if up {
                HealthStatus::healthy()
            } else {
                HealthStatus::unhealthy()
            }
        })
    }

    fn explode() -> HealthStatus {
        panic!("checker exploded")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_all_up() {
        let mut composite = ConcurrentCompositeChecker::new();
        composite.add_checker("db", delayed(20, true));
        composite.add_checker("cache", delayed(5, true));

        let health = composite.check().await;
        assert!(health.is_up());
        assert_eq!(health.info().len(), 2);
        assert!(health.get("db").and_then(Info::as_health).unwrap().is_up());
        assert!(health.get("cache").and_then(Info::as_health).unwrap().is_up());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_down_latches() {
        let mut composite = ConcurrentCompositeChecker::new();
        composite.add_checker("db", delayed(5, false));
        composite.add_checker("cache", delayed(30, true));

        let health = composite.check().await;
        assert!(health.is_down());
        assert!(health.get("db").and_then(Info::as_health).unwrap().is_down());
        assert!(health.get("cache").and_then(Info::as_health).unwrap().is_up());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_extra_info_wins_collisions() {
        let mut composite = ConcurrentCompositeChecker::new();
        composite.add_checker("db", delayed(1, true));
        composite.add_info("region", "us-east").add_info("db", 42);

        let health = composite.check().await;
        assert_eq!(
            health.get("region").and_then(Info::as_value),
            Some(&json!("us-east"))
        );
        assert_eq!(health.get("db").and_then(Info::as_value), Some(&json!(42)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_runs_checkers_in_parallel() {
        let mut composite = ConcurrentCompositeChecker::new();
        for index in 0..10 {
            composite.add_checker(format!("slow-{}", index), delayed(200, true));
        }

        let started = std::time::Instant::now();
        let health = composite.check().await;

        assert!(health.is_up());
        assert_eq!(health.info().len(), 10);
        assert!(started.elapsed() < Duration::from_millis(1500));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_panic_is_isolated() {
        let mut composite = ConcurrentCompositeChecker::new();
        composite.add_checker("db", delayed(10, true));
        composite.add_checker("broken", CheckerFn::new(|| async { explode() }));
        composite.add_checker("cache", delayed(30, true));

        let health = composite.check().await;
        assert!(health.is_down());
        assert_eq!(health.info().len(), 3);
        assert!(health.get("db").and_then(Info::as_health).unwrap().is_up());
        assert!(health.get("cache").and_then(Info::as_health).unwrap().is_up());

        let broken = health.get("broken").and_then(Info::as_health).unwrap();
        assert!(broken.is_down());
        assert_eq!(
            broken.get("error_kind").and_then(Info::as_value),
            Some(&json!("panic"))
        );
        assert_eq!(
            broken.get("error").and_then(Info::as_value),
            Some(&json!("Checker panicked: checker exploded"))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_deadline_marks_slow_checker_down() {
        let mut composite =
            ConcurrentCompositeChecker::new().with_deadline(Duration::from_millis(100));
        composite.add_checker("fast", delayed(1, true));
        composite.add_checker("hanging", delayed(30_000, true));

        let started = std::time::Instant::now();
        let health = composite.check().await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(health.is_down());
        assert!(health.get("fast").and_then(Info::as_health).unwrap().is_up());
        let hanging = health.get("hanging").and_then(Info::as_health).unwrap();
        assert_eq!(
            hanging.get("error_kind").and_then(Info::as_value),
            Some(&json!("timeout"))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_duplicate_names_last_registered_wins() {
        let mut composite = ConcurrentCompositeChecker::new();
        // The shadowed checker finishes last but must not overwrite the entry.
        composite.add_checker("db", delayed(50, false));
        composite.add_checker("db", delayed(1, true));

        assert_eq!(composite.len(), 2);
        let health = composite.check().await;
        assert_eq!(health.info().len(), 1);
        assert!(health.get("db").and_then(Info::as_health).unwrap().is_up());
        assert!(health.is_down());
    }

    #[tokio::test]
    async fn test_empty_composite_is_up() {
        let composite = ConcurrentCompositeChecker::new();
        assert!(composite.is_empty());

        let health = composite.check().await;
        assert!(health.is_up());
        assert!(health.info().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_panic_after_success_resets_status_gauge() {
        let registry = MetricsRegistry::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut composite = ConcurrentCompositeChecker::new().with_metrics(registry.collector());
        let counter = calls.clone();
        composite.add_checker(
            "flaky",
            CheckerFn::new(move || {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call == 0 {
                        HealthStatus::healthy()
                    } else {
                        explode()
                    }
                }
            }),
        );

        let metrics = registry.collector();
        assert!(composite.check().await.is_up());
        assert_eq!(metrics.checker_status.with_label_values(&["flaky"]).get(), 1);

        assert!(composite.check().await.is_down());
        assert_eq!(metrics.checker_status.with_label_values(&["flaky"]).get(), 0);
        assert_eq!(
            metrics
                .checker_faults_total
                .with_label_values(&["flaky", "panic"])
                .get(),
            1
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_dropping_check_aborts_checker_tasks() {
        let finished = Arc::new(AtomicUsize::new(0));

        let mut composite = ConcurrentCompositeChecker::new();
        let counter = finished.clone();
        composite.add_checker(
            "slow",
            CheckerFn::new(move || {
                let counter = counter.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    HealthStatus::healthy()
                }
            }),
        );

        for _ in 0..5 {
            let outcome = tokio::time::timeout(Duration::from_millis(20), composite.check()).await;
            assert!(outcome.is_err());
        }

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_deadline_counts_from_cycle_start() {
        let mut composite =
            ConcurrentCompositeChecker::new().with_deadline(Duration::from_millis(120));
        // On the current-thread runtime this task holds the only worker, so
        // the next task is first polled after the deadline has passed.
        composite.add_checker(
            "blocking",
            CheckerFn::new(|| async {
                std::thread::sleep(Duration::from_millis(150));
                HealthStatus::healthy()
            }),
        );
        composite.add_checker("late", delayed(50, true));

        let health = composite.check().await;
        assert!(health.get("blocking").and_then(Info::as_health).unwrap().is_up());

        let late = health.get("late").and_then(Info::as_health).unwrap();
        assert!(late.is_down());
        assert_eq!(
            late.get("error_kind").and_then(Info::as_value),
            Some(&json!("timeout"))
        );
    }
}
