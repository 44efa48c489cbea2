// src/metrics/collector.rs
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

use crate::health::{CheckError, HealthStatus};

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    /// Renders every registered metric in the Prometheus text format.
    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // Per-checker metrics
    pub checker_status: IntGaugeVec,
    pub checker_duration_seconds: HistogramVec,
    pub checker_faults_total: IntCounterVec,

    // Cycle metrics
    pub cycles_total: IntCounterVec,
    pub cycle_duration_seconds: HistogramVec,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let checker_status = IntGaugeVec::new(
            Opts::new(
                "health_checker_status",
                "Last reported checker status (1=up, 0=down)",
            ),
            &["checker"],
        )?;
        registry.register(Box::new(checker_status.clone()))?;

        let checker_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "health_checker_duration_seconds",
                "Time taken by a single checker",
            ),
            &["checker"],
        )?;
        registry.register(Box::new(checker_duration_seconds.clone()))?;

        let checker_faults_total = IntCounterVec::new(
            Opts::new(
                "health_checker_faults_total",
                "Checkers that panicked or missed the deadline",
            ),
            &["checker", "kind"],
        )?;
        registry.register(Box::new(checker_faults_total.clone()))?;

        let cycles_total = IntCounterVec::new(
            Opts::new("health_cycles_total", "Completed aggregate check cycles"),
            &["mode", "status"],
        )?;
        registry.register(Box::new(cycles_total.clone()))?;

        let cycle_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "health_cycle_duration_seconds",
                "Aggregate check cycle duration",
            ),
            &["mode"],
        )?;
        registry.register(Box::new(cycle_duration_seconds.clone()))?;

        Ok(Self {
            checker_status,
            checker_duration_seconds,
            checker_faults_total,
            cycles_total,
            cycle_duration_seconds,
        })
    }

    pub fn observe_checker(&self, checker: &str, health: &HealthStatus, duration: Duration) {
        let value = if health.is_up() { 1 } else { 0 };
        self.checker_status.with_label_values(&[checker]).set(value);

        self.checker_duration_seconds
            .with_label_values(&[checker])
            .observe(duration.as_secs_f64());
    }

    pub fn record_fault(&self, checker: &str, error: &CheckError) {
        self.checker_faults_total
            .with_label_values(&[checker, error.kind()])
            .inc();
    }

    pub fn observe_cycle(&self, mode: &str, health: &HealthStatus, duration: Duration) {
        let status = health.status().to_string();
        self.cycles_total
            .with_label_values(&[mode, status.as_str()])
            .inc();

        self.cycle_duration_seconds
            .with_label_values(&[mode])
            .observe(duration.as_secs_f64());
    }
}
