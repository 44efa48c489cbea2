// src/lib.rs
pub mod config;
pub mod health;
pub mod metrics;

pub use health::{
    Aggregator, CheckError, Checker, CheckerFn, CompositeChecker, ConcurrentCompositeChecker,
    HealthStatus, Info, Status,
};
