// src/health/mod.rs
mod aggregator;
mod checker;
mod composite;
mod concurrent;
mod status;

pub use aggregator::Aggregator;
pub use checker::{CheckError, Checker, CheckerFn};
pub use composite::CompositeChecker;
pub use concurrent::ConcurrentCompositeChecker;
pub use status::{HealthStatus, Info, Status};
