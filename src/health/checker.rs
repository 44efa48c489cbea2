// src/health/checker.rs
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::status::HealthStatus;

/// Anything that can report the health of one subsystem.
///
/// A checker that cannot reach its target should return a down
/// [`HealthStatus`] explaining why instead of panicking. Aggregators only
/// catch panics in the concurrent variant.
#[async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self) -> HealthStatus;
}

#[async_trait]
impl<C: Checker + ?Sized> Checker for Arc<C> {
    async fn check(&self) -> HealthStatus {
        (**self).check().await
    }
}

#[async_trait]
impl<C: Checker + ?Sized> Checker for Box<C> {
    async fn check(&self) -> HealthStatus {
        (**self).check().await
    }
}

/// Adapts an async closure into a [`Checker`].
pub struct CheckerFn<F> {
    f: F,
}

impl<F, Fut> CheckerFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = HealthStatus> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Checker for CheckerFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = HealthStatus> + Send + 'static,
{
    async fn check(&self) -> HealthStatus {
        (self.f)().await
    }
}

/// Faults an aggregator converts into down results on the checker's behalf.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CheckError {
    #[error("Checker panicked: {0}")]
    Panicked(String),

    #[error("Deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("Checker task was cancelled")]
    Cancelled,
}

impl CheckError {
    /// Short tag stored under `error_kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckError::Panicked(_) => "panic",
            CheckError::DeadlineExceeded(_) => "timeout",
            CheckError::Cancelled => "cancelled",
        }
    }

    pub(crate) fn from_join_error(error: tokio::task::JoinError) -> Self {
        if error.is_cancelled() {
            return CheckError::Cancelled;
        }

        let payload = error.into_panic();
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "unknown panic payload".to_string()
        };
        CheckError::Panicked(message)
    }
}
