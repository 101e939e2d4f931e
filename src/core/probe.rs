use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Answer of a read-only desired-state check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum ProbeStatus {
    Satisfied,
    Unsatisfied(String),
}

impl ProbeStatus {
    pub fn unsatisfied(detail: impl Into<String>) -> Self {
        Self::Unsatisfied(detail.into())
    }

    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }
}

/// Read-only check of whether a step's desired state already holds.
///
/// An `Err` means the check itself could not run (missing binary, permission
/// denied), which is different from `Unsatisfied`.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self) -> Result<ProbeStatus>;
}

/// Mutates the host so that the paired probe becomes satisfied.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn apply(&self) -> Result<()>;
}

/// A probe/executor pair with a default human-readable description.
pub trait Resource: Probe + Executor {
    fn describe(&self) -> String;
}

#[async_trait]
impl<T: Probe + ?Sized> Probe for Arc<T> {
    async fn check(&self) -> Result<ProbeStatus> {
        (**self).check().await
    }
}

#[async_trait]
impl<T: Executor + ?Sized> Executor for Arc<T> {
    async fn apply(&self) -> Result<()> {
        (**self).apply().await
    }
}

// ── Closure adapters ─────────────────────────────────────────────

pub struct FnProbe<F>(F);

pub fn probe_fn<F, Fut>(f: F) -> FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<ProbeStatus>> + Send + 'static,
{
    FnProbe(f)
}

#[async_trait]
impl<F, Fut> Probe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<ProbeStatus>> + Send + 'static,
{
    async fn check(&self) -> Result<ProbeStatus> {
        (self.0)().await
    }
}

pub struct FnExecutor<F>(F);

pub fn executor_fn<F, Fut>(f: F) -> FnExecutor<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    FnExecutor(f)
}

#[async_trait]
impl<F, Fut> Executor for FnExecutor<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn apply(&self) -> Result<()> {
        (self.0)().await
    }
}

// ── Retry wrapper ────────────────────────────────────────────────

/// Re-runs a failing executor up to `attempts` times with a fixed backoff.
///
/// The runner never retries on its own; callers opt in per step.
pub struct Retry<E> {
    inner: E,
    attempts: u32,
    backoff: Duration,
}

impl<E: Executor> Retry<E> {
    pub fn new(inner: E, attempts: u32, backoff: Duration) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            backoff,
        }
    }
}

#[async_trait]
impl<E: Executor> Executor for Retry<E> {
    async fn apply(&self) -> Result<()> {
        let mut attempt = 1_u32;
        loop {
            match self.inner.apply().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.attempts,
                        "executor failed, retrying: {e:#}"
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e.context(format!("gave up after {attempt} attempt(s)")));
                }
            }
        }
    }
}
