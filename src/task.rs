use std::future::Future;

use async_trait::async_trait;

use crate::TaskError;

/// An asynchronous, named unit of work.
///
/// `Ok(true)` is success, `Ok(false)` a logical failure and `Err` an
/// exceptional one. Implementations log their own failures before returning.
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<bool, TaskError>;
}

/// Task backed by a closure producing a fresh future per run.
pub struct FnTask<F> {
    name: String,
    f: F,
}

impl<F, Fut> FnTask<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, TaskError>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> Task for FnTask<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<bool, TaskError> {
        (self.f)().await
    }
}

/// Fallback marker: always succeeds, only leaves a trace in the log.
pub struct NoopTask {
    name: String,
}

impl NoopTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Task for NoopTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<bool, TaskError> {
        tracing::debug!(task = %self.name, "No-op task ran");
        Ok(true)
    }
}
