use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{Instrument, info_span, warn};

use crate::{BoxTask, Task, TaskError};

/// Bounded retry with a constant delay between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// Treat `Ok(false)` as retryable instead of terminal.
    pub retry_on_false: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::from_secs(1),
            retry_on_false: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            retry_on_false: false,
        }
    }

    pub fn retry_on_false(mut self, retry: bool) -> Self {
        self.retry_on_false = retry;
        self
    }
}

/// Decorates a task with [`RetryPolicy`].
pub struct RetriableTask {
    name: String,
    inner: BoxTask,
    policy: RetryPolicy,
}

impl RetriableTask {
    pub fn new(name: impl Into<String>, inner: BoxTask, policy: RetryPolicy) -> Self {
        let mut policy = policy;
        if policy.max_attempts == 0 {
            policy.max_attempts = 1;
        }

        Self {
            name: name.into(),
            inner,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl Task for RetriableTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<bool, TaskError> {
        let max_attempts = self.policy.max_attempts;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let span = info_span!("task", name = %self.inner.name(), attempt);
            match self.inner.run().instrument(span).await {
                Ok(true) => return Ok(true),
                Ok(false) if !self.policy.retry_on_false => {
                    warn!(
                        task = %self.name,
                        attempt,
                        "Inner task reported failure, not retrying"
                    );
                    return Ok(false);
                }
                Ok(false) => {
                    last_error = Some(TaskError::Execution(format!(
                        "{} reported failure",
                        self.inner.name()
                    )));
                }
                Err(e) => {
                    warn!(
                        task = %self.name,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Attempt failed"
                    );
                    last_error = Some(e);
                }
            }

            if attempt == max_attempts {
                break;
            }

            sleep(self.policy.delay).await;
        }

        let last = last_error
            .unwrap_or_else(|| TaskError::Execution(format!("{} never ran", self.inner.name())));

        Err(TaskError::RetriesExhausted {
            task: self.name.clone(),
            attempts: max_attempts,
            last: Box::new(last),
        })
    }
}
