use async_trait::async_trait;
use tracing::{Instrument, error, info, info_span, warn};

use crate::{BoxTask, Task, TaskError};

/// Runs stages in order and stops at the first failure.
///
/// When a stage fails the fallback runs exactly once and the chain reports
/// `Ok(false)`. Stage errors are logged here and not propagated. A chain is a
/// [`Task`] itself, so chains nest.
pub struct TaskChain {
    name: String,
    stages: Vec<BoxTask>,
    fallback: BoxTask,
}

impl TaskChain {
    pub fn new(name: impl Into<String>, fallback: BoxTask) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            fallback,
        }
    }

    pub fn then(mut self, stage: BoxTask) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(&self) -> &[BoxTask] {
        &self.stages
    }

    async fn run_fallback(&self, failed_stage: &str) {
        let span = info_span!("task", name = %self.fallback.name());
        match self.fallback.run().instrument(span).await {
            Ok(outcome) => info!(
                chain = %self.name,
                failed_stage,
                fallback = %self.fallback.name(),
                outcome,
                "Fallback ran"
            ),
            Err(e) => error!(
                chain = %self.name,
                failed_stage,
                fallback = %self.fallback.name(),
                error = %e,
                "Fallback failed"
            ),
        }
    }
}

#[async_trait]
impl Task for TaskChain {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<bool, TaskError> {
        for (index, stage) in self.stages.iter().enumerate() {
            let span = info_span!("task", name = %stage.name());
            let succeeded = match stage.run().instrument(span).await {
                Ok(true) => true,
                Ok(false) => {
                    warn!(chain = %self.name, stage = %stage.name(), index, "Stage reported failure");
                    false
                }
                Err(e) => {
                    error!(chain = %self.name, stage = %stage.name(), index, error = %e, "Stage failed");
                    false
                }
            };

            if !succeeded {
                self.run_fallback(stage.name()).await;
                return Ok(false);
            }
        }

        info!(chain = %self.name, stages = self.stages.len(), "Chain completed");
        Ok(true)
    }
}
