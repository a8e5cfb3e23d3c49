use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::{Task, TaskError};

/// A long-lived component with a start/stop lifecycle.
#[async_trait]
pub trait Application: Send + Sync {
    fn name(&self) -> &str;

    /// Returns once the application is armed; its work runs in the background.
    async fn start(&self) -> Result<(), TaskError>;

    /// Returns `true` if the application was running.
    async fn stop(&self) -> Result<bool, TaskError>;
}

/// Adapts [`Application::start`] into a [`Task`] so it can be chained.
pub struct StartApplicationTask {
    name: String,
    application: Arc<dyn Application>,
}

impl StartApplicationTask {
    pub fn new(name: impl Into<String>, application: Arc<dyn Application>) -> Self {
        Self {
            name: name.into(),
            application,
        }
    }
}

#[async_trait]
impl Task for StartApplicationTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<bool, TaskError> {
        match self.application.start().await {
            Ok(()) => {
                info!(application = %self.application.name(), "Application started");
                Ok(true)
            }
            Err(e) => {
                error!(application = %self.application.name(), error = %e, "Failed to start application");
                Err(e)
            }
        }
    }
}
