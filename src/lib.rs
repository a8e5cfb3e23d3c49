pub mod application;
pub mod chain;
pub mod clock;
pub mod config;
pub mod mongo;
pub mod retry;
pub mod runtime;
pub mod schedule;
pub mod store;
pub mod task;
pub mod tasks;

pub use application::{Application, StartApplicationTask};
pub use chain::TaskChain;
pub use clock::{Clock, SystemClock};
pub use config::{ConfigError, MongoConnection, MongoUser, WardenConfig};
pub use retry::{RetriableTask, RetryPolicy};
pub use runtime::Runtime;
pub use schedule::{OverlapPolicy, ScheduledApplication};
pub use store::{DocumentStore, StoreClient, StoreError};
pub use task::{FnTask, NoopTask, Task};

use std::sync::Arc;
use thiserror::Error;

pub type BoxTask = Arc<dyn Task>;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),
    #[error("Server unreachable: {0}")]
    Unreachable(String),
    #[error("Invalid cron schedule: {0}")]
    InvalidSchedule(String),
    #[error("Invalid task configuration: {0}")]
    Config(String),
    #[error("Task execution failed: {0}")]
    Execution(String),
    #[error("Task {task} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        task: String,
        attempts: u32,
        #[source]
        last: Box<TaskError>,
    },
}
