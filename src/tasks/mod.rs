//! Concrete tasks for provisioning and maintaining the logging database.

pub mod availability;
pub mod clean_logs;
pub mod create_user;

pub use availability::CheckAvailabilityTask;
pub use clean_logs::{CleanLogsTask, PruneReport, retention_cutoff};
pub use create_user::CreateLogUserTask;
