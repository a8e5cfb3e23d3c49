use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{Clock, DocumentStore, MongoConnection, MongoUser, Task, TaskError};

/// Start of the current UTC day minus `days_to_keep` days, `None` if that
/// falls outside the representable date range.
pub fn retention_cutoff(now: DateTime<Utc>, days_to_keep: u32) -> Option<DateTime<Utc>> {
    let midnight = Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN));
    midnight.checked_sub_signed(TimeDelta::try_days(i64::from(days_to_keep))?)
}

/// Outcome of one pruning pass.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PruneReport {
    pub cutoff: DateTime<Utc>,
    pub deleted: BTreeMap<String, u64>,
    pub failed: Vec<String>,
}

impl PruneReport {
    pub fn total_deleted(&self) -> u64 {
        self.deleted.values().sum()
    }
}

/// Deletes expired records from every collection of the logging database.
///
/// Collections are pruned concurrently and a failure in one does not stop the
/// others. The run reports `Ok(true)` only when every collection was pruned.
pub struct CleanLogsTask {
    name: String,
    store: Arc<dyn DocumentStore>,
    connection: MongoConnection,
    user: MongoUser,
    days_to_keep: u32,
    clock: Arc<dyn Clock>,
}

impl CleanLogsTask {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn DocumentStore>,
        connection: MongoConnection,
        user: MongoUser,
        days_to_keep: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            connection,
            user,
            days_to_keep,
            clock,
        }
    }

    pub async fn prune(&self) -> Result<PruneReport, TaskError> {
        let Some(cutoff) = retention_cutoff(self.clock.now(), self.days_to_keep) else {
            error!(days_to_keep = self.days_to_keep, "Retention window out of range");
            return Err(TaskError::Config(format!(
                "retention of {} days is out of range",
                self.days_to_keep
            )));
        };
        debug!(days_to_keep = self.days_to_keep, cutoff = %cutoff, "Attempting to clean logs");

        let client = self
            .store
            .connect(&self.connection, &self.user)
            .await
            .inspect_err(|e| {
                error!(
                    host = %self.connection.host,
                    port = self.connection.port,
                    user = %self.user.username,
                    error = %e,
                    "Failed to connect for log cleanup"
                )
            })?;

        let collections = match client.list_collections().await {
            Ok(collections) => collections,
            Err(e) => {
                error!(
                    host = %self.connection.host,
                    user = %self.user.username,
                    error = %e,
                    "Failed to list collections"
                );
                client.close().await;
                return Err(e.into());
            }
        };

        let outcomes = {
            let client = client.as_ref();
            join_all(collections.into_iter().map(|collection| async move {
                debug!(collection = %collection, "Attempting to clean collection");
                let outcome = client.delete_older_than(&collection, cutoff).await;
                (collection, outcome)
            }))
            .await
        };
        client.close().await;

        let mut report = PruneReport {
            cutoff,
            ..Default::default()
        };
        for (collection, outcome) in outcomes {
            match outcome {
                Ok(deleted) => {
                    debug!(collection = %collection, deleted, "Cleaned collection");
                    report.deleted.insert(collection, deleted);
                }
                Err(e) => {
                    error!(
                        host = %self.connection.host,
                        port = self.connection.port,
                        user = %self.user.username,
                        collection = %collection,
                        error = %e,
                        "Failed to clean logs"
                    );
                    report.failed.push(collection);
                }
            }
        }

        Ok(report)
    }
}

#[async_trait]
impl Task for CleanLogsTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<bool, TaskError> {
        let report = self.prune().await?;
        let summary = serde_json::to_string(&report).unwrap_or_default();

        if report.failed.is_empty() {
            info!(deleted = report.total_deleted(), report = %summary, "Log cleanup finished");
            Ok(true)
        } else {
            warn!(
                deleted = report.total_deleted(),
                failed = report.failed.len(),
                report = %summary,
                "Log cleanup finished with failures"
            );
            Ok(false)
        }
    }
}
