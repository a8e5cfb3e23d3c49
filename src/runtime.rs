//! Wires the provisioning and maintenance workflows out of a [`MongoConfig`].

use std::sync::Arc;

use crate::config::MongoConfig;
use crate::tasks::{CheckAvailabilityTask, CleanLogsTask, CreateLogUserTask};
use crate::{
    Application, BoxTask, Clock, DocumentStore, NoopTask, RetriableTask, ScheduledApplication,
    StartApplicationTask, Task, TaskChain, TaskError,
};

/// The startup task tree plus a handle on the scheduled maintenance
/// application, so it can be stopped on shutdown.
pub struct Runtime {
    root: BoxTask,
    application: Arc<ScheduledApplication>,
}

impl Runtime {
    pub fn new(config: &MongoConfig, store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        let provisioning = provisioning_chain(config, store.clone());
        let application = Arc::new(maintenance_application(config, store, clock));

        let start: BoxTask = Arc::new(StartApplicationTask::new(
            format!("Start{}", config.clean_logs.app_name),
            application.clone(),
        ));

        let root: BoxTask = Arc::new(
            TaskChain::new("StartupChain", Arc::new(NoopTask::new("OnFailureTask")))
                .then(provisioning)
                .then(start),
        );

        Self { root, application }
    }

    pub fn root(&self) -> &BoxTask {
        &self.root
    }

    pub fn application(&self) -> &Arc<ScheduledApplication> {
        &self.application
    }

    /// Run the startup chain once.
    pub async fn run(&self) -> Result<bool, TaskError> {
        self.root.run().await
    }

    pub async fn shutdown(&self) -> Result<bool, TaskError> {
        self.application.stop().await
    }
}

/// Retried availability check followed by retried, idempotent user creation.
pub fn provisioning_chain(config: &MongoConfig, store: Arc<dyn DocumentStore>) -> BoxTask {
    let check = CheckAvailabilityTask::new(
        "CheckMongoDbAvailabilityTask",
        store.clone(),
        config.connection.clone(),
        config.admin.clone(),
    );
    let check = RetriableTask::new(
        "RetryCheckMongoDbAvailabilityTask",
        Arc::new(check),
        config.availability_retry.clone(),
    );

    let create = CreateLogUserTask::new(
        "CreateMongoDbLogUser",
        store,
        config.connection.clone(),
        config.admin.clone(),
        config.logging.clone(),
    );
    let create = RetriableTask::new(
        "RetryCreateMongoDbLogUser",
        Arc::new(create),
        config.create_user_retry.clone(),
    );

    Arc::new(
        TaskChain::new("ProvisioningChain", Arc::new(NoopTask::new("OnFailureTask")))
            .then(Arc::new(check))
            .then(Arc::new(create)),
    )
}

/// Log pruning bound to the configured cron schedule.
pub fn maintenance_application(
    config: &MongoConfig,
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
) -> ScheduledApplication {
    let clean = &config.clean_logs;
    let task = CleanLogsTask::new(
        clean.app_name.clone(),
        store,
        config.connection.clone(),
        config.logging.clone(),
        clean.days_to_keep,
        clock.clone(),
    );

    ScheduledApplication::new(
        clean.app_name.clone(),
        clean.cron_schedule.clone(),
        Arc::new(task),
        clock,
    )
    .with_overlap(clean.overlap)
}
