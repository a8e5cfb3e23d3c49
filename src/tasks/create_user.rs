use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::store::Role;
use crate::{DocumentStore, MongoConnection, MongoUser, StoreError, Task, TaskError};

/// Creates the logging principal with `readWrite` on its own database only.
///
/// An existing user counts as success. An unreachable server is returned as
/// [`TaskError::Unreachable`] so an outer retry can pick it up; any other
/// failure is a logical `Ok(false)`.
pub struct CreateLogUserTask {
    name: String,
    store: Arc<dyn DocumentStore>,
    connection: MongoConnection,
    admin: MongoUser,
    new_user: MongoUser,
}

impl CreateLogUserTask {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn DocumentStore>,
        connection: MongoConnection,
        admin: MongoUser,
        new_user: MongoUser,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            connection,
            admin,
            new_user,
        }
    }

    async fn add_new_user(&self, database: &str) -> Result<(), StoreError> {
        let client = self.store.connect(&self.connection, &self.admin).await?;
        let result = client
            .add_user(
                database,
                &self.new_user.username,
                &self.new_user.password,
                &[Role::read_write(database)],
            )
            .await;
        client.close().await;
        result
    }
}

#[async_trait]
impl Task for CreateLogUserTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<bool, TaskError> {
        let Some(database) = self.new_user.database.as_deref() else {
            error!(user = %self.new_user.username, "New user has no target database");
            return Err(TaskError::Config(format!(
                "user {} has no target database",
                self.new_user.username
            )));
        };

        match self.add_new_user(database).await {
            Ok(()) => {
                info!(
                    host = %self.connection.host,
                    port = self.connection.port,
                    admin = %self.admin.username,
                    user = %self.new_user.username,
                    database,
                    "Created user"
                );
                Ok(true)
            }
            Err(StoreError::DuplicateKey(_)) => {
                info!(
                    host = %self.connection.host,
                    port = self.connection.port,
                    user = %self.new_user.username,
                    database,
                    "User already created"
                );
                Ok(true)
            }
            Err(StoreError::Network(reason)) => {
                error!(
                    host = %self.connection.host,
                    port = self.connection.port,
                    admin = %self.admin.username,
                    user = %self.new_user.username,
                    error = %reason,
                    "Failed to create user: server unreachable"
                );
                Err(TaskError::Unreachable(reason))
            }
            Err(e) => {
                error!(
                    host = %self.connection.host,
                    port = self.connection.port,
                    admin = %self.admin.username,
                    user = %self.new_user.username,
                    error = %e,
                    "Failed to create user"
                );
                Ok(false)
            }
        }
    }
}
