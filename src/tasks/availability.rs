use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{DocumentStore, MongoConnection, MongoUser, Task, TaskError};

/// Succeeds once a working client can be obtained; meant to be wrapped in a
/// [`RetriableTask`](crate::RetriableTask) since every failure is an `Err`.
pub struct CheckAvailabilityTask {
    name: String,
    store: Arc<dyn DocumentStore>,
    connection: MongoConnection,
    user: MongoUser,
}

impl CheckAvailabilityTask {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn DocumentStore>,
        connection: MongoConnection,
        user: MongoUser,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            connection,
            user,
        }
    }
}

#[async_trait]
impl Task for CheckAvailabilityTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<bool, TaskError> {
        match self.store.connect(&self.connection, &self.user).await {
            Ok(client) => {
                client.close().await;
                debug!(host = %self.connection.host, port = self.connection.port, "Server available");
                Ok(true)
            }
            Err(e) => {
                warn!(
                    host = %self.connection.host,
                    port = self.connection.port,
                    user = %self.user.username,
                    error = %e,
                    "Server not available"
                );
                Err(e.into())
            }
        }
    }
}
