//! Document store seam used by the provisioning and maintenance tasks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{MongoConnection, MongoUser};

/// Driver failures, classified by how the tasks react to them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("{0}")]
    Other(String),
}

/// A role granted to a user, e.g. `readWrite` on `logs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub role: String,
    pub database: String,
}

impl Role {
    pub fn read_write(database: impl Into<String>) -> Self {
        Self {
            role: "readWrite".to_string(),
            database: database.into(),
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a working client; fails when the server cannot be reached or the
    /// credential is rejected.
    async fn connect(
        &self,
        connection: &MongoConnection,
        user: &MongoUser,
    ) -> Result<Box<dyn StoreClient>, StoreError>;
}

#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn add_user(
        &self,
        database: &str,
        username: &str,
        password: &str,
        roles: &[Role],
    ) -> Result<(), StoreError>;

    /// Collections of the client's default database.
    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// Delete every record in `collection` whose `timestamp` is at or before
    /// `cutoff`; returns the number deleted.
    async fn delete_older_than(
        &self,
        collection: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn close(self: Box<Self>);
}
