//! [`DocumentStore`] backed by the official `mongodb` driver.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{Bson, DateTime as BsonDateTime, Document, doc};
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::{ClientOptions, Credential, ServerAddress};
use mongodb::{Client, Database};

use crate::store::{DocumentStore, Role, StoreClient, StoreError};
use crate::{MongoConnection, MongoUser};

/// `DuplicateKey`, and "user already exists" as reported by `createUser`.
const DUPLICATE_KEY_CODES: &[i32] = &[11000, 51003];

fn classify(err: MongoError) -> StoreError {
    let message = err.to_string();
    match *err.kind {
        ErrorKind::Command(ref command)
            if DUPLICATE_KEY_CODES.contains(&command.code) || command.code_name == "DuplicateKey" =>
        {
            StoreError::DuplicateKey(message)
        }
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } | ErrorKind::ConnectionPoolCleared { .. } => {
            StoreError::Network(message)
        }
        ErrorKind::Authentication { .. } => StoreError::Auth(message),
        _ => StoreError::Other(message),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MongoStore;

impl MongoStore {
    fn options(connection: &MongoConnection, user: &MongoUser) -> ClientOptions {
        let mut credential = Credential::default();
        credential.username = Some(user.username.clone());
        credential.password = Some(user.password.clone());
        credential.source = user.database.clone();

        let mut options = ClientOptions::default();
        options.hosts = vec![ServerAddress::Tcp {
            host: connection.host.clone(),
            port: Some(connection.port),
        }];
        options.credential = Some(credential);
        options.default_database = user.database.clone();
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
        options
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn connect(
        &self,
        connection: &MongoConnection,
        user: &MongoUser,
    ) -> Result<Box<dyn StoreClient>, StoreError> {
        let client = Client::with_options(Self::options(connection, user)).map_err(classify)?;

        // The driver connects lazily; a ping forces the handshake and auth.
        let probe_db = user.database.as_deref().unwrap_or("admin");
        client
            .database(probe_db)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(classify)?;

        Ok(Box::new(MongoClient { client }))
    }
}

struct MongoClient {
    client: Client,
}

impl MongoClient {
    fn default_database(&self) -> Result<Database, StoreError> {
        self.client
            .default_database()
            .ok_or_else(|| StoreError::Other("connection has no default database".to_string()))
    }
}

#[async_trait]
impl StoreClient for MongoClient {
    async fn add_user(
        &self,
        database: &str,
        username: &str,
        password: &str,
        roles: &[Role],
    ) -> Result<(), StoreError> {
        let roles: Vec<Bson> = roles
            .iter()
            .map(|r| Bson::Document(doc! { "role": r.role.as_str(), "db": r.database.as_str() }))
            .collect();

        self.client
            .database(database)
            .run_command(doc! {
                "createUser": username,
                "pwd": password,
                "roles": roles,
            })
            .await
            .map_err(classify)?;

        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        self.default_database()?
            .list_collection_names()
            .await
            .map_err(classify)
    }

    async fn delete_older_than(
        &self,
        collection: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let filter = doc! {
            "timestamp": { "$lte": BsonDateTime::from_millis(cutoff.timestamp_millis()) }
        };

        let result = self
            .default_database()?
            .collection::<Document>(collection)
            .delete_many(filter)
            .await
            .map_err(classify)?;

        Ok(result.deleted_count)
    }

    async fn close(self: Box<Self>) {
        self.client.shutdown().await;
    }
}
