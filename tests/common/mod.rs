#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Barrier;
use logwarden::config::{CleanLogsConfig, MongoConfig};
use logwarden::store::{DocumentStore, Role, StoreClient, StoreError};
use logwarden::{Clock, MongoConnection, MongoUser, OverlapPolicy, RetryPolicy};

pub fn at(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Wall clock that follows tokio's (pausable) clock.
pub struct TokioClock {
    base: DateTime<Utc>,
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn starting_at(base: DateTime<Utc>) -> Self {
        Self {
            base,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + chrono::Duration::from_std(self.origin.elapsed()).unwrap()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub database: String,
    pub username: String,
    pub roles: Vec<Role>,
}

/// Shared state behind [`MemoryStore`] and its clients.
#[derive(Default)]
pub struct StoreState {
    pub users: Mutex<Vec<UserRecord>>,
    /// Collection name -> record timestamps.
    pub collections: Mutex<BTreeMap<String, Vec<DateTime<Utc>>>>,
    pub failing_collections: Mutex<HashSet<String>>,
    pub fail_listing: AtomicBool,
    /// Number of upcoming connects that fail with a network error.
    pub unreachable_for: AtomicU32,
    /// Number of upcoming `add_user` calls that fail with a network error.
    pub dropped_user_creations: AtomicU32,
    pub connects: AtomicUsize,
    pub open_clients: AtomicUsize,
    /// When set, every deletion waits here before touching its collection.
    pub delete_barrier: Mutex<Option<Arc<Barrier>>>,
}

/// In-memory document store with failure injection.
#[derive(Default, Clone)]
pub struct MemoryStore {
    pub state: Arc<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, collection: &str, timestamps: &[&str]) {
        self.state
            .collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .extend(timestamps.iter().map(|t| at(t)));
    }

    pub fn records(&self, collection: &str) -> Vec<DateTime<Utc>> {
        self.state
            .collections
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn users(&self) -> Vec<UserRecord> {
        self.state.users.lock().unwrap().clone()
    }

    pub fn fail_collection(&self, collection: &str) {
        self.state
            .failing_collections
            .lock()
            .unwrap()
            .insert(collection.to_string());
    }

    pub fn fail_listing(&self) {
        self.state.fail_listing.store(true, Ordering::SeqCst);
    }

    pub fn unreachable_for(&self, connects: u32) {
        self.state.unreachable_for.store(connects, Ordering::SeqCst);
    }

    pub fn drop_user_creations(&self, calls: u32) {
        self.state.dropped_user_creations.store(calls, Ordering::SeqCst);
    }

    /// Hold each deletion until `parties` deletions are in progress at once.
    pub fn delete_barrier(&self, parties: usize) {
        *self.state.delete_barrier.lock().unwrap() = Some(Arc::new(Barrier::new(parties)));
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn open_clients(&self) -> usize {
        self.state.open_clients.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn connect(
        &self,
        connection: &MongoConnection,
        user: &MongoUser,
    ) -> Result<Box<dyn StoreClient>, StoreError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);

        let unreachable = self
            .state
            .unreachable_for
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if unreachable {
            return Err(StoreError::Network(format!(
                "{}:{} unreachable",
                connection.host, connection.port
            )));
        }

        self.state.open_clients.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryClient {
            state: self.state.clone(),
            database: user.database.clone(),
        }))
    }
}

pub struct MemoryClient {
    state: Arc<StoreState>,
    database: Option<String>,
}

#[async_trait]
impl StoreClient for MemoryClient {
    async fn add_user(
        &self,
        database: &str,
        username: &str,
        _password: &str,
        roles: &[Role],
    ) -> Result<(), StoreError> {
        let dropped = self
            .state
            .dropped_user_creations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if dropped {
            return Err(StoreError::Network("connection reset".to_string()));
        }

        let mut users = self.state.users.lock().unwrap();
        if users
            .iter()
            .any(|u| u.database == database && u.username == username)
        {
            return Err(StoreError::DuplicateKey(format!("User \"{username}@{database}\" already exists")));
        }
        users.push(UserRecord {
            database: database.to_string(),
            username: username.to_string(),
            roles: roles.to_vec(),
        });
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        if self.database.is_none() {
            return Err(StoreError::Other("connection has no default database".to_string()));
        }
        if self.state.fail_listing.load(Ordering::SeqCst) {
            return Err(StoreError::Other("listCollections failed".to_string()));
        }
        Ok(self.state.collections.lock().unwrap().keys().cloned().collect())
    }

    async fn delete_older_than(
        &self,
        collection: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        // Let sibling deletions interleave.
        tokio::task::yield_now().await;

        let barrier = self.state.delete_barrier.lock().unwrap().clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }

        if self.state.failing_collections.lock().unwrap().contains(collection) {
            return Err(StoreError::Other(format!("delete on {collection} failed")));
        }

        let mut collections = self.state.collections.lock().unwrap();
        let records = collections.entry(collection.to_string()).or_default();
        let before = records.len();
        records.retain(|t| *t > cutoff);
        Ok((before - records.len()) as u64)
    }

    async fn close(self: Box<Self>) {
        self.state.open_clients.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn mongo_config(cron_schedule: &str) -> MongoConfig {
    MongoConfig {
        connection: MongoConnection {
            host: "mongo".to_string(),
            port: 27017,
        },
        admin: MongoUser::new("root", "rootpw"),
        logging: MongoUser::new("logger", "loggerpw").with_database("logs"),
        availability_retry: RetryPolicy::new(5, Duration::from_secs(5)),
        create_user_retry: RetryPolicy::new(2, Duration::from_secs(10)),
        clean_logs: CleanLogsConfig {
            app_name: "CleanLogs".to_string(),
            cron_schedule: cron_schedule.to_string(),
            days_to_keep: 30,
            overlap: OverlapPolicy::Skip,
        },
    }
}

pub fn midnight(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}
