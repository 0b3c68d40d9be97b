//! toNotes Database Layer
//!
//! Persistence for the toNotes auth core: MongoDB for user and session
//! records, Redis for short-lived keys.
//!
//! # Architecture
//!
//! - **MongoDB**: `users` and `sessions` collections, each behind a repository trait
//! - **Redis**: revocation markers and the session cache, behind [`KeyValueStore`]
//! - **In-process store**: stands in for Redis when no URL is configured
//!
//! # Repository Pattern
//!
//! Services depend on [`UserRepository`] and [`SessionRepository`] trait
//! objects. The `mock` feature adds in-memory implementations of both.

pub mod cache;
pub mod config;
pub mod error;
pub mod memory;
pub mod models;
pub mod repos;

#[cfg(feature = "mock")]
pub mod mock;

use chrono::{DateTime, Utc};
use deadpool_redis::{Config as RedisConfig, Runtime};
use mongodb::bson::{doc, DateTime as BsonDateTime};
use mongodb::options::ClientOptions;
use mongodb::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub use cache::{KeyValueStore, RedisStore};
pub use config::DatabaseConfig;
pub use error::{DbError, DbResult};
pub use memory::MemoryStore;
pub use models::*;
pub use repos::*;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PING_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) fn to_bson(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

pub(crate) fn from_bson(dt: BsonDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or_default()
}

/// Connected document store plus key/value store
pub struct Database {
    client: Client,
    mongo: mongodb::Database,
    store: Arc<dyn KeyValueStore>,
}

impl Database {
    /// Connect to MongoDB and Redis, creating indexes on the way
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        info!("Connecting to MongoDB: {}", config.mongo_uri_masked());

        let mut options = ClientOptions::parse(&config.mongo_uri)
            .await
            .map_err(|e| DbError::Connection(format!("MongoDB URI: {}", e)))?;
        options.max_pool_size = Some(config.mongo_max_pool_size);
        options.min_pool_size = Some(config.mongo_min_pool_size);
        options.max_idle_time = Some(config.max_conn_idle_time());
        options.connect_timeout = Some(CONNECT_TIMEOUT);
        options.server_selection_timeout = Some(CONNECT_TIMEOUT);

        let client = Client::with_options(options)
            .map_err(|e| DbError::Connection(format!("MongoDB: {}", e)))?;
        let mongo = client.database(&config.mongo_db);

        tokio::time::timeout(PING_TIMEOUT, mongo.run_command(doc! { "ping": 1 }, None))
            .await
            .map_err(|_| DbError::Timeout("MongoDB ping".to_string()))?
            .map_err(|e| DbError::Connection(format!("MongoDB ping: {}", e)))?;

        info!(db = %config.mongo_db, "Connected to MongoDB");

        MongoUserRepo::new(&mongo).ensure_indexes().await?;
        MongoSessionRepo::new(&mongo).ensure_indexes().await?;

        let store: Arc<dyn KeyValueStore> = if config.redis_url.is_empty() {
            warn!("No Redis URL configured, using the in-process key/value store");
            Arc::new(MemoryStore::new())
        } else {
            info!("Connecting to Redis: {}", config.redis_url_masked());
            let pool = RedisConfig::from_url(&config.redis_url)
                .create_pool(Some(Runtime::Tokio1))
                .map_err(|e| DbError::Connection(format!("Redis: {}", e)))?;
            let redis = RedisStore::new(pool);
            redis.ping().await?;
            info!("Connected to Redis");
            Arc::new(redis)
        };

        Ok(Self { client, mongo, store })
    }

    pub fn user_repo(&self) -> Arc<dyn UserRepository> {
        Arc::new(MongoUserRepo::new(&self.mongo))
    }

    pub fn session_repo(&self) -> Arc<dyn SessionRepository> {
        Arc::new(MongoSessionRepo::new(&self.mongo))
    }

    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.store)
    }

    /// Health check for both stores
    pub async fn health_check(&self) -> HealthStatus {
        let mongo_ok = self.mongo.run_command(doc! { "ping": 1 }, None).await.is_ok();
        let store_ok = self.store.ping().await.is_ok();

        HealthStatus {
            mongo: mongo_ok,
            store: store_ok,
            healthy: mongo_ok && store_ok,
        }
    }

    /// Close the key/value store and shut the MongoDB client down
    pub async fn close(self) {
        self.store.close().await;
        self.client.shutdown().await;
        info!("Database connections closed");
    }
}

/// Health status of database connections
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthStatus {
    pub mongo: bool,
    pub store: bool,
    pub healthy: bool,
}
