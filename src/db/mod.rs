//! Record store facade.
//!
//! A thin wrapper over MongoDB that every service goes through. Two
//! properties matter to callers:
//!
//! - `insert_one` reports a unique-index violation as
//!   [`DbError::Duplicate`], which callers treat as success: it means this
//!   event was already recorded, by this process or by another validator.
//! - every operation runs under the configured deadline, so a stalled
//!   store call can never hold up a service iteration past its interval.

use std::future::IntoFuture;
use std::time::Duration;

use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{Acknowledgment, ClientOptions, IndexOptions, WriteConcern};
use mongodb::{Client, IndexModel};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::config::MongoConfig;
use crate::models::{COLLECTION_BURNS, COLLECTION_INVALID_MINTS, COLLECTION_MINTS};

/// Error kind for store operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// The document violates a unique index. Callers use this as the
    /// idempotency signal, not as a failure.
    #[error("duplicate key")]
    Duplicate,
    /// The operation did not finish within the configured deadline.
    #[error("store operation timed out")]
    Timeout,
    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),
}

/// Handle to the shared record store.
#[derive(Clone)]
pub struct Database {
    client: Client,
    db: mongodb::Database,
    timeout: Duration,
}

impl Database {
    /// Connects to the store with majority write concern.
    pub async fn connect(config: &MongoConfig) -> anyhow::Result<Self> {
        debug!("connecting to database");
        let timeout = Duration::from_secs(config.timeout_secs);
        let mut options = ClientOptions::parse(&config.uri).await?;
        options.write_concern = Some(
            WriteConcern::builder()
                .w(Acknowledgment::Majority)
                .w_timeout(timeout)
                .build(),
        );
        let client = Client::with_options(options)?;
        let db = client.database(&config.database);
        debug!("connected to database");
        Ok(Database {
            client,
            db,
            timeout,
        })
    }

    /// Creates the unique indexes the pipeline's idempotency rests on.
    ///
    /// All three collections are covered; failure to create any of them
    /// aborts startup.
    pub async fn setup_indexes(&self) -> Result<(), DbError> {
        debug!("setting up indexes");
        self.create_unique_index(COLLECTION_MINTS, doc! { "transaction_hash": 1 })
            .await?;
        self.create_unique_index(COLLECTION_INVALID_MINTS, doc! { "transaction_hash": 1 })
            .await?;
        self.create_unique_index(
            COLLECTION_BURNS,
            doc! { "transaction_hash": 1, "log_index": 1 },
        )
        .await?;
        debug!("indexes ready");
        Ok(())
    }

    async fn create_unique_index(&self, collection: &str, keys: Document) -> Result<(), DbError> {
        let model = IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.with_deadline(
            self.db
                .collection::<Document>(collection)
                .create_index(model),
        )
        .await?;
        Ok(())
    }

    /// Inserts one document; a unique-index conflict surfaces as
    /// [`DbError::Duplicate`].
    pub async fn insert_one<T>(&self, collection: &str, document: &T) -> Result<(), DbError>
    where
        T: Serialize + Send + Sync,
    {
        let result = self
            .with_deadline(self.db.collection::<T>(collection).insert_one(document))
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(DbError::Mongo(err)) if is_duplicate_key(&err) => Err(DbError::Duplicate),
            Err(err) => Err(err),
        }
    }

    pub async fn find_one<T>(&self, collection: &str, filter: Document) -> Result<Option<T>, DbError>
    where
        T: DeserializeOwned + Send + Sync,
    {
        self.with_deadline(self.db.collection::<T>(collection).find_one(filter))
            .await
    }

    pub async fn find_many<T>(&self, collection: &str, filter: Document) -> Result<Vec<T>, DbError>
    where
        T: DeserializeOwned + Send + Sync,
    {
        let cursor = self
            .with_deadline(self.db.collection::<T>(collection).find(filter))
            .await?;
        self.with_deadline(cursor.try_collect()).await
    }

    /// Applies `update` to the first document matching `filter`; returns
    /// the number of documents modified. Conditional state transitions
    /// rely on a `0` here meaning "the precondition no longer held".
    pub async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64, DbError> {
        let result = self
            .with_deadline(
                self.db
                    .collection::<Document>(collection)
                    .update_one(filter, update),
            )
            .await?;
        Ok(result.modified_count)
    }

    /// Updates the matching document or inserts it when absent.
    pub async fn upsert_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<(), DbError> {
        self.with_deadline(
            self.db
                .collection::<Document>(collection)
                .update_one(filter, update)
                .upsert(true),
        )
        .await?;
        Ok(())
    }

    /// Shuts the connection pool down; called once after all services have
    /// stopped.
    pub async fn disconnect(self) {
        debug!("disconnecting from database");
        self.client.shutdown().await;
        debug!("disconnected from database");
    }

    async fn with_deadline<F, T>(&self, operation: F) -> Result<T, DbError>
    where
        F: IntoFuture<Output = Result<T, mongodb::error::Error>>,
    {
        match tokio::time::timeout(self.timeout, operation.into_future()).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(DbError::Mongo(err)),
            Err(_) => Err(DbError::Timeout),
        }
    }
}

/// Server error code 11000 is the unique-index violation.
fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        _ => false,
    }
}
