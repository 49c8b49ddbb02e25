use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracker_core::{Chain, TrackedWallet, TrackingJob, TransactionRecord, TransactionType};

pub mod job_queue;
pub mod postgres_store;

pub use job_queue::JobQueue;
pub use postgres_store::PostgresStore;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Queue transport error: {0}")]
    Transport(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt stored record: {0}")]
    InvalidRecord(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Filter for the transaction query surface. `wallet_address` is always
/// required; chain and kind narrow the result set.
#[derive(Debug, Clone)]
pub struct TransactionFilter {
    pub wallet_address: String,
    pub blockchain: Option<Chain>,
    pub transaction_type: Option<TransactionType>,
}

/// Store contract the orchestrator and API layer depend on. The single
/// production implementation is [`PostgresStore`]; tests substitute an
/// in-memory one.
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Create the tracked-wallet row if absent, else update cursor and
    /// active flag in place. Idempotent for repeated identical calls.
    async fn upsert_wallet(
        &self,
        address: &str,
        blockchain: Chain,
        last_processed_height: Option<u64>,
        is_active: bool,
    ) -> Result<()>;

    /// Returns the cursor only while the wallet is actively tracked.
    async fn find_active_wallet(
        &self,
        address: &str,
        blockchain: Chain,
    ) -> Result<Option<TrackedWallet>>;

    async fn update_wallet_height(
        &self,
        address: &str,
        blockchain: Chain,
        height: u64,
    ) -> Result<()>;

    async fn set_wallet_active(&self, address: &str, blockchain: Chain, active: bool)
        -> Result<()>;

    /// Bulk insert canonical events. All-or-nothing: a rejected batch
    /// leaves nothing committed, so the caller may retry the same range.
    async fn insert_transactions(&self, records: &[TransactionRecord]) -> Result<()>;

    async fn list_wallets(&self, blockchain: Option<Chain>) -> Result<Vec<TrackedWallet>>;

    /// Paginated query, newest first. Returns the page plus the total
    /// matching count.
    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<TransactionRecord>, u64)>;
}

/// One in-flight delivery of a tracking job. The raw payload is retained so
/// acknowledge/negative-acknowledge can address the exact queue entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDelivery {
    pub job: TrackingJob,
    pub payload: String,
}

/// Durable FIFO queue contract for tracking jobs: at-least-once delivery
/// with explicit ack/nack, plus deferred publication for the fixed-delay
/// polling and retry cadences.
#[async_trait]
pub trait TrackingQueue: Send + Sync {
    async fn publish(&self, job: &TrackingJob) -> Result<()>;

    /// Enqueue a job that becomes deliverable once `delay` has elapsed.
    async fn publish_delayed(&self, job: &TrackingJob, delay: Duration) -> Result<()>;

    /// Blocking pop with timeout. The delivery stays owned by the queue
    /// until acked or nacked; an un-acked delivery is never silently lost.
    async fn next_delivery(&self, timeout: Duration) -> Result<Option<JobDelivery>>;

    async fn ack(&self, delivery: &JobDelivery) -> Result<()>;

    /// Return the delivery to the queue for redelivery.
    async fn nack(&self, delivery: &JobDelivery) -> Result<()>;

    /// Move deferred jobs whose due time has passed onto the live queue.
    /// Returns how many were promoted.
    async fn promote_due_jobs(&self) -> Result<u64>;

    /// Re-queue deliveries stranded in the processing list by a previous
    /// process crash. Called once at consumer bootstrap.
    async fn recover_stranded(&self) -> Result<u64>;
}
