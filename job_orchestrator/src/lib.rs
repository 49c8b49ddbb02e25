use chain_client::{AdapterRegistry, ChainClientError};
use config_manager::TrackingConfig;
use persistence_layer::{PersistenceError, TrackingQueue, WalletStore};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use tracker_core::{Chain, CoreError, TrackingJob, TransactionRecord};

#[derive(Error, Debug, Clone)]
pub enum OrchestratorError {
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Chain client error: {0}")]
    ChainClient(String),
    #[error("Core error: {0}")]
    Core(String),
}

impl From<PersistenceError> for OrchestratorError {
    fn from(err: PersistenceError) -> Self {
        OrchestratorError::Persistence(err.to_string())
    }
}

impl From<ChainClientError> for OrchestratorError {
    fn from(err: ChainClientError) -> Self {
        OrchestratorError::ChainClient(err.to_string())
    }
}

impl From<CoreError> for OrchestratorError {
    fn from(err: CoreError) -> Self {
        OrchestratorError::Core(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Outcome of one successfully completed poll cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleStats {
    pub transfers: usize,
    pub swaps: usize,
    pub from_block: u64,
    pub to_block: u64,
}

/// Drives the tracking lifecycle: starts and stops wallet tracking,
/// consumes tracking jobs from the queue, runs poll cycles against the
/// chain adapters and persists the canonical records.
pub struct WalletTracker {
    registry: AdapterRegistry,
    store: Arc<dyn WalletStore>,
    queue: Arc<dyn TrackingQueue>,
    config: TrackingConfig,
}

impl WalletTracker {
    pub fn new(
        registry: AdapterRegistry,
        store: Arc<dyn WalletStore>,
        queue: Arc<dyn TrackingQueue>,
        config: TrackingConfig,
    ) -> Self {
        Self {
            registry,
            store,
            queue,
            config,
        }
    }

    /// Begin tracking a wallet. Seeds the cursor a fixed lookback below the
    /// current chain height (clamped at genesis) and publishes the first
    /// tracking job. Returns false instead of an error so callers can report
    /// a plain failure without surfacing internals.
    pub async fn track_wallet(&self, address: &str, blockchain: Chain) -> bool {
        match self.start_tracking(address, blockchain).await {
            Ok(cursor) => {
                info!(
                    "Started tracking {} on {} from height {}",
                    address, blockchain, cursor
                );
                true
            }
            Err(e) => {
                error!("Failed to start tracking {} on {}: {}", address, blockchain, e);
                false
            }
        }
    }

    async fn start_tracking(&self, address: &str, blockchain: Chain) -> Result<u64> {
        let adapter = self.registry.resolve(blockchain)?;
        let height = adapter.current_height().await?;
        let cursor = height.saturating_sub(self.config.lookback_blocks);

        self.store
            .upsert_wallet(address, blockchain, Some(cursor), true)
            .await?;

        self.queue
            .publish(&TrackingJob::new(address, blockchain, Some(cursor)))
            .await?;

        Ok(cursor)
    }

    /// Stop tracking a wallet. Any cycle already in flight completes, but
    /// it re-checks the active flag before scheduling a successor, so the
    /// polling chain ends there.
    pub async fn stop_tracking_wallet(&self, address: &str, blockchain: Chain) -> bool {
        match self.store.set_wallet_active(address, blockchain, false).await {
            Ok(()) => {
                info!("Stopped tracking {} on {}", address, blockchain);
                true
            }
            Err(e) => {
                error!("Failed to stop tracking {} on {}: {}", address, blockchain, e);
                false
            }
        }
    }

    /// Execute one tracking job.
    ///
    /// A job for a wallet that is no longer actively tracked is abandoned
    /// without error. A failed cycle does not move the cursor; the original
    /// job is re-published unchanged after the retry delay, so the same
    /// range is retried.
    pub async fn process_job(&self, job: &TrackingJob) -> Result<()> {
        let Some(wallet) = self
            .store
            .find_active_wallet(&job.wallet_address, job.blockchain)
            .await?
        else {
            info!(
                "Dropping job for {} on {}: wallet is not actively tracked",
                job.wallet_address, job.blockchain
            );
            return Ok(());
        };

        match self.run_cycle(job, wallet.last_processed_height).await {
            Ok(stats) => {
                debug!(
                    "Cycle for {} on {} covered [{}, {}]: {} transfers, {} swaps",
                    job.wallet_address,
                    job.blockchain,
                    stats.from_block,
                    stats.to_block,
                    stats.transfers,
                    stats.swaps
                );

                // Fresh read: a stop request issued mid-cycle must end the
                // polling chain here.
                let still_active = self
                    .store
                    .find_active_wallet(&job.wallet_address, job.blockchain)
                    .await?
                    .is_some();
                if still_active {
                    let next = TrackingJob::new(
                        job.wallet_address.clone(),
                        job.blockchain,
                        Some(stats.to_block),
                    );
                    self.queue
                        .publish_delayed(&next, Duration::from_secs(self.config.poll_interval_seconds))
                        .await?;
                }
                Ok(())
            }
            Err(e) => {
                warn!(
                    "Cycle for {} on {} failed: {}. Retrying in {}s",
                    job.wallet_address, job.blockchain, e, self.config.retry_delay_seconds
                );
                self.queue
                    .publish_delayed(job, Duration::from_secs(self.config.retry_delay_seconds))
                    .await?;
                Ok(())
            }
        }
    }

    async fn run_cycle(&self, job: &TrackingJob, cursor: Option<u64>) -> Result<CycleStats> {
        let adapter = self.registry.resolve(job.blockchain)?;
        let height = adapter.current_height().await?;
        let from_block = job.from_block.or(cursor).unwrap_or(0);

        let transfers = adapter
            .token_transfers(&job.wallet_address, from_block, Some(height))
            .await?;
        let swaps = adapter
            .token_swaps(&job.wallet_address, from_block, Some(height))
            .await?;

        let stats = CycleStats {
            transfers: transfers.len(),
            swaps: swaps.len(),
            from_block,
            to_block: height,
        };

        let records: Vec<TransactionRecord> = transfers
            .into_iter()
            .map(|t| TransactionRecord::from_transfer(job.blockchain, &job.wallet_address, t))
            .chain(
                swaps
                    .into_iter()
                    .map(|s| TransactionRecord::from_swap(job.blockchain, &job.wallet_address, s)),
            )
            .collect();

        if !records.is_empty() {
            self.store.insert_transactions(&records).await?;
            info!(
                "Stored {} records for {} on {}",
                records.len(),
                job.wallet_address,
                job.blockchain
            );
        }

        self.store
            .update_wallet_height(&job.wallet_address, job.blockchain, height)
            .await?;

        Ok(stats)
    }

    /// Consume tracking jobs until shutdown. Queue transport failures never
    /// terminate the loop; the consumer re-bootstraps after a fixed delay.
    pub async fn run_consumer(&self) {
        loop {
            match self.queue.recover_stranded().await {
                Ok(_) => {
                    info!("Tracking consumer started");
                }
                Err(e) => {
                    warn!(
                        "Consumer bootstrap failed: {}. Retrying in {}s",
                        e, self.config.bootstrap_retry_seconds
                    );
                    sleep(Duration::from_secs(self.config.bootstrap_retry_seconds)).await;
                    continue;
                }
            }

            loop {
                if let Err(e) = self.queue.promote_due_jobs().await {
                    warn!("Failed to promote deferred jobs: {}", e);
                    break;
                }

                match self.queue.next_delivery(Duration::from_secs(1)).await {
                    Ok(Some(delivery)) => match self.process_job(&delivery.job).await {
                        Ok(()) => {
                            if let Err(e) = self.queue.ack(&delivery).await {
                                warn!("Failed to ack delivery: {}", e);
                            }
                        }
                        Err(e) => {
                            error!(
                                "Job for {} on {} failed: {}",
                                delivery.job.wallet_address, delivery.job.blockchain, e
                            );
                            if let Err(e) = self.queue.nack(&delivery).await {
                                warn!("Failed to nack delivery: {}", e);
                            }
                        }
                    },
                    Ok(None) => {}
                    Err(e) => {
                        warn!("Queue delivery failed: {}. Reconnecting", e);
                        break;
                    }
                }
            }

            sleep(Duration::from_secs(self.config.bootstrap_retry_seconds)).await;
        }
    }
}
