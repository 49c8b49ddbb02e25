use crate::types::*;
use crate::{ApiError, AppState};
use axum::extract::{Query, State};
use axum::response::Json;
use chrono::Utc;
use persistence_layer::TransactionFilter;
use tracing::info;
use tracker_core::{Chain, TransactionType};

const DEFAULT_PAGE_LIMIT: u64 = 50;
const MAX_PAGE_LIMIT: u64 = 200;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

fn parse_chain(raw: &str) -> Result<Chain, ApiError> {
    raw.parse::<Chain>()
        .map_err(|e| ApiError::Validation(e.to_string()))
}

fn validate_address(raw: &str) -> Result<&str, ApiError> {
    let address = raw.trim();
    if address.is_empty() {
        return Err(ApiError::Validation(
            "walletAddress must not be empty".to_string(),
        ));
    }
    Ok(address)
}

pub async fn track_wallet(
    State(state): State<AppState>,
    Json(request): Json<WalletTrackingRequest>,
) -> Result<Json<TrackingResponse>, ApiError> {
    let address = validate_address(&request.wallet_address)?;
    let blockchain = parse_chain(&request.blockchain)?;

    info!("Track request for {} on {}", address, blockchain);

    if !state.tracker.track_wallet(address, blockchain).await {
        return Err(ApiError::Internal(format!(
            "could not start tracking {} on {}",
            address, blockchain
        )));
    }

    Ok(Json(TrackingResponse {
        success: true,
        message: "Wallet tracking started".to_string(),
        wallet_address: address.to_string(),
        blockchain: blockchain.to_string(),
    }))
}

pub async fn untrack_wallet(
    State(state): State<AppState>,
    Json(request): Json<WalletTrackingRequest>,
) -> Result<Json<TrackingResponse>, ApiError> {
    let address = validate_address(&request.wallet_address)?;
    let blockchain = parse_chain(&request.blockchain)?;

    info!("Untrack request for {} on {}", address, blockchain);

    if !state.tracker.stop_tracking_wallet(address, blockchain).await {
        return Err(ApiError::Internal(format!(
            "could not stop tracking {} on {}",
            address, blockchain
        )));
    }

    Ok(Json(TrackingResponse {
        success: true,
        message: "Wallet tracking stopped".to_string(),
        wallet_address: address.to_string(),
        blockchain: blockchain.to_string(),
    }))
}

pub async fn list_wallets(
    State(state): State<AppState>,
    Query(query): Query<WalletListQuery>,
) -> Result<Json<WalletListResponse>, ApiError> {
    let blockchain = query.blockchain.as_deref().map(parse_chain).transpose()?;

    let wallets = state.store.list_wallets(blockchain).await?;
    let count = wallets.len();

    Ok(Json(WalletListResponse {
        success: true,
        wallets,
        count,
    }))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<TransactionListResponse>, ApiError> {
    let wallet_address = query
        .wallet_address
        .as_deref()
        .ok_or_else(|| {
            ApiError::Validation("walletAddress query parameter is required".to_string())
        })
        .and_then(validate_address)?
        .to_string();

    let blockchain = query.blockchain.as_deref().map(parse_chain).transpose()?;
    let transaction_type = query
        .transaction_type
        .as_deref()
        .map(|raw| {
            raw.parse::<TransactionType>()
                .map_err(|e| ApiError::Validation(e.to_string()))
        })
        .transpose()?;

    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);

    let filter = TransactionFilter {
        wallet_address,
        blockchain,
        transaction_type,
    };
    let (transactions, total) = state.store.list_transactions(&filter, page, limit).await?;

    Ok(Json(TransactionListResponse {
        success: true,
        transactions,
        pagination: Pagination::new(total, page, limit),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chain_client::{AdapterRegistry, ChainAdapter};
    use config_manager::SystemConfig;
    use job_orchestrator::WalletTracker;
    use persistence_layer::{Result as PersistenceResult, TrackingQueue, WalletStore};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Duration;
    use tracker_core::{TrackedWallet, TrackingJob, TransactionRecord};

    #[derive(Default)]
    struct StubStore {
        wallets: Mutex<Vec<TrackedWallet>>,
        records: Mutex<Vec<TransactionRecord>>,
    }

    #[async_trait]
    impl WalletStore for StubStore {
        async fn upsert_wallet(
            &self,
            _address: &str,
            _blockchain: Chain,
            _last_processed_height: Option<u64>,
            _is_active: bool,
        ) -> PersistenceResult<()> {
            Ok(())
        }

        async fn find_active_wallet(
            &self,
            _address: &str,
            _blockchain: Chain,
        ) -> PersistenceResult<Option<TrackedWallet>> {
            Ok(None)
        }

        async fn update_wallet_height(
            &self,
            _address: &str,
            _blockchain: Chain,
            _height: u64,
        ) -> PersistenceResult<()> {
            Ok(())
        }

        async fn set_wallet_active(
            &self,
            _address: &str,
            _blockchain: Chain,
            _active: bool,
        ) -> PersistenceResult<()> {
            Ok(())
        }

        async fn insert_transactions(
            &self,
            _records: &[TransactionRecord],
        ) -> PersistenceResult<()> {
            Ok(())
        }

        async fn list_wallets(
            &self,
            blockchain: Option<Chain>,
        ) -> PersistenceResult<Vec<TrackedWallet>> {
            Ok(self
                .wallets
                .lock()
                .unwrap()
                .iter()
                .filter(|w| blockchain.map_or(true, |c| w.blockchain == c))
                .cloned()
                .collect())
        }

        async fn list_transactions(
            &self,
            filter: &TransactionFilter,
            page: u64,
            limit: u64,
        ) -> PersistenceResult<(Vec<TransactionRecord>, u64)> {
            let matching: Vec<TransactionRecord> = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.wallet_address == filter.wallet_address)
                .filter(|r| filter.blockchain.map_or(true, |c| r.blockchain == c))
                .filter(|r| {
                    filter
                        .transaction_type
                        .map_or(true, |t| r.transaction_type == t)
                })
                .cloned()
                .collect();
            let total = matching.len() as u64;
            let offset = page.saturating_sub(1).saturating_mul(limit) as usize;
            let page_items = matching
                .into_iter()
                .skip(offset)
                .take(limit as usize)
                .collect();
            Ok((page_items, total))
        }
    }

    struct NoopQueue;

    #[async_trait]
    impl TrackingQueue for NoopQueue {
        async fn publish(&self, _job: &TrackingJob) -> PersistenceResult<()> {
            Ok(())
        }
        async fn publish_delayed(
            &self,
            _job: &TrackingJob,
            _delay: Duration,
        ) -> PersistenceResult<()> {
            Ok(())
        }
        async fn next_delivery(
            &self,
            _timeout: Duration,
        ) -> PersistenceResult<Option<persistence_layer::JobDelivery>> {
            Ok(None)
        }
        async fn ack(&self, _delivery: &persistence_layer::JobDelivery) -> PersistenceResult<()> {
            Ok(())
        }
        async fn nack(&self, _delivery: &persistence_layer::JobDelivery) -> PersistenceResult<()> {
            Ok(())
        }
        async fn promote_due_jobs(&self) -> PersistenceResult<u64> {
            Ok(0)
        }
        async fn recover_stranded(&self) -> PersistenceResult<u64> {
            Ok(0)
        }
    }

    fn test_state() -> AppState {
        let config = SystemConfig::default();
        let store = Arc::new(StubStore::default());
        let registry: HashMap<Chain, Arc<dyn ChainAdapter>> = HashMap::new();
        let tracker = WalletTracker::new(
            AdapterRegistry::with_adapters(registry),
            store.clone(),
            Arc::new(NoopQueue),
            config.tracking.clone(),
        );
        AppState {
            config,
            tracker: Arc::new(tracker),
            store,
        }
    }

    #[tokio::test]
    async fn transactions_require_wallet_address() {
        let state = test_state();
        let result =
            list_transactions(State(state), Query(TransactionQuery::default())).await;
        let err = result.err().expect("missing walletAddress must be rejected");
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_chain_is_rejected_with_supported_set() {
        let state = test_state();
        let request = WalletTrackingRequest {
            wallet_address: "0xabc".to_string(),
            blockchain: "solana".to_string(),
        };
        let err = track_wallet(State(state), Json(request))
            .await
            .err()
            .expect("unknown chain must be rejected");
        assert!(err.to_string().contains("aptos, sui, movement"));
    }

    #[tokio::test]
    async fn empty_result_returns_zeroed_pagination() {
        let state = test_state();
        let query = TransactionQuery {
            wallet_address: Some("0xnobody".to_string()),
            transaction_type: Some("swap".to_string()),
            ..Default::default()
        };

        let Json(response) = list_transactions(State(state), Query(query))
            .await
            .unwrap();
        assert!(response.success);
        assert!(response.transactions.is_empty());
        assert_eq!(response.pagination.total, 0);
        assert_eq!(response.pagination.pages, 0);
        assert_eq!(response.pagination.page, 1);
        assert_eq!(response.pagination.limit, DEFAULT_PAGE_LIMIT);
    }

    #[tokio::test]
    async fn huge_page_number_is_served_without_overflow() {
        let state = test_state();
        let query = TransactionQuery {
            wallet_address: Some("0xnobody".to_string()),
            page: Some(u64::MAX),
            ..Default::default()
        };

        let Json(response) = list_transactions(State(state), Query(query))
            .await
            .unwrap();
        assert!(response.success);
        assert!(response.transactions.is_empty());
        assert_eq!(response.pagination.page, u64::MAX);
    }

    #[tokio::test]
    async fn untrack_succeeds_for_known_chain() {
        let state = test_state();
        let request = WalletTrackingRequest {
            wallet_address: "0xabc".to_string(),
            blockchain: "movement".to_string(),
        };
        let Json(response) = untrack_wallet(State(state), Json(request)).await.unwrap();
        assert!(response.success);
        assert_eq!(response.blockchain, "movement");
    }
}
