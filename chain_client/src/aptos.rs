use crate::move_api::{argument_as_string, LatestBlock, UserTransaction};
use crate::{extract_token_type, ChainAdapter, ChainClientError, Result};
use async_trait::async_trait;
use config_manager::ChainApiConfig;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use tracker_core::{Chain, TokenSwap, TokenTransfer};

const COIN_TRANSFER_FUNCTION: &str = "0x1::coin::transfer";

/// Aptos fullnode REST client.
#[derive(Debug, Clone)]
pub struct AptosClient {
    http_client: Client,
    api_url: String,
    page_limit: u32,
}

impl AptosClient {
    pub fn new(config: &ChainApiConfig, page_limit: u32) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent("wallet-tracker/1.0")
            .build()?;

        Ok(Self {
            http_client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            page_limit,
        })
    }

    async fn account_transactions(&self, address: &str, from_block: u64) -> Result<Vec<UserTransaction>> {
        let url = format!("{}/accounts/{}/transactions", self.api_url, address);
        let response = self
            .http_client
            .get(&url)
            .query(&[("start", from_block.to_string()), ("limit", self.page_limit.to_string())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ChainClientError::UpstreamStatus {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ChainAdapter for AptosClient {
    fn chain(&self) -> Chain {
        Chain::Aptos
    }

    async fn current_height(&self) -> Result<u64> {
        let url = format!("{}/blocks/by_height/latest", self.api_url);
        let response = self.http_client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ChainClientError::UpstreamStatus {
                status: status.as_u16(),
                message,
            });
        }

        let block: LatestBlock = response.json().await?;
        block.block_height.parse().map_err(|_| {
            ChainClientError::MalformedResponse(format!(
                "Aptos block height is not an integer: '{}'",
                block.block_height
            ))
        })
    }

    async fn token_transfers(
        &self,
        address: &str,
        from_block: u64,
        _to_block: Option<u64>,
    ) -> Result<Vec<TokenTransfer>> {
        let transactions = self.account_transactions(address, from_block).await?;
        let transfers = transfers_from_transactions(address, &transactions);
        debug!(
            "Found {} Aptos transfers for wallet {} from block {}",
            transfers.len(),
            address,
            from_block
        );
        Ok(transfers)
    }

    async fn token_swaps(
        &self,
        address: &str,
        from_block: u64,
        _to_block: Option<u64>,
    ) -> Result<Vec<TokenSwap>> {
        let transactions = self.account_transactions(address, from_block).await?;
        let swaps = swaps_from_transactions(address, &transactions);
        debug!(
            "Found {} Aptos swaps for wallet {} from block {}",
            swaps.len(),
            address,
            from_block
        );
        Ok(swaps)
    }
}

/// Two independent detection paths per transaction: the wallet's own
/// `0x1::coin::transfer` call (outgoing) and `CoinDeposited` events where
/// the wallet is the receiver (incoming). A transaction missed by one path
/// can still be caught by the other.
pub(crate) fn transfers_from_transactions(
    wallet_address: &str,
    transactions: &[UserTransaction],
) -> Vec<TokenTransfer> {
    let mut transfers = Vec::new();

    for tx in transactions {
        if !tx.is_user_transaction() {
            continue;
        }

        let is_coin_transfer = tx
            .payload
            .as_ref()
            .is_some_and(|p| p.payload_type == COIN_TRANSFER_FUNCTION);

        if is_coin_transfer {
            match parse_outgoing_transfer(wallet_address, tx) {
                Some(transfer) => transfers.push(transfer),
                None => warn!("Skipping unparsable Aptos transfer transaction {}", tx.hash),
            }
        } else if tx
            .receiver
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case(wallet_address))
        {
            for event in &tx.events {
                if !event.event_type.contains("CoinDeposited") {
                    continue;
                }
                match parse_deposit_event(wallet_address, tx, event) {
                    Some(transfer) => transfers.push(transfer),
                    None => warn!("Skipping unparsable Aptos deposit event in {}", tx.hash),
                }
            }
        }
    }

    transfers
}

fn parse_outgoing_transfer(wallet_address: &str, tx: &UserTransaction) -> Option<TokenTransfer> {
    let payload = tx.payload.as_ref()?;
    let token_address = payload.function.split("::").next()?.to_string();
    let to_address = argument_as_string(&payload.arguments, 0)?;
    let amount = argument_as_string(&payload.arguments, 1)?;

    Some(TokenTransfer {
        token_address,
        token_name: None,
        token_symbol: None,
        amount,
        decimals: None,
        from_address: wallet_address.to_string(),
        to_address,
        timestamp: tx.timestamp_utc()?,
        transaction_hash: tx.hash.clone(),
        block_height: tx.block_height()?,
    })
}

fn parse_deposit_event(
    wallet_address: &str,
    tx: &UserTransaction,
    event: &crate::move_api::MoveEvent,
) -> Option<TokenTransfer> {
    // Deposit events carry the coin type as a generic parameter.
    let inner = event.event_type.split('<').nth(1)?;
    let token_address = inner.split('>').next()?.to_string();
    let amount = event.amount()?;

    Some(TokenTransfer {
        token_address,
        token_name: None,
        token_symbol: None,
        amount,
        decimals: None,
        from_address: tx.sender.clone(),
        to_address: wallet_address.to_string(),
        timestamp: tx.timestamp_utc()?,
        transaction_hash: tx.hash.clone(),
        block_height: tx.block_height()?,
    })
}

/// Heuristic swap detection: a swap-like event names the exchange, and the
/// first withdraw/deposit event pair in source order provides the two legs.
pub(crate) fn swaps_from_transactions(
    wallet_address: &str,
    transactions: &[UserTransaction],
) -> Vec<TokenSwap> {
    let mut swaps = Vec::new();

    for tx in transactions {
        if !tx.is_user_transaction() {
            continue;
        }

        let swap_event = tx.events.iter().find(|e| {
            e.event_type.contains("swap")
                || e.event_type.contains("Swap")
                || e.event_type.to_lowercase().contains("exchange")
        });
        let Some(swap_event) = swap_event else {
            continue;
        };
        let exchange_address = swap_event
            .event_type
            .split("::")
            .next()
            .unwrap_or("")
            .to_string();

        let token_in_event = tx
            .events
            .iter()
            .find(|e| e.event_type.contains("Withdraw") || e.event_type.contains("withdraw"));
        let token_out_event = tx
            .events
            .iter()
            .find(|e| e.event_type.contains("Deposit") || e.event_type.contains("deposit"));

        let (Some(token_in_event), Some(token_out_event)) = (token_in_event, token_out_event)
        else {
            continue;
        };

        let parsed = (|| {
            Some(TokenSwap {
                token_in_address: extract_token_type(&token_in_event.event_type),
                token_in_name: None,
                token_in_symbol: None,
                amount_in: token_in_event.amount()?,
                decimals_in: None,
                token_out_address: extract_token_type(&token_out_event.event_type),
                token_out_name: None,
                token_out_symbol: None,
                amount_out: token_out_event.amount()?,
                decimals_out: None,
                exchange_address,
                exchange_name: None,
                wallet_address: wallet_address.to_string(),
                timestamp: tx.timestamp_utc()?,
                transaction_hash: tx.hash.clone(),
                block_height: tx.block_height()?,
            })
        })();

        match parsed {
            Some(swap) => swaps.push(swap),
            None => warn!("Skipping unparsable Aptos swap transaction {}", tx.hash),
        }
    }

    swaps
}
