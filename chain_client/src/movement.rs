use crate::move_api::{argument_as_string, LatestBlock, MoveEvent, UserTransaction};
use crate::{extract_token_type, ChainAdapter, ChainClientError, Result};
use async_trait::async_trait;
use config_manager::ChainApiConfig;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use tracker_core::{Chain, TokenSwap, TokenTransfer};

/// Movement REST client. Movement is an Aptos fork, so the API shape
/// matches Aptos with a `/v1` prefix, but its transfer and swap surface is
/// broader: generic `::coin::transfer`/`::coin::transfer_coins` entry
/// functions and `DepositEvent`-style events are all recognized.
#[derive(Debug, Clone)]
pub struct MovementClient {
    http_client: Client,
    api_url: String,
    page_limit: u32,
}

impl MovementClient {
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
        let url = format!("{}/v1/accounts/{}/transactions", self.api_url, address);
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
impl ChainAdapter for MovementClient {
    fn chain(&self) -> Chain {
        Chain::Movement
    }

    async fn current_height(&self) -> Result<u64> {
        let url = format!("{}/v1/blocks/by_height/latest", self.api_url);
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
                "Movement block height is not an integer: '{}'",
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
            "Found {} Movement transfers for wallet {} from block {}",
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
            "Found {} Movement swaps for wallet {} from block {}",
            swaps.len(),
            address,
            from_block
        );
        Ok(swaps)
    }
}

fn is_entry_function(tx: &UserTransaction) -> bool {
    tx.payload
        .as_ref()
        .is_some_and(|p| p.payload_type == "entry_function_payload")
}

/// Both detection paths run on every user transaction: the wallet's own
/// coin-transfer call and deposit-style events naming the wallet as the
/// receiver.
pub(crate) fn transfers_from_transactions(
    wallet_address: &str,
    transactions: &[UserTransaction],
) -> Vec<TokenTransfer> {
    let mut transfers = Vec::new();

    for tx in transactions {
        if !tx.is_user_transaction() {
            continue;
        }

        if is_entry_function(tx) {
            let function = tx
                .payload
                .as_ref()
                .map(|p| p.function.as_str())
                .unwrap_or_default();
            if function.contains("::coin::transfer") || function.contains("::coin::transfer_coins")
            {
                match parse_outgoing_transfer(wallet_address, tx) {
                    Some(transfer) => transfers.push(transfer),
                    None => {
                        warn!("Skipping unparsable Movement transfer transaction {}", tx.hash)
                    }
                }
            }
        }

        for event in &tx.events {
            if !event.event_type.contains("CoinDeposited")
                && !event.event_type.contains("DepositEvent")
            {
                continue;
            }
            match parse_deposit_event(wallet_address, tx, event) {
                Some(Some(transfer)) => transfers.push(transfer),
                // Deposit addressed to someone else; not our transfer.
                Some(None) => {}
                None => warn!("Skipping unparsable Movement deposit event in {}", tx.hash),
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

/// Outer `None` means the event was malformed; `Some(None)` means it parsed
/// fine but the wallet is not the receiver.
fn parse_deposit_event(
    wallet_address: &str,
    tx: &UserTransaction,
    event: &MoveEvent,
) -> Option<Option<TokenTransfer>> {
    let token_address = extract_token_type(&event.event_type);
    let amount = event.amount()?;
    let to_address = event
        .data_str("to")
        .map(str::to_string)
        .unwrap_or_else(|| wallet_address.to_string());

    if !to_address.eq_ignore_ascii_case(wallet_address) {
        return Some(None);
    }

    Some(Some(TokenTransfer {
        token_address,
        token_name: None,
        token_symbol: None,
        amount,
        decimals: None,
        from_address: tx.sender.clone(),
        to_address,
        timestamp: tx.timestamp_utc()?,
        transaction_hash: tx.hash.clone(),
        block_height: tx.block_height()?,
    }))
}

/// Swap detection on Movement keys off the submitted entry function: a
/// `::swap`/`::exchange` call plus a swap-like event, with the first
/// withdraw/deposit event pair providing the two legs.
pub(crate) fn swaps_from_transactions(
    wallet_address: &str,
    transactions: &[UserTransaction],
) -> Vec<TokenSwap> {
    let mut swaps = Vec::new();

    for tx in transactions {
        if !tx.is_user_transaction() || !is_entry_function(tx) {
            continue;
        }

        let function = tx
            .payload
            .as_ref()
            .map(|p| p.function.as_str())
            .unwrap_or_default();
        if !function.contains("::swap") && !function.contains("::exchange") {
            continue;
        }
        let exchange_address = function.split("::").next().unwrap_or("").to_string();

        let has_swap_event = tx.events.iter().any(|e| {
            let lowered = e.event_type.to_lowercase();
            lowered.contains("swap") || lowered.contains("exchange")
        });
        if !has_swap_event {
            continue;
        }

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
                exchange_address: exchange_address.clone(),
                exchange_name: None,
                wallet_address: wallet_address.to_string(),
                timestamp: tx.timestamp_utc()?,
                transaction_hash: tx.hash.clone(),
                block_height: tx.block_height()?,
            })
        })();

        match parsed {
            Some(swap) => swaps.push(swap),
            None => warn!("Skipping unparsable Movement swap transaction {}", tx.hash),
        }
    }

    swaps
}
