use crate::{ChainAdapter, ChainClientError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use config_manager::ChainApiConfig;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use tracker_core::{Chain, TokenSwap, TokenTransfer};

/// Sui JSON-RPC client.
///
/// The transaction query is not block-range-scoped upstream; each
/// transaction's own checkpoint number is compared against the requested
/// range and out-of-range entries are discarded client-side.
#[derive(Debug, Clone)]
pub struct SuiClient {
    http_client: Client,
    api_url: String,
    page_limit: u32,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TransactionBlocksPage {
    #[serde(default)]
    data: Vec<SuiTransactionBlock>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SuiTransactionBlock {
    pub digest: String,
    #[serde(default)]
    pub checkpoint: Option<String>,
    #[serde(rename = "timestampMs", default)]
    pub timestamp_ms: Option<String>,
    #[serde(default)]
    pub events: Vec<SuiEvent>,
    #[serde(default)]
    pub transaction: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SuiEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub fields: Value,
}

impl SuiTransactionBlock {
    fn checkpoint_number(&self) -> Option<u64> {
        self.checkpoint.as_deref()?.parse().ok()
    }

    fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        let millis: i64 = self.timestamp_ms.as_deref()?.parse().ok()?;
        DateTime::from_timestamp_millis(millis)
    }

    /// Range check against the transaction's own checkpoint; transactions
    /// without a checkpoint cannot be placed and are excluded.
    fn in_range(&self, from_block: u64, to_block: Option<u64>) -> bool {
        let Some(checkpoint) = self.checkpoint_number() else {
            return false;
        };
        if checkpoint < from_block {
            return false;
        }
        if let Some(to_block) = to_block {
            if checkpoint > to_block {
                return false;
            }
        }
        true
    }
}

impl SuiEvent {
    fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    fn amount(&self) -> Option<String> {
        match self.fields.get("amount") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    fn amount_magnitude(&self) -> i128 {
        self.amount()
            .and_then(|a| a.parse::<i128>().ok())
            .map(i128::abs)
            .unwrap_or(0)
    }
}

impl SuiClient {
    pub fn new(config: &ChainApiConfig, page_limit: u32) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent("wallet-tracker/1.0")
            .build()?;

        Ok(Self {
            http_client,
            api_url: config.api_url.clone(),
            page_limit,
        })
    }

    async fn rpc_call<T: for<'de> Deserialize<'de>>(&self, method: &str, params: Value) -> Result<T> {
        let response = self
            .http_client
            .post(&self.api_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
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

        let rpc: RpcResponse<T> = response.json().await?;
        if let Some(error) = rpc.error {
            return Err(ChainClientError::MalformedResponse(format!(
                "Sui RPC error for {}: {}",
                method, error
            )));
        }
        rpc.result.ok_or_else(|| {
            ChainClientError::MalformedResponse(format!("Sui RPC response for {} has no result", method))
        })
    }

    async fn query_transaction_blocks(&self, address: &str) -> Result<Vec<SuiTransactionBlock>> {
        let page: TransactionBlocksPage = self
            .rpc_call(
                "suix_queryTransactionBlocks",
                json!([
                    {
                        "filter": { "FromOrTo": address },
                        "options": {
                            "showEffects": true,
                            "showInput": true,
                            "showEvents": true,
                        }
                    },
                    null,
                    self.page_limit,
                    false,
                ]),
            )
            .await?;
        Ok(page.data)
    }
}

#[async_trait]
impl ChainAdapter for SuiClient {
    fn chain(&self) -> Chain {
        Chain::Sui
    }

    async fn current_height(&self) -> Result<u64> {
        let sequence: String = self
            .rpc_call("sui_getLatestCheckpointSequenceNumber", json!([]))
            .await?;
        sequence.parse().map_err(|_| {
            ChainClientError::MalformedResponse(format!(
                "Sui checkpoint sequence is not an integer: '{}'",
                sequence
            ))
        })
    }

    async fn token_transfers(
        &self,
        address: &str,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<Vec<TokenTransfer>> {
        let transactions = self.query_transaction_blocks(address).await?;
        let transfers = transfers_from_blocks(address, &transactions, from_block, to_block);
        debug!(
            "Found {} Sui transfers for wallet {} in range [{}, {:?}]",
            transfers.len(),
            address,
            from_block,
            to_block
        );
        Ok(transfers)
    }

    async fn token_swaps(
        &self,
        address: &str,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<Vec<TokenSwap>> {
        let transactions = self.query_transaction_blocks(address).await?;
        let swaps = swaps_from_blocks(address, &transactions, from_block, to_block);
        debug!(
            "Found {} Sui swaps for wallet {} in range [{}, {:?}]",
            swaps.len(),
            address,
            from_block,
            to_block
        );
        Ok(swaps)
    }
}

pub(crate) fn transfers_from_blocks(
    wallet_address: &str,
    transactions: &[SuiTransactionBlock],
    from_block: u64,
    to_block: Option<u64>,
) -> Vec<TokenTransfer> {
    let mut transfers = Vec::new();

    for tx in transactions {
        if !tx.in_range(from_block, to_block) {
            continue;
        }

        for event in &tx.events {
            if !event.event_type.contains("CoinBalanceChange") {
                continue;
            }
            let change_type = event.field_str("changeType").unwrap_or_default();
            // Only actual transfers, not gas or rebate adjustments.
            if change_type != "Receive" && change_type != "Pay" {
                continue;
            }

            let parsed = (|| {
                let amount = event.amount()?;
                let coin_type = event.field_str("coinType")?.to_string();
                let (from_address, to_address) = if change_type == "Pay" {
                    (
                        wallet_address.to_string(),
                        event.field_str("recipient").unwrap_or_default().to_string(),
                    )
                } else {
                    (
                        event.field_str("sender").unwrap_or_default().to_string(),
                        wallet_address.to_string(),
                    )
                };

                Some(TokenTransfer {
                    token_address: coin_type,
                    token_name: None,
                    token_symbol: None,
                    amount,
                    decimals: None,
                    from_address,
                    to_address,
                    timestamp: tx.timestamp_utc()?,
                    transaction_hash: tx.digest.clone(),
                    block_height: tx.checkpoint_number()?,
                })
            })();

            match parsed {
                Some(transfer) => transfers.push(transfer),
                None => warn!("Skipping unparsable Sui transfer event in {}", tx.digest),
            }
        }
    }

    transfers
}

/// Swap detection on Sui: a ProgrammableTransaction containing a MoveCall
/// whose function name looks like a swap, paired with the wallet's largest
/// outgoing and incoming balance-change events.
pub(crate) fn swaps_from_blocks(
    wallet_address: &str,
    transactions: &[SuiTransactionBlock],
    from_block: u64,
    to_block: Option<u64>,
) -> Vec<TokenSwap> {
    let mut swaps = Vec::new();

    for tx in transactions {
        if !tx.in_range(from_block, to_block) {
            continue;
        }

        let Some(swap_command) = find_swap_command(tx) else {
            continue;
        };
        let exchange_address = swap_command
            .get("package")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let token_in = tx
            .events
            .iter()
            .filter(|e| {
                e.event_type.contains("CoinBalanceChange")
                    && e.field_str("changeType") == Some("Pay")
                    && e.field_str("owner") == Some(wallet_address)
            })
            .max_by_key(|e| e.amount_magnitude());
        let token_out = tx
            .events
            .iter()
            .filter(|e| {
                e.event_type.contains("CoinBalanceChange")
                    && e.field_str("changeType") == Some("Receive")
                    && e.field_str("owner") == Some(wallet_address)
            })
            .max_by_key(|e| e.amount_magnitude());

        let (Some(token_in), Some(token_out)) = (token_in, token_out) else {
            continue;
        };

        let parsed = (|| {
            Some(TokenSwap {
                token_in_address: token_in.field_str("coinType")?.to_string(),
                token_in_name: None,
                token_in_symbol: None,
                amount_in: token_in.amount()?,
                decimals_in: None,
                token_out_address: token_out.field_str("coinType")?.to_string(),
                token_out_name: None,
                token_out_symbol: None,
                amount_out: token_out.amount()?,
                decimals_out: None,
                exchange_address: exchange_address.clone(),
                exchange_name: None,
                wallet_address: wallet_address.to_string(),
                timestamp: tx.timestamp_utc()?,
                transaction_hash: tx.digest.clone(),
                block_height: tx.checkpoint_number()?,
            })
        })();

        match parsed {
            Some(swap) => swaps.push(swap),
            None => warn!("Skipping unparsable Sui swap transaction {}", tx.digest),
        }
    }

    swaps
}

fn find_swap_command(tx: &SuiTransactionBlock) -> Option<&Value> {
    let transaction = tx.transaction.as_ref()?;
    let inner = transaction.get("data")?.get("transaction")?;
    if inner.get("kind")?.as_str()? != "ProgrammableTransaction" {
        return None;
    }

    inner
        .get("transactions")?
        .as_array()?
        .iter()
        .filter_map(|command| command.get("MoveCall"))
        .find(|move_call| {
            move_call
                .get("function")
                .and_then(Value::as_str)
                .is_some_and(|function| {
                    function.contains("swap")
                        || function.contains("exchange")
                        || function.contains("trade")
                })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block(value: Value) -> SuiTransactionBlock {
        serde_json::from_value(value).unwrap()
    }

    fn balance_change(change_type: &str, coin: &str, amount: &str, owner: &str) -> Value {
        json!({
            "type": "0x2::coin::CoinBalanceChange",
            "fields": {
                "changeType": change_type,
                "coinType": coin,
                "amount": amount,
                "owner": owner,
                "sender": "0xsender",
                "recipient": "0xrecipient"
            }
        })
    }

    #[test]
    fn transfers_outside_checkpoint_range_are_excluded() {
        let transactions = vec![
            block(json!({
                "digest": "d1",
                "checkpoint": "3999",
                "timestampMs": "1700000000000",
                "events": [balance_change("Receive", "0x2::sui::SUI", "10", "0xwallet")]
            })),
            block(json!({
                "digest": "d2",
                "checkpoint": "4500",
                "timestampMs": "1700000000000",
                "events": [balance_change("Receive", "0x2::sui::SUI", "20", "0xwallet")]
            })),
            block(json!({
                "digest": "d3",
                "checkpoint": "5001",
                "timestampMs": "1700000000000",
                "events": [balance_change("Receive", "0x2::sui::SUI", "30", "0xwallet")]
            })),
        ];

        let transfers = transfers_from_blocks("0xwallet", &transactions, 4000, Some(5000));
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].transaction_hash, "d2");
        assert_eq!(transfers[0].block_height, 4500);
    }

    #[test]
    fn pay_and_receive_set_directions() {
        let transactions = vec![block(json!({
            "digest": "d4",
            "checkpoint": "4100",
            "timestampMs": "1700000000000",
            "events": [
                balance_change("Pay", "0x2::sui::SUI", "-50", "0xwallet"),
                balance_change("Receive", "0x2::usdc::USDC", "70", "0xwallet"),
                balance_change("Gas", "0x2::sui::SUI", "-1", "0xwallet")
            ]
        }))];

        let transfers = transfers_from_blocks("0xwallet", &transactions, 4000, None);
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].from_address, "0xwallet");
        assert_eq!(transfers[0].to_address, "0xrecipient");
        assert_eq!(transfers[1].from_address, "0xsender");
        assert_eq!(transfers[1].to_address, "0xwallet");
    }

    #[test]
    fn swap_takes_largest_legs() {
        let transactions = vec![block(json!({
            "digest": "d5",
            "checkpoint": "4200",
            "timestampMs": "1700000000000",
            "transaction": {
                "data": {
                    "transaction": {
                        "kind": "ProgrammableTransaction",
                        "transactions": [
                            { "MoveCall": { "package": "0xdexpkg", "function": "swap_exact_input" } }
                        ]
                    }
                }
            },
            "events": [
                balance_change("Pay", "0x2::sui::SUI", "-1", "0xwallet"),
                balance_change("Pay", "0x2::usdc::USDC", "-500", "0xwallet"),
                balance_change("Receive", "0x3::apt::APT", "99", "0xwallet")
            ]
        }))];

        let swaps = swaps_from_blocks("0xwallet", &transactions, 4000, Some(5000));
        assert_eq!(swaps.len(), 1);
        assert_eq!(swaps[0].exchange_address, "0xdexpkg");
        assert_eq!(swaps[0].token_in_address, "0x2::usdc::USDC");
        assert_eq!(swaps[0].amount_in, "-500");
        assert_eq!(swaps[0].token_out_address, "0x3::apt::APT");
    }

    #[test]
    fn non_swap_move_call_is_ignored() {
        let transactions = vec![block(json!({
            "digest": "d6",
            "checkpoint": "4200",
            "timestampMs": "1700000000000",
            "transaction": {
                "data": {
                    "transaction": {
                        "kind": "ProgrammableTransaction",
                        "transactions": [
                            { "MoveCall": { "package": "0xpkg", "function": "mint_nft" } }
                        ]
                    }
                }
            },
            "events": [
                balance_change("Pay", "0x2::sui::SUI", "-500", "0xwallet"),
                balance_change("Receive", "0x3::apt::APT", "99", "0xwallet")
            ]
        }))];

        assert!(swaps_from_blocks("0xwallet", &transactions, 4000, None).is_empty());
    }

    #[test]
    fn missing_checkpoint_is_excluded() {
        let transactions = vec![block(json!({
            "digest": "d7",
            "timestampMs": "1700000000000",
            "events": [balance_change("Receive", "0x2::sui::SUI", "10", "0xwallet")]
        }))];

        assert!(transfers_from_blocks("0xwallet", &transactions, 0, None).is_empty());
    }
}
