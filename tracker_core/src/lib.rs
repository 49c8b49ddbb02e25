use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Unsupported blockchain: '{0}'. Supported blockchains: aptos, sui, movement")]
    UnsupportedChain(String),
    #[error("Unsupported transaction type: '{0}'. Supported types: transfer, swap")]
    UnsupportedTransactionType(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Supported blockchain networks. The string values are part of the
/// persisted/queried contract and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Aptos,
    Sui,
    Movement,
}

impl Chain {
    pub const ALL: [Chain; 3] = [Chain::Aptos, Chain::Sui, Chain::Movement];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Aptos => "aptos",
            Chain::Sui => "sui",
            Chain::Movement => "movement",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "aptos" => Ok(Chain::Aptos),
            "sui" => Ok(Chain::Sui),
            "movement" => Ok(Chain::Movement),
            other => Err(CoreError::UnsupportedChain(other.to_string())),
        }
    }
}

/// Canonical event kind stored on every transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Transfer,
    Swap,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Transfer => "transfer",
            TransactionType::Swap => "swap",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "transfer" => Ok(TransactionType::Transfer),
            "swap" => Ok(TransactionType::Swap),
            other => Err(CoreError::UnsupportedTransactionType(other.to_string())),
        }
    }
}

/// A token transfer observed for a tracked wallet, normalized from the
/// chain-specific wire format by the chain adapters.
///
/// Amounts are decimal strings exactly as reported by the chain; they are
/// never parsed into floats anywhere in the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    pub token_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_symbol: Option<String>,
    pub amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
    pub from_address: String,
    pub to_address: String,
    pub timestamp: DateTime<Utc>,
    pub transaction_hash: String,
    pub block_height: u64,
}

/// A token swap observed for a tracked wallet. Swap detection is a
/// best-effort heuristic over event logs, not a protocol-exact decoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSwap {
    pub token_in_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_in_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_in_symbol: Option<String>,
    pub amount_in: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimals_in: Option<u8>,
    pub token_out_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_out_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_out_symbol: Option<String>,
    pub amount_out: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimals_out: Option<u8>,
    pub exchange_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_name: Option<String>,
    pub wallet_address: String,
    pub timestamp: DateTime<Utc>,
    pub transaction_hash: String,
    pub block_height: u64,
}

/// Persisted canonical event. Transfer-specific and swap-specific fields
/// are optional so both kinds share one collection, mirroring the storage
/// contract; `transaction_type` discriminates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub blockchain: Chain,
    pub transaction_type: TransactionType,
    pub transaction_hash: String,
    pub block_height: u64,
    pub timestamp: DateTime<Utc>,
    pub wallet_address: String,
    // Transfer fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_address: Option<String>,
    // Swap fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_in_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_in_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_in_symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_in: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimals_in: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_out_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_out_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_out_symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_out: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimals_out: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    fn empty(
        blockchain: Chain,
        transaction_type: TransactionType,
        transaction_hash: String,
        block_height: u64,
        timestamp: DateTime<Utc>,
        wallet_address: String,
    ) -> Self {
        Self {
            blockchain,
            transaction_type,
            transaction_hash,
            block_height,
            timestamp,
            wallet_address,
            token_address: None,
            token_name: None,
            token_symbol: None,
            amount: None,
            decimals: None,
            from_address: None,
            to_address: None,
            token_in_address: None,
            token_in_name: None,
            token_in_symbol: None,
            amount_in: None,
            decimals_in: None,
            token_out_address: None,
            token_out_name: None,
            token_out_symbol: None,
            amount_out: None,
            decimals_out: None,
            exchange_address: None,
            exchange_name: None,
            created_at: Utc::now(),
        }
    }

    pub fn from_transfer(blockchain: Chain, wallet_address: &str, transfer: TokenTransfer) -> Self {
        let mut record = Self::empty(
            blockchain,
            TransactionType::Transfer,
            transfer.transaction_hash,
            transfer.block_height,
            transfer.timestamp,
            wallet_address.to_string(),
        );
        record.token_address = Some(transfer.token_address);
        record.token_name = transfer.token_name;
        record.token_symbol = transfer.token_symbol;
        record.amount = Some(transfer.amount);
        record.decimals = transfer.decimals;
        record.from_address = Some(transfer.from_address);
        record.to_address = Some(transfer.to_address);
        record
    }

    pub fn from_swap(blockchain: Chain, wallet_address: &str, swap: TokenSwap) -> Self {
        let mut record = Self::empty(
            blockchain,
            TransactionType::Swap,
            swap.transaction_hash,
            swap.block_height,
            swap.timestamp,
            wallet_address.to_string(),
        );
        record.token_in_address = Some(swap.token_in_address);
        record.token_in_name = swap.token_in_name;
        record.token_in_symbol = swap.token_in_symbol;
        record.amount_in = Some(swap.amount_in);
        record.decimals_in = swap.decimals_in;
        record.token_out_address = Some(swap.token_out_address);
        record.token_out_name = swap.token_out_name;
        record.token_out_symbol = swap.token_out_symbol;
        record.amount_out = Some(swap.amount_out);
        record.decimals_out = swap.decimals_out;
        record.exchange_address = Some(swap.exchange_address);
        record.exchange_name = swap.exchange_name;
        record
    }
}

/// Per-wallet polling cursor. At most one row exists per (address, chain);
/// `last_processed_height` only moves forward while the wallet is active.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedWallet {
    pub address: String,
    pub blockchain: Chain,
    pub last_processed_height: Option<u64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Queue message driving one polling cycle for one wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingJob {
    pub wallet_address: String,
    pub blockchain: Chain,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_block: Option<u64>,
}

impl TrackingJob {
    pub fn new(wallet_address: impl Into<String>, blockchain: Chain, from_block: Option<u64>) -> Self {
        Self {
            wallet_address: wallet_address.into(),
            blockchain,
            from_block,
        }
    }
}
