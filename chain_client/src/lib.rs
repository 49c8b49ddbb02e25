// Chain API clients - fetch raw wallet activity from each supported chain
// and normalize it into the canonical transfer/swap shapes.

pub mod aptos;
pub mod move_api;
pub mod movement;
pub mod registry;
pub mod sui;

pub use aptos::AptosClient;
pub use movement::MovementClient;
pub use registry::AdapterRegistry;
pub use sui::SuiClient;

use async_trait::async_trait;
use thiserror::Error;
use tracker_core::{Chain, TokenSwap, TokenTransfer};

#[derive(Error, Debug)]
pub enum ChainClientError {
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
    #[error("Upstream returned status {status}: {message}")]
    UpstreamStatus { status: u16, message: String },
    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),
    #[error("Unsupported blockchain: '{0}'. Supported blockchains: aptos, sui, movement")]
    UnsupportedChain(String),
}

pub type Result<T> = std::result::Result<T, ChainClientError>;

/// Uniform contract every chain-specific client implements.
///
/// Call-level failures (height or transaction list fetch) propagate to the
/// caller and abort the current poll cycle. A single unparsable transaction
/// inside an otherwise valid response is logged and skipped instead.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Which chain this adapter serves.
    fn chain(&self) -> Chain;

    /// Latest finalized block height or checkpoint sequence number.
    async fn current_height(&self) -> Result<u64>;

    /// Token transfers observed for `address` at or after `from_block` and,
    /// when `to_block` is given, at or before it.
    async fn token_transfers(
        &self,
        address: &str,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<Vec<TokenTransfer>>;

    /// Token swaps observed for `address`, identified heuristically from
    /// event logs and swap-like function names. Best-effort, not
    /// protocol-exact.
    async fn token_swaps(
        &self,
        address: &str,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<Vec<TokenSwap>>;
}

/// Extract the token type from an event-type string.
///
/// Prefers the generic parameter embedded in angle brackets
/// (`0x1::coin::CoinStore<0x2::usdc::USDC>` yields `0x2::usdc::USDC`);
/// falls back to the first `::`-delimited segment when no brackets are
/// present (`0x1::coin::TransferEvent` yields `0x1`).
pub fn extract_token_type(event_type: &str) -> String {
    if let Some(inner) = event_type.split('<').nth(1) {
        return inner.split('>').next().unwrap_or(inner).to_string();
    }
    event_type.split("::").next().unwrap_or("").to_string()
}
