use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracker_core::{TrackedWallet, TransactionRecord};

/// Standard API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Request body for starting or stopping wallet tracking. Chain arrives as
/// a raw string so an unknown value produces a validation error naming the
/// supported set instead of a deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTrackingRequest {
    pub wallet_address: String,
    pub blockchain: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingResponse {
    pub success: bool,
    pub message: String,
    pub wallet_address: String,
    pub blockchain: String,
}

/// Query parameters for the wallet list endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct WalletListQuery {
    pub blockchain: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletListResponse {
    pub success: bool,
    pub wallets: Vec<TrackedWallet>,
    pub count: usize,
}

/// Query parameters for the transaction query endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionQuery {
    pub wallet_address: Option<String>,
    pub blockchain: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub pages: u64,
}

impl Pagination {
    pub fn new(total: u64, page: u64, limit: u64) -> Self {
        let pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            total,
            page,
            limit,
            pages,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionListResponse {
    pub success: bool,
    pub transactions: Vec<TransactionRecord>,
    pub pagination: Pagination,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_rounds_page_count_up() {
        let p = Pagination::new(101, 1, 50);
        assert_eq!(p.pages, 3);

        let empty = Pagination::new(0, 1, 50);
        assert_eq!(empty.pages, 0);
    }

    #[test]
    fn tracking_request_uses_wire_field_names() {
        let parsed: WalletTrackingRequest = serde_json::from_str(
            r#"{"walletAddress":"0xabc","blockchain":"aptos"}"#,
        )
        .unwrap();
        assert_eq!(parsed.wallet_address, "0xabc");
        assert_eq!(parsed.blockchain, "aptos");
    }
}
