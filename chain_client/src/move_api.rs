//! Raw wire types shared by the Move-based chains (Aptos and its Movement
//! fork expose the same REST transaction shape).

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct LatestBlock {
    pub block_height: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserTransaction {
    #[serde(rename = "type")]
    pub tx_type: String,
    pub hash: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub receiver: Option<String>,
    #[serde(default)]
    pub payload: Option<EntryPayload>,
    #[serde(default)]
    pub events: Vec<MoveEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntryPayload {
    #[serde(rename = "type", default)]
    pub payload_type: String,
    #[serde(default)]
    pub function: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoveEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

impl UserTransaction {
    pub fn is_user_transaction(&self) -> bool {
        self.tx_type == "user_transaction"
    }

    /// Transaction version doubles as the block-height cursor on Move chains.
    pub fn block_height(&self) -> Option<u64> {
        self.version.parse().ok()
    }

    /// On-chain timestamps are microseconds since epoch, as decimal strings.
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        let micros: i64 = self.timestamp.parse().ok()?;
        DateTime::from_timestamp_micros(micros)
    }
}

impl MoveEvent {
    /// `data.amount`, tolerating both string and numeric encodings.
    pub fn amount(&self) -> Option<String> {
        match self.data.get("amount") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

/// Function-call arguments arrive as JSON values; transfer recipients and
/// amounts may be strings or numbers depending on the node version.
pub fn argument_as_string(args: &[Value], index: usize) -> Option<String> {
    match args.get(index) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_parses_microseconds() {
        let tx: UserTransaction = serde_json::from_value(serde_json::json!({
            "type": "user_transaction",
            "hash": "0xh",
            "version": "1234",
            "timestamp": "1700000000000000",
            "sender": "0xs"
        }))
        .unwrap();

        assert_eq!(tx.block_height(), Some(1234));
        let ts = tx.timestamp_utc().unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }

    #[test]
    fn event_amount_accepts_string_and_number() {
        let event: MoveEvent = serde_json::from_value(serde_json::json!({
            "type": "0x1::coin::DepositEvent",
            "data": { "amount": "500" }
        }))
        .unwrap();
        assert_eq!(event.amount().as_deref(), Some("500"));

        let event: MoveEvent = serde_json::from_value(serde_json::json!({
            "type": "0x1::coin::DepositEvent",
            "data": { "amount": 500 }
        }))
        .unwrap();
        assert_eq!(event.amount().as_deref(), Some("500"));
    }
}
