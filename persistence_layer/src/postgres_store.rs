use crate::{PersistenceError, Result, TransactionFilter, WalletStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{debug, info};
use tracker_core::{Chain, TrackedWallet, TransactionRecord, TransactionType};

/// PostgreSQL-backed store for tracked-wallet cursors and canonical
/// transaction records.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await?;

        info!("PostgreSQL pool initialized: max_connections=20, acquire_timeout=30s");
        Ok(Self { pool })
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tracked_wallets (
                address TEXT NOT NULL,
                blockchain TEXT NOT NULL,
                last_processed_height BIGINT,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (address, blockchain)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id BIGSERIAL PRIMARY KEY,
                blockchain TEXT NOT NULL,
                transaction_type TEXT NOT NULL,
                transaction_hash TEXT NOT NULL,
                block_height BIGINT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                wallet_address TEXT NOT NULL,
                token_address TEXT,
                token_name TEXT,
                token_symbol TEXT,
                amount TEXT,
                decimals SMALLINT,
                from_address TEXT,
                to_address TEXT,
                token_in_address TEXT,
                token_in_name TEXT,
                token_in_symbol TEXT,
                amount_in TEXT,
                decimals_in SMALLINT,
                token_out_address TEXT,
                token_out_name TEXT,
                token_out_symbol TEXT,
                amount_out TEXT,
                decimals_out SMALLINT,
                exchange_address TEXT,
                exchange_name TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Indexes matching the frequent query patterns.
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_transactions_wallet
             ON transactions (wallet_address, blockchain, transaction_type)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_transactions_height
             ON transactions (blockchain, block_height)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_transactions_timestamp
             ON transactions (timestamp DESC)",
        )
        .execute(&self.pool)
        .await?;

        info!("Database schema initialized");
        Ok(())
    }

    fn wallet_from_row(row: &sqlx::postgres::PgRow) -> Result<TrackedWallet> {
        let blockchain: String = row.get("blockchain");
        let blockchain: Chain = blockchain
            .parse()
            .map_err(|_| PersistenceError::InvalidRecord(format!("unknown chain '{}'", blockchain)))?;
        let last_processed_height: Option<i64> = row.get("last_processed_height");

        Ok(TrackedWallet {
            address: row.get("address"),
            blockchain,
            last_processed_height: last_processed_height.map(|h| h as u64),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<TransactionRecord> {
        let blockchain: String = row.get("blockchain");
        let blockchain: Chain = blockchain
            .parse()
            .map_err(|_| PersistenceError::InvalidRecord(format!("unknown chain '{}'", blockchain)))?;
        let transaction_type: String = row.get("transaction_type");
        let transaction_type: TransactionType = transaction_type.parse().map_err(|_| {
            PersistenceError::InvalidRecord(format!("unknown transaction type '{}'", transaction_type))
        })?;
        let block_height: i64 = row.get("block_height");
        let timestamp: DateTime<Utc> = row.get("timestamp");
        let created_at: DateTime<Utc> = row.get("created_at");

        let get_decimals = |column: &str| -> Option<u8> {
            row.get::<Option<i16>, _>(column).map(|d| d as u8)
        };

        Ok(TransactionRecord {
            blockchain,
            transaction_type,
            transaction_hash: row.get("transaction_hash"),
            block_height: block_height as u64,
            timestamp,
            wallet_address: row.get("wallet_address"),
            token_address: row.get("token_address"),
            token_name: row.get("token_name"),
            token_symbol: row.get("token_symbol"),
            amount: row.get("amount"),
            decimals: get_decimals("decimals"),
            from_address: row.get("from_address"),
            to_address: row.get("to_address"),
            token_in_address: row.get("token_in_address"),
            token_in_name: row.get("token_in_name"),
            token_in_symbol: row.get("token_in_symbol"),
            amount_in: row.get("amount_in"),
            decimals_in: get_decimals("decimals_in"),
            token_out_address: row.get("token_out_address"),
            token_out_name: row.get("token_out_name"),
            token_out_symbol: row.get("token_out_symbol"),
            amount_out: row.get("amount_out"),
            decimals_out: get_decimals("decimals_out"),
            exchange_address: row.get("exchange_address"),
            exchange_name: row.get("exchange_name"),
            created_at,
        })
    }
}

/// Page numbers come straight from API callers; the arithmetic must not
/// overflow for any `u64` input.
fn page_offset(page: u64, limit: u64) -> u64 {
    page.saturating_sub(1).saturating_mul(limit)
}

#[async_trait]
impl WalletStore for PostgresStore {
    async fn upsert_wallet(
        &self,
        address: &str,
        blockchain: Chain,
        last_processed_height: Option<u64>,
        is_active: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tracked_wallets (address, blockchain, last_processed_height, is_active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (address, blockchain) DO UPDATE SET
                last_processed_height = EXCLUDED.last_processed_height,
                is_active = EXCLUDED.is_active,
                updated_at = now()
            "#,
        )
        .bind(address)
        .bind(blockchain.as_str())
        .bind(last_processed_height.map(|h| h as i64))
        .bind(is_active)
        .execute(&self.pool)
        .await?;

        debug!(
            "Upserted tracked wallet {} on {} (height={:?}, active={})",
            address, blockchain, last_processed_height, is_active
        );
        Ok(())
    }

    async fn find_active_wallet(
        &self,
        address: &str,
        blockchain: Chain,
    ) -> Result<Option<TrackedWallet>> {
        let row = sqlx::query(
            r#"
            SELECT address, blockchain, last_processed_height, is_active, created_at, updated_at
            FROM tracked_wallets
            WHERE address = $1 AND blockchain = $2 AND is_active = TRUE
            "#,
        )
        .bind(address)
        .bind(blockchain.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::wallet_from_row).transpose()
    }

    async fn update_wallet_height(
        &self,
        address: &str,
        blockchain: Chain,
        height: u64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tracked_wallets
            SET last_processed_height = $3, updated_at = now()
            WHERE address = $1 AND blockchain = $2
            "#,
        )
        .bind(address)
        .bind(blockchain.as_str())
        .bind(height as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_wallet_active(
        &self,
        address: &str,
        blockchain: Chain,
        active: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tracked_wallets
            SET is_active = $3, updated_at = now()
            WHERE address = $1 AND blockchain = $2
            "#,
        )
        .bind(address)
        .bind(blockchain.as_str())
        .bind(active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_transactions(&self, records: &[TransactionRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        // Single transaction so a rejected batch leaves nothing committed
        // and the cycle can safely retry the same block range.
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO transactions
                    (blockchain, transaction_type, transaction_hash, block_height, timestamp,
                     wallet_address, token_address, token_name, token_symbol, amount, decimals,
                     from_address, to_address, token_in_address, token_in_name, token_in_symbol,
                     amount_in, decimals_in, token_out_address, token_out_name, token_out_symbol,
                     amount_out, decimals_out, exchange_address, exchange_name, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                        $17, $18, $19, $20, $21, $22, $23, $24, $25, $26)
                "#,
            )
            .bind(record.blockchain.as_str())
            .bind(record.transaction_type.as_str())
            .bind(&record.transaction_hash)
            .bind(record.block_height as i64)
            .bind(record.timestamp)
            .bind(&record.wallet_address)
            .bind(&record.token_address)
            .bind(&record.token_name)
            .bind(&record.token_symbol)
            .bind(&record.amount)
            .bind(record.decimals.map(|d| d as i16))
            .bind(&record.from_address)
            .bind(&record.to_address)
            .bind(&record.token_in_address)
            .bind(&record.token_in_name)
            .bind(&record.token_in_symbol)
            .bind(&record.amount_in)
            .bind(record.decimals_in.map(|d| d as i16))
            .bind(&record.token_out_address)
            .bind(&record.token_out_name)
            .bind(&record.token_out_symbol)
            .bind(&record.amount_out)
            .bind(record.decimals_out.map(|d| d as i16))
            .bind(&record.exchange_address)
            .bind(&record.exchange_name)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Inserted {} transaction records", records.len());
        Ok(())
    }

    async fn list_wallets(&self, blockchain: Option<Chain>) -> Result<Vec<TrackedWallet>> {
        let rows = match blockchain {
            Some(chain) => {
                sqlx::query(
                    r#"
                    SELECT address, blockchain, last_processed_height, is_active, created_at, updated_at
                    FROM tracked_wallets
                    WHERE blockchain = $1
                    ORDER BY created_at DESC
                    "#,
                )
                .bind(chain.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT address, blockchain, last_processed_height, is_active, created_at, updated_at
                    FROM tracked_wallets
                    ORDER BY created_at DESC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(Self::wallet_from_row).collect()
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<TransactionRecord>, u64)> {
        let mut conditions = String::from("wallet_address = $1");
        let mut next_param = 2;
        if filter.blockchain.is_some() {
            conditions.push_str(&format!(" AND blockchain = ${}", next_param));
            next_param += 1;
        }
        if filter.transaction_type.is_some() {
            conditions.push_str(&format!(" AND transaction_type = ${}", next_param));
            next_param += 1;
        }

        let select_sql = format!(
            "SELECT * FROM transactions WHERE {} ORDER BY timestamp DESC OFFSET ${} LIMIT ${}",
            conditions,
            next_param,
            next_param + 1
        );
        let count_sql = format!("SELECT COUNT(*) AS count FROM transactions WHERE {}", conditions);

        let offset = page_offset(page, limit);

        let mut select_query = sqlx::query(&select_sql).bind(&filter.wallet_address);
        let mut count_query = sqlx::query(&count_sql).bind(&filter.wallet_address);
        if let Some(chain) = filter.blockchain {
            select_query = select_query.bind(chain.as_str());
            count_query = count_query.bind(chain.as_str());
        }
        if let Some(transaction_type) = filter.transaction_type {
            select_query = select_query.bind(transaction_type.as_str());
            count_query = count_query.bind(transaction_type.as_str());
        }
        let select_query = select_query
            .bind(offset.min(i64::MAX as u64) as i64)
            .bind(limit as i64);

        let rows = select_query.fetch_all(&self.pool).await?;
        let records: Result<Vec<TransactionRecord>> =
            rows.iter().map(Self::record_from_row).collect();

        let count_row = count_query.fetch_one(&self.pool).await?;
        let total: i64 = count_row.get("count");

        Ok((records?, total as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_offset_saturates_instead_of_overflowing() {
        assert_eq!(page_offset(1, 50), 0);
        assert_eq!(page_offset(3, 50), 100);
        assert_eq!(page_offset(u64::MAX, 200), u64::MAX);
        assert_eq!(page_offset(0, 50), 0);
    }

    // Store tests need a live PostgreSQL instance; they are skipped unless
    // DATABASE_URL is set.
    async fn test_store() -> Option<PostgresStore> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let store = PostgresStore::new(&url).await.ok()?;
        store.init_schema().await.ok()?;
        Some(store)
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_find_respects_active_flag() {
        let Some(store) = test_store().await else {
            return;
        };

        let address = format!("0xtest_{}", std::process::id());
        store
            .upsert_wallet(&address, Chain::Aptos, Some(4000), true)
            .await
            .unwrap();
        store
            .upsert_wallet(&address, Chain::Aptos, Some(4000), true)
            .await
            .unwrap();

        let wallet = store
            .find_active_wallet(&address, Chain::Aptos)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(wallet.last_processed_height, Some(4000));

        store
            .set_wallet_active(&address, Chain::Aptos, false)
            .await
            .unwrap();
        assert!(store
            .find_active_wallet(&address, Chain::Aptos)
            .await
            .unwrap()
            .is_none());
    }
}
