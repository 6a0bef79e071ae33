// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::data::schema::{StatRow, TransactionRecord};
use crate::domain::error::AppError;
use crate::services::activity::ledger::ActivityStats;
use sqlx::{
    Pool, Row, Sqlite,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::Initialization(format!("DB Connect failed: {}", e)))?
            .create_if_missing(true);

        // Every connection to an in-memory database is its own database.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Initialization(format!("DB Connect failed: {}", e)))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Initialization(format!("DB Migration failed: {}", e)))?;

        Ok(Self { pool })
    }

    pub async fn load_stats(&self) -> Result<Option<ActivityStats>, AppError> {
        let rows = sqlx::query_as::<_, StatRow>("SELECT key, value FROM activity_stats")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Persistence(format!("Stats load failed: {}", e)))?;

        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(ActivityStats::from_pairs(
            rows.iter().map(|r| (r.key.as_str(), r.value)),
        )))
    }

    pub async fn save_stats(&self, stats: &ActivityStats) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Persistence(format!("Stats save failed: {}", e)))?;
        for (key, value) in stats.to_pairs() {
            sqlx::query(
                r#"
                INSERT INTO activity_stats (key, value)
                VALUES (?, ?)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Persistence(format!("Stats upsert {key} failed: {}", e)))?;
        }
        tx.commit()
            .await
            .map_err(|e| AppError::Persistence(format!("Stats commit failed: {}", e)))?;
        Ok(())
    }

    pub async fn save_transaction(
        &self,
        tx_hash: &str,
        chain_id: u64,
        wallet: &str,
        action: &str,
        attempt_index: u32,
        max_price_per_gas_wei: &str,
    ) -> Result<i64, AppError> {
        let chain_id_i64 = chain_id as i64;

        let row = sqlx::query(
            r#"
            INSERT INTO transactions (tx_hash, chain_id, wallet, action, attempt_index, max_price_per_gas_wei)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(tx_hash)
        .bind(chain_id_i64)
        .bind(wallet)
        .bind(action)
        .bind(i64::from(attempt_index))
        .bind(max_price_per_gas_wei)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Persistence(format!("Transaction insert {tx_hash} failed: {e}")))?;
        let id: i64 = row.get("id");

        Ok(id)
    }

    pub async fn update_status(
        &self,
        tx_hash: &str,
        status: &str,
        block_number: Option<u64>,
    ) -> Result<(), AppError> {
        let block_i64 = block_number.map(|b| b as i64);
        sqlx::query(
            r#"
            UPDATE transactions
            SET status = ?,
                block_number = COALESCE(?, block_number)
            WHERE tx_hash = ?
            "#,
        )
        .bind(status)
        .bind(block_i64)
        .bind(tx_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Persistence(format!("Status update failed: {}", e)))?;

        Ok(())
    }

    pub async fn get_recent_txs(&self, limit: i64) -> Result<Vec<TransactionRecord>, AppError> {
        let recs = sqlx::query_as::<_, TransactionRecord>(
            "SELECT * FROM transactions ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Persistence(format!("Query failed: {}", e)))?;

        Ok(recs)
    }
}
