// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, FromRow, Serialize)]
pub struct TransactionRecord {
    pub id: i64,
    pub tx_hash: String,
    pub chain_id: i64,
    pub wallet: String,
    pub action: String,
    pub attempt_index: i64,
    pub max_price_per_gas_wei: String,
    pub status: String,
    pub block_number: Option<i64>,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, FromRow)]
pub struct StatRow {
    pub key: String,
    pub value: i64,
}
