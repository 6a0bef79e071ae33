// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

// =============================================================================
// GAS & SUBMISSION
// =============================================================================

/// Testnets stall underpriced transactions, so the first quote is already 5x.
pub const DEFAULT_GAS_BUFFER_BASE: f64 = 5.0;
pub const DEFAULT_GAS_BUFFER_STEP: f64 = 1.0;
/// Fixed-point scale for buffer multipliers (hundredths).
pub const GAS_BUFFER_SCALE: u128 = 100;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 2_000;
pub const DEFAULT_CONFIRMATION_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 15_000;

/// Gas limit assumed by balance pre-checks when the node has not estimated yet.
pub const PRECHECK_GAS_LIMIT: u64 = 300_000;
pub const SWAP_DEADLINE_SECS: u64 = 20 * 60;

// =============================================================================
// AMOUNTS (basis points over 10_000)
// =============================================================================

pub const BPS_DENOMINATOR: u64 = 10_000;
pub const DEFAULT_SLIPPAGE_BPS: u64 = 50;
pub const DEFAULT_MIN_AMOUNT_BPS: u64 = 100;
pub const DEFAULT_MAX_AMOUNT_BPS: u64 = 500;
pub const DEFAULT_REMOVE_LIQUIDITY_PERCENT: u64 = 50;

/// Share of a donor asset swapped into the gas asset when it runs low.
pub const DEFAULT_REBALANCE_DONOR_BPS: u64 = 500;
/// Share of the gas asset swapped into an under-funded secondary asset.
pub const DEFAULT_REBALANCE_TOPUP_BPS: u64 = 100;

// =============================================================================
// SCHEDULING
// =============================================================================

pub const DEFAULT_OUTER_RETRIES: u32 = 3;
pub const DEFAULT_OUTER_RETRY_DELAY_MS: u64 = 5_000;
pub const DEFAULT_WALLET_DELAY_MIN_SECS: u64 = 30;
pub const DEFAULT_WALLET_DELAY_MAX_SECS: u64 = 120;
pub const DEFAULT_CYCLE_INTERVAL_SECS: u64 = 24 * 60 * 60;

pub const DEFAULT_SWAP_WEIGHT: u32 = 40;
pub const DEFAULT_SEND_WEIGHT: u32 = 20;
pub const DEFAULT_ADD_LIQUIDITY_WEIGHT: u32 = 20;
pub const DEFAULT_REMOVE_LIQUIDITY_WEIGHT: u32 = 20;
pub const DEFAULT_CUSTOM_CALL_WEIGHT: u32 = 0;
