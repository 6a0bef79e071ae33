// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::constants::BPS_DENOMINATOR;
use crate::domain::error::AppError;
use crate::domain::types::ActionKind;
use alloy::primitives::U256;
use rand::Rng;

/// Draw uniformly in `[0, total)` and walk the list in order, subtracting
/// each weight until the draw falls inside one.
pub fn select_weighted<R: Rng + ?Sized>(
    entries: &[(ActionKind, u32)],
    rng: &mut R,
) -> Option<ActionKind> {
    let total: u64 = entries.iter().map(|(_, w)| u64::from(*w)).sum();
    if total == 0 {
        return None;
    }
    let mut draw = rng.gen_range(0..total);
    for (kind, weight) in entries {
        let weight = u64::from(*weight);
        if draw < weight {
            return Some(*kind);
        }
        draw -= weight;
    }
    None
}

/// Uniform basis-point fraction in `[min_bps, max_bps]`.
pub fn random_bps<R: Rng + ?Sized>(rng: &mut R, min_bps: u64, max_bps: u64) -> u64 {
    if min_bps >= max_bps {
        return max_bps;
    }
    rng.gen_range(min_bps..=max_bps)
}

pub fn portion_bps(amount: U256, bps: u64) -> U256 {
    amount * U256::from(bps) / U256::from(BPS_DENOMINATOR)
}

/// Minimum acceptable output: `expected * (10000 - tolerance) / 10000`.
pub fn slippage_floor(expected: U256, tolerance_bps: u64) -> U256 {
    let keep = BPS_DENOMINATOR.saturating_sub(tolerance_bps);
    expected * U256::from(keep) / U256::from(BPS_DENOMINATOR)
}

/// Pool-share tokens to burn: `balance * percent / 100`.
pub fn remove_amount(balance: U256, percent: u64) -> Result<U256, AppError> {
    let amount = balance * U256::from(percent.min(100)) / U256::from(100u64);
    if amount.is_zero() {
        return Err(AppError::Precondition(format!(
            "liquidity to remove is zero (balance {balance}, {percent}%)"
        )));
    }
    Ok(amount)
}

/// Size an amount as a random share of `balance`; zero is a precondition failure.
pub fn sized_amount<R: Rng + ?Sized>(
    rng: &mut R,
    balance: U256,
    min_bps: u64,
    max_bps: u64,
    what: &str,
) -> Result<U256, AppError> {
    let bps = random_bps(rng, min_bps, max_bps);
    let amount = portion_bps(balance, bps);
    if amount.is_zero() {
        return Err(AppError::Precondition(format!(
            "{what} amount is zero (balance {balance}, {bps} bps)"
        )));
    }
    Ok(amount)
}
