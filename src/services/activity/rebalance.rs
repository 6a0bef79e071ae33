// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::types::WalletHandle;
use crate::services::activity::executors::ActionExecutors;
use crate::services::activity::ledger::ActivityLedger;
use crate::services::activity::oracle::{AssetBalance, BalanceSnapshot};
use crate::services::activity::selection::portion_bps;
use alloy::primitives::{TxHash, U256};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebalanceOutcome {
    /// Every tracked asset is at or above its minimum.
    Balanced,
    /// A shortfall exists but no asset can fund it.
    NoDonor { short: String },
    Swapped {
        from: String,
        to: String,
        amount: U256,
        tx: TxHash,
    },
    /// A read or the corrective swap failed; logged and swallowed.
    Failed { reason: String },
}

/// What, if anything, to swap to restore minimums. At most one move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebalancePlan {
    Nothing,
    Stuck(String),
    Swap {
        from: AssetBalance,
        to: AssetBalance,
        amount: U256,
    },
}

/// Donors and recipients are scanned in configured order.
pub fn plan_rebalance(snapshot: &BalanceSnapshot, donor_bps: u64, topup_bps: u64) -> RebalancePlan {
    let native = &snapshot.native;
    if native.below_minimum() {
        let donor = snapshot
            .tokens
            .iter()
            .find(|t| !t.balance.is_zero() && t.has_surplus());
        return match donor {
            Some(donor) => {
                let amount = portion_bps(donor.balance, donor_bps);
                if amount.is_zero() {
                    RebalancePlan::Stuck(native.asset.symbol.clone())
                } else {
                    RebalancePlan::Swap {
                        from: donor.clone(),
                        to: native.clone(),
                        amount,
                    }
                }
            }
            None => RebalancePlan::Stuck(native.asset.symbol.clone()),
        };
    }

    let Some(short) = snapshot.tokens.iter().find(|t| t.below_minimum()) else {
        return RebalancePlan::Nothing;
    };
    if !native.has_surplus() {
        return RebalancePlan::Stuck(short.asset.symbol.clone());
    }
    let amount = portion_bps(native.balance, topup_bps);
    if amount.is_zero() {
        return RebalancePlan::Stuck(short.asset.symbol.clone());
    }
    RebalancePlan::Swap {
        from: native.clone(),
        to: short.clone(),
        amount,
    }
}

/// Keeps the gas asset and the tracked tokens above their minimums.
pub struct RebalancePolicy {
    executors: Arc<ActionExecutors>,
    ledger: Arc<ActivityLedger>,
    donor_bps: u64,
    topup_bps: u64,
}

impl RebalancePolicy {
    pub fn new(
        executors: Arc<ActionExecutors>,
        ledger: Arc<ActivityLedger>,
        donor_bps: u64,
        topup_bps: u64,
    ) -> Self {
        Self {
            executors,
            ledger,
            donor_bps,
            topup_bps,
        }
    }

    pub fn plan(&self, snapshot: &BalanceSnapshot) -> RebalancePlan {
        plan_rebalance(snapshot, self.donor_bps, self.topup_bps)
    }

    /// Best effort. Never returns an error; the outcome is for logs and tests.
    pub async fn check_and_rebalance(&self, wallet: &WalletHandle) -> RebalanceOutcome {
        let snapshot = match self.executors.oracle().snapshot(wallet.address).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(
                    target: "rebalance",
                    wallet = %wallet.address,
                    error = %e,
                    "Balance read failed; skipping rebalance"
                );
                return RebalanceOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let (from, to, amount) = match self.plan(&snapshot) {
            RebalancePlan::Nothing => return RebalanceOutcome::Balanced,
            RebalancePlan::Stuck(short) => {
                tracing::warn!(
                    target: "rebalance",
                    wallet = %wallet.address,
                    asset = %short,
                    "Below minimum and no asset can cover it"
                );
                return RebalanceOutcome::NoDonor { short };
            }
            RebalancePlan::Swap { from, to, amount } => (from, to, amount),
        };

        tracing::info!(
            target: "rebalance",
            wallet = %wallet.address,
            from = %from.display(),
            to = %to.display(),
            "Rebalancing"
        );
        match self
            .executors
            .swap_exact(wallet, &from.asset, &to.asset, amount, "rebalance")
            .await
        {
            Ok(receipt) => {
                self.ledger.record_rebalance();
                RebalanceOutcome::Swapped {
                    from: from.asset.symbol,
                    to: to.asset.symbol,
                    amount,
                    tx: receipt.hash,
                }
            }
            Err(e) => {
                tracing::warn!(
                    target: "rebalance",
                    wallet = %wallet.address,
                    from = %from.asset.symbol,
                    to = %to.asset.symbol,
                    error = %e,
                    "Rebalance swap failed"
                );
                RebalanceOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::assets::{AssetKind, TrackedAsset};
    use alloy::primitives::Address;

    fn held(symbol: &str, kind: AssetKind, min: u64, balance: u64) -> AssetBalance {
        AssetBalance {
            asset: TrackedAsset {
                symbol: symbol.into(),
                kind,
                decimals: 18,
                min_balance: U256::from(min),
            },
            balance: U256::from(balance),
        }
    }

    fn snapshot(native: u64, tokens: &[(u64, u64)]) -> BalanceSnapshot {
        BalanceSnapshot {
            owner: Address::with_last_byte(1),
            native: held("ETH", AssetKind::Native, 1_000, native),
            tokens: tokens
                .iter()
                .enumerate()
                .map(|(i, (min, bal))| {
                    held(
                        &format!("T{i}"),
                        AssetKind::Erc20(Address::with_last_byte(10 + i as u8)),
                        *min,
                        *bal,
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn low_native_takes_first_donor_with_double_minimum() {
        // T0 is above minimum but not double; T1 and T2 both qualify.
        let snap = snapshot(0, &[(100, 150), (100, 10_000), (100, 50_000)]);
        match plan_rebalance(&snap, 500, 100) {
            RebalancePlan::Swap { from, to, amount } => {
                assert_eq!(from.asset.symbol, "T1");
                assert_eq!(to.asset.symbol, "ETH");
                assert_eq!(amount, U256::from(500u64));
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn short_token_is_topped_up_from_native_surplus() {
        let snap = snapshot(100_000, &[(100, 500), (100, 5), (100, 0)]);
        match plan_rebalance(&snap, 500, 100) {
            RebalancePlan::Swap { from, to, amount } => {
                assert_eq!(from.asset.symbol, "ETH");
                assert_eq!(to.asset.symbol, "T1");
                assert_eq!(amount, U256::from(1_000u64));
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn no_surplus_means_stuck_and_balanced_means_nothing() {
        assert_eq!(
            plan_rebalance(&snapshot(0, &[(100, 150)]), 500, 100),
            RebalancePlan::Stuck("ETH".into())
        );
        assert_eq!(
            plan_rebalance(&snapshot(1_500, &[(100, 5)]), 500, 100),
            RebalancePlan::Stuck("T0".into())
        );
        assert_eq!(
            plan_rebalance(&snapshot(1_500, &[(100, 100)]), 500, 100),
            RebalancePlan::Nothing
        );
    }
}
