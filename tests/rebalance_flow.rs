// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

mod common;

use alloy::primitives::U256;
use alloy::sol_types::SolCall;
use common::*;
use pulse_agent::data::abi::{IERC20, IUniswapV2Router02};
use pulse_agent::domain::types::ActionKind;
use pulse_agent::services::activity::rebalance::{RebalanceOutcome, RebalancePolicy};
use pulse_agent::services::activity::scheduler::{
    ActionScheduler, ChainActivity, SchedulerConfig, WalletActivity, WalletOutcome,
};
use pulse_agent::services::alerts::LogAlertSink;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn activity(h: &Harness) -> Arc<ChainActivity> {
    let policy = RebalancePolicy::new(h.executors.clone(), h.ledger.clone(), 500, 100);
    Arc::new(ChainActivity::new(h.executors.clone(), policy))
}

fn swap_only() -> SchedulerConfig {
    SchedulerConfig {
        weights: vec![(ActionKind::Swap, 1)],
        outer_retries: 1,
        outer_retry_delay: Duration::from_secs(5),
        precondition_short_circuit: false,
        wallet_delay_min: Duration::ZERO,
        wallet_delay_max: Duration::ZERO,
        cycle_interval: Duration::from_secs(86_400),
        stats_flush_every: 1,
    }
}

fn three_tokens() -> Vec<pulse_agent::data::assets::TrackedAsset> {
    vec![
        tracked_token(0, 100),
        tracked_token(1, 100),
        tracked_token(2, 100),
    ]
}

#[tokio::test]
async fn low_gas_wallet_rebalances_from_first_eligible_donor_before_acting() {
    let chain = MockChain::default();
    let w = wallet(0);
    // Below the 0.05 minimum but enough to pay for gas.
    chain.set_native(w.address, eth(10));
    // T0 is above its minimum but not double it, so T1 is the donor.
    chain.set_token(token(0), w.address, U256::from(150u64));
    chain.set_token(token(1), w.address, U256::from(1_000_000u64));
    chain.set_token(token(2), w.address, U256::from(5_000_000u64));
    let h = Harness::new(chain, registry(three_tokens()), vec![]);

    let mut scheduler = ActionScheduler::new(
        vec![w.clone()],
        activity(&h),
        h.ledger.clone(),
        Arc::new(LogAlertSink),
        swap_only(),
        StdRng::seed_from_u64(9),
        CancellationToken::new(),
    );
    let outcome = scheduler.run_wallet(&w).await;

    assert!(matches!(
        outcome,
        WalletOutcome::Completed {
            kind: ActionKind::Swap,
            tries: 1,
            ..
        }
    ));
    let sent = h.chain.sent();
    assert!(sent.len() >= 3, "rebalance plus the action, got {}", sent.len());
    assert_eq!(sent[0].to, Some(token(1)));
    assert_eq!(sent[0].selector(), IERC20::approveCall::SELECTOR);
    let rebalance = IUniswapV2Router02::swapExactTokensForETHCall::abi_decode(&sent[1].input).unwrap();
    assert_eq!(rebalance.path, vec![token(1), weth()]);
    // 5% of the donor balance.
    assert_eq!(rebalance.amountIn, U256::from(50_000u64));

    let stats = h.ledger.snapshot();
    assert_eq!(stats.rebalances, 1);
    assert_eq!(stats.swaps, 1);
    assert_eq!(stats.successful_actions, 1);
}

#[tokio::test]
async fn empty_gas_wallet_fails_rebalance_then_action_without_sending() {
    let chain = MockChain::default();
    let w = wallet(0);
    chain.set_token(token(1), w.address, U256::from(1_000_000u64));
    let h = Harness::new(chain, registry(three_tokens()), vec![]);

    let mut scheduler = ActionScheduler::new(
        vec![w.clone()],
        activity(&h),
        h.ledger.clone(),
        Arc::new(LogAlertSink),
        SchedulerConfig {
            outer_retries: 3,
            precondition_short_circuit: true,
            ..swap_only()
        },
        StdRng::seed_from_u64(4),
        CancellationToken::new(),
    );
    let outcome = scheduler.run_wallet(&w).await;

    // One try: the action failed on a precondition, so the turn ended at once.
    match outcome {
        WalletOutcome::Skipped { tries, last_error } => {
            assert_eq!(tries, 1);
            assert!(last_error.starts_with("swap:"), "{last_error}");
        }
        other => panic!("unexpected {other:?}"),
    }
    // The rebalance quoted its donor before the action ran.
    let events = h.chain.events();
    assert_eq!(events.first().map(String::as_str), Some(format!("quote:{:#x}", token(1)).as_str()));
    assert!(h.chain.sent().is_empty());

    let stats = h.ledger.snapshot();
    assert_eq!(stats.total_transactions, 0);
    assert_eq!(stats.rebalances, 0);
    assert_eq!(stats.failed_actions, 1);
}

#[tokio::test]
async fn empty_gas_rebalance_reports_the_shortfall() {
    let chain = MockChain::default();
    let w = wallet(0);
    chain.set_token(token(1), w.address, U256::from(1_000_000u64));
    let h = Harness::new(chain, registry(three_tokens()), vec![]);

    match activity(&h).rebalance(&w).await {
        RebalanceOutcome::Failed { reason } => assert!(reason.contains("Insufficient funds")),
        other => panic!("unexpected {other:?}"),
    }
    assert!(h.chain.sent().is_empty());
}

#[tokio::test]
async fn native_surplus_tops_up_first_short_token() {
    let chain = MockChain::default();
    let w = wallet(0);
    chain.set_native(w.address, eth(1_000));
    chain.set_token(token(0), w.address, U256::from(500u64));
    // T1 and T2 are both short; only T1 is topped up.
    let h = Harness::new(chain, registry(three_tokens()), vec![]);

    let outcome = activity(&h).rebalance(&w).await;

    match outcome {
        RebalanceOutcome::Swapped { from, to, amount, .. } => {
            assert_eq!(from, "ETH");
            assert_eq!(to, "T1");
            assert_eq!(amount, eth(10));
        }
        other => panic!("unexpected {other:?}"),
    }
    let sent = h.chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].value, eth(10));
    let call = IUniswapV2Router02::swapExactETHForTokensCall::abi_decode(&sent[0].input).unwrap();
    assert_eq!(call.path, vec![weth(), token(1)]);
}

#[tokio::test]
async fn balanced_wallet_sends_nothing_during_rebalance() {
    let chain = MockChain::default();
    let w = wallet(0);
    chain.set_native(w.address, eth(1_000));
    chain.set_token(token(0), w.address, U256::from(100u64));
    let h = Harness::new(chain, registry(vec![tracked_token(0, 100)]), vec![]);

    assert_eq!(activity(&h).rebalance(&w).await, RebalanceOutcome::Balanced);
    assert!(h.chain.sent().is_empty());
}
