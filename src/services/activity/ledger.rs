// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::types::ActionKind;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Process-wide activity counters.
///
/// Counters are atomics so the ledger can be shared by `Arc` between the
/// scheduler, the submitter and the status endpoint without a lock.
/// `successful_actions + failed_actions` is unrelated to `total_transactions`:
/// one action may send zero, one or several transactions.
#[derive(Debug, Default)]
pub struct ActivityLedger {
    swaps: AtomicU64,
    sends: AtomicU64,
    liquidity_adds: AtomicU64,
    liquidity_removes: AtomicU64,
    custom_calls: AtomicU64,
    successful_actions: AtomicU64,
    failed_actions: AtomicU64,
    total_transactions: AtomicU64,
    rebalances: AtomicU64,
    started_at: AtomicI64,
}

/// Flat snapshot of the ledger, persisted as key/value rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivityStats {
    pub swaps: u64,
    pub sends: u64,
    pub liquidity_adds: u64,
    pub liquidity_removes: u64,
    pub custom_calls: u64,
    pub successful_actions: u64,
    pub failed_actions: u64,
    pub total_transactions: u64,
    pub rebalances: u64,
    pub started_at: i64,
}

impl ActivityStats {
    pub fn to_pairs(&self) -> Vec<(&'static str, i64)> {
        vec![
            ("swaps", to_i64(self.swaps)),
            ("sends", to_i64(self.sends)),
            ("liquidity_adds", to_i64(self.liquidity_adds)),
            ("liquidity_removes", to_i64(self.liquidity_removes)),
            ("custom_calls", to_i64(self.custom_calls)),
            ("successful_actions", to_i64(self.successful_actions)),
            ("failed_actions", to_i64(self.failed_actions)),
            ("total_transactions", to_i64(self.total_transactions)),
            ("rebalances", to_i64(self.rebalances)),
            ("started_at", self.started_at),
        ]
    }

    /// Unknown keys are ignored; missing keys stay zero.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, i64)>,
    {
        let mut stats = Self::default();
        for (key, value) in pairs {
            let count = u64::try_from(value).unwrap_or(0);
            match key {
                "swaps" => stats.swaps = count,
                "sends" => stats.sends = count,
                "liquidity_adds" => stats.liquidity_adds = count,
                "liquidity_removes" => stats.liquidity_removes = count,
                "custom_calls" => stats.custom_calls = count,
                "successful_actions" => stats.successful_actions = count,
                "failed_actions" => stats.failed_actions = count,
                "total_transactions" => stats.total_transactions = count,
                "rebalances" => stats.rebalances = count,
                "started_at" => stats.started_at = value,
                other => tracing::debug!(target: "ledger", key = other, "Ignoring unknown stats key"),
            }
        }
        stats
    }
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

impl ActivityLedger {
    pub fn new() -> Self {
        let ledger = Self::default();
        ledger.started_at.store(unix_now(), Ordering::Relaxed);
        ledger
    }

    /// Continue counting from a persisted snapshot. A zero start time means
    /// the snapshot predates any run, so the current time is kept.
    pub fn restore(snapshot: &ActivityStats) -> Self {
        let ledger = Self::new();
        ledger.swaps.store(snapshot.swaps, Ordering::Relaxed);
        ledger.sends.store(snapshot.sends, Ordering::Relaxed);
        ledger
            .liquidity_adds
            .store(snapshot.liquidity_adds, Ordering::Relaxed);
        ledger
            .liquidity_removes
            .store(snapshot.liquidity_removes, Ordering::Relaxed);
        ledger
            .custom_calls
            .store(snapshot.custom_calls, Ordering::Relaxed);
        ledger
            .successful_actions
            .store(snapshot.successful_actions, Ordering::Relaxed);
        ledger
            .failed_actions
            .store(snapshot.failed_actions, Ordering::Relaxed);
        ledger
            .total_transactions
            .store(snapshot.total_transactions, Ordering::Relaxed);
        ledger.rebalances.store(snapshot.rebalances, Ordering::Relaxed);
        if snapshot.started_at > 0 {
            ledger
                .started_at
                .store(snapshot.started_at, Ordering::Relaxed);
        }
        ledger
    }

    /// One transaction reached the network.
    pub fn record_submission(&self) {
        self.total_transactions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, kind: ActionKind) {
        self.successful_actions.fetch_add(1, Ordering::Relaxed);
        self.category(kind).fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_actions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rebalance(&self) {
        self.rebalances.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_transactions(&self) -> u64 {
        self.total_transactions.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ActivityStats {
        ActivityStats {
            swaps: self.swaps.load(Ordering::Relaxed),
            sends: self.sends.load(Ordering::Relaxed),
            liquidity_adds: self.liquidity_adds.load(Ordering::Relaxed),
            liquidity_removes: self.liquidity_removes.load(Ordering::Relaxed),
            custom_calls: self.custom_calls.load(Ordering::Relaxed),
            successful_actions: self.successful_actions.load(Ordering::Relaxed),
            failed_actions: self.failed_actions.load(Ordering::Relaxed),
            total_transactions: self.total_transactions.load(Ordering::Relaxed),
            rebalances: self.rebalances.load(Ordering::Relaxed),
            started_at: self.started_at.load(Ordering::Relaxed),
        }
    }

    pub fn uptime_secs(&self) -> i64 {
        unix_now().saturating_sub(self.started_at.load(Ordering::Relaxed))
    }

    fn category(&self, kind: ActionKind) -> &AtomicU64 {
        match kind {
            ActionKind::Swap => &self.swaps,
            ActionKind::Send => &self.sends,
            ActionKind::AddLiquidity => &self.liquidity_adds,
            ActionKind::RemoveLiquidity => &self.liquidity_removes,
            ActionKind::CustomCall => &self.custom_calls,
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
