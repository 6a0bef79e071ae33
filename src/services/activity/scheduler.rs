// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::data::db::Database;
use crate::domain::error::AppError;
use crate::domain::types::{ActionKind, TxReceiptSummary, WalletHandle};
use crate::services::activity::executors::ActionExecutors;
use crate::services::activity::ledger::ActivityLedger;
use crate::services::activity::rebalance::{RebalanceOutcome, RebalancePolicy};
use crate::services::activity::selection::select_weighted;
use crate::services::alerts::{AlertSink, Severity};
use async_trait::async_trait;
use rand::Rng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// The per-wallet work the scheduler drives: maintenance first, then one action.
#[async_trait]
pub trait WalletActivity: Send + Sync {
    async fn rebalance(&self, wallet: &WalletHandle) -> RebalanceOutcome;
    async fn dispatch(
        &self,
        kind: ActionKind,
        wallet: &WalletHandle,
        rng: &mut StdRng,
    ) -> Result<TxReceiptSummary, AppError>;
}

/// Live implementation over the chain executors.
pub struct ChainActivity {
    executors: Arc<ActionExecutors>,
    rebalance: RebalancePolicy,
}

impl ChainActivity {
    pub fn new(executors: Arc<ActionExecutors>, rebalance: RebalancePolicy) -> Self {
        Self {
            executors,
            rebalance,
        }
    }
}

#[async_trait]
impl WalletActivity for ChainActivity {
    async fn rebalance(&self, wallet: &WalletHandle) -> RebalanceOutcome {
        self.rebalance.check_and_rebalance(wallet).await
    }

    async fn dispatch(
        &self,
        kind: ActionKind,
        wallet: &WalletHandle,
        rng: &mut StdRng,
    ) -> Result<TxReceiptSummary, AppError> {
        self.executors.execute(kind, wallet, rng).await
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub weights: Vec<(ActionKind, u32)>,
    pub outer_retries: u32,
    pub outer_retry_delay: Duration,
    /// End a wallet's turn on the first precondition/config error.
    pub precondition_short_circuit: bool,
    pub wallet_delay_min: Duration,
    pub wallet_delay_max: Duration,
    pub cycle_interval: Duration,
    pub stats_flush_every: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletOutcome {
    Completed {
        kind: ActionKind,
        receipt: TxReceiptSummary,
        tries: u32,
    },
    Skipped {
        tries: u32,
        last_error: String,
    },
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub completed: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

pub struct ActionScheduler {
    wallets: Vec<WalletHandle>,
    activity: Arc<dyn WalletActivity>,
    ledger: Arc<ActivityLedger>,
    alerts: Arc<dyn AlertSink>,
    store: Option<Database>,
    config: SchedulerConfig,
    rng: StdRng,
    cancel: CancellationToken,
    processed_since_flush: u64,
}

impl ActionScheduler {
    pub fn new(
        wallets: Vec<WalletHandle>,
        activity: Arc<dyn WalletActivity>,
        ledger: Arc<ActivityLedger>,
        alerts: Arc<dyn AlertSink>,
        config: SchedulerConfig,
        rng: StdRng,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            wallets,
            activity,
            ledger,
            alerts,
            store: None,
            config,
            rng,
            cancel,
            processed_since_flush: 0,
        }
    }

    pub fn with_store(mut self, store: Database) -> Self {
        self.store = Some(store);
        self
    }

    /// Run cycles until cancelled (or once), then flush and report.
    pub async fn run(&mut self, once: bool) {
        let mut cycle = 0u64;
        loop {
            cycle += 1;
            tracing::info!(
                target: "scheduler",
                cycle,
                wallets = self.wallets.len(),
                "Starting cycle"
            );
            let report = self.run_cycle().await;
            let summary = format!(
                "Cycle {cycle} finished: {} completed, {} skipped, {} transactions total",
                report.completed,
                report.skipped,
                self.ledger.total_transactions()
            );
            tracing::info!(target: "scheduler", cycle, "{summary}");
            self.alerts.notify(&summary, Severity::Info).await;
            if report.completed == 0 && report.skipped > 0 {
                let message = format!("Cycle {cycle}: every wallet was skipped; no action completed");
                tracing::error!(target: "scheduler", cycle, skipped = report.skipped, "{message}");
                self.alerts.notify(&message, Severity::Critical).await;
            }

            if once || report.cancelled || self.cancel.is_cancelled() {
                break;
            }
            tracing::info!(
                target: "scheduler",
                wait_secs = self.config.cycle_interval.as_secs(),
                "Waiting for next cycle"
            );
            if !self.pause(self.config.cycle_interval).await {
                break;
            }
        }
        self.shutdown().await;
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        for idx in 0..self.wallets.len() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let wallet = self.wallets[idx].clone();
            match self.run_wallet(&wallet).await {
                WalletOutcome::Completed { .. } => report.completed += 1,
                WalletOutcome::Skipped { .. } => report.skipped += 1,
                WalletOutcome::Cancelled => {
                    report.cancelled = true;
                    break;
                }
            }
            self.after_wallet().await;

            if idx + 1 < self.wallets.len() {
                let delay = self.wallet_delay();
                tracing::debug!(
                    target: "scheduler",
                    delay_secs = delay.as_secs(),
                    "Pausing before next wallet"
                );
                if !self.pause(delay).await {
                    report.cancelled = true;
                    break;
                }
            }
        }
        report
    }

    /// Outer retry: each try re-runs rebalance, selection and dispatch, so a
    /// different action may be picked every time.
    pub async fn run_wallet(&mut self, wallet: &WalletHandle) -> WalletOutcome {
        let max_tries = self.config.outer_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_tries {
            let rebalance = self.activity.rebalance(wallet).await;
            tracing::debug!(
                target: "scheduler",
                wallet = %wallet.address,
                outcome = ?rebalance,
                "Rebalance check done"
            );

            let Some(kind) = select_weighted(&self.config.weights, &mut self.rng) else {
                last_error = "no action has a non-zero weight".to_string();
                break;
            };
            tracing::info!(
                target: "scheduler",
                wallet = %wallet.address,
                action = %kind,
                attempt,
                "Dispatching action"
            );

            match self.activity.dispatch(kind, wallet, &mut self.rng).await {
                Ok(receipt) => {
                    self.ledger.record_success(kind);
                    return WalletOutcome::Completed {
                        kind,
                        receipt,
                        tries: attempt,
                    };
                }
                Err(e) => {
                    self.ledger.record_failure();
                    tracing::warn!(
                        target: "scheduler",
                        wallet = %wallet.address,
                        action = %kind,
                        attempt,
                        max_tries,
                        error = %e,
                        "Action failed"
                    );
                    last_error = format!("{kind}: {e}");
                    if self.config.precondition_short_circuit && !e.retryable_by_gas() {
                        return self.skip(wallet, attempt, last_error).await;
                    }
                    if attempt < max_tries && !self.pause(self.config.outer_retry_delay).await {
                        return WalletOutcome::Cancelled;
                    }
                }
            }
        }

        self.skip(wallet, max_tries, last_error).await
    }

    async fn skip(&self, wallet: &WalletHandle, tries: u32, last_error: String) -> WalletOutcome {
        tracing::error!(
            target: "scheduler",
            wallet = %wallet.address,
            tries,
            error = %last_error,
            "Wallet skipped for this cycle"
        );
        self.alerts
            .notify(
                &format!(
                    "Wallet #{} {:#x} skipped after {tries} tries: {last_error}",
                    wallet.index, wallet.address
                ),
                Severity::Warning,
            )
            .await;
        WalletOutcome::Skipped { tries, last_error }
    }

    async fn after_wallet(&mut self) {
        self.processed_since_flush += 1;
        if self.processed_since_flush >= self.config.stats_flush_every.max(1) {
            self.flush_stats().await;
        }
    }

    pub async fn flush_stats(&mut self) {
        self.processed_since_flush = 0;
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save_stats(&self.ledger.snapshot()).await {
            tracing::warn!(target: "db", error = %e, "Failed to persist activity stats");
        }
    }

    async fn shutdown(&mut self) {
        self.flush_stats().await;
        let stats = self.ledger.snapshot();
        let message = format!(
            "Agent stopped: {} successful, {} failed actions, {} transactions, {} rebalances",
            stats.successful_actions,
            stats.failed_actions,
            stats.total_transactions,
            stats.rebalances
        );
        tracing::info!(target: "scheduler", "{message}");
        self.alerts.notify(&message, Severity::Info).await;
    }

    fn wallet_delay(&mut self) -> Duration {
        let min = self.config.wallet_delay_min.as_millis() as u64;
        let max = self.config.wallet_delay_max.as_millis() as u64;
        if min >= max {
            return Duration::from_millis(max);
        }
        Duration::from_millis(self.rng.gen_range(min..=max))
    }

    /// Sleep unless cancelled first. Returns false on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = sleep(duration) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorKind;
    use alloy::primitives::B256;
    use alloy::signers::local::PrivateKeySigner;
    use rand::SeedableRng;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Scripted {
        results: Mutex<VecDeque<Result<TxReceiptSummary, AppError>>>,
        events: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn with(results: Vec<Result<TxReceiptSummary, AppError>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                events: Mutex::default(),
            })
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WalletActivity for Scripted {
        async fn rebalance(&self, _wallet: &WalletHandle) -> RebalanceOutcome {
            self.events.lock().unwrap().push("rebalance".into());
            RebalanceOutcome::Balanced
        }

        async fn dispatch(
            &self,
            kind: ActionKind,
            _wallet: &WalletHandle,
            _rng: &mut StdRng,
        ) -> Result<TxReceiptSummary, AppError> {
            self.events.lock().unwrap().push(format!("dispatch:{kind}"));
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AppError::Connection("script exhausted".into())))
        }
    }

    #[derive(Default)]
    struct Alerts(Mutex<Vec<(String, Severity)>>);

    #[async_trait]
    impl AlertSink for Alerts {
        async fn notify(&self, message: &str, severity: Severity) {
            self.0.lock().unwrap().push((message.to_string(), severity));
        }
    }

    fn receipt() -> TxReceiptSummary {
        TxReceiptSummary {
            hash: B256::with_last_byte(1),
            block_number: Some(1),
            gas_used: 21_000,
            effective_gas_price: 1,
            success: true,
        }
    }

    fn config(short_circuit: bool) -> SchedulerConfig {
        SchedulerConfig {
            weights: vec![(ActionKind::Send, 1)],
            outer_retries: 3,
            outer_retry_delay: Duration::from_secs(5),
            precondition_short_circuit: short_circuit,
            wallet_delay_min: Duration::from_secs(30),
            wallet_delay_max: Duration::from_secs(120),
            cycle_interval: Duration::from_secs(86_400),
            stats_flush_every: 1,
        }
    }

    fn wallets(n: usize) -> Vec<WalletHandle> {
        (0..n)
            .map(|i| {
                let signer = PrivateKeySigner::from_bytes(&B256::with_last_byte(i as u8 + 1)).unwrap();
                WalletHandle::new(i, signer)
            })
            .collect()
    }

    fn scheduler(
        activity: Arc<Scripted>,
        alerts: Arc<Alerts>,
        ledger: Arc<ActivityLedger>,
        cfg: SchedulerConfig,
        n: usize,
    ) -> ActionScheduler {
        ActionScheduler::new(
            wallets(n),
            activity,
            ledger,
            alerts,
            cfg,
            StdRng::seed_from_u64(42),
            CancellationToken::new(),
        )
    }

    fn insufficient() -> AppError {
        AppError::InsufficientFunds {
            required: "1".into(),
            available: "0".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_records_once_and_rebalances_first() {
        let activity = Scripted::with(vec![Ok(receipt())]);
        let alerts = Arc::new(Alerts::default());
        let ledger = Arc::new(ActivityLedger::new());
        let mut sched = scheduler(activity.clone(), alerts.clone(), ledger.clone(), config(false), 1);

        let wallet = sched.wallets[0].clone();
        let outcome = sched.run_wallet(&wallet).await;

        assert!(matches!(outcome, WalletOutcome::Completed { tries: 1, .. }));
        assert_eq!(activity.events(), vec!["rebalance", "dispatch:send"]);
        assert_eq!(ledger.snapshot().successful_actions, 1);
        assert_eq!(ledger.snapshot().sends, 1);
        assert!(alerts.0.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reruns_whole_sequence_then_alerts() {
        let activity = Scripted::with(vec![
            Err(AppError::Connection("down".into())),
            Err(AppError::Revert {
                hash: "0x1".into(),
                reason: "status 0".into(),
            }),
            Err(insufficient()),
        ]);
        let alerts = Arc::new(Alerts::default());
        let ledger = Arc::new(ActivityLedger::new());
        let mut sched = scheduler(activity.clone(), alerts.clone(), ledger.clone(), config(false), 1);

        let started = tokio::time::Instant::now();
        let wallet = sched.wallets[0].clone();
        let outcome = sched.run_wallet(&wallet).await;

        match outcome {
            WalletOutcome::Skipped { tries, last_error } => {
                assert_eq!(tries, 3);
                assert!(last_error.contains("Insufficient funds"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            activity.events(),
            vec![
                "rebalance",
                "dispatch:send",
                "rebalance",
                "dispatch:send",
                "rebalance",
                "dispatch:send"
            ]
        );
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(ledger.snapshot().failed_actions, 3);
        let alerts = alerts.0.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].1, Severity::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn precondition_short_circuit_ends_turn_immediately() {
        let activity = Scripted::with(vec![Err(insufficient()), Ok(receipt())]);
        let alerts = Arc::new(Alerts::default());
        let ledger = Arc::new(ActivityLedger::new());
        let mut sched = scheduler(activity.clone(), alerts.clone(), ledger, config(true), 1);

        let wallet = sched.wallets[0].clone();
        let outcome = sched.run_wallet(&wallet).await;

        assert!(matches!(outcome, WalletOutcome::Skipped { tries: 1, .. }));
        assert_eq!(activity.events().len(), 2);
        assert_eq!(insufficient().kind(), ErrorKind::Precondition);
    }

    #[tokio::test(start_paused = true)]
    async fn precondition_consumes_a_slot_by_default() {
        let activity = Scripted::with(vec![Err(insufficient()), Ok(receipt())]);
        let alerts = Arc::new(Alerts::default());
        let ledger = Arc::new(ActivityLedger::new());
        let mut sched = scheduler(activity.clone(), alerts, ledger, config(false), 1);

        let wallet = sched.wallets[0].clone();
        let outcome = sched.run_wallet(&wallet).await;

        assert!(matches!(outcome, WalletOutcome::Completed { tries: 2, .. }));
    }

    #[tokio::test]
    async fn once_runs_every_wallet_and_flushes() {
        let activity = Scripted::with(vec![Ok(receipt()), Ok(receipt())]);
        let alerts = Arc::new(Alerts::default());
        let ledger = Arc::new(ActivityLedger::new());
        let store = Database::new("sqlite::memory:").await.unwrap();
        let cfg = SchedulerConfig {
            wallet_delay_min: Duration::ZERO,
            wallet_delay_max: Duration::ZERO,
            ..config(false)
        };
        let mut sched =
            scheduler(activity, alerts.clone(), ledger, cfg, 2).with_store(store.clone());

        sched.run(true).await;

        let stats = store.load_stats().await.unwrap().unwrap();
        assert_eq!(stats.successful_actions, 2);
        let alerts = alerts.0.lock().unwrap();
        assert!(alerts.iter().any(|(m, _)| m.starts_with("Cycle 1 finished: 2 completed")));
        assert!(alerts.last().unwrap().0.starts_with("Agent stopped"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_before_next_wallet() {
        let activity = Scripted::with(vec![Ok(receipt()), Ok(receipt())]);
        let alerts = Arc::new(Alerts::default());
        let ledger = Arc::new(ActivityLedger::new());
        let mut sched = scheduler(activity.clone(), alerts, ledger.clone(), config(false), 2);
        let cancel = sched.cancel.clone();

        let handle = tokio::spawn(async move {
            sched.run(false).await;
        });
        // First wallet completes immediately; cancel during the inter-wallet pause.
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(ledger.snapshot().successful_actions, 1);
        assert_eq!(activity.events(), vec!["rebalance", "dispatch:send"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_with_no_completion_raises_critical_alert() {
        let activity = Scripted::with(vec![Err(insufficient())]);
        let alerts = Arc::new(Alerts::default());
        let ledger = Arc::new(ActivityLedger::new());
        let cfg = SchedulerConfig {
            outer_retries: 1,
            ..config(false)
        };
        let mut sched = scheduler(activity, alerts.clone(), ledger, cfg, 1);

        sched.run(true).await;

        let alerts = alerts.0.lock().unwrap();
        let critical: Vec<_> = alerts
            .iter()
            .filter(|(_, severity)| *severity == Severity::Critical)
            .collect();
        assert_eq!(critical.len(), 1);
        assert!(critical[0].0.contains("every wallet was skipped"));
    }
}
