// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::data::db::Database;
use crate::domain::error::AppError;
use crate::domain::types::{
    AttemptOutcome, GasQuote, PendingTx, SubmissionAttempt, TxReceiptSummary,
};
use crate::network::gas::FeeEstimator;
use crate::services::activity::ledger::ActivityLedger;
use alloy::primitives::Address;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct SubmissionPolicy {
    /// Total attempts per logical submission, including the first.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub confirmation_timeout: Duration,
}

/// Who is submitting and why; carried into logs and the journal.
#[derive(Debug, Clone, Copy)]
pub struct SubmitContext<'a> {
    pub wallet: Address,
    pub label: &'a str,
}

enum AttemptFailure {
    /// Retrying with a higher fee cannot help.
    Fatal(AppError),
    Retryable(AppError),
}

/// Gas-escalating submit/confirm loop.
///
/// Each attempt takes a fresh quote (the buffer grows with the attempt index),
/// hands it to the action, and races the confirmation against a timer. A lost
/// race abandons the wait only: the transaction may still land, and the next
/// attempt is a brand-new transaction.
pub struct TransactionSubmitter {
    gas: Arc<dyn FeeEstimator>,
    ledger: Arc<ActivityLedger>,
    policy: SubmissionPolicy,
    journal: Option<(Database, u64)>,
    cancel: CancellationToken,
}

impl TransactionSubmitter {
    pub fn new(
        gas: Arc<dyn FeeEstimator>,
        ledger: Arc<ActivityLedger>,
        policy: SubmissionPolicy,
    ) -> Self {
        Self {
            gas,
            ledger,
            policy,
            journal: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Record every broadcast transaction in `db`.
    pub fn with_journal(mut self, db: Database, chain_id: u64) -> Self {
        self.journal = Some((db, chain_id));
        self
    }

    /// Stop retrying once `cancel` fires; the backoff wait is cut short.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn submit<F, Fut>(
        &self,
        ctx: SubmitContext<'_>,
        action: F,
    ) -> Result<TxReceiptSummary, AppError>
    where
        F: FnMut(GasQuote) -> Fut,
        Fut: Future<Output = Result<PendingTx, AppError>>,
    {
        self.submit_traced(ctx, action).await.0
    }

    /// Like [`submit`](Self::submit) but also returns every attempt made.
    pub async fn submit_traced<F, Fut>(
        &self,
        ctx: SubmitContext<'_>,
        mut action: F,
    ) -> (Result<TxReceiptSummary, AppError>, Vec<SubmissionAttempt>)
    where
        F: FnMut(GasQuote) -> Fut,
        Fut: Future<Output = Result<PendingTx, AppError>>,
    {
        let max_attempts = self.policy.max_retries.max(1);
        let mut trace = Vec::with_capacity(max_attempts as usize);
        let mut attempt_index = 0u32;

        loop {
            let mut attempt = SubmissionAttempt::new(attempt_index);
            let result = self.attempt_once(ctx, &mut action, &mut attempt).await;
            trace.push(attempt);

            let err = match result {
                Ok(receipt) => {
                    tracing::info!(
                        target: "submitter",
                        wallet = %ctx.wallet,
                        action = ctx.label,
                        tx = %receipt.hash,
                        block = ?receipt.block_number,
                        gas_used = receipt.gas_used,
                        attempt = attempt_index + 1,
                        "Transaction confirmed"
                    );
                    return (Ok(receipt), trace);
                }
                Err(AttemptFailure::Fatal(e)) => {
                    tracing::warn!(
                        target: "submitter",
                        wallet = %ctx.wallet,
                        action = ctx.label,
                        error = %e,
                        "Action refused before sending; not retrying"
                    );
                    return (Err(e), trace);
                }
                Err(AttemptFailure::Retryable(e)) => e,
            };

            if attempt_index + 1 >= max_attempts {
                tracing::error!(
                    target: "submitter",
                    wallet = %ctx.wallet,
                    action = ctx.label,
                    attempts = max_attempts,
                    error = %err,
                    "Submission retries exhausted"
                );
                return (Err(err), trace);
            }

            let backoff = self
                .policy
                .initial_backoff
                .saturating_mul(attempt_index + 1);
            tracing::warn!(
                target: "submitter",
                wallet = %ctx.wallet,
                action = ctx.label,
                attempt = attempt_index + 1,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "Submission attempt failed; retrying with a higher fee"
            );
            let cancelled = tokio::select! {
                _ = self.cancel.cancelled() => true,
                _ = sleep(backoff) => false,
            };
            if cancelled {
                tracing::warn!(
                    target: "submitter",
                    wallet = %ctx.wallet,
                    action = ctx.label,
                    attempt = attempt_index + 1,
                    "Shutdown requested; abandoning remaining attempts"
                );
                return (Err(err), trace);
            }
            attempt_index += 1;
        }
    }

    async fn attempt_once<F, Fut>(
        &self,
        ctx: SubmitContext<'_>,
        action: &mut F,
        attempt: &mut SubmissionAttempt,
    ) -> Result<TxReceiptSummary, AttemptFailure>
    where
        F: FnMut(GasQuote) -> Fut,
        Fut: Future<Output = Result<PendingTx, AppError>>,
    {
        let quote = match self.gas.estimate(attempt.attempt_index).await {
            Ok(q) => q,
            Err(e) => {
                attempt.outcome = AttemptOutcome::RpcError(e.to_string());
                return Err(AttemptFailure::Retryable(e));
            }
        };
        attempt.gas_quote = Some(quote);

        let pending = match action(quote).await {
            Ok(p) => p,
            Err(e) if !e.retryable_by_gas() => {
                attempt.outcome = AttemptOutcome::Refused(e.to_string());
                return Err(AttemptFailure::Fatal(e));
            }
            Err(e) => {
                attempt.outcome = AttemptOutcome::RpcError(e.to_string());
                return Err(AttemptFailure::Retryable(e));
            }
        };

        let hash = pending.hash();
        attempt.tx_hash = Some(hash);
        self.ledger.record_submission();
        self.journal_sent(ctx, attempt.attempt_index, &hash.to_string(), &quote)
            .await;
        tracing::debug!(
            target: "submitter",
            wallet = %ctx.wallet,
            action = ctx.label,
            tx = %hash,
            %quote,
            "Transaction sent; awaiting confirmation"
        );

        let timeout = self.policy.confirmation_timeout;
        let outcome = tokio::time::timeout(timeout, pending.confirmed()).await;
        let hash_str = hash.to_string();
        match outcome {
            Err(_) => {
                attempt.outcome = AttemptOutcome::TimedOut;
                self.journal_status(&hash_str, "timed_out", None).await;
                Err(AttemptFailure::Retryable(AppError::ConfirmationTimeout {
                    hash: hash_str,
                    waited_ms: timeout.as_millis() as u64,
                }))
            }
            Ok(Err(e)) => {
                attempt.outcome = AttemptOutcome::RpcError(e.to_string());
                self.journal_status(&hash_str, "rpc_error", None).await;
                Err(AttemptFailure::Retryable(e))
            }
            Ok(Ok(receipt)) if receipt.success => {
                self.journal_status(&hash_str, "confirmed", receipt.block_number)
                    .await;
                attempt.outcome = AttemptOutcome::Confirmed(receipt.clone());
                Ok(receipt)
            }
            Ok(Ok(receipt)) => {
                attempt.outcome = AttemptOutcome::RevertedOnChain;
                self.journal_status(&hash_str, "reverted", receipt.block_number)
                    .await;
                Err(AttemptFailure::Retryable(AppError::Revert {
                    hash: hash_str,
                    reason: format!("status 0 in block {:?}", receipt.block_number),
                }))
            }
        }
    }

    async fn journal_sent(
        &self,
        ctx: SubmitContext<'_>,
        attempt_index: u32,
        hash: &str,
        quote: &GasQuote,
    ) {
        let Some((db, chain_id)) = &self.journal else {
            return;
        };
        let wallet = format!("{:#x}", ctx.wallet);
        if let Err(e) = db
            .save_transaction(
                hash,
                *chain_id,
                &wallet,
                ctx.label,
                attempt_index,
                &quote.max_price_per_gas().to_string(),
            )
            .await
        {
            tracing::warn!(target: "db", tx = hash, error = %e, "Failed to journal transaction");
        }
    }

    async fn journal_status(&self, hash: &str, status: &str, block: Option<u64>) {
        let Some((db, _)) = &self.journal else {
            return;
        };
        if let Err(e) = db.update_status(hash, status, block).await {
            tracing::warn!(target: "db", tx = hash, error = %e, "Failed to update transaction status");
        }
    }
}
