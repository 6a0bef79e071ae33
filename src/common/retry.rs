// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::error::{AppError, ErrorKind};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry a read-only async operation with exponential backoff.
///
/// Only transport failures are retried; a revert or a precondition answer from
/// the node is returned as-is because asking again yields the same answer.
pub async fn retry_async<F, Fut, T>(
    label: &str,
    mut op: F,
    attempts: usize,
    initial_delay: Duration,
) -> Result<T, AppError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut delay = initial_delay;
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < attempts && e.kind() == ErrorKind::RpcTransport => {
                tracing::debug!(target: "retry", %label, attempt, error = %e, "Read failed; backing off");
                sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
