// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::data::db::Database;
use crate::services::activity::ledger::{ActivityLedger, ActivityStats};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const RECENT_TX_LIMIT: i64 = 50;

/// Serve `/` (Prometheus text), `/dashboard` (JSON) and `/transactions`
/// (recent journal rows, when a store is attached) until `cancel` fires.
/// Returns the bound address, or `None` if binding failed.
pub async fn spawn_metrics_server(
    port: u16,
    ledger: Arc<ActivityLedger>,
    store: Option<Database>,
    cancel: CancellationToken,
) -> Option<SocketAddr> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::warn!(target: "metrics", error = %e, "Metrics server failed to bind");
            return None;
        }
    };

    let local = listener.local_addr().ok();
    if let Some(addr) = local {
        tracing::info!(target: "metrics", %addr, "Metrics server listening");
    }

    tokio::spawn(async move {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            let mut socket = match accepted {
                Ok((socket, _)) => socket,
                Err(e) => {
                    tracing::warn!(target: "metrics", error = %e, "Metrics accept error");
                    continue;
                }
            };

            let mut buf = [0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap_or(0);
            let req = String::from_utf8_lossy(&buf[..n]).to_string();
            let path = req
                .lines()
                .next()
                .and_then(|l| l.split_whitespace().nth(1))
                .unwrap_or("/");
            let route = path.split_once('?').map(|(r, _)| r).unwrap_or(path);

            let (content_type, body) = if route.starts_with("/dashboard") {
                ("application/json", render_dashboard_json(&ledger))
            } else if route.starts_with("/transactions") {
                ("application/json", render_recent_txs(store.as_ref()).await)
            } else {
                ("text/plain", render_metrics(&ledger.snapshot()))
            };
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n{}",
                content_type,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });

    local
}

pub fn render_metrics(stats: &ActivityStats) -> String {
    let mut body = String::new();
    for (key, value) in stats.to_pairs() {
        if key == "started_at" {
            body.push_str(&format!(
                "# TYPE activity_started_at_seconds gauge\nactivity_started_at_seconds {value}\n"
            ));
        } else {
            body.push_str(&format!("# TYPE activity_{key} counter\nactivity_{key} {value}\n"));
        }
    }
    body
}

fn render_dashboard_json(ledger: &ActivityLedger) -> String {
    let stats = ledger.snapshot();
    let attempted = stats.successful_actions + stats.failed_actions;
    let success_rate = if attempted > 0 {
        stats.successful_actions as f64 / attempted as f64 * 100.0
    } else {
        0.0
    };

    serde_json::json!({
        "stats": stats,
        "successRate": success_rate,
        "uptimeSecs": ledger.uptime_secs(),
    })
    .to_string()
}

async fn render_recent_txs(store: Option<&Database>) -> String {
    let Some(db) = store else {
        return "[]".to_string();
    };
    match db.get_recent_txs(RECENT_TX_LIMIT).await {
        Ok(rows) => serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string()),
        Err(e) => {
            tracing::warn!(target: "metrics", error = %e, "Recent transactions query failed");
            "[]".to_string()
        }
    }
}
