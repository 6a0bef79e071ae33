// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::error::AppError;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        })
    }
}

/// Fire-and-forget notification channel. Delivery problems are logged by the
/// sink and never reach the caller.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, message: &str, severity: Severity);
}

pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info => tracing::info!(target: "alerts", %severity, "{message}"),
            Severity::Warning => tracing::warn!(target: "alerts", %severity, "{message}"),
            Severity::Critical => tracing::error!(target: "alerts", %severity, "{message}"),
        }
    }
}

/// Posts `{"content": ...}`, the shape Discord and Slack-compatible hooks take.
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: Url,
}

impl WebhookAlertSink {
    pub fn new(url: &str) -> Result<Self, AppError> {
        let url = Url::parse(url)
            .map_err(|e| AppError::Config(format!("Invalid alert_webhook_url: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| AppError::Initialization(format!("Webhook client: {e}")))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn notify(&self, message: &str, severity: Severity) {
        let payload = serde_json::json!({
            "content": format!("[{severity}] {message}"),
        });
        match self.client.post(self.url.clone()).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                tracing::warn!(target: "alerts", status = %resp.status(), "Webhook rejected alert");
            }
            Err(e) => {
                tracing::warn!(target: "alerts", error = %e, "Webhook delivery failed");
            }
        }
    }
}

pub struct FanoutAlertSink {
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl FanoutAlertSink {
    pub fn new(sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl AlertSink for FanoutAlertSink {
    async fn notify(&self, message: &str, severity: Severity) {
        for sink in &self.sinks {
            sink.notify(message, severity).await;
        }
    }
}

/// Always logs; also posts to the webhook when one is configured.
pub fn build_alert_sink(webhook_url: Option<&str>) -> Result<Arc<dyn AlertSink>, AppError> {
    let mut sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(LogAlertSink)];
    if let Some(url) = webhook_url.map(str::trim).filter(|u| !u.is_empty()) {
        sinks.push(Arc::new(WebhookAlertSink::new(url)?));
    }
    Ok(Arc::new(FanoutAlertSink::new(sinks)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct Recording(Mutex<Vec<(String, Severity)>>);

    #[async_trait]
    impl AlertSink for Recording {
        async fn notify(&self, message: &str, severity: Severity) {
            self.0.lock().unwrap().push((message.to_string(), severity));
        }
    }

    #[tokio::test]
    async fn fanout_reaches_every_sink() {
        let a = Arc::new(Recording::default());
        let b = Arc::new(Recording::default());
        let fanout = FanoutAlertSink::new(vec![a.clone(), b.clone(), Arc::new(LogAlertSink)]);
        fanout.notify("wallet skipped", Severity::Warning).await;
        assert_eq!(a.0.lock().unwrap().len(), 1);
        assert_eq!(b.0.lock().unwrap()[0].1, Severity::Warning);
    }

    #[tokio::test]
    async fn webhook_posts_content_payload() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut seen = Vec::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                seen.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&seen);
                if n == 0 || text.contains("}") {
                    break;
                }
            }
            socket
                .write_all(b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n")
                .await
                .unwrap();
            String::from_utf8_lossy(&seen).to_string()
        });

        let sink = WebhookAlertSink::new(&format!("http://{addr}/hook")).unwrap();
        sink.notify("cycle done", Severity::Info).await;

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /hook"));
        assert!(request.contains(r#"{"content":"[INFO] cycle done"}"#));
    }

    #[tokio::test]
    async fn unreachable_webhook_is_swallowed() {
        let sink = WebhookAlertSink::new("http://127.0.0.1:9/hook").unwrap();
        sink.notify("nobody listening", Severity::Critical).await;
    }

    #[test]
    fn bad_webhook_url_is_config_error() {
        assert!(matches!(
            build_alert_sink(Some("not a url")),
            Err(AppError::Config(_))
        ));
        assert!(build_alert_sink(None).is_ok());
    }
}
