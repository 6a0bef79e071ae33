// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use std::str::FromStr;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const NOISY_MODULES: &str =
    "h2=info,hyper=info,hyper_util=info,reqwest=info,alloy_transport_http=info,sqlx=warn";

/// Expand a bare level ("debug") with quieter defaults for chatty dependencies.
/// Directive strings (with ',' or '=') pass through untouched.
pub fn filter_spec(log_level: &str) -> String {
    let normalized = log_level.trim();
    if normalized.contains(',') || normalized.contains('=') {
        normalized.to_string()
    } else if normalized.is_empty() {
        format!("info,{NOISY_MODULES}")
    } else {
        format!("{normalized},{NOISY_MODULES}")
    }
}

/// Level from `RUST_LOG` when set, otherwise from the debug flag.
pub fn level_from_env(debug: bool) -> String {
    std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| if debug { "debug" } else { "info" }.to_string())
}

pub fn setup_logging(log_level: &str, json_format: bool) {
    let spec = filter_spec(log_level);
    let filter = EnvFilter::from_str(&spec).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry().with(filter);

    if json_format {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false);
        subscriber.with(json_layer).init();
    } else {
        let fmt_layer = fmt::layer().with_target(true).compact();
        subscriber.with(fmt_layer).init();
    }

    let base = spec.split(',').next().unwrap_or("info");
    tracing::info!(
        target: "app",
        base,
        format = if json_format { "json" } else { "compact" },
        "Logging initialized"
    );
}
