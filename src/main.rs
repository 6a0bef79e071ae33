// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use clap::Parser;
use pulse_agent::app::config::AgentSettings;
use pulse_agent::app::logging::{level_from_env, setup_logging};
use pulse_agent::domain::error::AppError;
use pulse_agent::infrastructure::data::assets::AssetRegistry;
use pulse_agent::infrastructure::data::db::Database;
use pulse_agent::infrastructure::network::gas::GasOracle;
use pulse_agent::infrastructure::network::rpc::{AlloyRpc, ChainRpc};
use pulse_agent::services::activity::executors::{ActionExecutors, ExecutorConfig, resolve_custom_calls};
use pulse_agent::services::activity::ledger::ActivityLedger;
use pulse_agent::services::activity::oracle::BalanceOracle;
use pulse_agent::services::activity::rebalance::RebalancePolicy;
use pulse_agent::services::activity::scheduler::{ActionScheduler, ChainActivity, SchedulerConfig};
use pulse_agent::services::activity::submitter::TransactionSubmitter;
use pulse_agent::services::alerts::{Severity, build_alert_sink};
use pulse_agent::services::metrics::spawn_metrics_server;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about = "pulse agent: keeps a pool of testnet wallets active")]
struct Cli {
    /// Path to config file (default: config.toml)
    #[arg(long)]
    config: Option<String>,

    /// Run a single cycle over all wallets, then exit
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Seed for action selection and amount sizing
    #[arg(long)]
    seed: Option<u64>,

    /// Emit JSON logs
    #[arg(long, default_value_t = false)]
    log_json: bool,

    /// Simulate writes with eth_call instead of broadcasting
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let mut settings = AgentSettings::load_with_path(cli.config.as_deref())?;
    settings.log_json |= cli.log_json;
    settings.dry_run |= cli.dry_run;
    if cli.seed.is_some() {
        settings.rng_seed = cli.seed;
    }
    setup_logging(&level_from_env(settings.debug), settings.log_json);

    let db = Database::new(&settings.database_url).await?;
    let ledger = Arc::new(match db.load_stats().await? {
        Some(stats) => {
            tracing::info!(
                target: "ledger",
                total_transactions = stats.total_transactions,
                successful = stats.successful_actions,
                "Restored activity stats"
            );
            ActivityLedger::restore(&stats)
        }
        None => ActivityLedger::new(),
    });

    let wallets = settings.wallet_handles()?;
    let rpc: Arc<dyn ChainRpc> = Arc::new(AlloyRpc::new(
        &settings.rpc_url,
        &wallets,
        settings.rpc_timeout(),
        settings.dry_run,
    )?);

    let detected = rpc.chain_id().await?;
    let chain_id = match settings.chain_id {
        Some(configured) if configured != detected => {
            return Err(AppError::Config(format!(
                "chain_id {configured} does not match RPC chain {detected}"
            )));
        }
        Some(configured) => configured,
        None => {
            tracing::info!(target: "config", detected_chain = detected, "Auto-detected chain_id from RPC");
            detected
        }
    };

    let router = settings.router()?;
    let wrapped_native = match settings.wrapped_native_address()? {
        Some(addr) => addr,
        None => rpc.wrapped_native(router).await?,
    };

    let mut assets = AssetRegistry::from_settings(&settings)?;
    let corrected = assets.reconcile_decimals(rpc.as_ref()).await;
    if corrected > 0 {
        tracing::warn!(target: "config", corrected, "Token decimals corrected from chain");
    }
    let oracle = Arc::new(BalanceOracle::new(rpc.clone(), Arc::new(assets)));

    let gas = Arc::new(GasOracle::new(
        rpc.clone(),
        settings.gas_buffer_base,
        settings.gas_buffer_step,
    )?);
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!(target: "app", "Interrupt received; finishing current wallet");
                cancel.cancel();
            }
        });
    }
    let submitter = Arc::new(
        TransactionSubmitter::new(gas, ledger.clone(), settings.submission_policy())
            .with_journal(db.clone(), chain_id)
            .with_cancellation(cancel.clone()),
    );

    let recipients = if settings.send_recipients.is_empty() {
        wallets.iter().map(|w| w.address).collect()
    } else {
        settings.send_recipient_addresses()?
    };
    let custom_calls = resolve_custom_calls(&settings.custom_calls, &oracle).await?;
    let executors = Arc::new(ActionExecutors::new(
        rpc.clone(),
        oracle,
        submitter,
        ExecutorConfig {
            router,
            factory: settings.factory()?,
            wrapped_native,
            slippage_bps: settings.slippage_bps,
            min_amount_bps: settings.min_amount_bps,
            max_amount_bps: settings.max_amount_bps,
            remove_liquidity_percent: settings.remove_liquidity_percent,
            recipients,
        },
        custom_calls,
    ));
    let rebalance = RebalancePolicy::new(
        executors.clone(),
        ledger.clone(),
        settings.rebalance_donor_bps,
        settings.rebalance_topup_bps,
    );
    let activity = Arc::new(ChainActivity::new(executors, rebalance));

    let alerts = build_alert_sink(settings.alert_webhook_url.as_deref())?;
    if let Some(port) = settings.metrics_port {
        spawn_metrics_server(port, ledger.clone(), Some(db.clone()), cancel.clone()).await;
    }

    let rng = match settings.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let scheduler_config = SchedulerConfig {
        weights: settings.action_weights.entries(),
        outer_retries: settings.outer_retries,
        outer_retry_delay: Duration::from_millis(settings.outer_retry_delay_ms),
        precondition_short_circuit: settings.precondition_short_circuit,
        wallet_delay_min: Duration::from_secs(settings.wallet_delay_min_secs),
        wallet_delay_max: Duration::from_secs(settings.wallet_delay_max_secs),
        cycle_interval: Duration::from_secs(settings.cycle_interval_secs),
        stats_flush_every: settings.stats_flush_every,
    };

    let startup = format!(
        "Agent started on chain {chain_id} with {} wallets{}",
        wallets.len(),
        if settings.dry_run { " (dry run)" } else { "" }
    );
    tracing::info!(target: "app", chain_id, wallets = wallets.len(), dry_run = settings.dry_run, "{startup}");
    alerts.notify(&startup, Severity::Info).await;

    let mut scheduler = ActionScheduler::new(
        wallets,
        activity,
        ledger,
        alerts,
        scheduler_config,
        rng,
        cancel.clone(),
    )
    .with_store(db);
    scheduler.run(cli.once).await;
    cancel.cancel();
    Ok(())
}
