// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::parsing::{parse_address_hex, split_list};
use crate::domain::constants::*;
use crate::domain::error::AppError;
use crate::domain::types::{ActionKind, WalletHandle};
use crate::services::activity::submitter::SubmissionPolicy;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use config::{Config, Environment, File};
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize, Clone)]
pub struct AgentSettings {
    // General
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub log_json: bool,
    #[serde(default)]
    pub dry_run: bool,
    pub rng_seed: Option<u64>,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    pub metrics_port: Option<u16>,
    pub alert_webhook_url: Option<String>,

    // Chain
    pub rpc_url: String,
    pub chain_id: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_key_list")]
    pub private_keys: Vec<String>,
    pub router_address: String,
    pub factory_address: Option<String>,
    pub wrapped_native: Option<String>,

    // Assets
    #[serde(default = "default_native_symbol")]
    pub native_symbol: String,
    #[serde(default = "default_native_min_balance")]
    pub native_min_balance: String,
    #[serde(default)]
    pub tokens: Vec<TokenSettings>,

    // Actions
    #[serde(default)]
    pub action_weights: ActionWeights,
    #[serde(default)]
    pub custom_calls: Vec<CustomCallEntry>,
    #[serde(default)]
    pub send_recipients: Vec<String>,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u64,
    #[serde(default = "default_min_amount_bps")]
    pub min_amount_bps: u64,
    #[serde(default = "default_max_amount_bps")]
    pub max_amount_bps: u64,
    #[serde(default = "default_remove_liquidity_percent")]
    pub remove_liquidity_percent: u64,
    #[serde(default = "default_rebalance_donor_bps")]
    pub rebalance_donor_bps: u64,
    #[serde(default = "default_rebalance_topup_bps")]
    pub rebalance_topup_bps: u64,

    // Submission
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    #[serde(default = "default_gas_buffer_base")]
    pub gas_buffer_base: f64,
    #[serde(default = "default_gas_buffer_step")]
    pub gas_buffer_step: f64,

    // Scheduling
    #[serde(default = "default_outer_retries")]
    pub outer_retries: u32,
    #[serde(default = "default_outer_retry_delay_ms")]
    pub outer_retry_delay_ms: u64,
    #[serde(default)]
    pub precondition_short_circuit: bool,
    #[serde(default = "default_wallet_delay_min_secs")]
    pub wallet_delay_min_secs: u64,
    #[serde(default = "default_wallet_delay_max_secs")]
    pub wallet_delay_max_secs: u64,
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,
    #[serde(default = "default_stats_flush_every")]
    pub stats_flush_every: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TokenSettings {
    pub symbol: String,
    pub address: String,
    pub decimals: u8,
    #[serde(default = "default_token_min_balance")]
    pub min_balance: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ActionWeights {
    #[serde(default = "default_swap_weight")]
    pub swap: u32,
    #[serde(default = "default_send_weight")]
    pub send: u32,
    #[serde(default = "default_add_liquidity_weight")]
    pub add_liquidity: u32,
    #[serde(default = "default_remove_liquidity_weight")]
    pub remove_liquidity: u32,
    #[serde(default)]
    pub custom_call: u32,
}

impl Default for ActionWeights {
    fn default() -> Self {
        Self {
            swap: DEFAULT_SWAP_WEIGHT,
            send: DEFAULT_SEND_WEIGHT,
            add_liquidity: DEFAULT_ADD_LIQUIDITY_WEIGHT,
            remove_liquidity: DEFAULT_REMOVE_LIQUIDITY_WEIGHT,
            custom_call: DEFAULT_CUSTOM_CALL_WEIGHT,
        }
    }
}

impl ActionWeights {
    /// Weights in `ActionKind::ALL` order, zero-weight kinds dropped.
    pub fn entries(&self) -> Vec<(ActionKind, u32)> {
        ActionKind::ALL
            .iter()
            .map(|kind| {
                let w = match kind {
                    ActionKind::Swap => self.swap,
                    ActionKind::Send => self.send,
                    ActionKind::AddLiquidity => self.add_liquidity,
                    ActionKind::RemoveLiquidity => self.remove_liquidity,
                    ActionKind::CustomCall => self.custom_call,
                };
                (*kind, w)
            })
            .filter(|(_, w)| *w > 0)
            .collect()
    }
}

/// A named custom contract interaction.
#[derive(Debug, Deserialize, Clone)]
pub struct CustomCallEntry {
    pub name: String,
    #[serde(flatten)]
    pub call: CustomCallSettings,
}

/// Supported call shapes. `raw` covers anything else with pre-encoded calldata.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CustomCallSettings {
    Erc20Transfer {
        token: String,
        to: Option<String>,
        amount: String,
    },
    WrapNative {
        amount: String,
    },
    UnwrapNative {
        amount: String,
    },
    Raw {
        to: String,
        calldata: String,
        #[serde(default)]
        value: Option<String>,
    },
}

// Defaults
fn default_database_url() -> String {
    "sqlite://pulse.db".to_string()
}
fn default_native_symbol() -> String {
    "ETH".to_string()
}
fn default_native_min_balance() -> String {
    "0.05".to_string()
}
fn default_token_min_balance() -> String {
    "0".to_string()
}
fn default_slippage_bps() -> u64 {
    DEFAULT_SLIPPAGE_BPS
}
fn default_min_amount_bps() -> u64 {
    DEFAULT_MIN_AMOUNT_BPS
}
fn default_max_amount_bps() -> u64 {
    DEFAULT_MAX_AMOUNT_BPS
}
fn default_remove_liquidity_percent() -> u64 {
    DEFAULT_REMOVE_LIQUIDITY_PERCENT
}
fn default_rebalance_donor_bps() -> u64 {
    DEFAULT_REBALANCE_DONOR_BPS
}
fn default_rebalance_topup_bps() -> u64 {
    DEFAULT_REBALANCE_TOPUP_BPS
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_initial_backoff_ms() -> u64 {
    DEFAULT_INITIAL_BACKOFF_MS
}
fn default_confirmation_timeout_ms() -> u64 {
    DEFAULT_CONFIRMATION_TIMEOUT_MS
}
fn default_rpc_timeout_ms() -> u64 {
    DEFAULT_RPC_TIMEOUT_MS
}
fn default_gas_buffer_base() -> f64 {
    DEFAULT_GAS_BUFFER_BASE
}
fn default_gas_buffer_step() -> f64 {
    DEFAULT_GAS_BUFFER_STEP
}
fn default_outer_retries() -> u32 {
    DEFAULT_OUTER_RETRIES
}
fn default_outer_retry_delay_ms() -> u64 {
    DEFAULT_OUTER_RETRY_DELAY_MS
}
fn default_wallet_delay_min_secs() -> u64 {
    DEFAULT_WALLET_DELAY_MIN_SECS
}
fn default_wallet_delay_max_secs() -> u64 {
    DEFAULT_WALLET_DELAY_MAX_SECS
}
fn default_cycle_interval_secs() -> u64 {
    DEFAULT_CYCLE_INTERVAL_SECS
}
fn default_stats_flush_every() -> u64 {
    1
}
fn default_swap_weight() -> u32 {
    DEFAULT_SWAP_WEIGHT
}
fn default_send_weight() -> u32 {
    DEFAULT_SEND_WEIGHT
}
fn default_add_liquidity_weight() -> u32 {
    DEFAULT_ADD_LIQUIDITY_WEIGHT
}
fn default_remove_liquidity_weight() -> u32 {
    DEFAULT_REMOVE_LIQUIDITY_WEIGHT
}

fn deserialize_key_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{Error, SeqAccess, Visitor};
    use std::fmt;

    struct KeyVisitor;

    impl<'de> Visitor<'de> for KeyVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a sequence of private keys or a comma-separated string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: Error,
        {
            Ok(split_list(v))
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut out = Vec::new();
            while let Some(elem) = seq.next_element::<String>()? {
                out.push(elem.trim().to_string());
            }
            Ok(out)
        }
    }

    deserializer.deserialize_any(KeyVisitor)
}

impl AgentSettings {
    pub fn load_with_path(path: Option<&str>) -> Result<Self, AppError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();
        if let Some(selected_path) = resolve_config_path(path) {
            builder = builder.add_source(File::from(Path::new(&selected_path)).required(true));
        } else {
            builder = builder.add_source(File::with_name("config").required(false));
        }
        // Precedence: CLI (in main) > env/.env > config file.
        builder = builder.add_source(Environment::default().separator("__"));

        let settings: AgentSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        Url::parse(&self.rpc_url)
            .map_err(|e| AppError::Config(format!("Invalid RPC_URL: {e}")))?;
        if self.private_keys.is_empty() {
            return Err(AppError::Config("PRIVATE_KEYS is missing".to_string()));
        }
        self.router()?;
        self.optional_address("factory_address", self.factory_address.as_deref())?;
        self.optional_address("wrapped_native", self.wrapped_native.as_deref())?;
        if self.action_weights.entries().is_empty() {
            return Err(invalid("action_weights", "at least one weight must be non-zero"));
        }
        if self.min_amount_bps == 0 || self.min_amount_bps > self.max_amount_bps {
            return Err(invalid(
                "min_amount_bps",
                "must be non-zero and not above max_amount_bps",
            ));
        }
        if self.max_amount_bps > BPS_DENOMINATOR {
            return Err(invalid("max_amount_bps", "must not exceed 10000"));
        }
        if self.slippage_bps >= BPS_DENOMINATOR {
            return Err(invalid("slippage_bps", "must be below 10000"));
        }
        if !(1..=100).contains(&self.remove_liquidity_percent) {
            return Err(invalid("remove_liquidity_percent", "must be within 1..=100"));
        }
        if self.rebalance_donor_bps > BPS_DENOMINATOR || self.rebalance_topup_bps > BPS_DENOMINATOR {
            return Err(invalid("rebalance_*_bps", "must not exceed 10000"));
        }
        if self.wallet_delay_min_secs > self.wallet_delay_max_secs {
            return Err(invalid(
                "wallet_delay_min_secs",
                "must not exceed wallet_delay_max_secs",
            ));
        }
        if self.action_weights.custom_call > 0 && self.custom_calls.is_empty() {
            return Err(invalid(
                "custom_calls",
                "custom_call weight is set but no custom calls are configured",
            ));
        }
        Ok(())
    }

    pub fn wallet_handles(&self) -> Result<Vec<WalletHandle>, AppError> {
        self.private_keys
            .iter()
            .enumerate()
            .map(|(index, key)| {
                PrivateKeySigner::from_str(key)
                    .map(|signer| WalletHandle::new(index, signer))
                    .map_err(|e| AppError::Config(format!("Invalid private key #{index}: {e}")))
            })
            .collect()
    }

    pub fn router(&self) -> Result<Address, AppError> {
        parse_address_hex(&self.router_address)
            .ok_or_else(|| invalid("router_address", "not a valid address"))
    }

    pub fn factory(&self) -> Result<Option<Address>, AppError> {
        self.optional_address("factory_address", self.factory_address.as_deref())
    }

    pub fn wrapped_native_address(&self) -> Result<Option<Address>, AppError> {
        self.optional_address("wrapped_native", self.wrapped_native.as_deref())
    }

    pub fn send_recipient_addresses(&self) -> Result<Vec<Address>, AppError> {
        self.send_recipients
            .iter()
            .map(|raw| {
                parse_address_hex(raw)
                    .ok_or_else(|| invalid("send_recipients", &format!("invalid address {raw}")))
            })
            .collect()
    }

    pub fn submission_policy(&self) -> SubmissionPolicy {
        SubmissionPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            confirmation_timeout: Duration::from_millis(self.confirmation_timeout_ms),
        }
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    fn optional_address(&self, field: &str, raw: Option<&str>) -> Result<Option<Address>, AppError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(None),
            Some(v) => parse_address_hex(v)
                .map(Some)
                .ok_or_else(|| invalid(field, "not a valid address")),
        }
    }
}

fn invalid(field: &str, message: &str) -> AppError {
    AppError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn resolve_config_path(path: Option<&str>) -> Option<String> {
    if let Some(path) = path {
        return Some(path.to_string());
    }
    ["config.toml", "config.testnet.toml"]
        .iter()
        .find(|p| fs::metadata(p).is_ok())
        .map(|p| (*p).to_string())
}
