// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use alloy::primitives::{Address, U256};

use crate::app::config::{AgentSettings, TokenSettings};
use crate::common::parsing::{parse_address_hex, parse_token_amount};
use crate::domain::error::AppError;
use crate::network::rpc::ChainRpc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Native,
    Erc20(Address),
}

/// An asset whose balance the agent keeps above `min_balance`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedAsset {
    pub symbol: String,
    pub kind: AssetKind,
    pub decimals: u8,
    pub min_balance: U256,
}

impl TrackedAsset {
    pub fn token_address(&self) -> Option<Address> {
        match self.kind {
            AssetKind::Native => None,
            AssetKind::Erc20(addr) => Some(addr),
        }
    }
}

/// The gas asset plus configured tokens, in configured order.
#[derive(Debug, Clone)]
pub struct AssetRegistry {
    native: TrackedAsset,
    tokens: Vec<TrackedAsset>,
}

impl AssetRegistry {
    pub fn new(native: TrackedAsset, tokens: Vec<TrackedAsset>) -> Self {
        Self { native, tokens }
    }

    pub fn from_settings(settings: &AgentSettings) -> Result<Self, AppError> {
        let native = TrackedAsset {
            symbol: settings.native_symbol.clone(),
            kind: AssetKind::Native,
            decimals: 18,
            min_balance: parse_threshold("native_min_balance", &settings.native_min_balance, 18)?,
        };
        let tokens = settings
            .tokens
            .iter()
            .map(Self::token_from_settings)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { native, tokens })
    }

    fn token_from_settings(entry: &TokenSettings) -> Result<TrackedAsset, AppError> {
        let address = parse_address_hex(&entry.address).ok_or_else(|| AppError::Validation {
            field: format!("tokens.{}.address", entry.symbol),
            message: format!("invalid address {}", entry.address),
        })?;
        Ok(TrackedAsset {
            symbol: entry.symbol.clone(),
            kind: AssetKind::Erc20(address),
            decimals: entry.decimals,
            min_balance: parse_threshold(
                &format!("tokens.{}.min_balance", entry.symbol),
                &entry.min_balance,
                entry.decimals,
            )?,
        })
    }

    pub fn native(&self) -> &TrackedAsset {
        &self.native
    }

    pub fn tokens(&self) -> &[TrackedAsset] {
        &self.tokens
    }

    /// Compare configured decimals against the chain and adopt the on-chain
    /// value on mismatch. Returns how many entries were corrected.
    pub async fn reconcile_decimals(&mut self, rpc: &dyn ChainRpc) -> usize {
        let mut corrected = 0usize;
        for asset in &mut self.tokens {
            let AssetKind::Erc20(address) = asset.kind else {
                continue;
            };
            match rpc.token_decimals(address).await {
                Ok(onchain) if onchain != asset.decimals => {
                    tracing::warn!(
                        target: "assets",
                        symbol = %asset.symbol,
                        address = %format!("{:#x}", address),
                        configured = asset.decimals,
                        onchain,
                        "Configured decimals disagree with token; using on-chain value"
                    );
                    let factor = U256::from(10u64);
                    asset.min_balance = if onchain > asset.decimals {
                        asset.min_balance * factor.pow(U256::from(onchain - asset.decimals))
                    } else {
                        asset.min_balance / factor.pow(U256::from(asset.decimals - onchain))
                    };
                    asset.decimals = onchain;
                    corrected += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        target: "assets",
                        symbol = %asset.symbol,
                        error = %e,
                        "Failed to read token decimals; keeping configured value"
                    );
                }
            }
        }
        corrected
    }
}

fn parse_threshold(field: &str, raw: &str, decimals: u8) -> Result<U256, AppError> {
    parse_token_amount(raw, decimals).ok_or_else(|| AppError::Validation {
        field: field.to_string(),
        message: format!("invalid amount {raw:?}"),
    })
}
