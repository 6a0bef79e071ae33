// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::parsing::format_token_amount;
use crate::common::retry::retry_async;
use crate::data::assets::{AssetKind, AssetRegistry, TrackedAsset};
use crate::domain::constants::PRECHECK_GAS_LIMIT;
use crate::domain::error::AppError;
use crate::domain::types::GasQuote;
use crate::network::rpc::ChainRpc;
use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

const READ_ATTEMPTS: usize = 3;
const READ_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetBalance {
    pub asset: TrackedAsset,
    pub balance: U256,
}

impl AssetBalance {
    pub fn below_minimum(&self) -> bool {
        self.balance < self.asset.min_balance
    }

    /// At least twice the configured minimum.
    pub fn has_surplus(&self) -> bool {
        self.balance >= self.asset.min_balance.saturating_mul(U256::from(2u64))
    }

    pub fn display(&self) -> String {
        format!(
            "{} {}",
            format_token_amount(self.balance, self.asset.decimals),
            self.asset.symbol
        )
    }
}

/// All tracked balances of one wallet, tokens in configured order.
#[derive(Debug, Clone)]
pub struct BalanceSnapshot {
    pub owner: Address,
    pub native: AssetBalance,
    pub tokens: Vec<AssetBalance>,
}

/// What an action will spend, checked right before each send.
#[derive(Debug, Clone, Default)]
pub struct Spend {
    pub native_value: U256,
    pub token: Option<(Address, U256)>,
}

impl Spend {
    pub fn native(value: U256) -> Self {
        Self {
            native_value: value,
            token: None,
        }
    }

    pub fn token(token: Address, amount: U256) -> Self {
        Self {
            native_value: U256::ZERO,
            token: Some((token, amount)),
        }
    }

    pub fn with_native(mut self, value: U256) -> Self {
        self.native_value = value;
        self
    }
}

/// Read-side view of wallet holdings.
pub struct BalanceOracle {
    rpc: Arc<dyn ChainRpc>,
    assets: Arc<AssetRegistry>,
    decimals: DashMap<Address, u8>,
}

impl BalanceOracle {
    pub fn new(rpc: Arc<dyn ChainRpc>, assets: Arc<AssetRegistry>) -> Self {
        let decimals = DashMap::new();
        for token in assets.tokens() {
            if let Some(addr) = token.token_address() {
                decimals.insert(addr, token.decimals);
            }
        }
        Self {
            rpc,
            assets,
            decimals,
        }
    }

    pub fn assets(&self) -> &AssetRegistry {
        &self.assets
    }

    pub async fn native_balance(&self, owner: Address) -> Result<U256, AppError> {
        let rpc = &self.rpc;
        retry_async(
            "eth_getBalance",
            |_| rpc.native_balance(owner),
            READ_ATTEMPTS,
            READ_BACKOFF,
        )
        .await
    }

    pub async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, AppError> {
        let rpc = &self.rpc;
        retry_async(
            "balanceOf",
            |_| rpc.token_balance(token, owner),
            READ_ATTEMPTS,
            READ_BACKOFF,
        )
        .await
    }

    pub async fn balance_of(&self, asset: &TrackedAsset, owner: Address) -> Result<U256, AppError> {
        match asset.kind {
            AssetKind::Native => self.native_balance(owner).await,
            AssetKind::Erc20(token) => self.token_balance(token, owner).await,
        }
    }

    pub async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, AppError> {
        let rpc = &self.rpc;
        retry_async(
            "allowance",
            |_| rpc.allowance(token, owner, spender),
            READ_ATTEMPTS,
            READ_BACKOFF,
        )
        .await
    }

    /// Cached `decimals()`; untracked tokens are read once.
    pub async fn decimals(&self, token: Address) -> Result<u8, AppError> {
        if let Some(d) = self.decimals.get(&token) {
            return Ok(*d);
        }
        let rpc = &self.rpc;
        let d = retry_async(
            "decimals",
            |_| rpc.token_decimals(token),
            READ_ATTEMPTS,
            READ_BACKOFF,
        )
        .await?;
        self.decimals.insert(token, d);
        Ok(d)
    }

    /// Expected router output for `amount_in` along `path`.
    pub async fn quote(
        &self,
        router: Address,
        amount_in: U256,
        path: &[Address],
    ) -> Result<U256, AppError> {
        let rpc = &self.rpc;
        let amounts = retry_async(
            "getAmountsOut",
            |_| rpc.amounts_out(router, amount_in, path),
            READ_ATTEMPTS,
            READ_BACKOFF,
        )
        .await?;
        amounts
            .last()
            .copied()
            .ok_or_else(|| AppError::MalformedResponse("getAmountsOut returned no amounts".into()))
    }

    pub async fn snapshot(&self, owner: Address) -> Result<BalanceSnapshot, AppError> {
        let native = AssetBalance {
            asset: self.assets.native().clone(),
            balance: self.native_balance(owner).await?,
        };
        let mut tokens = Vec::with_capacity(self.assets.tokens().len());
        for asset in self.assets.tokens() {
            let balance = self.balance_of(asset, owner).await?;
            tokens.push(AssetBalance {
                asset: asset.clone(),
                balance,
            });
        }
        Ok(BalanceSnapshot {
            owner,
            native,
            tokens,
        })
    }

    /// Fail with `InsufficientFunds` unless `owner` can cover `spend` plus a
    /// gas reserve at the quoted price. Nothing is sent.
    pub async fn preflight(
        &self,
        owner: Address,
        spend: &Spend,
        quote: &GasQuote,
    ) -> Result<(), AppError> {
        if let Some((token, amount)) = spend.token {
            let have = self.token_balance(token, owner).await?;
            if have < amount {
                let decimals = self.decimals(token).await.unwrap_or(18);
                return Err(AppError::InsufficientFunds {
                    required: format_token_amount(amount, decimals),
                    available: format_token_amount(have, decimals),
                });
            }
        }

        let gas_reserve = U256::from(quote.max_price_per_gas()) * U256::from(PRECHECK_GAS_LIMIT);
        let required = spend.native_value.saturating_add(gas_reserve);
        let have = self.native_balance(owner).await?;
        if have < required {
            return Err(AppError::InsufficientFunds {
                required: format_token_amount(required, 18),
                available: format_token_amount(have, 18),
            });
        }
        Ok(())
    }
}
