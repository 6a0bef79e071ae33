// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::app::config::{CustomCallEntry, CustomCallSettings};
use crate::common::parsing::{format_token_amount, parse_address_hex, parse_hex_bytes, parse_token_amount};
use crate::data::abi::{IERC20, IUniswapV2Router02, IWETH};
use crate::data::assets::{AssetKind, TrackedAsset};
use crate::domain::constants::SWAP_DEADLINE_SECS;
use crate::domain::error::AppError;
use crate::domain::types::{ActionKind, TxReceiptSummary, WalletHandle};
use crate::network::rpc::ChainRpc;
use crate::services::activity::oracle::{BalanceOracle, Spend};
use crate::services::activity::selection::{remove_amount, sized_amount, slippage_floor};
use crate::services::activity::submitter::{SubmitContext, TransactionSubmitter};
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use rand::Rng;
use rand::rngs::StdRng;
use std::sync::Arc;

/// A supported custom interaction, resolved to chain units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomCall {
    Erc20Transfer {
        token: Address,
        to: Option<Address>,
        amount: U256,
    },
    WrapNative {
        amount: U256,
    },
    UnwrapNative {
        amount: U256,
    },
    Raw {
        to: Address,
        calldata: Bytes,
        value: U256,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedCall {
    pub name: String,
    pub call: CustomCall,
}

/// Resolve configured custom calls, reading token decimals where needed.
pub async fn resolve_custom_calls(
    entries: &[CustomCallEntry],
    oracle: &BalanceOracle,
) -> Result<Vec<NamedCall>, AppError> {
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let field = format!("custom_calls.{}", entry.name);
        let address = |raw: &str| {
            parse_address_hex(raw).ok_or_else(|| AppError::Validation {
                field: field.clone(),
                message: format!("invalid address {raw}"),
            })
        };
        let amount = |raw: &str, decimals: u8| {
            parse_token_amount(raw, decimals).ok_or_else(|| AppError::Validation {
                field: field.clone(),
                message: format!("invalid amount {raw:?}"),
            })
        };
        let call = match &entry.call {
            CustomCallSettings::Erc20Transfer {
                token,
                to,
                amount: raw,
            } => {
                let token = address(token)?;
                let decimals = oracle.decimals(token).await?;
                CustomCall::Erc20Transfer {
                    token,
                    to: to.as_deref().map(address).transpose()?,
                    amount: amount(raw, decimals)?,
                }
            }
            CustomCallSettings::WrapNative { amount: raw } => CustomCall::WrapNative {
                amount: amount(raw, 18)?,
            },
            CustomCallSettings::UnwrapNative { amount: raw } => CustomCall::UnwrapNative {
                amount: amount(raw, 18)?,
            },
            CustomCallSettings::Raw {
                to,
                calldata,
                value,
            } => CustomCall::Raw {
                to: address(to)?,
                calldata: parse_hex_bytes(calldata).ok_or_else(|| AppError::Validation {
                    field: field.clone(),
                    message: "calldata is not hex".into(),
                })?,
                value: match value {
                    Some(v) => amount(v, 18)?,
                    None => U256::ZERO,
                },
            },
        };
        out.push(NamedCall {
            name: entry.name.clone(),
            call,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub router: Address,
    pub factory: Option<Address>,
    pub wrapped_native: Address,
    pub slippage_bps: u64,
    pub min_amount_bps: u64,
    pub max_amount_bps: u64,
    pub remove_liquidity_percent: u64,
    /// Candidate peers for sends; the sender itself is skipped.
    pub recipients: Vec<Address>,
}

/// Builds each action's transaction and submits it through the submitter.
/// Amounts are decided once per action; the per-attempt closure only prices,
/// pre-checks balances and sends.
pub struct ActionExecutors {
    rpc: Arc<dyn ChainRpc>,
    oracle: Arc<BalanceOracle>,
    submitter: Arc<TransactionSubmitter>,
    config: ExecutorConfig,
    custom_calls: Vec<NamedCall>,
}

impl ActionExecutors {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        oracle: Arc<BalanceOracle>,
        submitter: Arc<TransactionSubmitter>,
        config: ExecutorConfig,
        custom_calls: Vec<NamedCall>,
    ) -> Self {
        Self {
            rpc,
            oracle,
            submitter,
            config,
            custom_calls,
        }
    }

    pub fn oracle(&self) -> &BalanceOracle {
        &self.oracle
    }

    pub async fn execute(
        &self,
        kind: ActionKind,
        wallet: &WalletHandle,
        rng: &mut StdRng,
    ) -> Result<TxReceiptSummary, AppError> {
        match kind {
            ActionKind::Swap => self.random_swap(wallet, rng).await,
            ActionKind::Send => self.send(wallet, rng).await,
            ActionKind::AddLiquidity => self.add_liquidity(wallet, rng).await,
            ActionKind::RemoveLiquidity => self.remove_liquidity(wallet, rng).await,
            ActionKind::CustomCall => self.custom_call(wallet, rng).await,
        }
    }

    async fn random_swap(
        &self,
        wallet: &WalletHandle,
        rng: &mut StdRng,
    ) -> Result<TxReceiptSummary, AppError> {
        let snapshot = self.oracle.snapshot(wallet.address).await?;
        if snapshot.tokens.is_empty() {
            return Err(AppError::Precondition("no tokens configured to swap".into()));
        }
        let directions = if snapshot.tokens.len() > 1 { 3 } else { 2 };
        let pick = rng.gen_range(0..snapshot.tokens.len());
        let (from, to) = match rng.gen_range(0..directions) {
            0 => (&snapshot.native, &snapshot.tokens[pick]),
            1 => (&snapshot.tokens[pick], &snapshot.native),
            _ => {
                let mut other = rng.gen_range(0..snapshot.tokens.len() - 1);
                if other >= pick {
                    other += 1;
                }
                (&snapshot.tokens[pick], &snapshot.tokens[other])
            }
        };
        let amount_in = sized_amount(
            rng,
            from.balance,
            self.config.min_amount_bps,
            self.config.max_amount_bps,
            "swap",
        )?;
        self.swap_exact(wallet, &from.asset, &to.asset, amount_in, ActionKind::Swap.as_str())
            .await
    }

    /// Swap `amount_in` of `from` into `to` through the router.
    pub async fn swap_exact(
        &self,
        wallet: &WalletHandle,
        from: &TrackedAsset,
        to: &TrackedAsset,
        amount_in: U256,
        label: &str,
    ) -> Result<TxReceiptSummary, AppError> {
        let router = self.config.router;
        let weth = self.config.wrapped_native;
        match (from.kind, to.kind) {
            (AssetKind::Native, AssetKind::Erc20(t)) if t == weth => {
                return self.wrap_native(wallet, amount_in, label).await;
            }
            (AssetKind::Erc20(f), AssetKind::Native) if f == weth => {
                return self.unwrap_native(wallet, amount_in, label).await;
            }
            _ => {}
        }
        let path = match (from.kind, to.kind) {
            (AssetKind::Native, AssetKind::Erc20(t)) => vec![weth, t],
            (AssetKind::Erc20(f), AssetKind::Native) => vec![f, weth],
            (AssetKind::Erc20(f), AssetKind::Erc20(t)) if f == weth || t == weth => vec![f, t],
            (AssetKind::Erc20(f), AssetKind::Erc20(t)) => vec![f, weth, t],
            (AssetKind::Native, AssetKind::Native) => {
                return Err(AppError::Precondition(
                    "swap source and target are both native".into(),
                ));
            }
        };

        let min_out = match self.oracle.quote(router, amount_in, &path).await {
            Ok(expected) => slippage_floor(expected, self.config.slippage_bps),
            Err(e) => {
                tracing::warn!(
                    target: "executor",
                    wallet = %wallet.address,
                    from = %from.symbol,
                    to = %to.symbol,
                    error = %e,
                    "Quote failed; proceeding with zero minimum output"
                );
                U256::ZERO
            }
        };

        let recipient = wallet.address;
        let deadline = deadline();
        let (tx, spend) = match from.kind {
            AssetKind::Native => {
                let data = IUniswapV2Router02::swapExactETHForTokensCall {
                    amountOutMin: min_out,
                    path,
                    to: recipient,
                    deadline,
                }
                .abi_encode();
                (
                    call_tx(router, data).with_value(amount_in),
                    Spend::native(amount_in),
                )
            }
            AssetKind::Erc20(token) => {
                self.ensure_allowance(wallet, token, router, amount_in).await?;
                let data = if matches!(to.kind, AssetKind::Native) {
                    IUniswapV2Router02::swapExactTokensForETHCall {
                        amountIn: amount_in,
                        amountOutMin: min_out,
                        path,
                        to: recipient,
                        deadline,
                    }
                    .abi_encode()
                } else {
                    IUniswapV2Router02::swapExactTokensForTokensCall {
                        amountIn: amount_in,
                        amountOutMin: min_out,
                        path,
                        to: recipient,
                        deadline,
                    }
                    .abi_encode()
                };
                (call_tx(router, data), Spend::token(token, amount_in))
            }
        };

        tracing::info!(
            target: "executor",
            wallet = %wallet.address,
            action = label,
            from = %from.symbol,
            to = %to.symbol,
            amount_in = %format_token_amount(amount_in, from.decimals),
            min_out = %format_token_amount(min_out, to.decimals),
            "Swapping"
        );
        self.submit_write(wallet, label, tx, spend).await
    }

    pub async fn send(
        &self,
        wallet: &WalletHandle,
        rng: &mut StdRng,
    ) -> Result<TxReceiptSummary, AppError> {
        let to = self.pick_recipient(wallet.address, rng)?;
        let snapshot = self.oracle.snapshot(wallet.address).await?;
        let choice = rng.gen_range(0..=snapshot.tokens.len());
        let held = if choice == 0 {
            &snapshot.native
        } else {
            &snapshot.tokens[choice - 1]
        };
        let amount = sized_amount(
            rng,
            held.balance,
            self.config.min_amount_bps,
            self.config.max_amount_bps,
            "send",
        )?;
        self.transfer(wallet, &held.asset, to, amount, ActionKind::Send.as_str())
            .await
    }

    async fn transfer(
        &self,
        wallet: &WalletHandle,
        asset: &TrackedAsset,
        to: Address,
        amount: U256,
        label: &str,
    ) -> Result<TxReceiptSummary, AppError> {
        if to == wallet.address {
            return Err(AppError::Precondition("refusing to send to self".into()));
        }
        let (tx, spend) = match asset.kind {
            AssetKind::Native => (
                TransactionRequest::default().with_to(to).with_value(amount),
                Spend::native(amount),
            ),
            AssetKind::Erc20(token) => {
                let data = IERC20::transferCall { to, amount }.abi_encode();
                (call_tx(token, data), Spend::token(token, amount))
            }
        };
        tracing::info!(
            target: "executor",
            wallet = %wallet.address,
            action = label,
            to = %to,
            amount = %format_token_amount(amount, asset.decimals),
            asset = %asset.symbol,
            "Sending"
        );
        self.submit_write(wallet, label, tx, spend).await
    }

    pub async fn add_liquidity(
        &self,
        wallet: &WalletHandle,
        rng: &mut StdRng,
    ) -> Result<TxReceiptSummary, AppError> {
        let token = self.pick_token(rng)?;
        let token_address = self.liquidity_side(token)?;
        let balance = self.oracle.token_balance(token_address, wallet.address).await?;
        let token_amount = sized_amount(
            rng,
            balance,
            self.config.min_amount_bps,
            self.config.max_amount_bps,
            "add_liquidity",
        )?;
        let native_amount = self
            .oracle
            .quote(
                self.config.router,
                token_amount,
                &[token_address, self.config.wrapped_native],
            )
            .await?;
        if native_amount.is_zero() {
            return Err(AppError::Precondition(format!(
                "pool quotes zero native for {} {}",
                token_amount, token.symbol
            )));
        }

        self.ensure_allowance(wallet, token_address, self.config.router, token_amount)
            .await?;
        let data = IUniswapV2Router02::addLiquidityETHCall {
            token: token_address,
            amountTokenDesired: token_amount,
            amountTokenMin: slippage_floor(token_amount, self.config.slippage_bps),
            amountETHMin: slippage_floor(native_amount, self.config.slippage_bps),
            to: wallet.address,
            deadline: deadline(),
        }
        .abi_encode();
        let tx = call_tx(self.config.router, data).with_value(native_amount);
        let spend = Spend::token(token_address, token_amount).with_native(native_amount);

        tracing::info!(
            target: "executor",
            wallet = %wallet.address,
            token = %token.symbol,
            token_amount = %format_token_amount(token_amount, token.decimals),
            native_amount = %format_token_amount(native_amount, 18),
            "Adding liquidity"
        );
        self.submit_write(wallet, ActionKind::AddLiquidity.as_str(), tx, spend)
            .await
    }

    pub async fn remove_liquidity(
        &self,
        wallet: &WalletHandle,
        rng: &mut StdRng,
    ) -> Result<TxReceiptSummary, AppError> {
        let factory = self
            .config
            .factory
            .ok_or_else(|| AppError::Config("factory_address is required to remove liquidity".into()))?;
        let token = self.pick_token(rng)?;
        let token_address = self.liquidity_side(token)?;
        let pair = self
            .rpc
            .pair_for(factory, token_address, self.config.wrapped_native)
            .await?;
        if pair == Address::ZERO {
            return Err(AppError::Precondition(format!(
                "no {}/native pair exists",
                token.symbol
            )));
        }
        let shares = self.oracle.token_balance(pair, wallet.address).await?;
        let liquidity = remove_amount(shares, self.config.remove_liquidity_percent)?;

        self.ensure_allowance(wallet, pair, self.config.router, liquidity)
            .await?;
        let data = IUniswapV2Router02::removeLiquidityETHCall {
            token: token_address,
            liquidity,
            amountTokenMin: U256::ZERO,
            amountETHMin: U256::ZERO,
            to: wallet.address,
            deadline: deadline(),
        }
        .abi_encode();
        let tx = call_tx(self.config.router, data);

        tracing::info!(
            target: "executor",
            wallet = %wallet.address,
            token = %token.symbol,
            pair = %pair,
            liquidity = %liquidity,
            percent = self.config.remove_liquidity_percent,
            "Removing liquidity"
        );
        self.submit_write(
            wallet,
            ActionKind::RemoveLiquidity.as_str(),
            tx,
            Spend::token(pair, liquidity),
        )
        .await
    }

    pub async fn custom_call(
        &self,
        wallet: &WalletHandle,
        rng: &mut StdRng,
    ) -> Result<TxReceiptSummary, AppError> {
        if self.custom_calls.is_empty() {
            return Err(AppError::Config("no custom calls configured".into()));
        }
        let named = &self.custom_calls[rng.gen_range(0..self.custom_calls.len())];
        let label = ActionKind::CustomCall.as_str();

        tracing::info!(
            target: "executor",
            wallet = %wallet.address,
            call = %named.name,
            "Running custom call"
        );
        match &named.call {
            CustomCall::Erc20Transfer { token, to, amount } => {
                let to = match to {
                    Some(addr) => *addr,
                    None => self.pick_recipient(wallet.address, rng)?,
                };
                let decimals = self.oracle.decimals(*token).await?;
                let asset = TrackedAsset {
                    symbol: named.name.clone(),
                    kind: AssetKind::Erc20(*token),
                    decimals,
                    min_balance: U256::ZERO,
                };
                self.transfer(wallet, &asset, to, *amount, label).await
            }
            CustomCall::WrapNative { amount } => self.wrap_native(wallet, *amount, label).await,
            CustomCall::UnwrapNative { amount } => self.unwrap_native(wallet, *amount, label).await,
            CustomCall::Raw {
                to,
                calldata,
                value,
            } => {
                let tx = TransactionRequest::default()
                    .with_to(*to)
                    .with_input(calldata.clone())
                    .with_value(*value);
                self.submit_write(wallet, label, tx, Spend::native(*value))
                    .await
            }
        }
    }

    /// Native and its wrapped token convert 1:1 through the wrapper; the
    /// router has no pool for that pair.
    async fn wrap_native(
        &self,
        wallet: &WalletHandle,
        amount: U256,
        label: &str,
    ) -> Result<TxReceiptSummary, AppError> {
        let tx = call_tx(self.config.wrapped_native, IWETH::depositCall {}.abi_encode())
            .with_value(amount);
        tracing::info!(
            target: "executor",
            wallet = %wallet.address,
            action = label,
            amount = %format_token_amount(amount, 18),
            "Wrapping native"
        );
        self.submit_write(wallet, label, tx, Spend::native(amount))
            .await
    }

    async fn unwrap_native(
        &self,
        wallet: &WalletHandle,
        amount: U256,
        label: &str,
    ) -> Result<TxReceiptSummary, AppError> {
        let weth = self.config.wrapped_native;
        let data = IWETH::withdrawCall { amount }.abi_encode();
        tracing::info!(
            target: "executor",
            wallet = %wallet.address,
            action = label,
            amount = %format_token_amount(amount, 18),
            "Unwrapping native"
        );
        self.submit_write(wallet, label, call_tx(weth, data), Spend::token(weth, amount))
            .await
    }

    /// Approve `spender` for `U256::MAX` unless the current allowance already
    /// covers `amount`. Waits for the approval to confirm.
    pub async fn ensure_allowance(
        &self,
        wallet: &WalletHandle,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<(), AppError> {
        let current = self.oracle.allowance(token, wallet.address, spender).await?;
        if current >= amount {
            return Ok(());
        }
        tracing::info!(
            target: "executor",
            wallet = %wallet.address,
            token = %token,
            spender = %spender,
            "Allowance too low; approving"
        );
        let data = IERC20::approveCall {
            spender,
            amount: U256::MAX,
        }
        .abi_encode();
        self.submit_write(wallet, "approve", call_tx(token, data), Spend::default())
            .await?;
        Ok(())
    }

    async fn submit_write(
        &self,
        wallet: &WalletHandle,
        label: &str,
        tx: TransactionRequest,
        spend: Spend,
    ) -> Result<TxReceiptSummary, AppError> {
        let owner = wallet.address;
        let oracle = &self.oracle;
        let rpc = &self.rpc;
        let spend = &spend;
        let tx = &tx;
        self.submitter
            .submit(SubmitContext { wallet: owner, label }, |quote| {
                let mut request = tx.clone();
                quote.apply(&mut request);
                async move {
                    oracle.preflight(owner, spend, &quote).await?;
                    rpc.send_transaction(owner, request).await
                }
            })
            .await
    }

    fn liquidity_side(&self, token: &TrackedAsset) -> Result<Address, AppError> {
        match token.token_address() {
            Some(address) if address == self.config.wrapped_native => Err(AppError::Precondition(
                format!("{} is the wrapped native token; it has no pool against native", token.symbol),
            )),
            Some(address) => Ok(address),
            None => Err(AppError::Precondition("liquidity needs an ERC-20 side".into())),
        }
    }

    fn pick_token(&self, rng: &mut StdRng) -> Result<&TrackedAsset, AppError> {
        let tokens = self.oracle.assets().tokens();
        if tokens.is_empty() {
            return Err(AppError::Precondition("no tokens configured".into()));
        }
        Ok(&tokens[rng.gen_range(0..tokens.len())])
    }

    fn pick_recipient(&self, sender: Address, rng: &mut StdRng) -> Result<Address, AppError> {
        let peers: Vec<Address> = self
            .config
            .recipients
            .iter()
            .copied()
            .filter(|a| *a != sender)
            .collect();
        if peers.is_empty() {
            return Err(AppError::Precondition("no recipient other than the sender".into()));
        }
        Ok(peers[rng.gen_range(0..peers.len())])
    }
}

fn call_tx(to: Address, data: Vec<u8>) -> TransactionRequest {
    TransactionRequest::default()
        .with_to(to)
        .with_input(Bytes::from(data))
}

fn deadline() -> U256 {
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    U256::from(now + SWAP_DEADLINE_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_is_twenty_minutes_out() {
        let now = chrono::Utc::now().timestamp() as u64;
        let d: u64 = deadline().to();
        assert!(d >= now + SWAP_DEADLINE_SECS && d <= now + SWAP_DEADLINE_SECS + 5);
    }

    #[test]
    fn call_tx_targets_contract_with_calldata() {
        let data = IERC20::approveCall {
            spender: Address::with_last_byte(2),
            amount: U256::MAX,
        }
        .abi_encode();
        let tx = call_tx(Address::with_last_byte(1), data.clone());
        assert_eq!(tx.to, Some(Address::with_last_byte(1).into()));
        assert_eq!(tx.input.input().map(|b| b.to_vec()), Some(data));
    }
}
