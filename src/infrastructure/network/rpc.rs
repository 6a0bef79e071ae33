// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::data::abi::{IERC20, IUniswapV2Factory, IUniswapV2Router02};
use crate::domain::error::{AppError, classify_rpc_error};
use crate::domain::types::{FeeData, PendingTx, TxReceiptSummary, WalletHandle};
use crate::network::provider::{ConnectionFactory, HttpProvider};
use alloy::consensus::TxEnvelope;
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, U256, keccak256};
use alloy::providers::Provider;
use alloy::rpc::types::{BlockNumberOrTag, TransactionRequest};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;

/// Everything the agent needs from the chain. Kept narrow so the submission
/// core can be driven by a scripted implementation in tests.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn chain_id(&self) -> Result<u64, AppError>;
    async fn fee_data(&self) -> Result<FeeData, AppError>;
    async fn native_balance(&self, owner: Address) -> Result<U256, AppError>;
    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, AppError>;
    async fn token_decimals(&self, token: Address) -> Result<u8, AppError>;
    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, AppError>;
    async fn amounts_out(
        &self,
        router: Address,
        amount_in: U256,
        path: &[Address],
    ) -> Result<Vec<U256>, AppError>;
    async fn pair_for(
        &self,
        factory: Address,
        token_a: Address,
        token_b: Address,
    ) -> Result<Address, AppError>;
    async fn wrapped_native(&self, router: Address) -> Result<Address, AppError>;
    /// Sign with `from`'s key and broadcast. Returns once the node accepted it.
    async fn send_transaction(
        &self,
        from: Address,
        tx: TransactionRequest,
    ) -> Result<PendingTx, AppError>;
}

pub struct AlloyRpc {
    provider: HttpProvider,
    wallets: HashMap<Address, EthereumWallet>,
    chain_id: OnceCell<u64>,
    rpc_timeout: Duration,
    dry_run: bool,
    simulated: SimulatedWrites,
}

/// Dry-run bookkeeping: a sequence that keeps simulated hashes distinct and
/// the approvals that would have landed had they been broadcast.
#[derive(Default)]
struct SimulatedWrites {
    sequence: AtomicU64,
    approvals: DashMap<(Address, Address, Address), U256>,
}

impl AlloyRpc {
    pub fn new(
        rpc_url: &str,
        wallets: &[WalletHandle],
        rpc_timeout: Duration,
        dry_run: bool,
    ) -> Result<Self, AppError> {
        let provider = ConnectionFactory::http(rpc_url)?;
        Ok(Self::with_provider(provider, wallets, rpc_timeout, dry_run))
    }

    pub fn with_provider(
        provider: HttpProvider,
        wallets: &[WalletHandle],
        rpc_timeout: Duration,
        dry_run: bool,
    ) -> Self {
        let wallets = wallets
            .iter()
            .map(|w| (w.address, ConnectionFactory::wallet(w.signer.clone())))
            .collect();
        Self {
            provider,
            wallets,
            chain_id: OnceCell::new(),
            rpc_timeout,
            dry_run,
            simulated: SimulatedWrites::default(),
        }
    }

    async fn bounded<T, F>(&self, label: &str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        match tokio::time::timeout(self.rpc_timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(AppError::Connection(format!(
                "{label} timed out after {}ms",
                self.rpc_timeout.as_millis()
            ))),
        }
    }

    /// Fill nonce, chain id and gas limit, then sign with `from`'s key.
    ///
    /// The nonce is the pending count read on every call, so a broadcast the
    /// node refused (or one that timed out) never leaves a gap behind it.
    async fn sign(&self, from: Address, mut tx: TransactionRequest) -> Result<TxEnvelope, AppError> {
        let wallet = self
            .wallets
            .get(&from)
            .ok_or_else(|| AppError::Config(format!("No signer configured for {from:#x}")))?;

        let nonce = self
            .bounded("eth_getTransactionCount", async {
                self.provider
                    .get_transaction_count(from)
                    .pending()
                    .await
                    .map_err(|e| classify_rpc_error("nonce", &e))
            })
            .await?;
        tx.set_nonce(nonce);
        tx.set_chain_id(self.chain_id().await?);

        if tx.gas.is_none() {
            let estimate = self
                .bounded("eth_estimateGas", async {
                    self.provider
                        .estimate_gas(tx.clone())
                        .await
                        .map_err(|e| classify_rpc_error("estimate gas", &e))
                })
                .await?;
            tx.set_gas_limit(estimate);
        }

        tx.build(wallet)
            .await
            .map_err(|e| AppError::Config(format!("Signing for {from:#x} failed: {e}")))
    }

    async fn simulate(&self, from: Address, mut tx: TransactionRequest) -> Result<PendingTx, AppError> {
        let to = tx.to.and_then(|kind| kind.to().copied());
        let input = tx.input.input().cloned().unwrap_or_default();
        let value = tx.value.unwrap_or_default();
        // A call pays no fee; leaving the caps in makes nodes demand balance for the full gas cap.
        tx.gas_price = None;
        tx.max_fee_per_gas = None;
        tx.max_priority_fee_per_gas = None;

        let simulated = self
            .bounded("eth_call", async {
                self.provider
                    .call(tx)
                    .await
                    .map_err(|e| classify_rpc_error("eth_call", &e))
            })
            .await;
        if let Err(e) = simulated {
            if to.is_some_and(|spender| self.has_simulated_approval(from, spender)) {
                tracing::warn!(
                    target: "rpc",
                    from = %from,
                    error = %e,
                    "Dry-run: call relies on an approval that was only simulated; not verifiable"
                );
            } else {
                return Err(e);
            }
        }

        if let (Some(token), Ok(call)) = (to, IERC20::approveCall::abi_decode(&input)) {
            self.simulated
                .approvals
                .insert((token, from, call.spender), call.amount);
        }

        let sequence = self.simulated.sequence.fetch_add(1, Ordering::Relaxed);
        let hash = keccak256(
            [
                from.as_slice(),
                sequence.to_be_bytes().as_slice(),
                to.unwrap_or_default().as_slice(),
                value.to_be_bytes::<32>().as_slice(),
                &input[..],
            ]
            .concat(),
        );
        tracing::info!(target: "rpc", from = %from, tx = %hash, "Dry-run: simulated instead of broadcasting");
        let receipt = TxReceiptSummary {
            hash,
            block_number: None,
            gas_used: 0,
            effective_gas_price: 0,
            success: true,
        };
        Ok(PendingTx::new(
            hash,
            Box::pin(async move { Ok::<_, AppError>(receipt) }),
        ))
    }

    fn has_simulated_approval(&self, owner: Address, spender: Address) -> bool {
        self.simulated
            .approvals
            .iter()
            .any(|entry| entry.key().1 == owner && entry.key().2 == spender)
    }
}

fn classify_contract_error(context: &str, err: alloy::contract::Error) -> AppError {
    match err {
        alloy::contract::Error::TransportError(e) => classify_rpc_error(context, &e),
        other => AppError::MalformedResponse(format!("{context}: {other}")),
    }
}

#[async_trait]
impl ChainRpc for AlloyRpc {
    async fn chain_id(&self) -> Result<u64, AppError> {
        self.chain_id
            .get_or_try_init(|| {
                self.bounded("eth_chainId", async {
                    self.provider
                        .get_chain_id()
                        .await
                        .map_err(|e| classify_rpc_error("eth_chainId", &e))
                })
            })
            .await
            .copied()
    }

    async fn fee_data(&self) -> Result<FeeData, AppError> {
        self.bounded("fee data", async {
            let block = self
                .provider
                .get_block_by_number(BlockNumberOrTag::Latest)
                .await
                .map_err(|e| classify_rpc_error("latest block", &e))?;
            let base_fee_per_gas = block
                .as_ref()
                .and_then(|b| b.header.base_fee_per_gas)
                .map(u128::from);

            let max_priority_fee_per_gas = if base_fee_per_gas.is_some() {
                match self.provider.get_max_priority_fee_per_gas().await {
                    Ok(tip) => Some(tip),
                    Err(e) => {
                        tracing::debug!(target: "gas", error = %e, "eth_maxPriorityFeePerGas unavailable");
                        None
                    }
                }
            } else {
                None
            };

            let gas_price = match self.provider.get_gas_price().await {
                Ok(price) => Some(price),
                Err(e) if max_priority_fee_per_gas.is_some() => {
                    tracing::debug!(target: "gas", error = %e, "eth_gasPrice unavailable");
                    None
                }
                Err(e) => return Err(classify_rpc_error("eth_gasPrice", &e)),
            };

            Ok(FeeData {
                base_fee_per_gas,
                max_priority_fee_per_gas,
                gas_price,
            })
        })
        .await
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, AppError> {
        self.bounded("eth_getBalance", async {
            self.provider
                .get_balance(owner)
                .await
                .map_err(|e| classify_rpc_error("eth_getBalance", &e))
        })
        .await
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, AppError> {
        let contract = IERC20::new(token, self.provider.clone());
        self.bounded("balanceOf", async {
            contract
                .balanceOf(owner)
                .call()
                .await
                .map_err(|e| classify_contract_error("balanceOf", e))
        })
        .await
    }

    async fn token_decimals(&self, token: Address) -> Result<u8, AppError> {
        let contract = IERC20::new(token, self.provider.clone());
        self.bounded("decimals", async {
            contract
                .decimals()
                .call()
                .await
                .map_err(|e| classify_contract_error("decimals", e))
        })
        .await
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, AppError> {
        let contract = IERC20::new(token, self.provider.clone());
        let on_chain = self
            .bounded("allowance", async {
                contract
                    .allowance(owner, spender)
                    .call()
                    .await
                    .map_err(|e| classify_contract_error("allowance", e))
            })
            .await?;
        let simulated = self
            .simulated
            .approvals
            .get(&(token, owner, spender))
            .map(|a| *a)
            .unwrap_or_default();
        Ok(on_chain.max(simulated))
    }

    async fn amounts_out(
        &self,
        router: Address,
        amount_in: U256,
        path: &[Address],
    ) -> Result<Vec<U256>, AppError> {
        let contract = IUniswapV2Router02::new(router, self.provider.clone());
        let path = path.to_vec();
        self.bounded("getAmountsOut", async {
            contract
                .getAmountsOut(amount_in, path)
                .call()
                .await
                .map_err(|e| classify_contract_error("getAmountsOut", e))
        })
        .await
    }

    async fn pair_for(
        &self,
        factory: Address,
        token_a: Address,
        token_b: Address,
    ) -> Result<Address, AppError> {
        let contract = IUniswapV2Factory::new(factory, self.provider.clone());
        self.bounded("getPair", async {
            contract
                .getPair(token_a, token_b)
                .call()
                .await
                .map_err(|e| classify_contract_error("getPair", e))
        })
        .await
    }

    async fn wrapped_native(&self, router: Address) -> Result<Address, AppError> {
        let contract = IUniswapV2Router02::new(router, self.provider.clone());
        self.bounded("WETH", async {
            contract
                .WETH()
                .call()
                .await
                .map_err(|e| classify_contract_error("WETH", e))
        })
        .await
    }

    async fn send_transaction(
        &self,
        from: Address,
        mut tx: TransactionRequest,
    ) -> Result<PendingTx, AppError> {
        tx.from = Some(from);
        if self.dry_run {
            return self.simulate(from, tx).await;
        }

        let envelope = self.sign(from, tx).await?;
        let hash = *envelope.tx_hash();
        let raw = envelope.encoded_2718();
        let pending = self
            .bounded("eth_sendRawTransaction", async {
                self.provider
                    .send_raw_transaction(&raw)
                    .await
                    .map_err(|e| classify_rpc_error("send", &e))
            })
            .await?;
        if *pending.tx_hash() != hash {
            tracing::warn!(
                target: "rpc",
                local = %hash,
                node = %pending.tx_hash(),
                "Node reported a different transaction hash"
            );
        }

        Ok(PendingTx::new(
            hash,
            Box::pin(async move {
                let receipt = pending
                    .get_receipt()
                    .await
                    .map_err(|e| AppError::Connection(format!("receipt for {hash}: {e}")))?;
                Ok::<_, AppError>(TxReceiptSummary {
                    hash: ReceiptResponse::transaction_hash(&receipt),
                    block_number: ReceiptResponse::block_number(&receipt),
                    gas_used: ReceiptResponse::gas_used(&receipt),
                    effective_gas_price: ReceiptResponse::effective_gas_price(&receipt),
                    success: ReceiptResponse::status(&receipt),
                })
            }),
        ))
    }
}
