// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>
#![allow(dead_code)]

use alloy::primitives::{Address, B256, Bytes, U256, keccak256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use pulse_agent::data::abi::IERC20;
use pulse_agent::data::assets::{AssetKind, AssetRegistry, TrackedAsset};
use pulse_agent::domain::error::AppError;
use pulse_agent::domain::types::{FeeData, PendingTx, TxReceiptSummary, WalletHandle};
use pulse_agent::network::gas::GasOracle;
use pulse_agent::network::rpc::ChainRpc;
use pulse_agent::services::activity::executors::{ActionExecutors, ExecutorConfig, NamedCall};
use pulse_agent::services::activity::ledger::ActivityLedger;
use pulse_agent::services::activity::oracle::BalanceOracle;
use pulse_agent::services::activity::submitter::{SubmissionPolicy, TransactionSubmitter};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const GWEI: u128 = 1_000_000_000;
pub const ETH: u128 = 1_000_000_000_000_000_000;

pub fn addr(n: u8) -> Address {
    Address::with_last_byte(n)
}

pub fn router() -> Address {
    addr(0xee)
}

pub fn factory() -> Address {
    addr(0xef)
}

pub fn weth() -> Address {
    addr(0xaa)
}

pub fn token(i: u8) -> Address {
    addr(0xa0 + i)
}

pub fn eth(whole_milli: u128) -> U256 {
    U256::from(whole_milli * ETH / 1_000)
}

pub fn wallet(i: usize) -> WalletHandle {
    let signer = PrivateKeySigner::from_bytes(&B256::with_last_byte(i as u8 + 1)).unwrap();
    WalletHandle::new(i, signer)
}

/// How the chain treats the next send.
#[derive(Debug, Clone)]
pub enum SendScript {
    Confirm,
    Revert,
    Hang,
    Reject(String),
}

#[derive(Debug, Clone)]
pub struct SentTx {
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub max_price: u128,
}

impl SentTx {
    pub fn selector(&self) -> [u8; 4] {
        let mut sel = [0u8; 4];
        if self.input.len() >= 4 {
            sel.copy_from_slice(&self.input[..4]);
        }
        sel
    }
}

/// In-memory chain. Balances are static unless a test edits them; approvals
/// take effect when their transaction confirms.
pub struct MockChain {
    pub fees: Mutex<Result<FeeData, String>>,
    pub native: Mutex<HashMap<Address, U256>>,
    pub tokens: Mutex<HashMap<(Address, Address), U256>>,
    pub allowances: Mutex<HashMap<(Address, Address, Address), U256>>,
    pub decimals: Mutex<HashMap<Address, u8>>,
    /// Output per unit of input along any path; `None` makes quotes revert.
    pub quote_ratio: Mutex<Option<u64>>,
    pub pairs: Mutex<HashMap<Address, Address>>,
    pub script: Mutex<VecDeque<SendScript>>,
    pub sent: Mutex<Vec<SentTx>>,
    pub events: Mutex<Vec<String>>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            fees: Mutex::new(Ok(FeeData {
                base_fee_per_gas: Some(GWEI),
                max_priority_fee_per_gas: Some(GWEI),
                gas_price: Some(2 * GWEI),
            })),
            native: Mutex::default(),
            tokens: Mutex::default(),
            allowances: Mutex::default(),
            decimals: Mutex::default(),
            quote_ratio: Mutex::new(Some(2)),
            pairs: Mutex::default(),
            script: Mutex::default(),
            sent: Mutex::default(),
            events: Mutex::default(),
        }
    }
}

impl MockChain {
    pub fn set_native(&self, owner: Address, amount: U256) {
        self.native.lock().unwrap().insert(owner, amount);
    }

    pub fn set_token(&self, token: Address, owner: Address, amount: U256) {
        self.tokens.lock().unwrap().insert((token, owner), amount);
    }

    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.allowances
            .lock()
            .unwrap()
            .insert((token, owner, spender), amount);
    }

    pub fn push_script(&self, steps: impl IntoIterator<Item = SendScript>) {
        self.script.lock().unwrap().extend(steps);
    }

    pub fn sent(&self) -> Vec<SentTx> {
        self.sent.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn log(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn chain_id(&self) -> Result<u64, AppError> {
        Ok(11155111)
    }

    async fn fee_data(&self) -> Result<FeeData, AppError> {
        self.fees
            .lock()
            .unwrap()
            .clone()
            .map_err(AppError::Connection)
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, AppError> {
        Ok(self
            .native
            .lock()
            .unwrap()
            .get(&owner)
            .copied()
            .unwrap_or_default())
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, AppError> {
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .get(&(token, owner))
            .copied()
            .unwrap_or_default())
    }

    async fn token_decimals(&self, token: Address) -> Result<u8, AppError> {
        Ok(self
            .decimals
            .lock()
            .unwrap()
            .get(&token)
            .copied()
            .unwrap_or(18))
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, AppError> {
        Ok(self
            .allowances
            .lock()
            .unwrap()
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default())
    }

    async fn amounts_out(
        &self,
        _router: Address,
        amount_in: U256,
        path: &[Address],
    ) -> Result<Vec<U256>, AppError> {
        self.log(format!("quote:{:#x}", path.first().copied().unwrap_or_default()));
        match *self.quote_ratio.lock().unwrap() {
            Some(ratio) => Ok(vec![amount_in, amount_in * U256::from(ratio)]
                .into_iter()
                .chain(std::iter::repeat_n(
                    amount_in * U256::from(ratio),
                    path.len().saturating_sub(2),
                ))
                .collect()),
            None => Err(AppError::Revert {
                hash: String::new(),
                reason: "UniswapV2Library: INSUFFICIENT_LIQUIDITY".into(),
            }),
        }
    }

    async fn pair_for(
        &self,
        _factory: Address,
        token_a: Address,
        _token_b: Address,
    ) -> Result<Address, AppError> {
        Ok(self
            .pairs
            .lock()
            .unwrap()
            .get(&token_a)
            .copied()
            .unwrap_or(Address::ZERO))
    }

    async fn wrapped_native(&self, _router: Address) -> Result<Address, AppError> {
        Ok(weth())
    }

    async fn send_transaction(
        &self,
        from: Address,
        tx: TransactionRequest,
    ) -> Result<PendingTx, AppError> {
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SendScript::Confirm);
        if let SendScript::Reject(msg) = step {
            return Err(AppError::Connection(msg));
        }

        let to = tx.to.and_then(|kind| kind.to().copied());
        let input = tx.input.input().cloned().unwrap_or_default();
        let sent = SentTx {
            from,
            to,
            value: tx.value.unwrap_or_default(),
            input: input.clone(),
            max_price: tx.max_fee_per_gas.or(tx.gas_price).unwrap_or_default(),
        };
        let nonce = {
            let mut log = self.sent.lock().unwrap();
            log.push(sent.clone());
            log.len()
        };
        self.log(format!("send:{}", hex::encode(sent.selector())));
        let hash = keccak256(nonce.to_be_bytes());

        let success = !matches!(step, SendScript::Revert);
        if success
            && let (Some(token), Ok(call)) = (to, IERC20::approveCall::abi_decode(&input))
        {
            self.set_allowance(token, from, call.spender, call.amount);
        }

        let receipt = TxReceiptSummary {
            hash,
            block_number: Some(nonce as u64),
            gas_used: 100_000,
            effective_gas_price: sent.max_price,
            success,
        };
        let confirmation: futures::future::BoxFuture<'static, Result<TxReceiptSummary, AppError>> =
            match step {
                SendScript::Hang => Box::pin(futures::future::pending()),
                _ => Box::pin(async move { Ok::<_, AppError>(receipt) }),
            };
        Ok(PendingTx::new(hash, confirmation))
    }
}

pub fn tracked_token(i: u8, min_units: u64) -> TrackedAsset {
    TrackedAsset {
        symbol: format!("T{i}"),
        kind: AssetKind::Erc20(token(i)),
        decimals: 18,
        min_balance: U256::from(min_units),
    }
}

pub fn registry(tokens: Vec<TrackedAsset>) -> AssetRegistry {
    let native = TrackedAsset {
        symbol: "ETH".into(),
        kind: AssetKind::Native,
        decimals: 18,
        min_balance: eth(50),
    };
    AssetRegistry::new(native, tokens)
}

pub fn policy() -> SubmissionPolicy {
    SubmissionPolicy {
        max_retries: 3,
        initial_backoff: Duration::from_secs(1),
        confirmation_timeout: Duration::from_secs(30),
    }
}

pub struct Harness {
    pub chain: Arc<MockChain>,
    pub ledger: Arc<ActivityLedger>,
    pub oracle: Arc<BalanceOracle>,
    pub executors: Arc<ActionExecutors>,
}

impl Harness {
    pub fn new(chain: MockChain, assets: AssetRegistry, recipients: Vec<Address>) -> Self {
        Self::with_calls(chain, assets, recipients, Vec::new())
    }

    pub fn with_calls(
        chain: MockChain,
        assets: AssetRegistry,
        recipients: Vec<Address>,
        custom_calls: Vec<NamedCall>,
    ) -> Self {
        let chain = Arc::new(chain);
        let rpc: Arc<dyn ChainRpc> = chain.clone();
        let ledger = Arc::new(ActivityLedger::new());
        let gas = Arc::new(GasOracle::new(rpc.clone(), 5.0, 1.0).unwrap());
        let submitter = Arc::new(TransactionSubmitter::new(gas, ledger.clone(), policy()));
        let oracle = Arc::new(BalanceOracle::new(rpc.clone(), Arc::new(assets)));
        let executors = Arc::new(ActionExecutors::new(
            rpc,
            oracle.clone(),
            submitter,
            ExecutorConfig {
                router: router(),
                factory: Some(factory()),
                wrapped_native: weth(),
                slippage_bps: 50,
                min_amount_bps: 100,
                max_amount_bps: 500,
                remove_liquidity_percent: 50,
                recipients,
            },
            custom_calls,
        ));
        Self {
            chain,
            ledger,
            oracle,
            executors,
        }
    }
}
