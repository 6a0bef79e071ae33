// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::error::AppError;
use alloy::primitives::{Address, TxHash};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw fee readings from the node. Any field may be missing on chains that
/// do not expose it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeData {
    pub base_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub gas_price: Option<u128>,
}

/// Fee offer attached to exactly one submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasQuote {
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
    Legacy {
        gas_price: u128,
    },
}

impl GasQuote {
    pub fn apply(&self, tx: &mut TransactionRequest) {
        match *self {
            GasQuote::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                tx.max_fee_per_gas = Some(max_fee_per_gas);
                tx.max_priority_fee_per_gas = Some(max_priority_fee_per_gas);
                tx.gas_price = None;
            }
            GasQuote::Legacy { gas_price } => {
                tx.gas_price = Some(gas_price);
                tx.max_fee_per_gas = None;
                tx.max_priority_fee_per_gas = None;
            }
        }
    }

    /// Highest per-gas price this quote may pay; used for balance pre-checks.
    pub fn max_price_per_gas(&self) -> u128 {
        match *self {
            GasQuote::Eip1559 {
                max_fee_per_gas, ..
            } => max_fee_per_gas,
            GasQuote::Legacy { gas_price } => gas_price,
        }
    }
}

impl fmt::Display for GasQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GasQuote::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => write!(
                f,
                "eip1559(max_fee={max_fee_per_gas}, priority={max_priority_fee_per_gas})"
            ),
            GasQuote::Legacy { gas_price } => write!(f, "legacy(gas_price={gas_price})"),
        }
    }
}

/// The parts of a receipt the agent acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceiptSummary {
    pub hash: TxHash,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    pub success: bool,
}

/// A transaction the node accepted. Dropping it abandons the confirmation
/// wait; it cannot retract the transaction.
pub struct PendingTx {
    hash: TxHash,
    confirmation: BoxFuture<'static, Result<TxReceiptSummary, AppError>>,
}

impl PendingTx {
    pub fn new(
        hash: TxHash,
        confirmation: BoxFuture<'static, Result<TxReceiptSummary, AppError>>,
    ) -> Self {
        Self { hash, confirmation }
    }

    pub fn hash(&self) -> TxHash {
        self.hash
    }

    pub async fn confirmed(self) -> Result<TxReceiptSummary, AppError> {
        self.confirmation.await
    }
}

impl fmt::Debug for PendingTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTx").field("hash", &self.hash).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Pending,
    Confirmed(TxReceiptSummary),
    RevertedOnChain,
    TimedOut,
    RpcError(String),
    /// The action declined before anything was broadcast.
    Refused(String),
}

/// One iteration of the submission loop.
#[derive(Debug, Clone)]
pub struct SubmissionAttempt {
    pub attempt_index: u32,
    pub gas_quote: Option<GasQuote>,
    pub tx_hash: Option<TxHash>,
    pub outcome: AttemptOutcome,
}

impl SubmissionAttempt {
    pub fn new(attempt_index: u32) -> Self {
        Self {
            attempt_index,
            gas_quote: None,
            tx_hash: None,
            outcome: AttemptOutcome::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Swap,
    Send,
    AddLiquidity,
    RemoveLiquidity,
    CustomCall,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::Swap,
        ActionKind::Send,
        ActionKind::AddLiquidity,
        ActionKind::RemoveLiquidity,
        ActionKind::CustomCall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Swap => "swap",
            ActionKind::Send => "send",
            ActionKind::AddLiquidity => "add_liquidity",
            ActionKind::RemoveLiquidity => "remove_liquidity",
            ActionKind::CustomCall => "custom_call",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured key. Lives for the whole run.
#[derive(Clone)]
pub struct WalletHandle {
    pub index: usize,
    pub address: Address,
    pub signer: PrivateKeySigner,
}

impl WalletHandle {
    pub fn new(index: usize, signer: PrivateKeySigner) -> Self {
        Self {
            index,
            address: signer.address(),
            signer,
        }
    }
}

impl fmt::Debug for WalletHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletHandle")
            .field("index", &self.index)
            .field("address", &self.address)
            .finish()
    }
}
