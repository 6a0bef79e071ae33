// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use alloy::transports::{RpcError, TransportErrorKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Connection failed to endpoint: {0}")]
    Connection(String),

    #[error("Malformed RPC response: {0}")]
    MalformedResponse(String),

    #[error("Transaction reverted: {hash}, reason: {reason}")]
    Revert { hash: String, reason: String },

    #[error("Confirmation timed out after {waited_ms}ms for {hash}")]
    ConfirmationTimeout { hash: String, waited_ms: u64 },

    #[error("Insufficient funds. Required: {required}, Available: {available}")]
    InsufficientFunds { required: String, available: String },

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Validation failed for field {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

/// Coarse failure classes used by both retry layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Precondition,
    RpcTransport,
    OnChainRevert,
    ConfirmationTimeout,
    Configuration,
    Other,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InsufficientFunds { .. } | AppError::Precondition(_) => {
                ErrorKind::Precondition
            }
            AppError::Connection(_) | AppError::MalformedResponse(_) => ErrorKind::RpcTransport,
            AppError::Revert { .. } => ErrorKind::OnChainRevert,
            AppError::ConfirmationTimeout { .. } => ErrorKind::ConfirmationTimeout,
            AppError::Config(_) | AppError::Validation { .. } => ErrorKind::Configuration,
            AppError::Initialization(_) | AppError::Persistence(_) | AppError::Unknown(_) => {
                ErrorKind::Other
            }
        }
    }

    /// Whether submitting a fresh transaction with a higher fee can plausibly fix this.
    pub fn retryable_by_gas(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::Precondition | ErrorKind::Configuration
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Persistence(err.to_string())
    }
}

/// Map an alloy transport error onto the agent's taxonomy.
///
/// Nodes report estimation-time reverts and balance shortfalls as plain JSON-RPC
/// error payloads, so the message text is the only signal available.
pub fn classify_rpc_error(context: &str, err: &RpcError<TransportErrorKind>) -> AppError {
    match err {
        RpcError::ErrorResp(payload) => {
            let message = payload.message.to_lowercase();
            if message.contains("insufficient funds") {
                AppError::InsufficientFunds {
                    required: "unknown".into(),
                    available: format!("{context}: {}", payload.message),
                }
            } else if message.contains("revert") {
                AppError::Revert {
                    hash: "<not mined>".into(),
                    reason: format!("{context}: {}", payload.message),
                }
            } else {
                AppError::Connection(format!("{context}: {}", payload.message))
            }
        }
        RpcError::DeserError { err, .. } => {
            AppError::MalformedResponse(format!("{context}: {err}"))
        }
        other => AppError::Connection(format!("{context}: {other}")),
    }
}
