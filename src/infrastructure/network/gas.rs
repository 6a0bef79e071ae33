// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::constants::GAS_BUFFER_SCALE;
use crate::domain::error::AppError;
use crate::domain::types::{FeeData, GasQuote};
use crate::network::rpc::ChainRpc;
use async_trait::async_trait;
use std::sync::Arc;

/// Source of attempt-indexed fee quotes.
#[async_trait]
pub trait FeeEstimator: Send + Sync {
    async fn estimate(&self, attempt_index: u32) -> Result<GasQuote, AppError>;
}

/// Buffered fee quotes that grow linearly with the attempt index.
///
/// The multiplier `base + attempt * step` is held in hundredths so fee math
/// stays in integers: `fee * scaled / 100`, truncating.
#[derive(Clone)]
pub struct GasOracle {
    rpc: Arc<dyn ChainRpc>,
    base_scaled: u128,
    step_scaled: u128,
}

impl GasOracle {
    pub fn new(rpc: Arc<dyn ChainRpc>, buffer_base: f64, buffer_step: f64) -> Result<Self, AppError> {
        Ok(Self {
            rpc,
            base_scaled: scale_multiplier("gas_buffer_base", buffer_base)?,
            step_scaled: scale_multiplier("gas_buffer_step", buffer_step)?,
        })
    }

    /// Multiplier for `attempt_index`, in hundredths.
    pub fn buffer_scaled(&self, attempt_index: u32) -> u128 {
        self.base_scaled
            .saturating_add(self.step_scaled.saturating_mul(u128::from(attempt_index)))
    }

    pub fn quote_from(&self, fees: &FeeData, attempt_index: u32) -> Result<GasQuote, AppError> {
        let scaled = self.buffer_scaled(attempt_index);
        if let (Some(base_fee), Some(tip)) = (fees.base_fee_per_gas, fees.max_priority_fee_per_gas)
        {
            let max_priority_fee_per_gas = apply_buffer(tip, scaled).max(1);
            let max_fee_per_gas = apply_buffer(base_fee, scaled)
                .saturating_add(max_priority_fee_per_gas)
                .max(1);
            return Ok(GasQuote::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            });
        }

        let gas_price = fees.gas_price.ok_or_else(|| {
            AppError::MalformedResponse("fee data carries neither EIP-1559 fields nor gasPrice".into())
        })?;
        Ok(GasQuote::Legacy {
            gas_price: apply_buffer(gas_price, scaled).max(1),
        })
    }
}

#[async_trait]
impl FeeEstimator for GasOracle {
    async fn estimate(&self, attempt_index: u32) -> Result<GasQuote, AppError> {
        let fees = self.rpc.fee_data().await?;
        let quote = self.quote_from(&fees, attempt_index)?;
        tracing::debug!(
            target: "gas",
            attempt = attempt_index,
            buffer_pct = self.buffer_scaled(attempt_index),
            %quote,
            "Fee quote"
        );
        Ok(quote)
    }
}

fn scale_multiplier(field: &str, value: f64) -> Result<u128, AppError> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::Validation {
            field: field.to_string(),
            message: format!("must be a finite non-negative multiplier, got {value}"),
        });
    }
    Ok((value * GAS_BUFFER_SCALE as f64).round() as u128)
}

fn apply_buffer(fee: u128, scaled: u128) -> u128 {
    fee.saturating_mul(scaled) / GAS_BUFFER_SCALE
}
