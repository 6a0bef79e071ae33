// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::error::AppError;
use alloy::network::{Ethereum, EthereumWallet};
use alloy::providers::RootProvider;
use alloy::signers::local::PrivateKeySigner;
use url::Url;

pub type HttpProvider = RootProvider<Ethereum>;

pub struct ConnectionFactory;

impl ConnectionFactory {
    /// Bare provider with no fillers. Nonce, gas limit and chain id are filled
    /// per send from fresh reads, never from a local cache.
    pub fn http(rpc_url: &str) -> Result<HttpProvider, AppError> {
        let url = Self::parse(rpc_url)?;
        Ok(RootProvider::new_http(url))
    }

    pub fn wallet(signer: PrivateKeySigner) -> EthereumWallet {
        EthereumWallet::from(signer)
    }

    fn parse(rpc_url: &str) -> Result<Url, AppError> {
        Url::parse(rpc_url).map_err(|e| AppError::Config(format!("Invalid RPC URL: {}", e)))
    }
}
