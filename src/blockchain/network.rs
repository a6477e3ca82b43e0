// src/blockchain/network.rs
//! Target network parameters enforced before every write.

use ethers_core::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

/// The single EVM network credentials are minted on.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TargetNetwork {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    pub explorer_url: String,
    pub currency_symbol: String,
}

impl TargetNetwork {
    /// Rayls Devnet, the default deployment target.
    pub fn rayls_devnet() -> Self {
        Self {
            chain_id: 123123,
            name: "Rayls Devnet".to_string(),
            rpc_url: "https://devnet-rpc.rayls.com".to_string(),
            explorer_url: "https://devnet-explorer.rayls.com".to_string(),
            currency_symbol: "USDgas".to_string(),
        }
    }

    /// Chain id as the `0x`-prefixed quantity wallets expect.
    pub fn chain_id_hex(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }

    /// Explorer page for one credential token.
    pub fn token_url(&self, contract: Address, token_id: U256) -> String {
        format!(
            "{}/token/{:#x}/instance/{}",
            self.explorer_url.trim_end_matches('/'),
            contract,
            token_id
        )
    }

    /// Explorer page for a transaction.
    pub fn tx_url(&self, tx_hash: H256) -> String {
        format!("{}/tx/{:#x}", self.explorer_url.trim_end_matches('/'), tx_hash)
    }
}
