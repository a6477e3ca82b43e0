// src/contracts/vault.rs
//! KYC-gated vault contract interface.

use crate::error::ContractError;
use async_trait::async_trait;
use ethers_core::types::{Address, H256, U256};

/// ABI of the KYC-gated vault.
pub const KYC_VAULT_ABI: &[u8] = include_bytes!("abi/KYCVault.json");

#[async_trait]
pub trait VaultContract: Send + Sync {
    /// `hasValidKYCNFT(account)`: whether the account may deposit.
    async fn has_valid_credential(&self, account: Address) -> Result<bool, ContractError>;

    /// `deposits(account)`: amount currently deposited, in wei.
    async fn deposited(&self, account: Address) -> Result<U256, ContractError>;

    /// Payable `deposit()` carrying `value` wei.
    async fn deposit(&self, value: U256) -> Result<H256, ContractError>;
}
