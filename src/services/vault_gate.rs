// src/services/vault_gate.rs
//! Credential-gated vault deposits.

use crate::blockchain::chain_coordinator::{ChainCoordinator, WalletNetwork};
use crate::blockchain::network::TargetNetwork;
use crate::contracts::vault::VaultContract;
use crate::error::{TransactionError, WorkflowError};
use ethers::utils::parse_ether;
use ethers_core::types::{Address, H256, U256};
use log::info;
use std::sync::Arc;

const CREDENTIAL_REQUIRED: &str =
    "You need a valid KYC NFT to deposit. Please verify your identity first in the Tier 1 KYC Dashboard.";

pub struct VaultGate {
    vault: Arc<dyn VaultContract>,
    wallet: Arc<dyn WalletNetwork>,
    coordinator: ChainCoordinator,
    target: TargetNetwork,
}

impl VaultGate {
    pub fn new(
        vault: Arc<dyn VaultContract>,
        wallet: Arc<dyn WalletNetwork>,
        coordinator: ChainCoordinator,
        target: TargetNetwork,
    ) -> Self {
        Self {
            vault,
            wallet,
            coordinator,
            target,
        }
    }

    pub fn target(&self) -> &TargetNetwork {
        &self.target
    }

    /// Deposits `amount` (decimal ether) from the connected account.
    ///
    /// Eligibility is read first; without a valid credential nothing is
    /// written and the chain is not switched.
    pub async fn deposit(&self, amount: &str) -> Result<H256, WorkflowError> {
        let account = self.wallet.account().ok_or(WorkflowError::WalletNotConnected)?;
        let value = parse_amount(amount)?;

        if !self.vault.has_valid_credential(account).await? {
            return Err(TransactionError::CredentialMissing(CREDENTIAL_REQUIRED.to_string()).into());
        }

        self.coordinator.ensure_chain(&self.target).await?;
        let tx_hash = self
            .vault
            .deposit(value)
            .await
            .map_err(TransactionError::from)?;
        self.wallet
            .wait_for_confirmation(tx_hash)
            .await
            .map_err(TransactionError::from)?;

        info!("deposit of {} from {:?} confirmed: {}", amount, account, self.target.tx_url(tx_hash));
        Ok(tx_hash)
    }

    pub async fn deposited(&self, account: Address) -> Result<U256, WorkflowError> {
        Ok(self.vault.deposited(account).await?)
    }
}

fn parse_amount(amount: &str) -> Result<U256, WorkflowError> {
    let value = parse_ether(amount.trim()).map_err(|_| WorkflowError::InvalidAmount(amount.to_string()))?;
    if value.is_zero() {
        return Err(WorkflowError::InvalidAmount(amount.to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::testing::{test_account, MockVault, MockWallet, DEPOSIT_TX};
    use std::time::Duration;

    fn gate(vault: Arc<MockVault>, wallet: Arc<MockWallet>) -> VaultGate {
        VaultGate::new(
            vault,
            wallet.clone(),
            ChainCoordinator::new(wallet, Duration::from_millis(1)),
            TargetNetwork::rayls_devnet(),
        )
    }

    #[tokio::test]
    async fn test_deposit_without_credential_never_writes() {
        let vault = Arc::new(MockVault::new(false));
        let wallet = Arc::new(MockWallet::on_chain(1));
        let err = gate(vault.clone(), wallet.clone()).deposit("0.01").await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::NeedsCredential);
        assert!(vault.deposits().is_empty());
        assert_eq!(wallet.switch_requests(), 0);
    }

    #[tokio::test]
    async fn test_deposit_with_credential() {
        let vault = Arc::new(MockVault::new(true));
        let wallet = Arc::new(MockWallet::on_chain(1));
        let gate = gate(vault.clone(), wallet.clone());

        assert_eq!(gate.deposit("0.01").await.unwrap(), DEPOSIT_TX);
        assert_eq!(wallet.switch_requests(), 1);
        assert_eq!(vault.deposits(), vec![U256::exp10(16)]);
        assert_eq!(gate.deposited(test_account()).await.unwrap(), U256::exp10(16));
    }

    #[tokio::test]
    async fn test_insufficient_funds_is_classified() {
        let vault = Arc::new(MockVault::failing_deposit("insufficient funds for gas * price + value"));
        let wallet = Arc::new(MockWallet::on_chain(123123));
        let err = gate(vault, wallet).deposit("5").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::NeedsFunds);
    }

    #[tokio::test]
    async fn test_invalid_amounts() {
        let gate = gate(Arc::new(MockVault::new(true)), Arc::new(MockWallet::on_chain(123123)));
        for amount in ["", "abc", "0"] {
            assert!(matches!(
                gate.deposit(amount).await,
                Err(WorkflowError::InvalidAmount(_))
            ));
        }
    }
}
