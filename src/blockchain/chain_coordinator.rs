// src/blockchain/chain_coordinator.rs
//! Keeps the wallet on the target chain before any write goes out.

use crate::blockchain::network::TargetNetwork;
use crate::error::{ChainSwitchError, ContractError};
use async_trait::async_trait;
use ethers_core::types::{Address, H256};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Switch requests issued after the first one when the wallet has not settled.
const MAX_SWITCH_RETRIES: usize = 1;

/// A mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub transaction_hash: H256,
    pub block_number: Option<u64>,
}

/// The connected wallet, as far as network selection and receipts go.
#[async_trait]
pub trait WalletNetwork: Send + Sync {
    /// Connected account, `None` when no wallet is connected.
    fn account(&self) -> Option<Address>;

    async fn chain_id(&self) -> Result<u64, ChainSwitchError>;

    /// Asks the wallet to move to `target`.
    async fn switch_chain(&self, target: &TargetNetwork) -> Result<(), ChainSwitchError>;

    /// Resolves once the transaction is mined. A reverted transaction is an error.
    async fn wait_for_confirmation(&self, tx_hash: H256) -> Result<Confirmation, ContractError>;
}

/// Ensures the wallet is on the target chain, switching when needed.
#[derive(Clone)]
pub struct ChainCoordinator {
    wallet: Arc<dyn WalletNetwork>,
    settle_delay: Duration,
}

impl ChainCoordinator {
    pub fn new(wallet: Arc<dyn WalletNetwork>, settle_delay: Duration) -> Self {
        Self {
            wallet,
            settle_delay,
        }
    }

    /// Makes sure the active chain is `target`.
    ///
    /// When it is not, a switch is requested and the wallet is given
    /// `settle_delay` to report the new chain. A wallet that accepted the
    /// switch but still reports the old chain gets exactly one more request.
    ///
    /// # Errors
    /// - [`ChainSwitchError::Rejected`] as soon as a switch request fails;
    ///   callers must not write after this
    /// - [`ChainSwitchError::Mismatch`] when the wallet never settles
    pub async fn ensure_chain(&self, target: &TargetNetwork) -> Result<(), ChainSwitchError> {
        let current = self.wallet.chain_id().await?;
        if current == target.chain_id {
            debug!("wallet already on chain {}", target.chain_id);
            return Ok(());
        }

        info!(
            "wallet on chain {}, switching to {} ({})",
            current, target.chain_id, target.name
        );
        let mut observed = current;
        for attempt in 0..=MAX_SWITCH_RETRIES {
            self.wallet.switch_chain(target).await?;
            tokio::time::sleep(self.settle_delay).await;

            observed = self.wallet.chain_id().await?;
            if observed == target.chain_id {
                info!("switched to chain {}", target.chain_id);
                return Ok(());
            }
            warn!(
                "wallet still reports chain {} after switch attempt {}",
                observed,
                attempt + 1
            );
        }

        Err(ChainSwitchError::Mismatch {
            target: target.chain_id,
            actual: observed,
        })
    }
}
