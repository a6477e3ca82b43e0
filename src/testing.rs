// src/testing.rs
//! In-memory doubles for the chain, wallet and provider seams.

use crate::blockchain::chain_coordinator::{Confirmation, WalletNetwork};
use crate::blockchain::network::TargetNetwork;
use crate::contracts::credential_nft::{mint_arguments, CredentialAttributes, CredentialContract};
use crate::contracts::vault::VaultContract;
use crate::error::{ChainSwitchError, ContractError, ProviderError};
use crate::models::proof::ContractProof;
use crate::services::provider_session::{ProofProvider, ProviderSessionFactory, SessionDescriptor};
use async_trait::async_trait;
use ethers_core::types::{Address, H256, U256};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const MINT_TX: H256 = H256::repeat_byte(0x11);
pub const DEPOSIT_TX: H256 = H256::repeat_byte(0x22);

pub fn test_account() -> Address {
    Address::repeat_byte(0xaa)
}

#[derive(Debug, Clone)]
pub enum SwitchBehavior {
    Succeed,
    Reject(String),
    /// Accepts the request but stays on the current chain.
    Ignore,
}

pub struct MockWallet {
    account: Option<Address>,
    chain: AtomicU64,
    switch: SwitchBehavior,
    switch_requests: AtomicUsize,
    confirmation_error: Mutex<Option<ContractError>>,
    confirmation_delay: Option<Duration>,
}

impl MockWallet {
    pub fn on_chain(chain_id: u64) -> Self {
        Self {
            account: Some(test_account()),
            chain: AtomicU64::new(chain_id),
            switch: SwitchBehavior::Succeed,
            switch_requests: AtomicUsize::new(0),
            confirmation_error: Mutex::new(None),
            confirmation_delay: None,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            account: None,
            ..Self::on_chain(123123)
        }
    }

    pub fn with_switch(mut self, behavior: SwitchBehavior) -> Self {
        self.switch = behavior;
        self
    }

    /// Confirmations arrive only after `delay`.
    pub fn with_confirmation_delay(mut self, delay: Duration) -> Self {
        self.confirmation_delay = Some(delay);
        self
    }

    pub fn fail_confirmation(&self, err: ContractError) {
        *self.confirmation_error.lock().unwrap() = Some(err);
    }

    pub fn switch_requests(&self) -> usize {
        self.switch_requests.load(Ordering::SeqCst)
    }

    pub fn current_chain(&self) -> u64 {
        self.chain.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletNetwork for MockWallet {
    fn account(&self) -> Option<Address> {
        self.account
    }

    async fn chain_id(&self) -> Result<u64, ChainSwitchError> {
        Ok(self.current_chain())
    }

    async fn switch_chain(&self, target: &TargetNetwork) -> Result<(), ChainSwitchError> {
        self.switch_requests.fetch_add(1, Ordering::SeqCst);
        match &self.switch {
            SwitchBehavior::Succeed => {
                self.chain.store(target.chain_id, Ordering::SeqCst);
                Ok(())
            }
            SwitchBehavior::Reject(reason) => Err(ChainSwitchError::Rejected {
                target: target.chain_id,
                reason: reason.clone(),
            }),
            SwitchBehavior::Ignore => Ok(()),
        }
    }

    async fn wait_for_confirmation(&self, tx_hash: H256) -> Result<Confirmation, ContractError> {
        if let Some(delay) = self.confirmation_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.confirmation_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(Confirmation {
            transaction_hash: tx_hash,
            block_number: Some(1),
        })
    }
}

#[derive(Default)]
struct ContractState {
    has_credential: bool,
    token_id: U256,
    platform: String,
    fail_attributes: bool,
    mint_error: Option<String>,
    mints: Vec<(String, Address)>,
}

pub struct MockContract {
    state: Mutex<ContractState>,
}

impl MockContract {
    pub fn empty() -> Self {
        Self {
            state: Mutex::new(ContractState::default()),
        }
    }

    pub fn holding(token_id: U256, platform: &str) -> Self {
        Self {
            state: Mutex::new(ContractState {
                has_credential: true,
                token_id,
                platform: platform.to_string(),
                ..ContractState::default()
            }),
        }
    }

    pub fn fail_attribute_reads(&self) {
        self.state.lock().unwrap().fail_attributes = true;
    }

    pub fn fail_mint(&self, message: &str) {
        self.state.lock().unwrap().mint_error = Some(message.to_string());
    }

    /// `(platform, recipient)` of every accepted mint.
    pub fn mints(&self) -> Vec<(String, Address)> {
        self.state.lock().unwrap().mints.clone()
    }
}

#[async_trait]
impl CredentialContract for MockContract {
    async fn has_credential(&self, _account: Address) -> Result<bool, ContractError> {
        Ok(self.state.lock().unwrap().has_credential)
    }

    async fn token_id_of(&self, _account: Address) -> Result<U256, ContractError> {
        Ok(self.state.lock().unwrap().token_id)
    }

    async fn credential_attributes(&self, token_id: U256) -> Result<CredentialAttributes, ContractError> {
        let state = self.state.lock().unwrap();
        if state.fail_attributes {
            return Err(ContractError::Provider("attributes unavailable".into()));
        }
        Ok(CredentialAttributes {
            first_name: "Test".into(),
            last_name: "Holder".into(),
            kyc_status: "verified".into(),
            platform: state.platform.clone(),
            verified_address: test_account(),
            minted_at: token_id,
        })
    }

    async fn mint_with_proof(
        &self,
        proof: &ContractProof,
        platform: &str,
        recipient: Address,
    ) -> Result<H256, ContractError> {
        mint_arguments(proof, platform, recipient)?;
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.mint_error {
            return Err(ContractError::Call {
                method: "mintWithProof".into(),
                message: message.clone(),
            });
        }
        state.has_credential = true;
        state.token_id = U256::from(state.mints.len() + 1);
        state.platform = platform.to_string();
        state.mints.push((platform.to_string(), recipient));
        Ok(MINT_TX)
    }
}

pub struct MockVault {
    eligible: bool,
    deposit_error: Option<String>,
    deposits: Mutex<Vec<U256>>,
}

impl MockVault {
    pub fn new(eligible: bool) -> Self {
        Self {
            eligible,
            deposit_error: None,
            deposits: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_deposit(message: &str) -> Self {
        Self {
            deposit_error: Some(message.to_string()),
            ..Self::new(true)
        }
    }

    pub fn deposits(&self) -> Vec<U256> {
        self.deposits.lock().unwrap().clone()
    }
}

#[async_trait]
impl VaultContract for MockVault {
    async fn has_valid_credential(&self, _account: Address) -> Result<bool, ContractError> {
        Ok(self.eligible)
    }

    async fn deposited(&self, _account: Address) -> Result<U256, ContractError> {
        Ok(self
            .deposits
            .lock()
            .unwrap()
            .iter()
            .fold(U256::zero(), |acc, value| acc + *value))
    }

    async fn deposit(&self, value: U256) -> Result<H256, ContractError> {
        if let Some(message) = &self.deposit_error {
            return Err(ContractError::Call {
                method: "deposit".into(),
                message: message.clone(),
            });
        }
        self.deposits.lock().unwrap().push(value);
        Ok(DEPOSIT_TX)
    }
}

pub struct MockProvider {
    sessions: ProviderSessionFactory,
    start_error: Option<String>,
    started: AtomicUsize,
    cancelled: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            sessions: ProviderSessionFactory::new("test-app"),
            start_error: None,
            started: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            start_error: Some(message.to_string()),
            ..Self::new()
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProofProvider for MockProvider {
    async fn start_session(&self, method: &str) -> Result<SessionDescriptor, ProviderError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.start_error {
            return Err(ProviderError::Session(message.clone()));
        }
        self.sessions.describe(method)
    }

    async fn cancel_session(&self, _descriptor: &SessionDescriptor) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
    }
}
