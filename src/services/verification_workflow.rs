// src/services/verification_workflow.rs
//! Verification workflow.
//!
//! Drives one verification attempt from collection selection to a confirmed
//! mint:
//!
//! 1. `start` checks the wallet, opens a provider session
//! 2. `receive_proof` normalizes the raw proof and maps the platform
//! 3. the chain is enforced, the mint is submitted and confirmed
//! 4. holdings are reconciled from chain reads
//!
//! Every failure lands the session in `Failed` with its cause recorded.
//! Only one session is live at a time; a second start is rejected.
//!
//! Each change is also published as a [`WorkflowSnapshot`], so readers can
//! follow a mint in flight without waiting on the workflow itself.

use crate::blockchain::chain_coordinator::{ChainCoordinator, WalletNetwork};
use crate::blockchain::network::TargetNetwork;
use crate::contracts::credential_nft::{mint_arguments, CredentialContract};
use crate::error::{ProofError, ProviderError, TransactionError, WorkflowError};
use crate::models::collection::{tier1_collections, Registry, VerificationCollection};
use crate::models::session::{VerificationSession, WorkflowState};
use crate::services::credential_reconciler::{CredentialReconciler, CredentialView, Reconciliation};
use crate::services::provider_session::{ProofProvider, SessionDescriptor};
use crate::zkp::normalize;
use ethers_core::types::{Address, H256, U256};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

/// Result of a confirmed mint.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MintOutcome {
    pub collection_id: String,
    pub platform: String,
    pub transaction_hash: H256,
    pub block_number: Option<u64>,
    /// Token id once reconciliation could classify it.
    pub token_id: Option<U256>,
}

/// State, session and holdings as of the last change.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSnapshot {
    pub state: WorkflowState,
    pub session: Option<VerificationSession>,
    pub holdings: CredentialView,
}

impl WorkflowSnapshot {
    /// Collection of the session currently in flight, if any.
    pub fn active_collection(&self) -> Option<&str> {
        if !self.state.is_active() {
            return None;
        }
        self.session.as_ref().map(|s| s.collection_id.as_str())
    }
}

pub struct VerificationWorkflow {
    provider: Arc<dyn ProofProvider>,
    wallet: Arc<dyn WalletNetwork>,
    contract: Arc<dyn CredentialContract>,
    coordinator: ChainCoordinator,
    target: TargetNetwork,
    reconciler: CredentialReconciler<VerificationCollection>,
    state: WorkflowState,
    session: Option<VerificationSession>,
    descriptor: Option<SessionDescriptor>,
    holdings: CredentialView,
    holdings_account: Option<Address>,
    status: watch::Sender<WorkflowSnapshot>,
}

impl VerificationWorkflow {
    pub fn new(
        provider: Arc<dyn ProofProvider>,
        wallet: Arc<dyn WalletNetwork>,
        contract: Arc<dyn CredentialContract>,
        coordinator: ChainCoordinator,
        target: TargetNetwork,
    ) -> Self {
        let (status, _) = watch::channel(WorkflowSnapshot {
            state: WorkflowState::Idle,
            session: None,
            holdings: CredentialView::new(),
        });
        Self {
            provider,
            wallet,
            contract,
            coordinator,
            target,
            reconciler: CredentialReconciler::new(tier1_collections()),
            state: WorkflowState::Idle,
            session: None,
            descriptor: None,
            holdings: CredentialView::new(),
            holdings_account: None,
            status,
        }
    }

    /// Receiver that sees every published [`WorkflowSnapshot`].
    pub fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.status.subscribe()
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn session(&self) -> Option<&VerificationSession> {
        self.session.as_ref()
    }

    pub fn descriptor(&self) -> Option<&SessionDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn holdings(&self) -> &CredentialView {
        &self.holdings
    }

    pub fn registry(&self) -> &Registry<VerificationCollection> {
        self.reconciler.registry()
    }

    pub fn target(&self) -> &TargetNetwork {
        &self.target
    }

    /// `Idle → Verifying → WaitingForMobileProof` for `collection_id`.
    ///
    /// A missing wallet fails immediately and leaves the state untouched, as
    /// does an in-flight session or an unknown collection.
    pub async fn start(&mut self, collection_id: &str) -> Result<SessionDescriptor, WorkflowError> {
        let account = self.wallet.account().ok_or(WorkflowError::WalletNotConnected)?;
        if self.state.is_active() {
            let active = self
                .session
                .as_ref()
                .map(|s| s.collection_id.clone())
                .unwrap_or_default();
            return Err(WorkflowError::SessionActive { collection_id: active });
        }
        let collection = self
            .registry()
            .get(collection_id)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownCollection(collection_id.to_string()))?;

        self.sync_account(account);
        if self.state.is_terminal() {
            self.transition(WorkflowState::Idle, "reset")?;
        }
        self.session = Some(VerificationSession::new(&collection.id));
        self.descriptor = None;
        self.transition(WorkflowState::Verifying, "start")?;

        match self.provider.start_session(&collection.verification_method).await {
            Ok(descriptor) => {
                self.descriptor = Some(descriptor.clone());
                self.transition(WorkflowState::WaitingForMobileProof, "session_started")?;
                Ok(descriptor)
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Handles a proof from the provider and runs it through to `Minted`.
    ///
    /// Normalization and platform mapping happen before the chain is touched;
    /// a bad proof never triggers a chain switch or a write.
    pub async fn receive_proof(&mut self, raw: Value) -> Result<MintOutcome, WorkflowError> {
        if self.state != WorkflowState::WaitingForMobileProof {
            return Err(WorkflowError::InvalidTransition {
                from: self.state,
                trigger: "proof_received",
            });
        }
        let (account, collection) = match self.current_target() {
            Ok(found) => found,
            Err(e) => return Err(self.fail(e)),
        };

        if let Some(session) = self.session.as_mut() {
            session.last_proof = Some(raw.clone());
        }
        self.transition(WorkflowState::ProofReceived, "proof_received")?;

        let platform = collection.platform();
        let proof = match normalize(&raw).and_then(|proof| {
            mint_arguments(&proof, &platform, account)
                .map(|_| proof)
                .map_err(|e| ProofError::malformed(e.to_string()))
        }) {
            Ok(proof) => proof,
            Err(e) => return Err(self.fail(e.into())),
        };
        debug!(
            "proof for `{}` normalized, identifier {:#x}",
            collection.id, proof.signed_claim.claim.identifier
        );

        self.transition(WorkflowState::EnsuringChain, "proof_normalized")?;
        if let Err(e) = self.coordinator.ensure_chain(&self.target).await {
            return Err(self.fail(e.into()));
        }

        self.transition(WorkflowState::SubmittingTransaction, "chain_ready")?;
        let tx_hash = match self.contract.mint_with_proof(&proof, &platform, account).await {
            Ok(hash) => hash,
            Err(e) => return Err(self.fail(TransactionError::from(e).into())),
        };
        if let Some(session) = self.session.as_mut() {
            session.transaction_hash = Some(tx_hash);
        }

        self.transition(WorkflowState::WaitingForConfirmation, "transaction_submitted")?;
        let confirmation = match self.wallet.wait_for_confirmation(tx_hash).await {
            Ok(confirmation) => confirmation,
            Err(e) => return Err(self.fail(TransactionError::from(e).into())),
        };

        self.transition(WorkflowState::Minted, "confirmed")?;
        self.descriptor = None;
        info!("{} minted for `{}`: {}", platform, collection.id, self.target.tx_url(tx_hash));

        if let Err(e) = self.refresh_holdings().await {
            warn!("holdings refresh after mint failed: {}", e);
        }
        Ok(MintOutcome {
            token_id: self.holdings.get(&collection.id),
            collection_id: collection.id,
            platform,
            transaction_hash: tx_hash,
            block_number: confirmation.block_number,
        })
    }

    /// Records a failure reported by the provider channel.
    pub fn provider_failed(&mut self, reason: &str) -> Result<(), WorkflowError> {
        if !self.state.is_active() {
            return Err(WorkflowError::NoActiveSession);
        }
        self.fail(ProviderError::Session(reason.to_string()).into());
        Ok(())
    }

    /// Aborts the provider session and returns to `Idle`.
    ///
    /// Only possible before a proof was received.
    pub async fn cancel(&mut self) -> Result<(), WorkflowError> {
        if !self.state.is_active() {
            return Err(WorkflowError::NoActiveSession);
        }
        if !self.state.can_cancel() {
            return Err(WorkflowError::InvalidTransition {
                from: self.state,
                trigger: "cancel",
            });
        }

        self.transition(WorkflowState::Cancelled, "cancel")?;
        if let Some(descriptor) = self.descriptor.take() {
            self.provider.cancel_session(&descriptor).await;
        }
        self.transition(WorkflowState::Idle, "reset")?;
        self.session = None;
        self.publish();
        Ok(())
    }

    /// Re-reads the wallet's credential and folds it into the holdings view.
    pub async fn refresh_holdings(&mut self) -> Result<Reconciliation, WorkflowError> {
        let account = self.wallet.account().ok_or(WorkflowError::WalletNotConnected)?;
        self.sync_account(account);

        let snapshot = self
            .reconciler
            .read_snapshot(self.contract.as_ref(), account)
            .await?;
        let reconciliation = self.reconciler.reconcile(&snapshot);
        if self.holdings.apply(&reconciliation) {
            info!("holdings for {:?} updated: {:?}", account, reconciliation);
            self.publish();
        } else {
            debug!("holdings for {:?} unchanged: {:?}", account, reconciliation);
        }
        Ok(reconciliation)
    }

    fn current_target(&self) -> Result<(Address, VerificationCollection), WorkflowError> {
        let account = self.wallet.account().ok_or(WorkflowError::WalletNotConnected)?;
        let collection_id = self
            .session
            .as_ref()
            .map(|s| s.collection_id.as_str())
            .ok_or(WorkflowError::NoActiveSession)?;
        let collection = self
            .registry()
            .get(collection_id)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownCollection(collection_id.to_string()))?;
        Ok((account, collection))
    }

    fn sync_account(&mut self, account: Address) {
        if self.holdings_account != Some(account) {
            if self.holdings_account.is_some() {
                info!("account changed to {:?}, clearing holdings", account);
            }
            self.holdings.reset();
            self.holdings_account = Some(account);
            self.publish();
        }
    }

    fn publish(&self) {
        self.status.send_replace(WorkflowSnapshot {
            state: self.state,
            session: self.session.clone(),
            holdings: self.holdings.clone(),
        });
    }

    fn transition(&mut self, to: WorkflowState, trigger: &'static str) -> Result<(), WorkflowError> {
        if !self.state.can_transition_to(to) {
            return Err(WorkflowError::InvalidTransition {
                from: self.state,
                trigger,
            });
        }
        let collection = self
            .session
            .as_ref()
            .map(|s| s.collection_id.as_str())
            .unwrap_or("-");
        info!("verification `{}`: {} -> {} ({})", collection, self.state, to, trigger);
        if let Some(session) = self.session.as_mut() {
            session.record(to, trigger);
        }
        self.state = to;
        self.publish();
        Ok(())
    }

    /// Moves an active session to `Failed`, recording `err` as its cause.
    fn fail(&mut self, err: WorkflowError) -> WorkflowError {
        warn!("verification failed in {}: {}", self.state, err);
        if self.state.is_active() {
            if let Some(session) = self.session.as_mut() {
                session.last_error = Some(err.user_message());
            }
            if let Err(e) = self.transition(WorkflowState::Failed, "failure") {
                warn!("{}", e);
            }
        }
        self.descriptor = None;
        err
    }
}
