// src/models/session.rs
//! Verification session state.
//!
//! ```text
//! Idle ─▶ Verifying ─▶ WaitingForMobileProof ─▶ ProofReceived ─▶ EnsuringChain
//!             │                 │                                     │
//!             └──▶ Cancelled ◀──┘                                     ▼
//!                                  Minted ◀─ WaitingForConfirmation ◀─ SubmittingTransaction
//! ```
//!
//! `Failed` is reachable from every active state. `Minted`, `Failed` and
//! `Cancelled` are terminal for the session and only lead back to `Idle`.

use chrono::{DateTime, Utc};
use ethers_core::types::H256;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowState {
    Idle,
    Verifying,
    WaitingForMobileProof,
    ProofReceived,
    EnsuringChain,
    SubmittingTransaction,
    WaitingForConfirmation,
    Minted,
    Failed,
    Cancelled,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Minted | Self::Failed | Self::Cancelled)
    }

    /// A session is in flight and blocks new starts.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle) && !self.is_terminal()
    }

    /// Cancellation is only cooperative before anything was submitted.
    pub fn can_cancel(&self) -> bool {
        matches!(self, Self::Verifying | Self::WaitingForMobileProof)
    }

    pub fn can_transition_to(&self, to: WorkflowState) -> bool {
        use WorkflowState::*;
        match (self, to) {
            (Idle, Verifying)
            | (Verifying, WaitingForMobileProof)
            | (WaitingForMobileProof, ProofReceived)
            | (ProofReceived, EnsuringChain)
            | (EnsuringChain, SubmittingTransaction)
            | (SubmittingTransaction, WaitingForConfirmation)
            | (WaitingForConfirmation, Minted) => true,
            (from, Failed) => from.is_active(),
            (from, Cancelled) => from.can_cancel(),
            (from, Idle) => from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Verifying => "VERIFYING",
            Self::WaitingForMobileProof => "WAITING_FOR_MOBILE_PROOF",
            Self::ProofReceived => "PROOF_RECEIVED",
            Self::EnsuringChain => "ENSURING_CHAIN",
            Self::SubmittingTransaction => "SUBMITTING_TRANSACTION",
            Self::WaitingForConfirmation => "WAITING_FOR_CONFIRMATION",
            Self::Minted => "MINTED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// One recorded state change.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TransitionRecord {
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub trigger: String,
    pub at: DateTime<Utc>,
}

/// Per-attempt state for one collection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSession {
    pub collection_id: String,
    pub status: WorkflowState,
    /// Most recent raw proof; a later proof replaces it.
    pub last_proof: Option<Value>,
    pub last_error: Option<String>,
    pub transaction_hash: Option<H256>,
    pub started_at: DateTime<Utc>,
    pub transitions: Vec<TransitionRecord>,
}

impl VerificationSession {
    pub fn new(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            status: WorkflowState::Idle,
            last_proof: None,
            last_error: None,
            transaction_hash: None,
            started_at: Utc::now(),
            transitions: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, to: WorkflowState, trigger: &str) {
        self.transitions.push(TransitionRecord {
            from: self.status,
            to,
            trigger: trigger.to_string(),
            at: Utc::now(),
        });
        self.status = to;
    }
}
