// src/error.rs
//! Error taxonomy for the credential engine.
//!
//! Every failure the workflow can hit is a typed variant here. Session-level
//! failures are collected in [`WorkflowError`], which also knows how to turn
//! itself into the short, user-actionable message shown to wallet holders.

use crate::models::session::WorkflowState;
use ethers_core::types::H256;
use thiserror::Error;

/// Failures while turning a raw provider proof into a [`ContractProof`].
///
/// [`ContractProof`]: crate::models::proof::ContractProof
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    /// The proof was null or an empty list.
    #[error("invalid proof: proof is null or empty")]
    Empty,

    /// A required field was missing or could not be encoded.
    #[error("invalid proof: {0}")]
    Malformed(String),
}

impl ProofError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        ProofError::Malformed(reason.into())
    }
}

/// Failures while making sure the wallet sits on the target chain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainSwitchError {
    /// The wallet or node refused the switch request.
    #[error("switch to chain {target} was rejected: {reason}")]
    Rejected { target: u64, reason: String },

    /// The switch was accepted but the wallet never reported the target chain.
    #[error("wallet reports chain {actual} after switching to {target}")]
    Mismatch { target: u64, actual: u64 },

    /// The active chain could not be read at all.
    #[error("unable to read the active chain: {0}")]
    Unavailable(String),
}

impl ChainSwitchError {
    /// Whether the switch failed because the user declined it, as opposed to
    /// a node that cannot switch chains at all.
    pub fn is_user_rejection(&self) -> bool {
        match self {
            ChainSwitchError::Rejected { reason, .. } => has_marker(reason, USER_REJECTED_MARKERS),
            _ => false,
        }
    }
}

/// Failures reported by a contract read or write before classification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("contract call `{method}` failed: {message}")]
    Call { method: String, message: String },

    #[error("contract ABI error: {0}")]
    Abi(String),

    #[error("invalid contract argument: {0}")]
    InvalidArgument(String),

    #[error("no signer configured for write operations")]
    NoSigner,

    #[error("transaction {0:#x} was dropped before confirmation")]
    Dropped(H256),

    #[error("transaction {0:#x} reverted")]
    Reverted(H256),

    #[error("provider error: {0}")]
    Provider(String),
}

/// A failed write, classified by what the user has to do about it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("a valid KYC credential is required: {0}")]
    CredentialMissing(String),

    #[error("insufficient balance: {0}")]
    InsufficientFunds(String),

    #[error("transaction was rejected in the wallet: {0}")]
    UserRejected(String),

    #[error("transaction failed: {0}")]
    Unclassified(String),
}

const USER_REJECTED_MARKERS: &[&str] = &[
    "user rejected",
    "user denied",
    "rejected the request",
    "request rejected",
    "4001",
];
const FUNDS_MARKERS: &[&str] = &[
    "insufficient funds",
    "insufficient balance",
    "exceeds balance",
];
const CREDENTIAL_MARKERS: &[&str] = &["kyc", "credential", "not verified"];

impl TransactionError {
    /// Classifies an underlying wallet or node message by known substrings.
    ///
    /// Rejection markers win over funds markers, which win over credential
    /// markers; anything else is unclassified.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let has_any = |markers: &[&str]| has_marker(&message, markers);

        if has_any(USER_REJECTED_MARKERS) {
            TransactionError::UserRejected(message)
        } else if has_any(FUNDS_MARKERS) {
            TransactionError::InsufficientFunds(message)
        } else if has_any(CREDENTIAL_MARKERS) {
            TransactionError::CredentialMissing(message)
        } else {
            TransactionError::Unclassified(message)
        }
    }
}

fn has_marker(message: &str, markers: &[&str]) -> bool {
    let lowered = message.to_lowercase();
    markers.iter().any(|m| lowered.contains(m))
}

impl From<ContractError> for TransactionError {
    fn from(err: ContractError) -> Self {
        TransactionError::classify(err.to_string())
    }
}

/// Failures talking to the attestation provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("invalid provider `{0}`. Use \"binance\", \"coinbase\", \"x\", or \"example\".")]
    UnknownMethod(String),

    #[error("provider session failed: {0}")]
    Session(String),
}

/// Failures in the Tier-2 institutional submission path.
#[derive(Error, Debug)]
pub enum InstitutionalError {
    #[error("unknown institutional provider `{0}`")]
    UnknownProvider(String),

    #[error("missing required document: {0}")]
    MissingDocument(&'static str),

    #[error("sandbox endpoint error ({status}): {body}")]
    Endpoint { status: u16, body: String },

    #[error("mint service error ({status}): {message}")]
    MintService { status: u16, message: String },

    #[error("unable to connect to the applicant endpoint {url}: {reason}")]
    EndpointUnreachable { url: String, reason: String },

    #[error("unable to connect to the mint service {url}: {reason}")]
    ServiceUnreachable { url: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failures loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid address for `{field}`: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("invalid URL for `{field}`: {value}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("invalid signer key: {0}")]
    InvalidKey(String),
}

/// The broad category a failure falls into from the user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NeedsCredential,
    NeedsFunds,
    Cancelled,
    Unknown,
}

impl FailureKind {
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureKind::NeedsCredential => {
                "You need a valid KYC NFT for this action. Verify your identity in the Tier 1 KYC Dashboard first."
            }
            FailureKind::NeedsFunds => "Your wallet balance is too low to cover this transaction.",
            FailureKind::Cancelled => "The request was cancelled in your wallet.",
            FailureKind::Unknown => "Something went wrong. Please try again.",
        }
    }
}

/// Errors surfaced by the verification workflow and its callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("wallet is not connected")]
    WalletNotConnected,

    #[error("a verification for `{collection_id}` is already in progress")]
    SessionActive { collection_id: String },

    #[error("no verification session is active")]
    NoActiveSession,

    #[error("unknown collection `{0}`")]
    UnknownCollection(String),

    #[error("`{trigger}` is not allowed while {from}")]
    InvalidTransition {
        from: WorkflowState,
        trigger: &'static str,
    },

    #[error("invalid amount `{0}`")]
    InvalidAmount(String),

    #[error(transparent)]
    Proof(#[from] ProofError),

    #[error(transparent)]
    ChainSwitch(#[from] ChainSwitchError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl WorkflowError {
    pub fn kind(&self) -> FailureKind {
        match self {
            WorkflowError::Transaction(TransactionError::CredentialMissing(_)) => {
                FailureKind::NeedsCredential
            }
            WorkflowError::Transaction(TransactionError::InsufficientFunds(_)) => {
                FailureKind::NeedsFunds
            }
            WorkflowError::Transaction(TransactionError::UserRejected(_)) => FailureKind::Cancelled,
            WorkflowError::ChainSwitch(err) if err.is_user_rejection() => FailureKind::Cancelled,
            _ => FailureKind::Unknown,
        }
    }

    /// Message suitable for showing to the wallet holder.
    pub fn user_message(&self) -> String {
        match self.kind() {
            FailureKind::Unknown => format!("{} ({})", FailureKind::Unknown.user_message(), self),
            kind => kind.user_message().to_string(),
        }
    }
}
