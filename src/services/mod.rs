// src/services/mod.rs
pub mod api_server;
pub mod credential_reconciler;
pub mod institutional;
pub mod platform_mapper;
pub mod provider_session;
pub mod vault_gate;
pub mod verification_workflow;

pub use api_server::ApiServer;
pub use credential_reconciler::{CredentialReconciler, CredentialView, Reconciliation};
pub use platform_mapper::{classify, to_platform};
pub use verification_workflow::{MintOutcome, VerificationWorkflow, WorkflowSnapshot};
