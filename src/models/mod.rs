// src/models/mod.rs
pub mod collection;
pub mod proof;
pub mod session;

pub use collection::{InstitutionalProvider, ProviderStatus, Registry, VerificationCollection};
pub use proof::{ContractProof, RawProof};
pub use session::{VerificationSession, WorkflowState};
