// src/contracts/mod.rs
//! Smart contract interfaces consumed by the engine.

pub mod credential_nft;
pub mod vault;

pub use credential_nft::{CredentialAttributes, CredentialContract};
pub use vault::VaultContract;
