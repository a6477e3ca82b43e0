// src/blockchain/mod.rs
pub mod chain_coordinator;
pub mod evm_client;
pub mod network;

pub use chain_coordinator::{ChainCoordinator, Confirmation, WalletNetwork};
pub use evm_client::{ContractAddresses, EvmClient};
pub use network::TargetNetwork;
