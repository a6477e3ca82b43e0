// src/lib.rs

//! # KYC Credential Engine
//!
//! Normalizes attestation proofs from a zero-knowledge identity provider and
//! drives them through to an on-chain KYC credential.
//!
//! ## Architecture Overview
//! 1. **Proof Layer**: `zkp` turns any provider proof shape into a `ContractProof`
//! 2. **Blockchain Layer**: `EvmClient`, target network and chain switching
//! 3. **Contracts Layer**: credential NFT and vault call signatures
//! 4. **Services Layer**: verification workflow, reconciliation, vault, Tier 2, API

pub mod blockchain;
pub mod config;
pub mod contracts;
pub mod error;
pub mod models;
pub mod services;
pub mod zkp;

#[cfg(test)]
mod testing;
