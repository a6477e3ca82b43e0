// src/zkp/mod.rs
//! Zero-knowledge attestation handling: encoding fixups and proof normalization.

pub mod encoding;
pub mod proof_normalizer;

pub use proof_normalizer::normalize;
