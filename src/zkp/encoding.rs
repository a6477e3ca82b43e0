// src/zkp/encoding.rs
//! Byte-level fixups applied to proof fields before they reach the contract.

use crate::error::ProofError;
use ethers_core::types::H256;
use ethers_core::utils::hex;
use log::warn;

/// Hex characters in a `bytes32` value.
const IDENTIFIER_HEX_LEN: usize = 64;

/// Prefixes `0x` when missing.
pub fn with_hex_prefix(raw: &str) -> String {
    if raw.starts_with("0x") {
        raw.to_string()
    } else {
        format!("0x{raw}")
    }
}

/// Forces an identifier to exactly 32 bytes.
///
/// Short values are right-padded with zero nibbles. Values longer than 32
/// bytes are truncated, which silently discards the tail; that loss is logged
/// but not rejected.
pub fn encode_identifier(raw: &str) -> Result<H256, ProofError> {
    let prefixed = with_hex_prefix(raw.trim());
    let body = &prefixed[2..];
    if body.len() > IDENTIFIER_HEX_LEN {
        warn!(
            "identifier is {} hex chars long, truncating to {}",
            body.len(),
            IDENTIFIER_HEX_LEN
        );
    }

    let fixed: String = body
        .chars()
        .chain(std::iter::repeat('0'))
        .take(IDENTIFIER_HEX_LEN)
        .collect();
    let bytes = hex::decode(&fixed)
        .map_err(|e| ProofError::malformed(format!("identifier is not valid hex: {e}")))?;
    Ok(H256::from_slice(&bytes))
}

/// Validates the `0x` prefix and lower-cases an owner address.
///
/// The length is not checked here; a bad address fails when the mint
/// arguments are built.
pub fn encode_owner(raw: &str) -> Result<String, ProofError> {
    let trimmed = raw.trim();
    if !trimmed.starts_with("0x") {
        return Err(ProofError::malformed("owner address is missing or invalid"));
    }
    Ok(trimmed.to_lowercase())
}

/// Prefixes each signature with `0x`. No length validation.
pub fn encode_signatures(raw: &[String]) -> Vec<String> {
    raw.iter().map(|sig| with_hex_prefix(sig.trim())).collect()
}
