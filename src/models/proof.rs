// src/models/proof.rs
//! Proof data model.
//!
//! Two sides of the same attestation live here:
//! - [`RawProof`]: what the attestation provider hands back, in one of three
//!   shapes depending on SDK version and response mode
//! - [`ContractProof`]: the exact layout the on-chain verifier expects
//!
//! The raw side is a tagged union. Shape detection happens once, in
//! [`RawProof::from_value`], and every later step matches on the variant.

use crate::error::ProofError;
use ethers_core::types::H256;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Provider-side description of what was proven.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimInfo {
    pub provider: String,
    pub parameters: String,
    pub context: String,
}

/// The signed claim body.
///
/// `identifier` is always exactly 32 bytes and `owner` is always lower-cased
/// and `0x`-prefixed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub identifier: H256,
    pub owner: String,
    pub timestamp_s: u32,
    pub epoch: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SignedClaim {
    pub claim: Claim,
    /// `0x`-prefixed hex signatures, in provider order.
    pub signatures: Vec<String>,
}

/// Canonical proof passed to the mint-with-proof contract call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContractProof {
    pub claim_info: ClaimInfo,
    pub signed_claim: SignedClaim,
}

/// A number as providers send it: integer, float, or numeric string.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Numeric {
    Int(u64),
    Float(f64),
    Text(String),
}

impl Numeric {
    /// Converts to a `uint32`, rejecting negatives, fractions and overflow.
    pub fn to_u32(&self, field: &str) -> Result<u32, ProofError> {
        let out_of_range = || ProofError::malformed(format!("{field} is not a valid uint32"));
        match self {
            Numeric::Int(n) => u32::try_from(*n).map_err(|_| out_of_range()),
            Numeric::Float(f) => {
                if f.fract() == 0.0 && *f >= 0.0 && *f <= f64::from(u32::MAX) {
                    Ok(*f as u32)
                } else {
                    Err(out_of_range())
                }
            }
            Numeric::Text(s) => s.trim().parse::<u32>().map_err(|_| out_of_range()),
        }
    }
}

/// `provider`/`parameters`/`context`, wherever they happen to sit.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ClaimInfoFields {
    pub provider: Option<String>,
    pub parameters: Option<String>,
    pub context: Option<String>,
}

impl ClaimInfoFields {
    pub fn into_claim_info(self) -> ClaimInfo {
        ClaimInfo {
            provider: self.provider.unwrap_or_default(),
            parameters: self.parameters.unwrap_or_default(),
            context: self.context.unwrap_or_default(),
        }
    }
}

/// Claim body fields, every one optional until normalization resolves them.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClaimFields {
    pub identifier: Option<String>,
    pub owner: Option<String>,
    pub timestamp_s: Option<Numeric>,
    pub epoch: Option<Numeric>,
}

/// Everything that may appear at the root of any shape.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RootFields {
    #[serde(flatten)]
    pub info: ClaimInfoFields,
    #[serde(flatten)]
    pub claim: ClaimFields,
    pub claim_info: Option<ClaimInfoFields>,
    pub signatures: Option<Vec<String>>,
}

/// The nested `claimData` object of the current SDK response.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ClaimDataFields {
    #[serde(flatten)]
    pub info: ClaimInfoFields,
    #[serde(flatten)]
    pub claim: ClaimFields,
}

/// The nested `signedClaim` object of the older response layout.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct SignedClaimFields {
    pub claim: Option<ClaimFields>,
    pub signatures: Option<Vec<String>>,
}

/// Which layout a raw proof arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofShape {
    ClaimData,
    SignedClaim,
    Flat,
}

impl fmt::Display for ProofShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProofShape::ClaimData => "claimData",
            ProofShape::SignedClaim => "signedClaim",
            ProofShape::Flat => "flat",
        };
        f.write_str(s)
    }
}

/// A provider proof after shape detection.
#[derive(Debug, Clone)]
pub enum RawProof {
    /// `claimData`-rooted: claim info and owner nested, signatures at the root.
    ClaimData {
        claim_data: ClaimDataFields,
        root: RootFields,
    },
    /// `signedClaim`-rooted: explicit `claim` sub-object and nested signatures.
    SignedClaim {
        signed_claim: SignedClaimFields,
        root: RootFields,
    },
    /// Everything at the root.
    Flat(RootFields),
}

impl RawProof {
    /// Detects the shape of a provider response.
    ///
    /// Lists are reduced to their first element. Detection order is
    /// `claimData`, then `signedClaim`, then flat; a key holding `null`
    /// counts as absent.
    pub fn from_value(value: &Value) -> Result<Self, ProofError> {
        let proof = match value {
            Value::Array(items) => items.first().ok_or(ProofError::Empty)?,
            Value::Null => return Err(ProofError::Empty),
            other => other,
        };
        let object = match proof {
            Value::Object(map) => map,
            Value::Null => return Err(ProofError::Empty),
            _ => return Err(ProofError::malformed("proof is not an object")),
        };

        let root: RootFields = decode(proof, "proof")?;
        let present = |key: &str| object.get(key).filter(|v| !v.is_null());

        if let Some(claim_data) = present("claimData") {
            Ok(RawProof::ClaimData {
                claim_data: decode(claim_data, "claimData")?,
                root,
            })
        } else if let Some(signed_claim) = present("signedClaim") {
            Ok(RawProof::SignedClaim {
                signed_claim: decode(signed_claim, "signedClaim")?,
                root,
            })
        } else {
            Ok(RawProof::Flat(root))
        }
    }

    pub fn shape(&self) -> ProofShape {
        match self {
            RawProof::ClaimData { .. } => ProofShape::ClaimData,
            RawProof::SignedClaim { .. } => ProofShape::SignedClaim,
            RawProof::Flat(_) => ProofShape::Flat,
        }
    }
}

fn decode<T: for<'de> Deserialize<'de>>(value: &Value, what: &str) -> Result<T, ProofError> {
    serde_json::from_value(value.clone())
        .map_err(|e| ProofError::malformed(format!("{what} has an unexpected layout: {e}")))
}
