// src/zkp/proof_normalizer.rs
//! Proof normalization.
//!
//! Converts whatever the attestation provider returned into the canonical
//! [`ContractProof`] consumed by the mint-with-proof call. The function is
//! pure; it only logs.
//!
//! ## Field sourcing per shape
//! | field        | claimData                   | signedClaim                        | flat  |
//! |--------------|-----------------------------|------------------------------------|-------|
//! | claim info   | `claimData.*`               | `claimInfo.*`, then root           | same  |
//! | identifier   | root, then `claimData`      | `signedClaim.claim`, then root     | root  |
//! | owner        | `claimData`, then root      | `signedClaim.claim`, then root     | root  |
//! | timestamp/epoch | `claimData`, then root, else 0 | `signedClaim.claim`, then root, else 0 | root, else 0 |
//! | signatures   | root, must be non-empty     | `signedClaim`, then root, may be empty | root, must be non-empty |

use crate::error::ProofError;
use crate::models::proof::{
    Claim, ClaimFields, ClaimInfo, ContractProof, Numeric, RawProof, RootFields, SignedClaim,
};
use crate::zkp::encoding::{encode_identifier, encode_owner, encode_signatures};
use log::{debug, warn};
use serde_json::Value;

/// Normalizes a raw provider response into a [`ContractProof`].
///
/// # Errors
/// - [`ProofError::Empty`] for `null` or an empty list
/// - [`ProofError::Malformed`] when identifier, owner or (outside the
///   `signedClaim` shape) signatures cannot be resolved
pub fn normalize(raw: &Value) -> Result<ContractProof, ProofError> {
    let proof = RawProof::from_value(raw)?;
    debug!("normalizing {} proof", proof.shape());
    proof.into_contract_proof()
}

impl RawProof {
    /// Resolves every field according to the detected shape.
    pub fn into_contract_proof(self) -> Result<ContractProof, ProofError> {
        match self {
            RawProof::ClaimData { claim_data, root } => {
                let nested = claim_data.claim;
                let claim = resolve_claim(
                    first_present(&root.claim.identifier, &nested.identifier),
                    first_present(&nested.owner, &root.claim.owner),
                    nested.timestamp_s.as_ref().or(root.claim.timestamp_s.as_ref()),
                    nested.epoch.as_ref().or(root.claim.epoch.as_ref()),
                )?;
                let signatures = require_signatures(root.signatures.unwrap_or_default())?;
                Ok(assemble(claim_data.info.into_claim_info(), claim, signatures))
            }
            RawProof::SignedClaim { signed_claim, root } => {
                let nested = signed_claim
                    .claim
                    .ok_or_else(|| ProofError::malformed("signedClaim.claim is missing"))?;
                let claim = resolve_claim(
                    first_present(&nested.identifier, &root.claim.identifier),
                    first_present(&nested.owner, &root.claim.owner),
                    nested.timestamp_s.as_ref().or(root.claim.timestamp_s.as_ref()),
                    nested.epoch.as_ref().or(root.claim.epoch.as_ref()),
                )?;
                let signatures = signed_claim
                    .signatures
                    .or_else(|| root.signatures.clone())
                    .unwrap_or_default();
                if signatures.is_empty() {
                    warn!("accepting signedClaim proof without signatures");
                }
                let info = root_claim_info(root);
                Ok(assemble(info, claim, encode_signatures(&signatures)))
            }
            RawProof::Flat(root) => {
                let ClaimFields {
                    identifier,
                    owner,
                    timestamp_s,
                    epoch,
                } = root.claim.clone();
                let claim = resolve_claim(
                    identifier.as_deref().filter(|s| !s.is_empty()),
                    owner.as_deref().filter(|s| !s.is_empty()),
                    timestamp_s.as_ref(),
                    epoch.as_ref(),
                )?;
                let signatures = require_signatures(root.signatures.clone().unwrap_or_default())?;
                Ok(assemble(root_claim_info(root), claim, signatures))
            }
        }
    }
}

/// `claimInfo` object when present, otherwise the root-level fields.
fn root_claim_info(root: RootFields) -> ClaimInfo {
    match root.claim_info {
        Some(info) => info.into_claim_info(),
        None => root.info.into_claim_info(),
    }
}

/// First non-empty string of the two, in order.
fn first_present<'a>(primary: &'a Option<String>, fallback: &'a Option<String>) -> Option<&'a str> {
    primary
        .as_deref()
        .filter(|s| !s.is_empty())
        .or_else(|| fallback.as_deref().filter(|s| !s.is_empty()))
}

fn resolve_claim(
    identifier: Option<&str>,
    owner: Option<&str>,
    timestamp_s: Option<&Numeric>,
    epoch: Option<&Numeric>,
) -> Result<Claim, ProofError> {
    let identifier = identifier.ok_or_else(|| ProofError::malformed("identifier is missing"))?;
    let owner = owner.ok_or_else(|| ProofError::malformed("owner address is missing or invalid"))?;

    Ok(Claim {
        identifier: encode_identifier(identifier)?,
        owner: encode_owner(owner)?,
        timestamp_s: timestamp_s.map(|n| n.to_u32("timestampS")).transpose()?.unwrap_or(0),
        epoch: epoch.map(|n| n.to_u32("epoch")).transpose()?.unwrap_or(0),
    })
}

fn require_signatures(raw: Vec<String>) -> Result<Vec<String>, ProofError> {
    if raw.is_empty() {
        return Err(ProofError::malformed("signatures array is empty"));
    }
    Ok(encode_signatures(&raw))
}

fn assemble(claim_info: ClaimInfo, claim: Claim, signatures: Vec<String>) -> ContractProof {
    ContractProof {
        claim_info,
        signed_claim: SignedClaim { claim, signatures },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers_core::types::H256;
    use serde_json::json;

    const OWNER: &str = "0xABCDEF0123456789abcdef0123456789ABCDEF01";

    fn claim_data_proof() -> Value {
        json!({
            "claimData": {"provider": "p", "parameters": "a", "context": "b"},
            "identifier": "0xabc123",
            "owner": OWNER,
            "timestampS": 100,
            "epoch": 1,
            "signatures": ["deadbeef"]
        })
    }

    fn signed_claim_proof() -> Value {
        json!({
            "claimInfo": {"provider": "p", "parameters": "a", "context": "b"},
            "signedClaim": {
                "claim": {
                    "identifier": "abc123",
                    "owner": OWNER,
                    "timestampS": 100,
                    "epoch": 1
                },
                "signatures": ["0xdeadbeef"]
            }
        })
    }

    fn flat_proof() -> Value {
        json!({
            "provider": "p",
            "parameters": "a",
            "context": "b",
            "identifier": "0xabc123",
            "owner": OWNER,
            "timestampS": "100",
            "epoch": 1,
            "signatures": ["deadbeef"]
        })
    }

    #[test]
    fn test_claim_data_scenario() {
        let proof = normalize(&claim_data_proof()).unwrap();

        let expected_id = format!("0xabc123{}", "0".repeat(58));
        assert_eq!(format!("{:#x}", proof.signed_claim.claim.identifier), expected_id);
        assert_eq!(
            proof.signed_claim.claim.owner,
            "0xabcdef0123456789abcdef0123456789abcdef01"
        );
        assert_eq!(proof.signed_claim.claim.timestamp_s, 100);
        assert_eq!(proof.signed_claim.claim.epoch, 1);
        assert_eq!(proof.signed_claim.signatures, vec!["0xdeadbeef"]);
        assert_eq!(proof.claim_info.provider, "p");
        assert_eq!(proof.claim_info.parameters, "a");
        assert_eq!(proof.claim_info.context, "b");
    }

    #[test]
    fn test_shape_invariance() {
        let a = normalize(&claim_data_proof()).unwrap();
        let b = normalize(&signed_claim_proof()).unwrap();
        let c = normalize(&flat_proof()).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_list_input_uses_first_proof() {
        let list = json!([claim_data_proof(), {"garbage": true}]);
        assert_eq!(normalize(&list).unwrap(), normalize(&claim_data_proof()).unwrap());
        assert_eq!(normalize(&json!([])).unwrap_err(), ProofError::Empty);
    }

    #[test]
    fn test_claim_data_field_precedence() {
        let raw = json!({
            "claimData": {
                "identifier": "0x02",
                "owner": "0xNESTED",
                "timestampS": 7,
                "epoch": 8
            },
            "identifier": "0x01",
            "owner": "0xROOT",
            "timestampS": 1,
            "epoch": 2,
            "signatures": ["aa"]
        });
        let claim = normalize(&raw).unwrap().signed_claim.claim;
        // identifier prefers the root, owner and counters prefer claimData
        assert_eq!(claim.identifier.as_bytes()[0], 0x01);
        assert_eq!(claim.owner, "0xnested");
        assert_eq!(claim.timestamp_s, 7);
        assert_eq!(claim.epoch, 8);
    }

    #[test]
    fn test_claim_data_falls_back_to_nested_identifier_and_root_owner() {
        let raw = json!({
            "claimData": {"identifier": "0x02"},
            "owner": OWNER,
            "signatures": ["aa"]
        });
        let proof = normalize(&raw).unwrap();
        assert_eq!(proof.signed_claim.claim.identifier.as_bytes()[0], 0x02);
        assert_eq!(proof.signed_claim.claim.timestamp_s, 0);
        assert_eq!(proof.signed_claim.claim.epoch, 0);
        assert_eq!(proof.claim_info.provider, "");
    }

    #[test]
    fn test_missing_identifier_fails_in_every_shape() {
        let mut a = claim_data_proof();
        a.as_object_mut().unwrap().remove("identifier");
        let mut b = signed_claim_proof();
        b["signedClaim"]["claim"].as_object_mut().unwrap().remove("identifier");
        let mut c = flat_proof();
        c.as_object_mut().unwrap().remove("identifier");

        for raw in [a, b, c] {
            assert_eq!(
                normalize(&raw).unwrap_err(),
                ProofError::Malformed("identifier is missing".into())
            );
        }
    }

    #[test]
    fn test_missing_owner_fails_in_every_shape() {
        let mut a = claim_data_proof();
        a.as_object_mut().unwrap().remove("owner");
        let mut b = signed_claim_proof();
        b["signedClaim"]["claim"].as_object_mut().unwrap().remove("owner");
        let mut c = flat_proof();
        c.as_object_mut().unwrap().remove("owner");

        for raw in [a, b, c] {
            assert!(matches!(normalize(&raw), Err(ProofError::Malformed(_))));
        }
    }

    #[test]
    fn test_owner_without_prefix_is_rejected() {
        let mut raw = claim_data_proof();
        raw["owner"] = json!("ABCDEF0123456789abcdef0123456789ABCDEF01");
        assert!(matches!(normalize(&raw), Err(ProofError::Malformed(_))));
    }

    #[test]
    fn test_missing_signatures_fail_outside_signed_claim() {
        let mut a = claim_data_proof();
        a.as_object_mut().unwrap().remove("signatures");
        assert_eq!(
            normalize(&a).unwrap_err(),
            ProofError::Malformed("signatures array is empty".into())
        );

        let mut c = flat_proof();
        c["signatures"] = json!([]);
        assert!(matches!(normalize(&c), Err(ProofError::Malformed(_))));
    }

    #[test]
    fn test_signed_claim_accepts_missing_signatures() {
        // Asymmetric with the claimData shape on purpose; see DESIGN.md.
        let mut raw = signed_claim_proof();
        raw["signedClaim"].as_object_mut().unwrap().remove("signatures");
        let proof = normalize(&raw).unwrap();
        assert!(proof.signed_claim.signatures.is_empty());
    }

    #[test]
    fn test_signed_claim_uses_root_fallbacks() {
        let raw = json!({
            "signedClaim": {"claim": {}},
            "identifier": "0x03",
            "owner": OWNER,
            "epoch": 9,
            "signatures": ["bb"]
        });
        let proof = normalize(&raw).unwrap();
        assert_eq!(proof.signed_claim.claim.identifier.as_bytes()[0], 0x03);
        assert_eq!(proof.signed_claim.claim.epoch, 9);
        assert_eq!(proof.signed_claim.signatures, vec!["0xbb"]);
    }

    #[test]
    fn test_signed_claim_without_claim_object() {
        let raw = json!({"signedClaim": {"signatures": ["aa"]}, "identifier": "0x01", "owner": OWNER});
        assert_eq!(
            normalize(&raw).unwrap_err(),
            ProofError::Malformed("signedClaim.claim is missing".into())
        );
    }

    #[test]
    fn test_normalization_is_deterministic() {
        let raw = claim_data_proof();
        assert_eq!(normalize(&raw).unwrap(), normalize(&raw).unwrap());
        assert_ne!(normalize(&raw).unwrap().signed_claim.claim.identifier, H256::zero());
    }

    #[test]
    fn test_serializes_in_contract_layout() {
        let value = serde_json::to_value(normalize(&claim_data_proof()).unwrap()).unwrap();
        assert_eq!(value["claimInfo"]["provider"], "p");
        assert_eq!(value["signedClaim"]["claim"]["timestampS"], 100);
        assert_eq!(value["signedClaim"]["signatures"][0], "0xdeadbeef");
    }
}
