// src/contracts/credential_nft.rs
//! KYC credential NFT contract interface.
//!
//! Reads tell which credential a wallet holds; the single write mints a new
//! credential from a normalized proof.

use crate::error::ContractError;
use crate::models::proof::ContractProof;
use async_trait::async_trait;
use ethers_core::types::{Address, Bytes, H256, U256};
use serde::Serialize;

/// ABI of the credential NFT contract.
pub const KYC_NFT_ABI: &[u8] = include_bytes!("abi/KYCNFT.json");

/// Attributes stored on-chain alongside a minted credential.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialAttributes {
    pub first_name: String,
    pub last_name: String,
    pub kyc_status: String,
    /// Platform string written at mint time; drives classification.
    pub platform: String,
    pub verified_address: Address,
    pub minted_at: U256,
}

/// Raw `getKYCData` return tuple.
pub type CredentialAttributesTuple = (String, String, String, String, Address, U256);

impl From<CredentialAttributesTuple> for CredentialAttributes {
    fn from(raw: CredentialAttributesTuple) -> Self {
        let (first_name, last_name, kyc_status, platform, verified_address, minted_at) = raw;
        Self {
            first_name,
            last_name,
            kyc_status,
            platform,
            verified_address,
            minted_at,
        }
    }
}

/// ABI-ready form of a [`ContractProof`].
pub type ProofTokens = ((String, String, String), ((H256, Address, u32, u32), Vec<Bytes>));

/// Arguments of `mintWithProof(proof, platform, recipient)`.
pub type MintArguments = (ProofTokens, String, Address);

/// Converts a normalized proof into contract call arguments.
///
/// This is where the owner finally has to be a 20-byte address and every
/// signature valid hex.
pub fn mint_arguments(
    proof: &ContractProof,
    platform: &str,
    recipient: Address,
) -> Result<MintArguments, ContractError> {
    let claim = &proof.signed_claim.claim;
    let owner: Address = claim
        .owner
        .parse()
        .map_err(|_| ContractError::InvalidArgument(format!("owner `{}` is not an address", claim.owner)))?;
    let signatures = proof
        .signed_claim
        .signatures
        .iter()
        .map(|sig| {
            sig.parse::<Bytes>()
                .map_err(|_| ContractError::InvalidArgument(format!("signature `{sig}` is not hex")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let info = &proof.claim_info;
    Ok((
        (
            (info.provider.clone(), info.parameters.clone(), info.context.clone()),
            ((claim.identifier, owner, claim.timestamp_s, claim.epoch), signatures),
        ),
        platform.to_string(),
        recipient,
    ))
}

/// On-chain credential NFT.
#[async_trait]
pub trait CredentialContract: Send + Sync {
    /// `hasKYCNFT(account)`
    async fn has_credential(&self, account: Address) -> Result<bool, ContractError>;

    /// `getTokenIdByAddress(account)`; zero when none.
    async fn token_id_of(&self, account: Address) -> Result<U256, ContractError>;

    /// `getKYCData(tokenId)`
    async fn credential_attributes(&self, token_id: U256) -> Result<CredentialAttributes, ContractError>;

    /// `mintWithProof(proof, platform, recipient)`, returning the transaction hash.
    async fn mint_with_proof(
        &self,
        proof: &ContractProof,
        platform: &str,
        recipient: Address,
    ) -> Result<H256, ContractError>;
}
