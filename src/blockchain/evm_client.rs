// src/blockchain/evm_client.rs
//! EVM client implementation.
//!
//! Provides a high-level interface over an HTTP JSON-RPC endpoint for the
//! credential NFT and vault contracts, plus the wallet operations the
//! workflow needs: chain id, chain switch and receipt tracking.

use crate::blockchain::chain_coordinator::{Confirmation, WalletNetwork};
use crate::blockchain::network::TargetNetwork;
use crate::contracts::credential_nft::{
    mint_arguments, CredentialAttributes, CredentialAttributesTuple, CredentialContract, KYC_NFT_ABI,
};
use crate::contracts::vault::{VaultContract, KYC_VAULT_ABI};
use crate::error::{ChainSwitchError, ConfigError, ContractError};
use crate::models::proof::ContractProof;
use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, PendingTransaction, Provider};
use ethers::signers::{Signer, Wallet};
use ethers_contract::{BaseContract, Contract};
use ethers_core::{
    abi::{Abi, Detokenize, Tokenize},
    types::{Address, H256, U256},
    utils::hex,
};
use k256::ecdsa::SigningKey;
use log::debug;
use serde_json::json;
use std::sync::Arc;

type SignerClient = SignerMiddleware<Arc<Provider<Http>>, Wallet<SigningKey>>;

/// Deployed contract addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractAddresses {
    pub credential_nft: Address,
    pub vault: Address,
}

/// EVM client for credential reads, writes and wallet network management.
///
/// This client provides:
/// - Read-only contract queries through the HTTP provider
/// - Signed transactions when a private key is configured
/// - `wallet_switchEthereumChain` requests and receipt polling
#[derive(Clone)]
pub struct EvmClient {
    /// JSON-RPC provider
    provider: Arc<Provider<Http>>,
    /// Signing middleware, absent for read-only deployments
    signer: Option<Arc<SignerClient>>,
    /// Fixed gas limit for every write
    gas_limit: U256,
    addresses: ContractAddresses,
}

impl EvmClient {
    /// Creates a new client instance.
    ///
    /// # Arguments
    /// * `network` - Target network; its RPC URL and chain id are used
    /// * `private_key` - Hex-encoded private key (with or without 0x prefix)
    /// * `gas_limit` - Gas limit applied to every transaction
    /// * `addresses` - Deployed contract addresses
    ///
    /// # Errors
    /// Returns error if:
    /// - The RPC URL cannot be parsed
    /// - The private key is not 32 bytes of hex
    pub fn new(
        network: &TargetNetwork,
        private_key: Option<&str>,
        gas_limit: u64,
        addresses: ContractAddresses,
    ) -> Result<Self, ConfigError> {
        let provider = Arc::new(Provider::<Http>::try_from(network.rpc_url.as_str()).map_err(|e| {
            ConfigError::InvalidUrl {
                field: "network.rpc_url",
                value: format!("{} ({e})", network.rpc_url),
            }
        })?);

        let signer = match private_key.filter(|k| !k.trim().is_empty()) {
            Some(key) => {
                let key_bytes = hex::decode(key.trim().trim_start_matches("0x"))
                    .map_err(|e| ConfigError::InvalidKey(e.to_string()))?;
                let signing_key =
                    SigningKey::from_slice(&key_bytes).map_err(|e| ConfigError::InvalidKey(e.to_string()))?;
                let wallet = Wallet::from(signing_key).with_chain_id(network.chain_id);
                Some(Arc::new(SignerMiddleware::new(provider.clone(), wallet)))
            }
            None => None,
        };

        Ok(Self {
            provider,
            signer,
            gas_limit: U256::from(gas_limit),
            addresses,
        })
    }

    pub fn addresses(&self) -> ContractAddresses {
        self.addresses
    }

    /// Sends a transaction to a smart contract.
    ///
    /// # Arguments
    /// * `contract_address` - Address of the target contract
    /// * `abi` - Contract ABI bytes
    /// * `method` - Method name to call
    /// * `params` - Method parameters
    /// * `value` - Wei attached to payable calls
    ///
    /// # Returns
    /// Transaction hash of the sent transaction
    ///
    /// # Errors
    /// Returns error if no signer is configured, the ABI or method is invalid,
    /// or the node/wallet refuses the transaction.
    async fn send_transaction(
        &self,
        contract_address: Address,
        abi: &[u8],
        method: &str,
        params: impl Tokenize,
        value: Option<U256>,
    ) -> Result<H256, ContractError> {
        let signer = self.signer.as_ref().ok_or(ContractError::NoSigner)?;
        let contract = Contract::new(contract_address, load_abi(abi)?, signer.clone());

        let mut call = contract
            .method::<_, H256>(method, params)
            .map_err(|e| ContractError::Abi(e.to_string()))?
            .gas(self.gas_limit);
        if let Some(value) = value {
            call = call.value(value);
        }

        let tx_hash = call
            .send()
            .await
            .map_err(|e| call_error(method, e))?
            .tx_hash();
        debug!("{} submitted as {:#x}", method, tx_hash);
        Ok(tx_hash)
    }

    /// Queries a smart contract (read-only operation).
    ///
    /// # Returns
    /// Decoded return value from the contract call
    async fn query_contract<R: Detokenize>(
        &self,
        contract_address: Address,
        abi: &[u8],
        method: &str,
        params: impl Tokenize,
    ) -> Result<R, ContractError> {
        let contract = Contract::new(contract_address, load_abi(abi)?, self.provider.clone());

        contract
            .method::<_, R>(method, params)
            .map_err(|e| ContractError::Abi(e.to_string()))?
            .call()
            .await
            .map_err(|e| call_error(method, e))
    }
}

fn load_abi(abi: &[u8]) -> Result<BaseContract, ContractError> {
    Abi::load(abi)
        .map(BaseContract::from)
        .map_err(|e| ContractError::Abi(e.to_string()))
}

fn call_error(method: &str, err: impl std::fmt::Display) -> ContractError {
    ContractError::Call {
        method: method.to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl WalletNetwork for EvmClient {
    fn account(&self) -> Option<Address> {
        self.signer.as_ref().map(|signer| signer.address())
    }

    async fn chain_id(&self) -> Result<u64, ChainSwitchError> {
        self.provider
            .get_chainid()
            .await
            .map(|id| id.as_u64())
            .map_err(|e| ChainSwitchError::Unavailable(e.to_string()))
    }

    async fn switch_chain(&self, target: &TargetNetwork) -> Result<(), ChainSwitchError> {
        self.provider
            .request::<_, serde_json::Value>(
                "wallet_switchEthereumChain",
                [json!({ "chainId": target.chain_id_hex() })],
            )
            .await
            .map(|_| ())
            .map_err(|e| ChainSwitchError::Rejected {
                target: target.chain_id,
                reason: e.to_string(),
            })
    }

    async fn wait_for_confirmation(&self, tx_hash: H256) -> Result<Confirmation, ContractError> {
        let receipt = PendingTransaction::new(tx_hash, self.provider.as_ref())
            .confirmations(1)
            .await
            .map_err(|e| ContractError::Provider(e.to_string()))?
            .ok_or(ContractError::Dropped(tx_hash))?;

        if receipt.status == Some(0u64.into()) {
            return Err(ContractError::Reverted(tx_hash));
        }
        Ok(Confirmation {
            transaction_hash: tx_hash,
            block_number: receipt.block_number.map(|n| n.as_u64()),
        })
    }
}

#[async_trait]
impl CredentialContract for EvmClient {
    async fn has_credential(&self, account: Address) -> Result<bool, ContractError> {
        self.query_contract(self.addresses.credential_nft, KYC_NFT_ABI, "hasKYCNFT", account)
            .await
    }

    async fn token_id_of(&self, account: Address) -> Result<U256, ContractError> {
        self.query_contract(
            self.addresses.credential_nft,
            KYC_NFT_ABI,
            "getTokenIdByAddress",
            account,
        )
        .await
    }

    async fn credential_attributes(&self, token_id: U256) -> Result<CredentialAttributes, ContractError> {
        let raw: CredentialAttributesTuple = self
            .query_contract(self.addresses.credential_nft, KYC_NFT_ABI, "getKYCData", token_id)
            .await?;
        Ok(raw.into())
    }

    async fn mint_with_proof(
        &self,
        proof: &ContractProof,
        platform: &str,
        recipient: Address,
    ) -> Result<H256, ContractError> {
        let args = mint_arguments(proof, platform, recipient)?;
        self.send_transaction(self.addresses.credential_nft, KYC_NFT_ABI, "mintWithProof", args, None)
            .await
    }
}

#[async_trait]
impl VaultContract for EvmClient {
    async fn has_valid_credential(&self, account: Address) -> Result<bool, ContractError> {
        self.query_contract(self.addresses.vault, KYC_VAULT_ABI, "hasValidKYCNFT", account)
            .await
    }

    async fn deposited(&self, account: Address) -> Result<U256, ContractError> {
        self.query_contract(self.addresses.vault, KYC_VAULT_ABI, "deposits", account)
            .await
    }

    async fn deposit(&self, value: U256) -> Result<H256, ContractError> {
        self.send_transaction(self.addresses.vault, KYC_VAULT_ABI, "deposit", (), Some(value))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses() -> ContractAddresses {
        ContractAddresses {
            credential_nft: Address::repeat_byte(1),
            vault: Address::repeat_byte(2),
        }
    }

    #[test]
    fn test_read_only_client_has_no_account() {
        let client = EvmClient::new(&TargetNetwork::rayls_devnet(), None, 3_000_000, addresses()).unwrap();
        assert!(client.account().is_none());
    }

    #[test]
    fn test_signer_account_is_derived_from_key() {
        // Well-known development key #0.
        let key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let client =
            EvmClient::new(&TargetNetwork::rayls_devnet(), Some(key), 3_000_000, addresses()).unwrap();
        let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        assert_eq!(client.account(), Some(expected));
    }

    #[test]
    fn test_invalid_key_is_rejected() {
        assert!(matches!(
            EvmClient::new(&TargetNetwork::rayls_devnet(), Some("0x1234"), 3_000_000, addresses()),
            Err(ConfigError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_write_without_signer_fails() {
        let client = EvmClient::new(&TargetNetwork::rayls_devnet(), None, 3_000_000, addresses()).unwrap();
        assert_eq!(client.deposit(U256::one()).await.unwrap_err(), ContractError::NoSigner);
    }

    #[test]
    fn test_bundled_abis_load() {
        assert!(load_abi(KYC_NFT_ABI).is_ok());
        assert!(load_abi(KYC_VAULT_ABI).is_ok());
    }
}
