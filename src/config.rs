// src/config.rs
//! Runtime configuration.
//!
//! Layers, lowest first: built-in defaults, an optional `kyc-engine.toml`
//! in the working directory, then `KYC__SECTION__KEY` environment variables.

use crate::blockchain::evm_client::ContractAddresses;
use crate::blockchain::network::TargetNetwork;
use crate::error::ConfigError;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use config::builder::DefaultState;
use ethers_core::types::Address;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Deserialize, Debug, Clone)]
pub struct NetworkSettings {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    pub explorer_url: String,
    pub currency_symbol: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ContractSettings {
    pub credential_nft: String,
    /// Proof verifier the NFT contract delegates to; informational only.
    pub verifier: String,
    pub vault: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ChainSettings {
    pub settle_delay_ms: u64,
    pub gas_limit: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ProviderSettings {
    pub application_id: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Tier2Settings {
    pub mint_url: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SignerSettings {
    #[serde(default)]
    pub private_key: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServerSettings {
    pub listen: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub network: NetworkSettings,
    pub contracts: ContractSettings,
    pub chain: ChainSettings,
    pub provider: ProviderSettings,
    pub tier2: Tier2Settings,
    #[serde(default)]
    pub signer: SignerSettings,
    pub server: ServerSettings,
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let network = TargetNetwork::rayls_devnet();
    Ok(Config::builder()
        .set_default("network.chain_id", network.chain_id as i64)?
        .set_default("network.name", network.name)?
        .set_default("network.rpc_url", network.rpc_url)?
        .set_default("network.explorer_url", network.explorer_url)?
        .set_default("network.currency_symbol", network.currency_symbol)?
        .set_default("contracts.credential_nft", "0x996dA15db8b9E938d8bEc848E27f6567990493BB")?
        .set_default("contracts.verifier", "0xa399869468Ba49c6f7a0b65Df06adE96e5CC0D0f")?
        .set_default("contracts.vault", "0x0000000000000000000000000000000000000000")?
        .set_default("chain.settle_delay_ms", 1000i64)?
        .set_default("chain.gas_limit", 3_000_000i64)?
        .set_default("provider.application_id", "")?
        .set_default("tier2.mint_url", "http://localhost:5000/api/nft/mint")?
        .set_default("server.listen", "127.0.0.1:3000")?)
}

impl AppConfig {
    /// Loads defaults, `kyc-engine.toml` if present, then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config = defaults()?
            .add_source(File::with_name("kyc-engine").required(false))
            .add_source(Environment::with_prefix("KYC").prefix_separator("__").separator("__"))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Defaults overlaid with a TOML document.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config = defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn target_network(&self) -> TargetNetwork {
        TargetNetwork {
            chain_id: self.network.chain_id,
            name: self.network.name.clone(),
            rpc_url: self.network.rpc_url.clone(),
            explorer_url: self.network.explorer_url.clone(),
            currency_symbol: self.network.currency_symbol.clone(),
        }
    }

    pub fn contract_addresses(&self) -> Result<ContractAddresses, ConfigError> {
        Ok(ContractAddresses {
            credential_nft: parse_address("contracts.credential_nft", &self.contracts.credential_nft)?,
            vault: parse_address("contracts.vault", &self.contracts.vault)?,
        })
    }

    pub fn verifier_address(&self) -> Result<Address, ConfigError> {
        parse_address("contracts.verifier", &self.contracts.verifier)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.chain.settle_delay_ms)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.listen.parse().map_err(|_| ConfigError::InvalidUrl {
            field: "server.listen",
            value: self.server.listen.clone(),
        })
    }
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}
