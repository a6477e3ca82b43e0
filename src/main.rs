// src/main.rs

//! # KYC Credential Engine - Main Entry Point
//!
//! Loads configuration, connects to the target network and starts the API
//! server.
//!
//! ## Configuration
//! Defaults can be overridden by `kyc-engine.toml` or environment variables
//! (a `.env` file is loaded first):
//! - `KYC__SIGNER__PRIVATE_KEY`: wallet private key; without it writes fail
//! - `KYC__CONTRACTS__CREDENTIAL_NFT`, `KYC__CONTRACTS__VAULT`: contract addresses
//! - `KYC__PROVIDER__APPLICATION_ID`: attestation provider application id
//! - `KYC__SERVER__LISTEN`: API listen address (default 127.0.0.1:3000)

use anyhow::Context;
use dotenv::dotenv;
use kyc_credential_engine::blockchain::{ChainCoordinator, EvmClient, WalletNetwork};
use kyc_credential_engine::config::AppConfig;
use kyc_credential_engine::models::collection::institutional_providers;
use kyc_credential_engine::services::institutional::InstitutionalSubmitter;
use kyc_credential_engine::services::provider_session::ProviderSessionFactory;
use kyc_credential_engine::services::vault_gate::VaultGate;
use kyc_credential_engine::services::{ApiServer, VerificationWorkflow};
use log::{info, warn};
use std::sync::Arc;

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load environment and configuration
/// 2. Build the EVM client for the target network
/// 3. Wire the workflow, vault gate and Tier 2 submitter
/// 4. Start API server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load().context("failed to load configuration")?;
    let target = config.target_network();
    let addresses = config
        .contract_addresses()
        .context("invalid contract address in configuration")?;
    let verifier = config
        .verifier_address()
        .context("invalid verifier address in configuration")?;

    let client = Arc::new(
        EvmClient::new(
            &target,
            config.signer.private_key.as_deref(),
            config.chain.gas_limit,
            addresses,
        )
        .context("failed to initialize EVM client")?,
    );
    match client.account() {
        Some(account) => info!("signing as {:?}", account),
        None => warn!("no signer configured; mint and deposit requests will fail"),
    }
    info!(
        "target {} (chain {}), credential NFT {:?}, verifier {:?}, vault {:?}",
        target.name, target.chain_id, addresses.credential_nft, verifier, addresses.vault
    );

    let coordinator = ChainCoordinator::new(client.clone(), config.settle_delay());
    let sessions = ProviderSessionFactory::new(config.provider.application_id.clone());
    let workflow = VerificationWorkflow::new(
        Arc::new(sessions.clone()),
        client.clone(),
        client.clone(),
        coordinator.clone(),
        target.clone(),
    );
    let vault = VaultGate::new(client.clone(), client.clone(), coordinator, target);
    let submitter = InstitutionalSubmitter::new(config.tier2.mint_url.clone(), institutional_providers());

    let server = Arc::new(ApiServer::new(
        workflow,
        vault,
        submitter,
        sessions,
        client.clone(),
        client,
        addresses.credential_nft,
    ));
    let addr = config.listen_addr().context("invalid listen address")?;
    server.run(addr).await.context("API server failed")?;
    Ok(())
}
