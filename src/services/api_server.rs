// src/services/api_server.rs
//! API Server for the KYC credential engine
//!
//! This module exposes the verification workflow over HTTP. The API is built
//! using Axum and includes endpoints for:
//! - Provider session requests and proof normalization
//! - Driving a Tier 1 verification session through to a minted credential
//! - Reading reconciled credential holdings
//! - Credential-gated vault deposits
//! - Tier 2 institutional submissions

use crate::blockchain::chain_coordinator::WalletNetwork;
use crate::contracts::credential_nft::CredentialContract;
use crate::error::{InstitutionalError, ProviderError, TransactionError, WorkflowError};
use crate::models::collection::{tier1_collections, Registry, VerificationCollection};
use crate::services::credential_reconciler::Reconciliation;
use crate::services::institutional::{Applicant, Document, InstitutionalSubmitter, Tier2Application};
use crate::services::provider_session::ProviderSessionFactory;
use crate::services::vault_gate::VaultGate;
use crate::services::verification_workflow::{VerificationWorkflow, WorkflowSnapshot};
use crate::zkp::normalize;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use ethers_core::types::Address;
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;

// API request structures

/// Request payload for starting a verification
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartVerificationRequest {
    collection_id: String,
}

/// Failure reported by the provider channel
#[derive(Deserialize)]
struct ProviderFailureRequest {
    error: String,
}

/// Request payload for a vault deposit, amount in ether
#[derive(Deserialize)]
struct DepositRequest {
    amount: String,
}

/// Base64-encoded document upload
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentUpload {
    file_name: String,
    content: String,
}

/// Request payload for a Tier 2 institutional submission
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Tier2Request {
    provider_id: String,
    #[serde(default)]
    applicant: Option<Applicant>,
    #[serde(default)]
    passport: Option<DocumentUpload>,
    /// Base64 PNG from the liveness capture
    #[serde(default)]
    selfie: Option<String>,
    #[serde(default)]
    note: Option<String>,
}

type ApiResponse = (StatusCode, Json<Value>);

/// API server state containing all service dependencies
pub struct ApiServer {
    /// The single live verification workflow. Mutating handlers never wait
    /// for it: a request arriving while another one drives it is refused.
    workflow: Mutex<VerificationWorkflow>,

    /// Latest state published by the workflow, readable during a mint
    status: watch::Receiver<WorkflowSnapshot>,

    collections: Arc<Registry<VerificationCollection>>,

    /// Credential-gated vault
    vault: VaultGate,

    /// Tier 2 submissions and holdings
    submitter: InstitutionalSubmitter,

    /// Provider session descriptors for the configured application
    sessions: ProviderSessionFactory,

    wallet: Arc<dyn WalletNetwork>,
    contract: Arc<dyn CredentialContract>,

    /// Credential NFT address, for explorer links
    credential_nft: Address,
}

impl ApiServer {
    /// Creates a new instance of the API server
    ///
    /// # Arguments
    /// * `workflow` - Tier 1 verification workflow
    /// * `vault` - Vault deposit gate
    /// * `submitter` - Tier 2 institutional submitter
    /// * `sessions` - Provider session factory
    /// * `wallet` - Connected wallet, used for the account
    /// * `contract` - Credential NFT, used for Tier 2 reconciliation
    /// * `credential_nft` - Address of the credential NFT contract
    pub fn new(
        workflow: VerificationWorkflow,
        vault: VaultGate,
        submitter: InstitutionalSubmitter,
        sessions: ProviderSessionFactory,
        wallet: Arc<dyn WalletNetwork>,
        contract: Arc<dyn CredentialContract>,
        credential_nft: Address,
    ) -> Self {
        ApiServer {
            status: workflow.subscribe(),
            collections: tier1_collections(),
            workflow: Mutex::new(workflow),
            vault,
            submitter,
            sessions,
            wallet,
            contract,
            credential_nft,
        }
    }

    /// Builds the router with every route bound to `self`
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/request-verification/:provider", get(Self::request_verification_handler))
            .route("/normalize-proof", post(Self::normalize_proof_handler))
            .route("/collections", get(Self::collections_handler))
            .route("/verification/start", post(Self::start_verification_handler))
            .route("/verification/proof", post(Self::receive_proof_handler))
            .route("/verification/fail", post(Self::provider_failed_handler))
            .route("/verification/cancel", post(Self::cancel_verification_handler))
            .route("/verification/session", get(Self::session_handler))
            .route("/holdings", get(Self::holdings_handler))
            .route("/vault/deposit", post(Self::deposit_handler))
            .route("/vault/deposits", get(Self::deposits_handler))
            .route("/tier2/providers", get(Self::tier2_providers_handler))
            .route("/tier2/request", post(Self::tier2_request_handler))
            .layer(CorsLayer::permissive())
            .with_state(self)
    }

    /// Starts the API server and begins listening for requests
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "127.0.0.1:3000")
    pub async fn run(self: Arc<Self>, addr: SocketAddr) -> std::io::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on http://{}", addr);
        axum::serve(listener, app).await
    }

    fn snapshot(&self) -> WorkflowSnapshot {
        self.status.borrow().clone()
    }

    /// Exclusive access to the workflow, or `SessionActive` while another
    /// request holds it.
    fn try_workflow(&self) -> Result<MutexGuard<'_, VerificationWorkflow>, WorkflowError> {
        self.workflow.try_lock().map_err(|_| WorkflowError::SessionActive {
            collection_id: self.snapshot().active_collection().unwrap_or_default().to_string(),
        })
    }

    // =====================
    // Provider Handlers
    // =====================

    /// Returns the provider session request for a verification method
    ///
    /// # Endpoint
    /// GET /request-verification/:provider
    ///
    /// # Responses
    /// - 200 OK: `{success: true, proofRequest}`
    /// - 400 Bad Request: Unknown provider
    async fn request_verification_handler(
        Path(provider): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> impl IntoResponse {
        match state.sessions.describe(&provider) {
            Ok(descriptor) => (
                StatusCode::OK,
                Json(json!({ "success": true, "proofRequest": descriptor })),
            ),
            Err(e) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": e.to_string() })),
            ),
        }
    }

    /// Normalizes a raw provider proof without submitting it
    ///
    /// # Endpoint
    /// POST /normalize-proof
    ///
    /// # Responses
    /// - 200 OK: Canonical contract proof
    /// - 422 Unprocessable Entity: Empty or malformed proof
    async fn normalize_proof_handler(Json(raw): Json<Value>) -> impl IntoResponse {
        match normalize(&raw) {
            Ok(proof) => (StatusCode::OK, Json(json!(proof))),
            Err(e) => error_response(&WorkflowError::from(e)),
        }
    }

    // =====================
    // Tier 1 Verification Handlers
    // =====================

    /// Lists Tier 1 collections with verification progress
    ///
    /// # Endpoint
    /// GET /collections
    async fn collections_handler(State(state): State<Arc<ApiServer>>) -> impl IntoResponse {
        let registry = state.collections.as_ref();
        let holdings = state.snapshot().holdings;
        (
            StatusCode::OK,
            Json(json!({
                "collections": registry.entries(),
                "verified": holdings.len(),
                "remaining": holdings.remaining(registry),
                "next": holdings.next_unverified(registry).map(|c| c.id.clone()),
            })),
        )
    }

    /// Starts verification for a collection
    ///
    /// # Endpoint
    /// POST /verification/start
    ///
    /// # Responses
    /// - 200 OK: Provider session descriptor
    /// - 401 Unauthorized: No wallet connected
    /// - 409 Conflict: A session is already in flight
    async fn start_verification_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<StartVerificationRequest>,
    ) -> impl IntoResponse {
        let mut workflow = match state.try_workflow() {
            Ok(workflow) => workflow,
            Err(e) => return error_response(&e),
        };
        match workflow.start(&payload.collection_id).await {
            Ok(descriptor) => (
                StatusCode::OK,
                Json(json!({ "state": workflow.state(), "proofRequest": descriptor })),
            ),
            Err(e) => error_response(&e),
        }
    }

    /// Delivers the provider's proof and runs the mint
    ///
    /// # Endpoint
    /// POST /verification/proof
    ///
    /// # Responses
    /// - 200 OK: Mint outcome with explorer links
    /// - 4xx/5xx: Failure with a user-actionable message
    async fn receive_proof_handler(
        State(state): State<Arc<ApiServer>>,
        Json(raw): Json<Value>,
    ) -> impl IntoResponse {
        let mut workflow = match state.try_workflow() {
            Ok(workflow) => workflow,
            Err(e) => return error_response(&e),
        };
        match workflow.receive_proof(raw).await {
            Ok(outcome) => {
                let target = workflow.target();
                let transaction_url = target.tx_url(outcome.transaction_hash);
                let token_url = outcome
                    .token_id
                    .map(|id| target.token_url(state.credential_nft, id));
                (
                    StatusCode::OK,
                    Json(json!({
                        "state": workflow.state(),
                        "outcome": outcome,
                        "transactionUrl": transaction_url,
                        "tokenUrl": token_url,
                    })),
                )
            }
            Err(e) => error_response(&e),
        }
    }

    /// Records a provider-side failure
    ///
    /// # Endpoint
    /// POST /verification/fail
    async fn provider_failed_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<ProviderFailureRequest>,
    ) -> impl IntoResponse {
        let mut workflow = match state.try_workflow() {
            Ok(workflow) => workflow,
            Err(e) => return error_response(&e),
        };
        match workflow.provider_failed(&payload.error) {
            Ok(()) => (
                StatusCode::OK,
                Json(json!({ "state": workflow.state(), "session": workflow.session() })),
            ),
            Err(e) => error_response(&e),
        }
    }

    /// Cancels the in-flight provider session
    ///
    /// # Endpoint
    /// POST /verification/cancel
    async fn cancel_verification_handler(State(state): State<Arc<ApiServer>>) -> impl IntoResponse {
        let mut workflow = match state.try_workflow() {
            Ok(workflow) => workflow,
            Err(e) => return error_response(&e),
        };
        match workflow.cancel().await {
            Ok(()) => (StatusCode::OK, Json(json!({ "state": workflow.state() }))),
            Err(e) => error_response(&e),
        }
    }

    /// Current workflow state and session, including a mint in flight
    ///
    /// # Endpoint
    /// GET /verification/session
    async fn session_handler(State(state): State<Arc<ApiServer>>) -> impl IntoResponse {
        let snapshot = state.snapshot();
        (
            StatusCode::OK,
            Json(json!({ "state": snapshot.state, "session": snapshot.session })),
        )
    }

    /// Re-reads and returns Tier 1 and Tier 2 holdings for the wallet
    ///
    /// While a mint is in flight the Tier 1 view is the last published one,
    /// with status `busy`.
    ///
    /// # Endpoint
    /// GET /holdings
    async fn holdings_handler(State(state): State<Arc<ApiServer>>) -> impl IntoResponse {
        let tier1 = match state.workflow.try_lock() {
            Ok(mut workflow) => match workflow.refresh_holdings().await {
                Ok(reconciliation) => json!({
                    "status": reconciliation_status(&reconciliation),
                    "holdings": workflow.holdings(),
                }),
                Err(e) => return error_response(&e),
            },
            Err(_) => json!({ "status": "busy", "holdings": state.snapshot().holdings }),
        };
        let tier2 = match state.wallet.account() {
            Some(account) => state
                .submitter
                .refresh_holdings(state.contract.as_ref(), account)
                .await
                .map_err(|e| warn!("Tier 2 reconciliation failed: {}", e))
                .ok(),
            None => None,
        };

        (
            StatusCode::OK,
            Json(json!({
                "tier1": tier1,
                "tier2": {
                    "status": tier2.as_ref().map(reconciliation_status),
                    "holdings": state.submitter.holdings().await,
                },
            })),
        )
    }

    // =====================
    // Vault Handlers
    // =====================

    /// Deposits into the credential-gated vault
    ///
    /// # Endpoint
    /// POST /vault/deposit
    ///
    /// # Responses
    /// - 200 OK: Transaction hash
    /// - 403 Forbidden: No valid credential
    async fn deposit_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<DepositRequest>,
    ) -> impl IntoResponse {
        match state.vault.deposit(&payload.amount).await {
            Ok(tx_hash) => (
                StatusCode::OK,
                Json(json!({
                    "transactionHash": tx_hash,
                    "transactionUrl": state.vault.target().tx_url(tx_hash),
                })),
            ),
            Err(e) => error_response(&e),
        }
    }

    /// Amount deposited by the connected account, in wei
    ///
    /// # Endpoint
    /// GET /vault/deposits
    async fn deposits_handler(State(state): State<Arc<ApiServer>>) -> impl IntoResponse {
        let account = match state.wallet.account() {
            Some(account) => account,
            None => return error_response(&WorkflowError::WalletNotConnected),
        };
        match state.vault.deposited(account).await {
            Ok(amount) => (
                StatusCode::OK,
                Json(json!({ "account": account, "deposited": amount.to_string() })),
            ),
            Err(e) => error_response(&e),
        }
    }

    // =====================
    // Tier 2 Handlers
    // =====================

    /// Lists institutional providers
    ///
    /// # Endpoint
    /// GET /tier2/providers
    async fn tier2_providers_handler(State(state): State<Arc<ApiServer>>) -> impl IntoResponse {
        (
            StatusCode::OK,
            Json(json!({ "providers": state.submitter.registry().entries() })),
        )
    }

    /// Submits a Tier 2 application and requests the mint
    ///
    /// # Endpoint
    /// POST /tier2/request
    ///
    /// # Responses
    /// - 200 OK: Mint service reply
    /// - 400 Bad Request: Missing or undecodable documents
    /// - 502/503: Provider or mint service failure
    async fn tier2_request_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<Tier2Request>,
    ) -> impl IntoResponse {
        let recipient = match state.wallet.account() {
            Some(account) => account,
            None => return error_response(&WorkflowError::WalletNotConnected),
        };

        let passport = match payload.passport.map(decode_document).transpose() {
            Ok(passport) => passport,
            Err(e) => return bad_request(e),
        };
        let selfie = match payload.selfie.as_deref().map(base64::decode).transpose() {
            Ok(selfie) => selfie,
            Err(e) => return bad_request(format!("selfie is not valid base64: {e}")),
        };

        let application = Tier2Application {
            applicant: payload.applicant.unwrap_or_else(Applicant::sandbox),
            recipient,
            passport,
            selfie,
            note: payload.note,
        };
        match state.submitter.submit(&payload.provider_id, application).await {
            Ok(result) => (StatusCode::OK, Json(json!(result))),
            Err(e) => institutional_error_response(&e),
        }
    }
}

fn decode_document(upload: DocumentUpload) -> Result<Document, String> {
    let bytes = base64::decode(&upload.content)
        .map_err(|e| format!("{} is not valid base64: {e}", upload.file_name))?;
    Ok(Document {
        file_name: upload.file_name,
        bytes,
    })
}

fn reconciliation_status(reconciliation: &Reconciliation) -> &'static str {
    match reconciliation {
        Reconciliation::Held { .. } => "held",
        Reconciliation::NotHeld => "not_held",
        Reconciliation::Unclassified { .. } => "unclassified",
        Reconciliation::Gap(_) => "pending",
    }
}

fn bad_request(error: impl Into<String>) -> ApiResponse {
    let error = error.into();
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": error, "message": error })),
    )
}

fn status_for(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::WalletNotConnected => StatusCode::UNAUTHORIZED,
        WorkflowError::SessionActive { .. }
        | WorkflowError::NoActiveSession
        | WorkflowError::InvalidTransition { .. } => StatusCode::CONFLICT,
        WorkflowError::UnknownCollection(_) => StatusCode::NOT_FOUND,
        WorkflowError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
        WorkflowError::Proof(_) => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::Provider(ProviderError::UnknownMethod(_)) => StatusCode::BAD_REQUEST,
        WorkflowError::Transaction(TransactionError::CredentialMissing(_)) => StatusCode::FORBIDDEN,
        WorkflowError::Transaction(TransactionError::InsufficientFunds(_)) => StatusCode::PAYMENT_REQUIRED,
        WorkflowError::Transaction(TransactionError::UserRejected(_)) => StatusCode::CONFLICT,
        WorkflowError::ChainSwitch(_)
        | WorkflowError::Transaction(TransactionError::Unclassified(_))
        | WorkflowError::Provider(ProviderError::Session(_))
        | WorkflowError::Contract(_) => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(err: &WorkflowError) -> ApiResponse {
    warn!("request failed: {}", err);
    (
        status_for(err),
        Json(json!({ "error": err.to_string(), "message": err.user_message() })),
    )
}

fn institutional_error_response(err: &InstitutionalError) -> ApiResponse {
    warn!("Tier 2 request failed: {}", err);
    let (status, message) = match err {
        InstitutionalError::UnknownProvider(_) => (StatusCode::NOT_FOUND, err.to_string()),
        InstitutionalError::MissingDocument(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        InstitutionalError::EndpointUnreachable { url, .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Unable to connect to the institution's verification endpoint at {url}. Please try again later."),
        ),
        InstitutionalError::ServiceUnreachable { url, .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Unable to connect to the NFT minting service at {url}. Please ensure the backend server is running."),
        ),
        InstitutionalError::Endpoint { .. }
        | InstitutionalError::MintService { .. }
        | InstitutionalError::Http(_) => (
            StatusCode::BAD_GATEWAY,
            format!("Failed to mint NFT: {err}. Please try again or contact support if the issue persists."),
        ),
    };
    (status, Json(json!({ "error": err.to_string(), "message": message })))
}
