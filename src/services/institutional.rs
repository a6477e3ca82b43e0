// src/services/institutional.rs
//! Tier 2 institutional KYC submissions.
//!
//! An application goes to the provider's applicant endpoint as a multipart
//! form. Only when the provider accepts it is a mint requested from the
//! mint service, which issues the credential on the applicant's behalf.

use crate::contracts::credential_nft::CredentialContract;
use crate::error::{ContractError, InstitutionalError};
use crate::models::collection::{InstitutionalProvider, Registry};
use crate::services::credential_reconciler::{CredentialReconciler, CredentialView, Reconciliation};
use ethers_core::types::{Address, U256};
use log::{debug, info, warn};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Applicant identity fields sent with every submission.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Applicant {
    pub first_name: String,
    pub last_name: String,
    pub dob: String,
    pub issued_date: String,
    pub valid_until: String,
    pub number: String,
    pub place_of_birth: String,
    pub country: String,
}

impl Applicant {
    /// Fixed sandbox identity accepted by the provider sandboxes.
    pub fn sandbox() -> Self {
        Self {
            first_name: "David".to_string(),
            last_name: "Benedict".to_string(),
            dob: "1987-08-11".to_string(),
            issued_date: "2006-09-17".to_string(),
            valid_until: "2016-06-17".to_string(),
            number: "GBR8412036M1806287".to_string(),
            place_of_birth: "LONDON".to_string(),
            country: "GBR".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Tier2Application {
    pub applicant: Applicant,
    pub recipient: Address,
    pub passport: Option<Document>,
    /// PNG capture from the liveness check.
    pub selfie: Option<Vec<u8>>,
    pub note: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct MintRequest<'a> {
    to: Address,
    first_name: &'a str,
    last_name: &'a str,
    kyc_status: &'a str,
    platform: &'a str,
}

/// Mint service reply. Non-JSON bodies become a bare message.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MintResponse {
    #[serde(default)]
    pub success: bool,
    pub message: Option<String>,
    pub transaction_hash: Option<String>,
    /// Number or decimal string, depending on the service.
    pub token_id: Option<Value>,
}

impl MintResponse {
    pub fn token_id(&self) -> Option<U256> {
        match self.token_id.as_ref()? {
            Value::Number(n) => n.as_u64().map(U256::from),
            Value::String(s) => U256::from_dec_str(s).ok(),
            _ => None,
        }
    }
}

pub struct InstitutionalSubmitter {
    client: Client,
    mint_url: String,
    reconciler: CredentialReconciler<InstitutionalProvider>,
    holdings: RwLock<CredentialView>,
}

impl InstitutionalSubmitter {
    pub fn new(mint_url: impl Into<String>, registry: Arc<Registry<InstitutionalProvider>>) -> Self {
        Self {
            client: Client::new(),
            mint_url: mint_url.into(),
            reconciler: CredentialReconciler::new(registry),
            holdings: RwLock::new(CredentialView::new()),
        }
    }

    pub fn registry(&self) -> &Registry<InstitutionalProvider> {
        self.reconciler.registry()
    }

    pub async fn holdings(&self) -> CredentialView {
        self.holdings.read().await.clone()
    }

    /// Submits an application to `provider_id`, then requests the mint.
    ///
    /// # Errors
    /// - [`InstitutionalError::MissingDocument`] before anything is sent
    /// - [`InstitutionalError::Endpoint`] when the provider refuses; no mint
    ///   is requested
    /// - [`InstitutionalError::EndpointUnreachable`] when the provider cannot
    ///   be reached
    /// - [`InstitutionalError::MintService`] or
    ///   [`InstitutionalError::ServiceUnreachable`] from the mint step
    pub async fn submit(
        &self,
        provider_id: &str,
        application: Tier2Application,
    ) -> Result<MintResponse, InstitutionalError> {
        let provider = self
            .registry()
            .get(provider_id)
            .cloned()
            .ok_or_else(|| InstitutionalError::UnknownProvider(provider_id.to_string()))?;
        let passport = application
            .passport
            .ok_or(InstitutionalError::MissingDocument("passport"))?;
        let selfie = application
            .selfie
            .ok_or(InstitutionalError::MissingDocument("selfie"))?;
        let applicant = &application.applicant;

        let mut form = Form::new()
            .text("firstName", applicant.first_name.clone())
            .text("lastName", applicant.last_name.clone())
            .text("dob", applicant.dob.clone())
            .text("issuedDate", applicant.issued_date.clone())
            .text("validUntil", applicant.valid_until.clone())
            .text("number", applicant.number.clone())
            .text("placeOfBirth", applicant.place_of_birth.clone())
            .text("country", applicant.country.clone())
            .part(
                "passport",
                Part::bytes(passport.bytes)
                    .file_name(passport.file_name)
                    .mime_str("application/pdf")?,
            );
        if let Some(note) = application.note.filter(|n| !n.is_empty()) {
            form = form.text("note", note);
        }
        form = form.part(
            "selfie",
            Part::bytes(selfie).file_name("selfie.png").mime_str("image/png")?,
        );

        let endpoint = &provider.submission_endpoint;
        debug!("submitting Tier 2 application to {}", endpoint);
        let response = self
            .client
            .post(endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| InstitutionalError::EndpointUnreachable {
                url: endpoint.clone(),
                reason: e.to_string(),
            })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    warn!("unable to read error body from {}: {}", endpoint, e);
                    String::new()
                }
            };
            return Err(InstitutionalError::Endpoint { status, body });
        }

        let request = MintRequest {
            to: application.recipient,
            first_name: &applicant.first_name,
            last_name: &applicant.last_name,
            kyc_status: "verified",
            platform: &provider.id,
        };
        let response = self
            .client
            .post(&self.mint_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| InstitutionalError::ServiceUnreachable {
                url: self.mint_url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(InstitutionalError::MintService {
                status: status.as_u16(),
                message: error_message(status, &text),
            });
        }

        let result = serde_json::from_str::<MintResponse>(&text).unwrap_or_else(|_| {
            warn!("mint service replied with non-JSON body");
            MintResponse {
                message: Some(text),
                ..MintResponse::default()
            }
        });
        if let (true, Some(token_id)) = (result.success, result.token_id()) {
            self.holdings.write().await.record(&provider.id, token_id);
        }
        info!(
            "Tier 2 request delivered to {} (tx: {})",
            provider.name,
            result.transaction_hash.as_deref().unwrap_or("-")
        );
        Ok(result)
    }

    /// Reconciles Tier 2 holdings from the wallet's on-chain credential.
    pub async fn refresh_holdings(
        &self,
        contract: &dyn CredentialContract,
        account: Address,
    ) -> Result<Reconciliation, ContractError> {
        let snapshot = self.reconciler.read_snapshot(contract, account).await?;
        let reconciliation = self.reconciler.reconcile(&snapshot);
        self.holdings.write().await.apply(&reconciliation);
        Ok(reconciliation)
    }
}

/// `message` or `error` from a JSON body, else the raw body, else the
/// status reason.
fn error_message(status: StatusCode, body: &str) -> String {
    let fallback = format!("HTTP error! status: {}", status.as_u16());
    match serde_json::from_str::<Value>(body) {
        Ok(value) => ["message", "error"]
            .iter()
            .find_map(|key| value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()))
            .map(str::to_string)
            .unwrap_or(fallback),
        Err(_) if !body.is_empty() => body.to_string(),
        Err(_) => status.canonical_reason().map(str::to_string).unwrap_or(fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::collection::ProviderStatus;
    use crate::testing::MockContract;
    use mockito::{mock, Matcher};
    use serde_json::json;

    fn registry(path: &str) -> Arc<Registry<InstitutionalProvider>> {
        registry_at(format!("{}{}", mockito::server_url(), path))
    }

    fn registry_at(endpoint: String) -> Arc<Registry<InstitutionalProvider>> {
        Arc::new(Registry::new(
            vec![InstitutionalProvider {
                id: "deutsche-bank".into(),
                name: "Deutsche Bank".into(),
                legal_entity: "Deutsche Bank AG".into(),
                description: "sandbox".into(),
                submission_endpoint: endpoint,
                status: ProviderStatus::Live,
            }],
            None,
        ))
    }

    fn application() -> Tier2Application {
        Tier2Application {
            applicant: Applicant::sandbox(),
            recipient: Address::repeat_byte(0xaa),
            passport: Some(Document {
                file_name: "passport.pdf".into(),
                bytes: b"%PDF-1.4".to_vec(),
            }),
            selfie: Some(b"png".to_vec()),
            note: Some("priority".into()),
        }
    }

    #[tokio::test]
    async fn test_submit_then_mint() {
        let applicants = mock("POST", "/db/applicants")
            .match_header("content-type", Matcher::Regex("multipart/form-data".into()))
            .match_body(Matcher::Regex("GBR8412036M1806287".into()))
            .with_status(201)
            .create();
        let mint = mock("POST", "/db/nft/mint")
            .match_body(Matcher::PartialJson(json!({
                "firstName": "David",
                "kycStatus": "verified",
                "platform": "deutsche-bank"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true,"tokenId":"7","transactionHash":"0xfeed"}"#)
            .create();

        let submitter = InstitutionalSubmitter::new(
            format!("{}/db/nft/mint", mockito::server_url()),
            registry("/db/applicants"),
        );
        let result = submitter.submit("deutsche-bank", application()).await.unwrap();

        applicants.assert();
        mint.assert();
        assert_eq!(result.token_id(), Some(U256::from(7)));
        assert_eq!(submitter.holdings().await.get("deutsche-bank"), Some(U256::from(7)));
    }

    #[tokio::test]
    async fn test_endpoint_rejection_skips_mint() {
        let _applicants = mock("POST", "/reject/applicants")
            .with_status(422)
            .with_body("passport unreadable")
            .create();
        let mint = mock("POST", "/reject/nft/mint").expect(0).create();

        let submitter = InstitutionalSubmitter::new(
            format!("{}/reject/nft/mint", mockito::server_url()),
            registry("/reject/applicants"),
        );
        let err = submitter.submit("deutsche-bank", application()).await.unwrap_err();

        assert!(matches!(
            err,
            InstitutionalError::Endpoint { status: 422, ref body } if body == "passport unreadable"
        ));
        mint.assert();
        assert!(submitter.holdings().await.is_empty());
    }

    #[tokio::test]
    async fn test_mint_error_message_from_json() {
        let _applicants = mock("POST", "/minterr/applicants").with_status(200).create();
        let _mint = mock("POST", "/minterr/nft/mint")
            .with_status(409)
            .with_body(r#"{"error":"already minted"}"#)
            .create();

        let submitter = InstitutionalSubmitter::new(
            format!("{}/minterr/nft/mint", mockito::server_url()),
            registry("/minterr/applicants"),
        );
        let err = submitter.submit("deutsche-bank", application()).await.unwrap_err();
        assert!(matches!(
            err,
            InstitutionalError::MintService { status: 409, ref message } if message == "already minted"
        ));
    }

    #[tokio::test]
    async fn test_non_json_success_is_a_message() {
        let _applicants = mock("POST", "/text/applicants").with_status(200).create();
        let _mint = mock("POST", "/text/nft/mint").with_status(200).with_body("queued").create();

        let submitter = InstitutionalSubmitter::new(
            format!("{}/text/nft/mint", mockito::server_url()),
            registry("/text/applicants"),
        );
        let result = submitter.submit("deutsche-bank", application()).await.unwrap();
        assert_eq!(result.message.as_deref(), Some("queued"));
        assert!(!result.success);
        assert!(result.token_id().is_none());
        assert!(submitter.holdings().await.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_mint_service() {
        let _applicants = mock("POST", "/down/applicants").with_status(200).create();
        let submitter = InstitutionalSubmitter::new("http://127.0.0.1:1/api/nft/mint", registry("/down/applicants"));
        assert!(matches!(
            submitter.submit("deutsche-bank", application()).await,
            Err(InstitutionalError::ServiceUnreachable { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_not_the_mint_service() {
        let mint = mock("POST", "/enddown/nft/mint").expect(0).create();
        let submitter = InstitutionalSubmitter::new(
            format!("{}/enddown/nft/mint", mockito::server_url()),
            registry_at("http://127.0.0.1:1/applicants".into()),
        );
        let err = submitter.submit("deutsche-bank", application()).await.unwrap_err();
        assert!(matches!(
            err,
            InstitutionalError::EndpointUnreachable { ref url, .. } if url == "http://127.0.0.1:1/applicants"
        ));
        mint.assert();
    }

    #[tokio::test]
    async fn test_missing_documents_fail_before_sending() {
        let submitter = InstitutionalSubmitter::new("http://127.0.0.1:1/mint", registry("/unused"));
        let mut app = application();
        app.selfie = None;
        assert!(matches!(
            submitter.submit("deutsche-bank", app).await,
            Err(InstitutionalError::MissingDocument("selfie"))
        ));
        assert!(matches!(
            submitter.submit("hsbc", application()).await,
            Err(InstitutionalError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_error_message_fallbacks() {
        assert_eq!(error_message(StatusCode::BAD_REQUEST, r#"{"message":"bad"}"#), "bad");
        assert_eq!(error_message(StatusCode::BAD_REQUEST, r#"{"other":1}"#), "HTTP error! status: 400");
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "upstream down"), "upstream down");
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, ""), "Bad Gateway");
    }

    #[tokio::test]
    async fn test_tier2_reconciliation_from_chain() {
        let submitter = InstitutionalSubmitter::new("http://127.0.0.1:1/mint", registry("/unused"));
        let contract = MockContract::holding(U256::from(12), "deutsche-bank");
        submitter
            .refresh_holdings(&contract, Address::repeat_byte(0xaa))
            .await
            .unwrap();
        assert_eq!(submitter.holdings().await.get("deutsche-bank"), Some(U256::from(12)));

        let other = MockContract::holding(U256::from(13), "coinbase");
        assert!(matches!(
            submitter.refresh_holdings(&other, Address::repeat_byte(0xaa)).await.unwrap(),
            Reconciliation::Unclassified { .. }
        ));
    }
}
