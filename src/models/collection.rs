// src/models/collection.rs
//! Static registries of verifiable credential collections.
//!
//! Tier 1 collections are backed by the credential NFT contract and verified
//! through the attestation provider. Tier 2 institutional providers accept
//! document submissions out of band; their holdings are inferred from the
//! platform string stored with the minted token.

use crate::services::platform_mapper::{to_platform, Classifiable};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A Tier 1 credential collection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationCollection {
    pub id: String,
    pub display_name: String,
    pub issuer: String,
    /// Provider method used to start verification (`coinbase`, `twitter`, ...).
    pub verification_method: String,
    pub description: String,
}

impl VerificationCollection {
    fn new(id: &str, display_name: &str, issuer: &str, method: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            issuer: issuer.to_string(),
            verification_method: method.to_string(),
            description: description.to_string(),
        }
    }

    /// Platform string recorded on-chain for credentials of this collection.
    pub fn platform(&self) -> String {
        to_platform(&self.verification_method)
    }
}

impl Classifiable for VerificationCollection {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn platform_aliases(&self) -> Vec<String> {
        vec![self.platform()]
    }
}

/// Onboarding status of an institutional provider.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Live,
    Pilot,
    Requested,
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderStatus::Live => "Live",
            ProviderStatus::Pilot => "Pilot",
            ProviderStatus::Requested => "Requested",
        };
        f.write_str(s)
    }
}

/// A Tier 2 institutional KYC provider.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstitutionalProvider {
    pub id: String,
    pub name: String,
    pub legal_entity: String,
    pub description: String,
    /// Applicant submission URL.
    pub submission_endpoint: String,
    pub status: ProviderStatus,
}

impl Classifiable for InstitutionalProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

/// An ordered, immutable registry with an optional default entry.
///
/// Order matters: classification returns the first match.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    entries: Vec<T>,
    default_id: Option<String>,
}

impl<T: Classifiable> Registry<T> {
    pub fn new(entries: Vec<T>, default_id: Option<&str>) -> Self {
        Self {
            entries,
            default_id: default_id.map(str::to_string),
        }
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.entries.iter().find(|entry| entry.id() == id)
    }

    /// The bucket used when nothing else matches.
    pub fn default_entry(&self) -> Option<&T> {
        self.default_id.as_deref().and_then(|id| self.get(id))
    }
}

static TIER1_COLLECTIONS: Lazy<Arc<Registry<VerificationCollection>>> = Lazy::new(|| {
    Arc::new(Registry::new(
        vec![
            VerificationCollection::new(
                "coinbase-kyc",
                "Coinbase KYC Verified",
                "Coinbase",
                "coinbase",
                "Verify your identity using Coinbase KYC credentials",
            ),
            VerificationCollection::new(
                "binance-kyc",
                "Binance KYC Verified",
                "Binance",
                "binance",
                "Verify your identity using Binance KYC credentials",
            ),
            VerificationCollection::new(
                "x-username",
                "X Username Verified",
                "X (Twitter)",
                "x",
                "Verify your X (Twitter) username",
            ),
            VerificationCollection::new(
                "example-verification",
                "Example Verification",
                "Example",
                "example",
                "Example verification provider for testing purposes",
            ),
        ],
        Some("example-verification"),
    ))
});

static INSTITUTIONAL_PROVIDERS: Lazy<Arc<Registry<InstitutionalProvider>>> = Lazy::new(|| {
    let provider = |id: &str, name: &str, legal: &str, description: &str, endpoint: &str, status| {
        InstitutionalProvider {
            id: id.to_string(),
            name: name.to_string(),
            legal_entity: legal.to_string(),
            description: description.to_string(),
            submission_endpoint: endpoint.to_string(),
            status,
        }
    };
    Arc::new(Registry::new(
        vec![
            provider(
                "deutsche-bank",
                "Deutsche Bank",
                "Deutsche Bank AG",
                "Rayls-local sandbox for German Tier 2 approvals.",
                "http://localhost:5000/api/applicants",
                ProviderStatus::Live,
            ),
            provider(
                "jp-morgan",
                "J.P. Morgan",
                "J.P. Morgan Chase & Co.",
                "Institutional onboarding for USD liquidity programs.",
                "http://localhost:5000/api/jpm/applicants",
                ProviderStatus::Pilot,
            ),
            provider(
                "dbs-bank",
                "DBS Bank",
                "DBS Group Holdings",
                "APAC treasury partner with MAS-aligned checks.",
                "http://localhost:5000/api/dbs/applicants",
                ProviderStatus::Requested,
            ),
        ],
        None,
    ))
});

/// Tier 1 collections, with `example-verification` as the default bucket.
pub fn tier1_collections() -> Arc<Registry<VerificationCollection>> {
    Arc::clone(&TIER1_COLLECTIONS)
}

/// Tier 2 institutional providers. No default bucket.
pub fn institutional_providers() -> Arc<Registry<InstitutionalProvider>> {
    Arc::clone(&INSTITUTIONAL_PROVIDERS)
}
