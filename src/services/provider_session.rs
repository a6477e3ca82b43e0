// src/services/provider_session.rs
//! Attestation provider sessions.
//!
//! The provider SDK itself stays outside this crate. A session descriptor is
//! handed to the client, which drives the mobile flow and eventually posts
//! the raw proof back to the workflow.

use crate::error::ProviderError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

/// Opaque handle for one provider round-trip.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    pub provider_id: String,
    pub application_id: String,
    pub method: String,
    pub requested_at: DateTime<Utc>,
}

/// Starts and aborts attestation sessions.
#[async_trait]
pub trait ProofProvider: Send + Sync {
    async fn start_session(&self, method: &str) -> Result<SessionDescriptor, ProviderError>;

    async fn cancel_session(&self, descriptor: &SessionDescriptor);
}

/// Resolves a verification method to the provider id it is attested by.
pub fn provider_id_for(method: &str) -> Result<&'static str, ProviderError> {
    match method {
        "binance" => Ok("2b22db5c-78d9-4d82-84f0-a9e0a4ed0470"),
        "coinbase" => Ok("285a345c-c6a6-4b9f-9e1e-23432082c0a8"),
        "x" | "twitter" => Ok("2523321f-f61d-4db3-b4e6-e665af5efdc1"),
        "example" => Ok("example"),
        other => Err(ProviderError::UnknownMethod(other.to_string())),
    }
}

/// Builds session descriptors for the configured application.
#[derive(Debug, Clone)]
pub struct ProviderSessionFactory {
    application_id: String,
}

impl ProviderSessionFactory {
    pub fn new(application_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
        }
    }

    pub fn describe(&self, method: &str) -> Result<SessionDescriptor, ProviderError> {
        Ok(SessionDescriptor {
            provider_id: provider_id_for(method)?.to_string(),
            application_id: self.application_id.clone(),
            method: method.to_string(),
            requested_at: Utc::now(),
        })
    }
}

#[async_trait]
impl ProofProvider for ProviderSessionFactory {
    async fn start_session(&self, method: &str) -> Result<SessionDescriptor, ProviderError> {
        let descriptor = self.describe(method)?;
        info!(
            "provider session requested for `{}` ({})",
            descriptor.method, descriptor.provider_id
        );
        Ok(descriptor)
    }

    async fn cancel_session(&self, descriptor: &SessionDescriptor) {
        info!("provider session for `{}` discarded", descriptor.method);
    }
}
