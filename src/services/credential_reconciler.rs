// src/services/credential_reconciler.rs
//! Derives which credential a wallet holds from chain reads.
//!
//! Holdings are never persisted. They are rebuilt from a [`ChainSnapshot`]
//! whenever the account changes or a mint is confirmed, and classification of
//! the stored platform string goes through [`classify`].

use crate::contracts::credential_nft::{CredentialAttributes, CredentialContract};
use crate::error::ContractError;
use crate::models::collection::Registry;
use crate::services::platform_mapper::{classify, Classifiable};
use ethers_core::types::{Address, U256};
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Wallet-scoped credential reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainSnapshot {
    pub has_credential: bool,
    /// `None` until a non-zero token id is readable.
    pub token_id: Option<U256>,
    pub attributes: Option<CredentialAttributes>,
}

/// Chain state present but not yet complete enough to classify.
///
/// Not a failure: the next read is expected to fill it in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationGap {
    TokenPending,
    AttributesPending { token_id: U256 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    Held { collection_id: String, token_id: U256 },
    NotHeld,
    /// A token exists but its platform matches nothing in the registry.
    Unclassified { token_id: U256, platform: String },
    Gap(ReconciliationGap),
}

pub struct CredentialReconciler<T> {
    registry: Arc<Registry<T>>,
}

impl<T: Classifiable> CredentialReconciler<T> {
    pub fn new(registry: Arc<Registry<T>>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry<T> {
        &self.registry
    }

    /// Pure function of the snapshot and the registry.
    pub fn reconcile(&self, snapshot: &ChainSnapshot) -> Reconciliation {
        if !snapshot.has_credential {
            return Reconciliation::NotHeld;
        }
        let token_id = match snapshot.token_id {
            Some(id) if !id.is_zero() => id,
            _ => return Reconciliation::Gap(ReconciliationGap::TokenPending),
        };
        let attributes = match &snapshot.attributes {
            Some(attributes) => attributes,
            None => return Reconciliation::Gap(ReconciliationGap::AttributesPending { token_id }),
        };

        match classify(&attributes.platform, &self.registry) {
            Some(entry) => Reconciliation::Held {
                collection_id: entry.id().to_string(),
                token_id,
            },
            None => Reconciliation::Unclassified {
                token_id,
                platform: attributes.platform.clone(),
            },
        }
    }

    /// Reads the snapshot for `account`.
    ///
    /// Ownership and token id failures propagate. A failed attribute read
    /// leaves the attributes empty so the holding is withheld, not guessed.
    pub async fn read_snapshot(
        &self,
        contract: &dyn CredentialContract,
        account: Address,
    ) -> Result<ChainSnapshot, ContractError> {
        let has_credential = contract.has_credential(account).await?;
        if !has_credential {
            return Ok(ChainSnapshot::default());
        }

        let token_id = contract.token_id_of(account).await?;
        if token_id.is_zero() {
            debug!("{:?} holds a credential but no token id is readable yet", account);
            return Ok(ChainSnapshot {
                has_credential,
                ..ChainSnapshot::default()
            });
        }

        let attributes = match contract.credential_attributes(token_id).await {
            Ok(attributes) => Some(attributes),
            Err(e) => {
                warn!("attributes for token {} unavailable: {}", token_id, e);
                None
            }
        };
        Ok(ChainSnapshot {
            has_credential,
            token_id: Some(token_id),
            attributes,
        })
    }
}

/// Read-only mapping of collection id to held token id.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct CredentialView {
    holdings: BTreeMap<String, U256>,
}

impl CredentialView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a reconciliation result into the view.
    ///
    /// Only `Held` changes anything; gaps and misses keep what is already
    /// known. Returns whether the view changed.
    pub fn apply(&mut self, reconciliation: &Reconciliation) -> bool {
        match reconciliation {
            Reconciliation::Held {
                collection_id,
                token_id,
            } => self.record(collection_id, *token_id),
            _ => false,
        }
    }

    pub fn record(&mut self, collection_id: &str, token_id: U256) -> bool {
        self.holdings.insert(collection_id.to_string(), token_id) != Some(token_id)
    }

    /// Forgets everything, e.g. when the connected account changes.
    pub fn reset(&mut self) {
        self.holdings.clear();
    }

    pub fn get(&self, collection_id: &str) -> Option<U256> {
        self.holdings.get(collection_id).copied()
    }

    pub fn holdings(&self) -> &BTreeMap<String, U256> {
        &self.holdings
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    /// First registry entry not held yet.
    pub fn next_unverified<'a, T: Classifiable>(&self, registry: &'a Registry<T>) -> Option<&'a T> {
        registry
            .entries()
            .iter()
            .find(|entry| !self.holdings.contains_key(entry.id()))
    }

    pub fn remaining<T: Classifiable>(&self, registry: &Registry<T>) -> usize {
        registry
            .entries()
            .iter()
            .filter(|entry| !self.holdings.contains_key(entry.id()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::collection::{institutional_providers, tier1_collections};
    use crate::testing::MockContract;

    fn attributes(platform: &str) -> CredentialAttributes {
        CredentialAttributes {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            kyc_status: "verified".into(),
            platform: platform.into(),
            verified_address: Address::repeat_byte(7),
            minted_at: U256::from(1_700_000_000u64),
        }
    }

    fn snapshot(platform: Option<&str>) -> ChainSnapshot {
        ChainSnapshot {
            has_credential: true,
            token_id: Some(U256::from(5)),
            attributes: platform.map(attributes),
        }
    }

    #[test]
    fn test_held_credential_is_classified() {
        let reconciler = CredentialReconciler::new(tier1_collections());
        assert_eq!(
            reconciler.reconcile(&snapshot(Some("coinbase"))),
            Reconciliation::Held {
                collection_id: "coinbase-kyc".into(),
                token_id: U256::from(5)
            }
        );
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let reconciler = CredentialReconciler::new(tier1_collections());
        let snap = snapshot(Some("x"));
        let mut first = CredentialView::new();
        first.apply(&reconciler.reconcile(&snap));
        let mut second = first.clone();
        assert!(!second.apply(&reconciler.reconcile(&snap)));
        assert_eq!(first, second);
        assert_eq!(first.get("x-username"), Some(U256::from(5)));
    }

    #[test]
    fn test_missing_attributes_withhold_holding() {
        let reconciler = CredentialReconciler::new(tier1_collections());
        let result = reconciler.reconcile(&snapshot(None));
        assert_eq!(
            result,
            Reconciliation::Gap(ReconciliationGap::AttributesPending {
                token_id: U256::from(5)
            })
        );
        let mut view = CredentialView::new();
        assert!(!view.apply(&result));
        assert!(view.is_empty());
    }

    #[test]
    fn test_zero_token_is_pending() {
        let reconciler = CredentialReconciler::new(tier1_collections());
        let snap = ChainSnapshot {
            has_credential: true,
            token_id: Some(U256::zero()),
            attributes: None,
        };
        assert_eq!(
            reconciler.reconcile(&snap),
            Reconciliation::Gap(ReconciliationGap::TokenPending)
        );
    }

    #[test]
    fn test_no_credential() {
        let reconciler = CredentialReconciler::new(tier1_collections());
        assert_eq!(reconciler.reconcile(&ChainSnapshot::default()), Reconciliation::NotHeld);
    }

    #[test]
    fn test_institutional_unknown_platform_is_unclassified() {
        let reconciler = CredentialReconciler::new(institutional_providers());
        assert_eq!(
            reconciler.reconcile(&snapshot(Some("coinbase"))),
            Reconciliation::Unclassified {
                token_id: U256::from(5),
                platform: "coinbase".into()
            }
        );
        assert!(matches!(
            reconciler.reconcile(&snapshot(Some("deutsche-bank"))),
            Reconciliation::Held { ref collection_id, .. } if collection_id == "deutsche-bank"
        ));
    }

    #[test]
    fn test_next_unverified_and_remaining() {
        let registry = tier1_collections();
        let mut view = CredentialView::new();
        assert_eq!(view.remaining(&registry), 4);
        view.record("coinbase-kyc", U256::one());
        assert_eq!(view.next_unverified(&registry).unwrap().id, "binance-kyc");
        assert_eq!(view.remaining(&registry), 3);
        view.reset();
        assert_eq!(view.remaining(&registry), 4);
    }

    #[tokio::test]
    async fn test_read_snapshot_tolerates_attribute_failure() {
        let contract = MockContract::holding(U256::from(9), "binance");
        contract.fail_attribute_reads();
        let reconciler = CredentialReconciler::new(tier1_collections());
        let snap = reconciler
            .read_snapshot(&contract, Address::repeat_byte(1))
            .await
            .unwrap();
        assert!(snap.has_credential);
        assert_eq!(snap.token_id, Some(U256::from(9)));
        assert!(snap.attributes.is_none());
    }

    #[tokio::test]
    async fn test_read_snapshot_without_credential() {
        let contract = MockContract::empty();
        let reconciler = CredentialReconciler::new(tier1_collections());
        let snap = reconciler
            .read_snapshot(&contract, Address::repeat_byte(1))
            .await
            .unwrap();
        assert_eq!(snap, ChainSnapshot::default());
    }
}
