// src/services/platform_mapper.rs
//! Verification method ⇄ platform string mapping.
//!
//! The contract stores a short platform string with every minted credential.
//! [`to_platform`] produces it from a verification method; [`classify`] reads
//! it back and decides which registry entry a held token belongs to.

use crate::models::collection::Registry;

/// Anything a platform string can be classified into.
pub trait Classifiable {
    fn id(&self) -> &str;

    fn display_name(&self) -> &str;

    /// Exact platform strings that identify this entry.
    fn platform_aliases(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Maps a verification method to its contract platform string.
///
/// `twitter` is stored as `x`; every other method, known or not, passes
/// through unchanged.
pub fn to_platform(method: &str) -> String {
    match method {
        "twitter" => "x".to_string(),
        other => other.to_string(),
    }
}

/// Classifies an on-chain platform string against a registry.
///
/// Matching is case-insensitive and runs in registry order:
/// 1. an entry whose id, or one of its exact platform aliases, equals the input
/// 2. an entry whose id or display name is contained in the input
/// 3. the registry's default entry
///
/// Returns `None` for an empty input, or when nothing matches and the
/// registry has no default.
pub fn classify<'a, T: Classifiable>(platform: &str, registry: &'a Registry<T>) -> Option<&'a T> {
    let platform = platform.trim().to_lowercase();
    if platform.is_empty() {
        return None;
    }

    let exact = registry.entries().iter().find(|entry| {
        entry.id().to_lowercase() == platform
            || entry
                .platform_aliases()
                .iter()
                .any(|alias| alias.to_lowercase() == platform)
    });
    if exact.is_some() {
        return exact;
    }

    registry
        .entries()
        .iter()
        .find(|entry| {
            let id = entry.id().to_lowercase();
            let name = entry.display_name().to_lowercase();
            (!id.is_empty() && platform.contains(&id)) || (!name.is_empty() && platform.contains(&name))
        })
        .or_else(|| registry.default_entry())
}
