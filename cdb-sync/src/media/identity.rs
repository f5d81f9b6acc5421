//! Content-addressed media identity
//!
//! `id = uuid_v5(uuid_v5(NAMESPACE_DNS, host), normalized_uri)`: a pure
//! function of the normalized URI, so re-importing the same reference always
//! lands on the same media object.

use cdb_common::uuid_utils;
use regex::Regex;
use url::Url;
use uuid::Uuid;

/// Name of the capture group carrying an embedded identifier
pub const UUID_GROUP: &str = "uuid";

/// Hash-based identity of a normalized URI
pub fn derive_asset_id(normalized: &Url) -> Uuid {
    let host = normalized.host_str().unwrap_or_default();
    let namespace = uuid_utils::namespaced(&Uuid::NAMESPACE_DNS, host);
    uuid_utils::namespaced(&namespace, normalized.as_str())
}

/// Identity derivation with an optional pattern for URIs that already embed
/// their media object id (images uploaded locally and then copied into the
/// legacy system)
#[derive(Debug, Clone, Default)]
pub struct IdentityScheme {
    pattern: Option<Regex>,
}

impl IdentityScheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// The pattern must define a named group `uuid`
    pub fn with_pattern(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(pattern)?;
        if !regex.capture_names().flatten().any(|n| n == UUID_GROUP) {
            return Err(regex::Error::Syntax(format!(
                "identifier pattern has no named group '{}'",
                UUID_GROUP
            )));
        }
        Ok(Self {
            pattern: Some(regex),
        })
    }

    pub fn derive(&self, normalized: &Url) -> Uuid {
        self.embedded_id(normalized)
            .unwrap_or_else(|| derive_asset_id(normalized))
    }

    fn embedded_id(&self, normalized: &Url) -> Option<Uuid> {
        let captures = self.pattern.as_ref()?.captures(normalized.as_str())?;
        let candidate = captures.name(UUID_GROUP)?.as_str();
        match uuid_utils::parse(candidate) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(
                    uri = %normalized,
                    candidate = %candidate,
                    error = %e,
                    "Identifier pattern matched a non-UUID, hashing the URI instead"
                );
                None
            }
        }
    }
}
