//! Remote similarity registry.
//!
//! Nearest-neighbour search over perceptual hashes happens server-side; the
//! core only shapes the request and normalizes what comes back. Registry
//! implementations are handed to the matcher and resolver explicitly.
//!
//! ## Implementations
//!
//! - [`HttpRegistry`] - the `/alex/match` and `/alex/stats` HTTP API
//! - [`MockRegistry`] - canned responses for tests
//!
//! ## Example
//!
//! ```no_run
//! use codex_core::registry::{HttpRegistry, MatchQuery, SimilarityRegistry};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = HttpRegistry::new()?;
//! let matches = registry.find_matches(&MatchQuery::new("00ff".repeat(16))).await?;
//! println!("{} raw matches", matches.len());
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "network")]
mod http;
mod mock;

#[cfg(feature = "network")]
pub use http::{HttpRegistry, RegistryConfig};
pub use mock::MockRegistry;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;
use crate::phash::matcher::{DEFAULT_LIMIT, DEFAULT_THRESHOLD};

/// Trait for perceptual-hash registries.
///
/// Implementations must be thread-safe (`Send + Sync`) and hold no state
/// shared between verification requests beyond their own connection pool.
#[async_trait]
pub trait SimilarityRegistry: Send + Sync {
    /// Records within `query.threshold` bits of `query.hash`.
    ///
    /// Any failure (transport, non-2xx, undecodable body) is an error; the
    /// matcher decides whether to degrade it to an empty list.
    async fn find_matches(&self, query: &MatchQuery) -> Result<Vec<RegistryMatch>>;

    /// Registry size, for display only.
    async fn stats(&self) -> Result<RegistryStats>;
}

/// A similarity request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchQuery {
    pub hash: String,
    pub threshold: u32,
    pub limit: usize,
}

impl MatchQuery {
    /// A query with the default threshold (10) and limit (5).
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            threshold: DEFAULT_THRESHOLD,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// A match record as the registry reports it.
///
/// Every field is optional; validation happens during normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryMatch {
    #[serde(
        default,
        alias = "artifact_id",
        alias = "artifactId",
        deserialize_with = "string_or_number"
    )]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default, alias = "hamming_distance")]
    pub distance: Option<u32>,
    #[serde(default)]
    pub similarity: Option<f64>,
    /// Server-asserted tier. Never trusted; kept for diagnostics.
    #[serde(default)]
    pub confidence: Option<String>,
}

/// Response of the stats endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_artworks: u64,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(Option::<Id>::deserialize(deserializer)?.map(|id| match id {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_match_aliases() {
        let record: RegistryMatch = serde_json::from_value(json!({
            "artifact_id": "GCX-7",
            "title": "Dawn",
            "hamming_distance": 4,
            "confidence": "high"
        }))
        .unwrap();
        assert_eq!(record.id.as_deref(), Some("GCX-7"));
        assert_eq!(record.distance, Some(4));
        assert_eq!(record.artist, None);
    }

    #[test]
    fn test_registry_match_numeric_id() {
        let record: RegistryMatch =
            serde_json::from_value(json!({ "id": 42, "distance": 0 })).unwrap();
        assert_eq!(record.id.as_deref(), Some("42"));
    }

    #[test]
    fn test_registry_match_null_fields() {
        let record: RegistryMatch =
            serde_json::from_value(json!({ "id": null, "title": null })).unwrap();
        assert_eq!(record, RegistryMatch::default());
    }

    #[test]
    fn test_match_query_defaults() {
        let query = MatchQuery::new("abcd");
        assert_eq!(query.threshold, 10);
        assert_eq!(query.limit, 5);
    }
}
