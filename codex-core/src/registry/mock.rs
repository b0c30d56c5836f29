//! In-memory registry for tests.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{MatchQuery, RegistryMatch, RegistryStats, SimilarityRegistry};
use crate::error::{CodexError, Result};

/// Registry returning canned matches.
///
/// Records the last query it received so tests can assert on request shape.
#[derive(Debug)]
pub struct MockRegistry {
    matches: Vec<RegistryMatch>,
    available: bool,
    last_query: Mutex<Option<MatchQuery>>,
}

impl MockRegistry {
    /// A reachable registry with no matches.
    pub fn empty() -> Self {
        Self::with_matches(Vec::new())
    }

    /// A reachable registry that always answers with `matches`.
    pub fn with_matches(matches: Vec<RegistryMatch>) -> Self {
        Self {
            matches,
            available: true,
            last_query: Mutex::new(None),
        }
    }

    /// A registry whose every call fails.
    pub fn unavailable() -> Self {
        Self {
            matches: Vec::new(),
            available: false,
            last_query: Mutex::new(None),
        }
    }

    /// The most recent query passed to [`find_matches`](SimilarityRegistry::find_matches).
    pub fn last_query(&self) -> Option<MatchQuery> {
        self.last_query.lock().ok().and_then(|q| q.clone())
    }
}

#[async_trait]
impl SimilarityRegistry for MockRegistry {
    async fn find_matches(&self, query: &MatchQuery) -> Result<Vec<RegistryMatch>> {
        if let Ok(mut last) = self.last_query.lock() {
            *last = Some(query.clone());
        }
        if !self.available {
            return Err(CodexError::RegistryUnavailable("mock registry offline".into()));
        }
        Ok(self.matches.clone())
    }

    async fn stats(&self) -> Result<RegistryStats> {
        if !self.available {
            return Err(CodexError::RegistryUnavailable("mock registry offline".into()));
        }
        Ok(RegistryStats {
            total_artworks: self.matches.len() as u64,
        })
    }
}
