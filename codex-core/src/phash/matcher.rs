//! Fingerprint comparison, confidence tiers, and registry lookups.

use serde::Serialize;
use tracing::{debug, instrument, warn};

use super::perceptual::PerceptualHash;
use crate::error::{CodexError, Result};
use crate::registry::{MatchQuery, RegistryMatch, SimilarityRegistry};

/// Default maximum Hamming distance sent to the registry.
pub const DEFAULT_THRESHOLD: u32 = 10;

/// Default maximum number of candidates.
pub const DEFAULT_LIMIT: usize = 5;

/// Upper bound on requested candidates.
pub const MAX_LIMIT: usize = 100;

/// Highest distance classified as `High`.
const HIGH_MAX_DISTANCE: u32 = 3;

/// Highest distance classified as `Medium`.
const MEDIUM_MAX_DISTANCE: u32 = 7;

/// How strongly a result identifies an artwork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
    None,
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::None => "none",
        };
        f.write_str(label)
    }
}

/// A registry match, normalized and re-scored locally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub id: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    /// Hamming distance to the query hash.
    pub distance: u32,
    /// `1 - distance / bits`, in `[0, 1]`.
    pub similarity: f64,
    /// Tier derived from `distance`; any tier the registry asserted is ignored.
    pub confidence: ConfidenceTier,
}

/// Compute the Hamming distance between two hex fingerprints.
///
/// Both strings must have the same length. Each pair of nibbles is XORed
/// and the set bits summed, so the result is at most `4 × length`.
pub fn hamming_distance(a: &str, b: &str) -> Result<u32> {
    if a.len() != b.len() {
        return Err(CodexError::IncompatibleHashLengths {
            left: a.len(),
            right: b.len(),
        });
    }

    a.chars().zip(b.chars()).try_fold(0u32, |acc, (x, y)| {
        let x = nibble(x)?;
        let y = nibble(y)?;
        Ok(acc + (x ^ y).count_ones())
    })
}

fn nibble(c: char) -> Result<u32> {
    c.to_digit(16)
        .ok_or_else(|| CodexError::InvalidHash(format!("character {c:?} is not hex")))
}

/// Map a distance to a confidence tier.
///
/// `0..=3` is high, `4..=7` medium, anything further low. Only meaningful
/// when at least one candidate exists; see [`classify_best`].
pub fn classify(distance: u32) -> ConfidenceTier {
    match distance {
        0..=HIGH_MAX_DISTANCE => ConfidenceTier::High,
        d if d <= MEDIUM_MAX_DISTANCE => ConfidenceTier::Medium,
        _ => ConfidenceTier::Low,
    }
}

/// Tier for a candidate list: the closest candidate's tier, or `None`.
pub fn classify_best(candidates: &[MatchCandidate]) -> ConfidenceTier {
    candidates
        .iter()
        .map(|c| c.distance)
        .min()
        .map_or(ConfidenceTier::None, classify)
}

/// Turn raw registry records into ranked candidates.
///
/// Records without an identifier or distance, or with a distance larger
/// than the hash can produce, are dropped. The rest are stably sorted by
/// distance and truncated to `limit`.
pub fn normalize_matches(
    raw: Vec<RegistryMatch>,
    bit_len: u32,
    limit: usize,
) -> Vec<MatchCandidate> {
    let mut candidates: Vec<MatchCandidate> = raw
        .into_iter()
        .filter_map(|record| {
            let id = record.id.filter(|id| !id.trim().is_empty());
            let (Some(id), Some(distance)) = (id, record.distance) else {
                warn!("Dropping registry match without id or distance");
                return None;
            };
            if distance > bit_len {
                warn!(
                    id = %id,
                    distance,
                    bit_len,
                    "Dropping registry match with out-of-range distance"
                );
                return None;
            }
            Some(MatchCandidate {
                id,
                title: record.title,
                artist: record.artist,
                distance,
                similarity: 1.0 - f64::from(distance) / f64::from(bit_len.max(1)),
                confidence: classify(distance),
            })
        })
        .collect();

    candidates.sort_by_key(|c| c.distance);
    candidates.truncate(limit);
    candidates
}

/// Query shaping and response normalization for the similarity registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashMatcher {
    threshold: u32,
    limit: usize,
}

impl Default for HashMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl HashMatcher {
    /// Create a matcher. `limit` is capped at [`MAX_LIMIT`].
    pub fn new(threshold: u32, limit: usize) -> Self {
        Self {
            threshold,
            limit: limit.min(MAX_LIMIT),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// The request sent to the registry for `hash`.
    pub fn build_query(&self, hash: &PerceptualHash) -> MatchQuery {
        MatchQuery {
            hash: hash.as_hex().to_string(),
            threshold: self.threshold,
            limit: self.limit,
        }
    }

    /// Look up `hash`, surfacing registry failures.
    #[instrument(
        level = "debug",
        skip_all,
        fields(hash = %hash, threshold = self.threshold, limit = self.limit)
    )]
    pub async fn try_query<R>(
        &self,
        hash: &PerceptualHash,
        registry: &R,
    ) -> Result<Vec<MatchCandidate>>
    where
        R: SimilarityRegistry + ?Sized,
    {
        let query = self.build_query(hash);
        let raw = registry.find_matches(&query).await?;
        let received = raw.len();

        let candidates = normalize_matches(raw, hash.bit_len(), self.limit);
        debug!(received, kept = candidates.len(), "Normalized registry matches");

        Ok(candidates)
    }

    /// Look up `hash`; a failed lookup yields no candidates.
    pub async fn query<R>(&self, hash: &PerceptualHash, registry: &R) -> Vec<MatchCandidate>
    where
        R: SimilarityRegistry + ?Sized,
    {
        match self.try_query(hash, registry).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "Registry query failed, treating as no matches");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MockRegistry;

    fn raw(id: &str, distance: u32) -> RegistryMatch {
        RegistryMatch {
            id: Some(id.to_string()),
            title: Some(format!("Title {id}")),
            artist: Some("Artist".to_string()),
            distance: Some(distance),
            ..Default::default()
        }
    }

    #[test]
    fn test_hamming_distance_identical() {
        let h = "deadbeefcafebabe";
        assert_eq!(hamming_distance(h, h).unwrap(), 0);
    }

    #[test]
    fn test_hamming_distance_symmetric() {
        let a = "0123456789abcdef";
        let b = "fedcba9876543210";
        assert_eq!(
            hamming_distance(a, b).unwrap(),
            hamming_distance(b, a).unwrap()
        );
    }

    #[test]
    fn test_hamming_distance_all_bits() {
        let zeros = "0".repeat(64);
        let ones = "f".repeat(64);
        assert_eq!(hamming_distance(&zeros, &ones).unwrap(), 256);
    }

    #[test]
    fn test_hamming_distance_counts_exact_bits() {
        // 0x0 vs 0x7 differs in 3 bits, 0x8 vs 0x0 in 1
        assert_eq!(hamming_distance("08", "70").unwrap(), 4);
    }

    #[test]
    fn test_hamming_distance_case_insensitive_digits() {
        assert_eq!(hamming_distance("AB", "ab").unwrap(), 0);
    }

    #[test]
    fn test_hamming_distance_length_mismatch() {
        assert!(matches!(
            hamming_distance("abcd", "abc"),
            Err(CodexError::IncompatibleHashLengths { left: 4, right: 3 })
        ));
    }

    #[test]
    fn test_hamming_distance_rejects_non_hex() {
        assert!(matches!(
            hamming_distance("zz", "00"),
            Err(CodexError::InvalidHash(_))
        ));
    }

    #[test]
    fn test_classify_boundaries() {
        assert_eq!(classify(0), ConfidenceTier::High);
        assert_eq!(classify(3), ConfidenceTier::High);
        assert_eq!(classify(4), ConfidenceTier::Medium);
        assert_eq!(classify(7), ConfidenceTier::Medium);
        assert_eq!(classify(8), ConfidenceTier::Low);
        assert_eq!(classify(200), ConfidenceTier::Low);
    }

    #[test]
    fn test_classify_best_empty_is_none() {
        assert_eq!(classify_best(&[]), ConfidenceTier::None);
    }

    #[test]
    fn test_normalize_sorts_truncates_and_scores() {
        let candidates = normalize_matches(
            vec![raw("c", 9), raw("a", 2), raw("b", 5), raw("d", 2)],
            256,
            3,
        );
        let ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d", "b"]);
        assert_eq!(candidates[0].confidence, ConfidenceTier::High);
        assert_eq!(candidates[2].confidence, ConfidenceTier::Medium);
        assert!((candidates[2].similarity - (1.0 - 5.0 / 256.0)).abs() < 1e-12);
        assert_eq!(classify_best(&candidates), ConfidenceTier::High);
    }

    #[test]
    fn test_normalize_ignores_server_confidence() {
        let mut record = raw("x", 9);
        record.confidence = Some("high".to_string());
        let candidates = normalize_matches(vec![record], 256, 5);
        assert_eq!(candidates[0].confidence, ConfidenceTier::Low);
    }

    #[test]
    fn test_normalize_drops_incomplete_and_out_of_range() {
        let missing_id = RegistryMatch {
            distance: Some(1),
            ..Default::default()
        };
        let missing_distance = RegistryMatch {
            id: Some("y".into()),
            ..Default::default()
        };
        let candidates = normalize_matches(
            vec![missing_id, missing_distance, raw("far", 300), raw("ok", 1)],
            256,
            5,
        );
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "ok");
    }

    #[test]
    fn test_matcher_caps_limit() {
        assert_eq!(HashMatcher::new(10, 1_000).limit(), MAX_LIMIT);
        let matcher = HashMatcher::default();
        assert_eq!(matcher.threshold(), 10);
        assert_eq!(matcher.limit(), 5);
    }

    #[test]
    fn test_build_query_carries_defaults() {
        let hash = PerceptualHash::from_hex(&"a".repeat(64)).unwrap();
        let query = HashMatcher::default().build_query(&hash);
        assert_eq!(query.hash, "a".repeat(64));
        assert_eq!(query.threshold, 10);
        assert_eq!(query.limit, 5);
    }

    #[tokio::test]
    async fn test_query_normalizes_mock_response() {
        let hash = PerceptualHash::from_hex(&"0".repeat(64)).unwrap();
        let registry = MockRegistry::with_matches(vec![raw("b", 6), raw("a", 1)]);

        let candidates = HashMatcher::default().query(&hash, &registry).await;
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].id, "a");
        assert_eq!(registry.last_query().unwrap().threshold, 10);
    }

    #[tokio::test]
    async fn test_query_failure_yields_empty() {
        let hash = PerceptualHash::from_hex(&"0".repeat(64)).unwrap();
        let registry = MockRegistry::unavailable();

        assert!(HashMatcher::default().query(&hash, &registry).await.is_empty());
        assert!(matches!(
            HashMatcher::default().try_query(&hash, &registry).await,
            Err(CodexError::RegistryUnavailable(_))
        ));
    }
}
