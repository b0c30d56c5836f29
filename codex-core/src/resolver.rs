//! Fallback-chained provenance resolution.
//!
//! The resolver runs a small state machine:
//!
//! ```text
//! Start -> TryMetadata -> TryHash -> Resolved
//!              |                        ^
//!              +------------------------+
//! ```
//!
//! Embedded metadata is authoritative: a decodable payload resolves
//! immediately with high confidence. Otherwise the image is hashed and
//! looked up in the registry. Every failure along the way is recorded as a
//! diagnostic and the run degrades toward `Unverified`; resolution itself
//! never fails.

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::extract::EmbeddedMetadata;
use crate::integrity::{IntegrityReport, IntegrityVerifier};
use crate::payload::{MetadataPayload, PayloadCodec};
use crate::phash::{
    classify_best, ConfidenceTier, HashMatcher, MatchCandidate, PerceptualHash, PerceptualHasher,
    PixelSource,
};
use crate::registry::SimilarityRegistry;

/// How an image was identified.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// An embedded payload decoded successfully.
    VerifiedByMetadata {
        payload: MetadataPayload,
        /// Present when a Soulmark or GoldenCodexHash accompanied the payload.
        integrity: Option<IntegrityReport>,
    },
    /// The registry returned at least one candidate, closest first.
    VerifiedByHash {
        hash: PerceptualHash,
        matches: Vec<MatchCandidate>,
    },
    Unverified {
        /// The computed hash, if hashing got that far.
        hash: Option<PerceptualHash>,
    },
}

impl VerificationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::VerifiedByMetadata { .. } => "verified-by-metadata",
            Self::VerifiedByHash { .. } => "verified-by-hash",
            Self::Unverified { .. } => "unverified",
        }
    }
}

/// Result of one resolver run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    pub outcome: VerificationOutcome,
    pub confidence: ConfidenceTier,
    /// Recovered failures and soft warnings, in the order they occurred.
    pub diagnostics: Vec<String>,
}

impl VerificationResult {
    pub fn is_verified(&self) -> bool {
        !matches!(self.outcome, VerificationOutcome::Unverified { .. })
    }

    pub fn payload(&self) -> Option<&MetadataPayload> {
        match &self.outcome {
            VerificationOutcome::VerifiedByMetadata { payload, .. } => Some(payload),
            _ => None,
        }
    }

    pub fn integrity(&self) -> Option<&IntegrityReport> {
        match &self.outcome {
            VerificationOutcome::VerifiedByMetadata { integrity, .. } => integrity.as_ref(),
            _ => None,
        }
    }

    pub fn best_match(&self) -> Option<&MatchCandidate> {
        match &self.outcome {
            VerificationOutcome::VerifiedByHash { matches, .. } => matches.first(),
            _ => None,
        }
    }

    pub fn hash(&self) -> Option<&PerceptualHash> {
        match &self.outcome {
            VerificationOutcome::VerifiedByHash { hash, .. } => Some(hash),
            VerificationOutcome::Unverified { hash } => hash.as_ref(),
            VerificationOutcome::VerifiedByMetadata { .. } => None,
        }
    }
}

/// What the hash branch can work from.
#[derive(Clone, Copy)]
pub enum ImageInput<'a> {
    None,
    Pixels(&'a (dyn PixelSource + Sync)),
    #[cfg(feature = "image")]
    Encoded(&'a [u8]),
}

#[derive(Debug)]
enum State {
    Start,
    TryMetadata,
    TryHash,
    Resolved(VerificationOutcome, ConfidenceTier),
}

/// Orchestrates decoding, integrity checking, hashing and matching.
///
/// Holds no mutable state; one instance can serve concurrent runs.
pub struct ProvenanceResolver<R> {
    codec: PayloadCodec,
    verifier: IntegrityVerifier,
    hasher: PerceptualHasher,
    matcher: HashMatcher,
    registry: R,
}

impl<R: SimilarityRegistry> ProvenanceResolver<R> {
    /// A resolver with default components querying `registry`.
    pub fn new(registry: R) -> Self {
        Self {
            codec: PayloadCodec::new(),
            verifier: IntegrityVerifier::new(),
            hasher: PerceptualHasher::default(),
            matcher: HashMatcher::default(),
            registry,
        }
    }

    pub fn with_hasher(mut self, hasher: PerceptualHasher) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_matcher(mut self, matcher: HashMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Resolve from an already-extracted payload and/or pixels.
    pub async fn resolve(
        &self,
        embedded: Option<&EmbeddedMetadata>,
        pixels: Option<&(dyn PixelSource + Sync)>,
    ) -> VerificationResult {
        let image = pixels.map_or(ImageInput::None, ImageInput::Pixels);
        self.run(embedded, image).await
    }

    /// Resolve straight from encoded image bytes.
    ///
    /// The bytes are searched for an embedded payload first and only decoded
    /// as an image if the hash branch is reached.
    #[cfg(feature = "image")]
    pub async fn resolve_bytes(&self, bytes: &[u8]) -> VerificationResult {
        let embedded = crate::extract::find_embedded(bytes);
        self.run(embedded.as_ref(), ImageInput::Encoded(bytes)).await
    }

    /// Drive the state machine to completion.
    #[instrument(level = "debug", skip_all, fields(
        has_payload = embedded.is_some(),
        has_image = !matches!(image, ImageInput::None)
    ))]
    pub async fn run(
        &self,
        embedded: Option<&EmbeddedMetadata>,
        image: ImageInput<'_>,
    ) -> VerificationResult {
        let mut diagnostics = Vec::new();
        let mut state = State::Start;

        let (outcome, confidence) = loop {
            debug!(state = ?state, "Resolver step");
            state = match state {
                State::Start => State::TryMetadata,
                State::TryMetadata => match self.try_metadata(embedded, &mut diagnostics) {
                    Some(outcome) => State::Resolved(outcome, ConfidenceTier::High),
                    None => State::TryHash,
                },
                State::TryHash => {
                    let (outcome, confidence) = self.try_hash(image, &mut diagnostics).await;
                    State::Resolved(outcome, confidence)
                }
                State::Resolved(outcome, confidence) => break (outcome, confidence),
            };
        };

        info!(
            outcome = outcome.label(),
            confidence = %confidence,
            diagnostics = diagnostics.len(),
            "Provenance resolved"
        );

        VerificationResult {
            outcome,
            confidence,
            diagnostics,
        }
    }

    fn try_metadata(
        &self,
        embedded: Option<&EmbeddedMetadata>,
        diagnostics: &mut Vec<String>,
    ) -> Option<VerificationOutcome> {
        let Some(embedded) = embedded else {
            debug!("No embedded payload");
            return None;
        };

        let payload = match self.codec.decode(&embedded.payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Embedded payload rejected, falling back to hash lookup");
                diagnostics.push(format!("metadata: {e}"));
                return None;
            }
        };

        for missing in payload.missing_required_fields() {
            diagnostics.push(format!("metadata: {missing}"));
        }

        let integrity = embedded
            .expected_fingerprint()
            .map(|expected| self.verifier.verify(&payload, expected));
        if let Some(report) = integrity.as_ref().filter(|r| !r.valid) {
            warn!(expected = %report.expected, actual = %report.actual, "Soulmark mismatch");
            diagnostics.push(format!(
                "integrity: expected {}, calculated {}",
                report.expected, report.actual
            ));
        }

        Some(VerificationOutcome::VerifiedByMetadata { payload, integrity })
    }

    async fn try_hash(
        &self,
        image: ImageInput<'_>,
        diagnostics: &mut Vec<String>,
    ) -> (VerificationOutcome, ConfidenceTier) {
        let unverified = |hash| (VerificationOutcome::Unverified { hash }, ConfidenceTier::None);

        let hashed = match image {
            ImageInput::None => {
                diagnostics.push("hash: no image data".to_string());
                return unverified(None);
            }
            ImageInput::Pixels(pixels) => self.hasher.hash(pixels),
            #[cfg(feature = "image")]
            ImageInput::Encoded(bytes) => self.hasher.hash_bytes(bytes),
        };
        let hash = match hashed {
            Ok(hash) => hash,
            Err(e) => {
                warn!(error = %e, "Perceptual hashing failed");
                diagnostics.push(format!("hash: {e}"));
                return unverified(None);
            }
        };

        let matches = match self.matcher.try_query(&hash, &self.registry).await {
            Ok(matches) => matches,
            Err(e) => {
                warn!(error = %e, "Registry query failed, treating as no matches");
                diagnostics.push(format!("registry: {e}"));
                Vec::new()
            }
        };

        if matches.is_empty() {
            return unverified(Some(hash));
        }
        let confidence = classify_best(&matches);
        (VerificationOutcome::VerifiedByHash { hash, matches }, confidence)
    }
}
