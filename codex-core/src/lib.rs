//! Codex Core - Golden Codex provenance reading and verification
//!
//! This crate recovers the structured provenance metadata that Golden Codex
//! embeds in images and, when none is present, identifies an image by
//! perceptual similarity against a remote registry.
//!
//! # Features
//!
//! - GCUIS payload codec (Base64 → gzip → JSON) with typed metadata views
//! - Soulmark integrity fingerprints (SHA-256 over insertion-order minified JSON)
//! - Average-hash perceptual fingerprints over any RGB(A) pixel source
//! - Hamming-distance matching with confidence tiers
//! - Embedded payload extraction from PNG text chunks and XMP packets
//! - A fallback-chained resolver that always produces a result
//!
//! # Example
//!
//! ```no_run
//! use codex_core::{MockRegistry, ProvenanceResolver};
//!
//! # async fn example(image_bytes: &[u8]) {
//! let resolver = ProvenanceResolver::new(MockRegistry::empty());
//! let result = resolver.resolve_bytes(image_bytes).await;
//!
//! println!("{} ({})", result.outcome.label(), result.confidence);
//! if let Some(payload) = result.payload() {
//!     println!("title: {:?}", payload.title());
//! }
//! # }
//! ```

pub mod error;
pub mod extract;
pub mod integrity;
pub mod payload;
pub mod phash;
pub mod registry;
pub mod resolver;

// Re-export main types for convenience
pub use error::{CodexError, Result};
pub use extract::{find_embedded, EmbeddedMetadata};
pub use integrity::{fingerprint_of, IntegrityReport, IntegrityVerifier, Soulmark};
pub use payload::{decode_payload, MetadataPayload, PayloadCodec};
pub use phash::{
    classify, hamming_distance, ConfidenceTier, HashMatcher, MatchCandidate, PerceptualHash,
    PerceptualHasher, PixelSource, RawPixels,
};
pub use registry::{MatchQuery, MockRegistry, RegistryMatch, RegistryStats, SimilarityRegistry};
pub use resolver::{ProvenanceResolver, VerificationOutcome, VerificationResult};

#[cfg(feature = "network")]
pub use registry::{HttpRegistry, RegistryConfig};

#[cfg(feature = "image")]
pub use phash::compute_phash;
