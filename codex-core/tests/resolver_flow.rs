//! Resolver flows across the metadata and hash branches.

use codex_core::{
    ConfidenceTier, EmbeddedMetadata, HashMatcher, MetadataPayload, MockRegistry, PayloadCodec,
    PerceptualHasher, ProvenanceResolver, RawPixels, RegistryMatch, VerificationOutcome,
};
use serde_json::json;

fn checkerboard(size: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let v = if (x / 4 + y / 4) % 2 == 0 { 220 } else { 30 };
            data.extend_from_slice(&[v, v, v, 255]);
        }
    }
    data
}

fn record(id: &str, distance: u32) -> RegistryMatch {
    RegistryMatch {
        id: Some(id.to_string()),
        title: Some(format!("Work {id}")),
        artist: Some("Ada".to_string()),
        distance: Some(distance),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_empty_registry_resolves_unverified() {
    let data = checkerboard(64);
    let pixels = RawPixels::rgba(64, 64, &data).unwrap();
    let resolver = ProvenanceResolver::new(MockRegistry::empty());

    let result = resolver.resolve(None, Some(&pixels)).await;

    assert!(matches!(
        result.outcome,
        VerificationOutcome::Unverified { hash: Some(_) }
    ));
    assert_eq!(result.confidence, ConfidenceTier::None);
}

#[tokio::test]
async fn test_hash_branch_tiers_follow_best_candidate() {
    let data = checkerboard(64);
    let pixels = RawPixels::rgba(64, 64, &data).unwrap();

    for (distances, tier) in [
        (vec![3, 12], ConfidenceTier::High),
        (vec![9, 4], ConfidenceTier::Medium),
        (vec![8], ConfidenceTier::Low),
    ] {
        let matches = distances
            .iter()
            .enumerate()
            .map(|(i, d)| record(&format!("GCX-{i}"), *d))
            .collect();
        let resolver = ProvenanceResolver::new(MockRegistry::with_matches(matches));

        let result = resolver.resolve(None, Some(&pixels)).await;
        assert_eq!(result.outcome.label(), "verified-by-hash");
        assert_eq!(result.confidence, tier, "distances {distances:?}");
    }
}

#[tokio::test]
async fn test_custom_components_shape_the_query() {
    let data = checkerboard(64);
    let pixels = RawPixels::rgba(64, 64, &data).unwrap();
    let resolver = ProvenanceResolver::new(MockRegistry::with_matches(vec![
        record("a", 1),
        record("b", 2),
        record("c", 3),
    ]))
    .with_hasher(PerceptualHasher::new(8).unwrap())
    .with_matcher(HashMatcher::new(4, 2));

    let result = resolver.resolve(None, Some(&pixels)).await;

    let query = resolver.registry().last_query().unwrap();
    assert_eq!(query.hash.len(), 16);
    assert_eq!(query.threshold, 4);
    assert_eq!(query.limit, 2);
    match result.outcome {
        VerificationOutcome::VerifiedByHash { matches, hash } => {
            assert_eq!(matches.len(), 2);
            assert_eq!(hash.grid_size(), 8);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn test_verified_metadata_with_matching_soulmark() {
    let payload = MetadataPayload::try_from(json!({
        "title": "X",
        "_identifiers": { "artifactId": "GCX1" },
        "ownership_and_rights": { "copyright": { "holder": "Y" } }
    }))
    .unwrap();
    let embedded = EmbeddedMetadata {
        payload: PayloadCodec::new().encode(&payload).unwrap(),
        soulmark: None,
        codex_hash: Some(codex_core::fingerprint_of(&payload).to_hex()),
    };
    let resolver = ProvenanceResolver::new(MockRegistry::unavailable());

    let result = resolver.resolve(Some(&embedded), None).await;

    assert_eq!(result.confidence, ConfidenceTier::High);
    assert!(result.integrity().unwrap().valid);
    assert_eq!(result.payload().unwrap().title(), Some("X"));
    assert!(result.diagnostics.is_empty());
}

#[tokio::test]
async fn test_corrupt_payload_and_offline_registry_still_resolve() {
    let mut transport = PayloadCodec::new()
        .encode(&MetadataPayload::try_from(json!({ "title": "X" })).unwrap())
        .unwrap();
    // chop the gzip trailer
    transport.truncate(transport.len() - 8);
    let embedded = EmbeddedMetadata::from_payload(transport);

    let data = checkerboard(32);
    let pixels = RawPixels::rgba(32, 32, &data).unwrap();
    let resolver = ProvenanceResolver::new(MockRegistry::unavailable());

    let result = resolver.resolve(Some(&embedded), Some(&pixels)).await;

    assert!(!result.is_verified());
    assert_eq!(result.confidence, ConfidenceTier::None);
    assert_eq!(result.diagnostics.len(), 2);
}

#[tokio::test]
async fn test_concurrent_resolutions_share_one_resolver() {
    let resolver = std::sync::Arc::new(ProvenanceResolver::new(MockRegistry::with_matches(vec![
        record("a", 0),
    ])));

    let tasks: Vec<_> = (0..8u32)
        .map(|i| {
            let resolver = resolver.clone();
            tokio::spawn(async move {
                let data = checkerboard(16 + i * 4);
                let size = 16 + i * 4;
                let pixels = RawPixels::rgba(size, size, &data).unwrap();
                resolver.resolve(None, Some(&pixels)).await.confidence
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), ConfidenceTier::High);
    }
}
