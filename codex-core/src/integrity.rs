//! Soulmark integrity fingerprints.
//!
//! A Soulmark is the SHA-256 digest of a payload's canonical form: minified
//! JSON with object keys in the order they were decoded. The encoder that
//! embedded the payload computed the digest over exactly that byte sequence,
//! so keys are never re-sorted here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{CodexError, Result};
use crate::payload::MetadataPayload;

/// Digest size in bytes.
pub const SOULMARK_SIZE: usize = 32;

/// A 256-bit payload fingerprint, displayed as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Soulmark([u8; SOULMARK_SIZE]);

impl Soulmark {
    pub fn from_bytes(bytes: [u8; SOULMARK_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SOULMARK_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Soulmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Soulmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Soulmark({})", self.to_hex())
    }
}

impl FromStr for Soulmark {
    type Err = CodexError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != SOULMARK_SIZE * 2 {
            return Err(CodexError::InvalidHash(format!(
                "Soulmark must be {} hex characters, got {}",
                SOULMARK_SIZE * 2,
                s.len()
            )));
        }
        let mut bytes = [0u8; SOULMARK_SIZE];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| CodexError::InvalidHash(format!("invalid Soulmark hex: {e}")))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Soulmark {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Soulmark {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Outcome of checking a payload against an expected fingerprint.
///
/// A mismatch is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub expected: String,
    pub actual: Soulmark,
}

/// Computes and checks Soulmarks.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegrityVerifier;

impl IntegrityVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Canonical serialization: minified JSON in stored key order, with
    /// numbers printed exactly as they were decoded.
    pub fn canonical_form(&self, payload: &MetadataPayload) -> String {
        payload.as_value().to_string()
    }

    pub fn fingerprint_of(&self, payload: &MetadataPayload) -> Soulmark {
        let canonical = self.canonical_form(payload);
        let digest = Sha256::digest(canonical.as_bytes());

        let mut bytes = [0u8; SOULMARK_SIZE];
        bytes.copy_from_slice(&digest);
        Soulmark(bytes)
    }

    /// Compare the payload's fingerprint with a caller-supplied hex value.
    ///
    /// The expected value is compared after trimming and lowercasing; any
    /// other difference, including a malformed expected value, is a mismatch.
    pub fn verify(&self, payload: &MetadataPayload, expected: &str) -> IntegrityReport {
        let actual = self.fingerprint_of(payload);
        let valid = actual.to_hex() == expected.trim().to_ascii_lowercase();

        debug!(valid, actual = %actual, "Checked payload integrity");

        IntegrityReport {
            valid,
            expected: expected.to_string(),
            actual,
        }
    }
}

/// Fingerprint a payload with a default verifier.
pub fn fingerprint_of(payload: &MetadataPayload) -> Soulmark {
    IntegrityVerifier::new().fingerprint_of(payload)
}
