//! Golden Codex metadata payloads.
//!
//! A payload is the JSON object carried inside an image under the GCUIS
//! transport convention (Base64 of a gzip stream of minified JSON). The
//! schema is advisory: decoding only enforces that the root is an object,
//! and every section is read through accessors that return `None` when the
//! data is absent or has an unexpected shape.
//!
//! Key order is preserved exactly as decoded. The Soulmark is computed over
//! that order, so a payload must never be rebuilt through a sorted map.

mod codec;

pub use codec::{decode_payload, decompress, PayloadCodec};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{CodexError, Result};

/// Paths that must be present for a payload to identify an artwork.
pub const REQUIRED_FIELDS: [&str; 3] = [
    "_identifiers.artifactId",
    "title",
    "ownership_and_rights.copyright.holder",
];

/// A decoded metadata payload.
///
/// Immutable once constructed. The wrapped value is always a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct MetadataPayload {
    root: Value,
}

impl TryFrom<Value> for MetadataPayload {
    type Error = CodexError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(_) => Ok(Self { root: value }),
            other => Err(CodexError::MalformedPayload(format!(
                "root must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

impl From<MetadataPayload> for Value {
    fn from(payload: MetadataPayload) -> Self {
        payload.root
    }
}

impl MetadataPayload {
    /// Wrap an already-parsed JSON object.
    pub fn from_object(object: Map<String, Value>) -> Self {
        Self {
            root: Value::Object(object),
        }
    }

    /// The underlying JSON tree.
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Top-level keys in decode order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.root
            .as_object()
            .into_iter()
            .flat_map(|object| object.keys().map(String::as_str))
    }

    /// Look up a dotted path such as `coreIdentity.title`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.root, |node, segment| node.get(segment))
    }

    /// Look up a dotted path that must hold a non-empty string.
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get_path(path)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn schema_version(&self) -> Option<&str> {
        self.get_str("schemaVersion")
    }

    pub fn identifiers(&self) -> Identifiers {
        Identifiers {
            artifact_id: self
                .get_str("_identifiers.artifactId")
                .or_else(|| self.get_str("artifactId"))
                .map(str::to_owned),
            codex_id: self
                .get_str("_identifiers.codexId")
                .or_else(|| self.get_str("codexId"))
                .map(str::to_owned),
            uuid: self
                .get_str("_identifiers.uuid")
                .and_then(|s| Uuid::parse_str(s).ok()),
            registry_id: self.get_str("_identifiers.registryId").map(str::to_owned),
            soulmark: self.get_str("_identifiers.soulmark").map(str::to_owned),
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.get_str("title")
            .or_else(|| self.get_str("coreIdentity.title"))
    }

    pub fn creator(&self) -> Option<&str> {
        self.get_str("coreIdentity.creator")
            .or_else(|| self.get_str("artist"))
    }

    /// The rights block, if present and well-formed.
    pub fn rights(&self) -> Option<Rights> {
        let block = self.get_path("ownership_and_rights")?;
        serde_json::from_value::<RawRights>(block.clone())
            .ok()
            .map(Rights::from)
    }

    /// The optional SoulWhisper personal message.
    pub fn soul_whisper(&self) -> Option<SoulWhisper> {
        let block = self.get_path("soulWhisper")?;
        serde_json::from_value(block.clone()).ok()
    }

    /// Report every required path that is missing or empty.
    ///
    /// This never fails: a payload with missing identification is still a
    /// valid decode result.
    pub fn missing_required_fields(&self) -> Vec<MissingField> {
        REQUIRED_FIELDS
            .iter()
            .filter(|path| match **path {
                "_identifiers.artifactId" => self.identifiers().artifact_id.is_none(),
                "title" => self.title().is_none(),
                other => self.get_str(other).is_none(),
            })
            .map(|path| MissingField {
                path: (*path).to_string(),
            })
            .collect()
    }

    /// Strict form of [`missing_required_fields`](Self::missing_required_fields).
    pub fn ensure_required(&self) -> Result<()> {
        let missing = self.missing_required_fields();
        if missing.is_empty() {
            return Ok(());
        }
        let paths: Vec<&str> = missing.iter().map(|m| m.path.as_str()).collect();
        Err(CodexError::MissingRequiredField(paths.join(", ")))
    }
}

/// Identifier block of a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Identifiers {
    pub artifact_id: Option<String>,
    pub codex_id: Option<String>,
    pub uuid: Option<Uuid>,
    pub registry_id: Option<String>,
    pub soulmark: Option<String>,
}

/// Usage flags, defaulting to the conservative reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageFlags {
    #[serde(default)]
    pub commercial_use: bool,
    #[serde(default = "default_true")]
    pub attribution_required: bool,
}

impl Default for UsageFlags {
    fn default() -> Self {
        Self {
            commercial_use: false,
            attribution_required: true,
        }
    }
}

/// The `ownership_and_rights` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rights {
    pub copyright_holder: Option<String>,
    pub usage: UsageFlags,
}

#[derive(Deserialize)]
struct RawRights {
    #[serde(default)]
    copyright: Option<RawCopyright>,
    #[serde(default)]
    usage: Option<UsageFlags>,
}

#[derive(Deserialize)]
struct RawCopyright {
    #[serde(default)]
    holder: Option<String>,
}

impl From<RawRights> for Rights {
    fn from(raw: RawRights) -> Self {
        Self {
            copyright_holder: raw
                .copyright
                .and_then(|c| c.holder)
                .filter(|h| !h.trim().is_empty()),
            usage: raw.usage.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

/// Optional personal message attached by the creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoulWhisper {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
}

/// A required path that was absent from a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingField {
    pub path: String,
}

impl std::fmt::Display for MissingField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "missing required field `{}`", self.path)
    }
}

fn default_true() -> bool {
    true
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> MetadataPayload {
        MetadataPayload::try_from(value).unwrap()
    }

    #[test]
    fn test_non_object_root_rejected() {
        assert!(matches!(
            MetadataPayload::try_from(json!([1, 2])),
            Err(CodexError::MalformedPayload(_))
        ));
        assert!(MetadataPayload::try_from(json!("text")).is_err());
    }

    #[test]
    fn test_identifiers_prefer_identifier_block() {
        let p = payload(json!({
            "artifactId": "legacy",
            "_identifiers": {
                "artifactId": "GCX1",
                "uuid": "550e8400-e29b-41d4-a716-446655440000",
                "registryId": "REG-9"
            }
        }));
        let ids = p.identifiers();
        assert_eq!(ids.artifact_id.as_deref(), Some("GCX1"));
        assert_eq!(ids.registry_id.as_deref(), Some("REG-9"));
        assert_eq!(
            ids.uuid.map(|u| u.to_string()).as_deref(),
            Some("550e8400-e29b-41d4-a716-446655440000")
        );
        assert!(ids.soulmark.is_none());
    }

    #[test]
    fn test_identifiers_fall_back_to_top_level() {
        let p = payload(json!({ "artifactId": "GCX-OLD", "codexId": "C-1" }));
        let ids = p.identifiers();
        assert_eq!(ids.artifact_id.as_deref(), Some("GCX-OLD"));
        assert_eq!(ids.codex_id.as_deref(), Some("C-1"));
    }

    #[test]
    fn test_title_falls_back_to_core_identity() {
        let p = payload(json!({ "coreIdentity": { "title": "Nocturne", "creator": "Ana" } }));
        assert_eq!(p.title(), Some("Nocturne"));
        assert_eq!(p.creator(), Some("Ana"));
    }

    #[test]
    fn test_rights_usage_defaults_are_conservative() {
        let p = payload(json!({
            "ownership_and_rights": { "copyright": { "holder": "Y" } }
        }));
        let rights = p.rights().unwrap();
        assert_eq!(rights.copyright_holder.as_deref(), Some("Y"));
        assert!(!rights.usage.commercial_use);
        assert!(rights.usage.attribution_required);
    }

    #[test]
    fn test_rights_usage_partial_flags() {
        let p = payload(json!({
            "ownership_and_rights": {
                "copyright": { "holder": "Y" },
                "usage": { "commercial_use": true }
            }
        }));
        let usage = p.rights().unwrap().usage;
        assert!(usage.commercial_use);
        assert!(usage.attribution_required);
    }

    #[test]
    fn test_soul_whisper_visibility() {
        let p = payload(json!({
            "soulWhisper": { "enabled": true, "message": "hi", "visibility": "public" }
        }));
        let whisper = p.soul_whisper().unwrap();
        assert!(whisper.enabled);
        assert_eq!(whisper.visibility, Visibility::Public);
        assert_eq!(whisper.sender, None);

        let hidden = payload(json!({ "soulWhisper": { "message": "quiet" } }));
        assert_eq!(hidden.soul_whisper().unwrap().visibility, Visibility::Private);
    }

    #[test]
    fn test_missing_required_fields_reports_each_path() {
        let p = payload(json!({ "title": "X" }));
        let missing: Vec<String> = p
            .missing_required_fields()
            .into_iter()
            .map(|m| m.path)
            .collect();
        assert_eq!(
            missing,
            vec![
                "_identifiers.artifactId".to_string(),
                "ownership_and_rights.copyright.holder".to_string()
            ]
        );
        assert!(matches!(
            p.ensure_required(),
            Err(CodexError::MissingRequiredField(_))
        ));
    }

    #[test]
    fn test_complete_payload_passes_required_check() {
        let p = payload(json!({
            "title": "X",
            "_identifiers": { "artifactId": "GCX1" },
            "ownership_and_rights": { "copyright": { "holder": "Y" } }
        }));
        assert!(p.missing_required_fields().is_empty());
        assert!(p.ensure_required().is_ok());
    }

    #[test]
    fn test_keys_keep_decode_order() {
        let p: MetadataPayload =
            serde_json::from_str(r#"{"zeta":1,"alpha":2,"mid":3}"#).unwrap();
        let keys: Vec<&str> = p.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_get_path_absent_segments() {
        let p = payload(json!({ "a": { "b": "c" } }));
        assert_eq!(p.get_str("a.b"), Some("c"));
        assert!(p.get_path("a.x.y").is_none());
        assert!(p.get_str("a").is_none());
    }
}
