//! Core data models used throughout suitegen.
//!
//! These types describe what flows through the pipeline: the uploaded API
//! description, the digest extracted from it, the stored artifacts with
//! their provenance, and the result descriptors returned to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// Serialization format of an uploaded API description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecFormat {
    Json,
    Yaml,
}

impl SpecFormat {
    /// Maps a file extension (`json`, `yaml`, `yml`; case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(SpecFormat::Json),
            "yaml" | "yml" => Some(SpecFormat::Yaml),
            _ => None,
        }
    }

    /// Maps a filename by its last extension.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    /// Guesses the format from content: a leading `{` or `[` means JSON.
    pub fn sniff(content: &str) -> Self {
        match content.trim_start().chars().next() {
            Some('{') | Some('[') => SpecFormat::Json,
            _ => SpecFormat::Yaml,
        }
    }
}

impl fmt::Display for SpecFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecFormat::Json => f.write_str("json"),
            SpecFormat::Yaml => f.write_str("yaml"),
        }
    }
}

impl FromStr for SpecFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| {
            PipelineError::InvalidRequest(format!(
                "unsupported format '{}'; expected json, yaml, or yml",
                s
            ))
        })
    }
}

/// Raw API description as received from an upload. Discarded after digesting.
#[derive(Debug, Clone)]
pub struct ApiDescription {
    pub content: String,
    pub format: SpecFormat,
}

impl ApiDescription {
    pub fn new(content: impl Into<String>, format: SpecFormat) -> Self {
        Self {
            content: content.into(),
            format,
        }
    }

    /// Builds a description whose format is sniffed from the content.
    pub fn inferred(content: impl Into<String>) -> Self {
        let content = content.into();
        let format = SpecFormat::sniff(&content);
        Self { content, format }
    }
}

/// One operation of the API (`GET /pets`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Upper-case HTTP method.
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub operation_id: Option<String>,
    /// Parameter names, path-level first.
    #[serde(default)]
    pub parameters: Vec<String>,
    /// Declared response status codes.
    #[serde(default)]
    pub responses: Vec<String>,
}

/// A named data model and its `(property, type)` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSummary {
    pub name: String,
    pub properties: Vec<(String, String)>,
}

/// Minimal structured summary of an API description.
///
/// `endpoint_count` is always derived from `endpoints`; it cannot be set
/// independently, including when a digest is read back from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DigestRecord")]
pub struct SpecDigest {
    title: String,
    version: Option<String>,
    description: Option<String>,
    base_url: Option<String>,
    endpoint_count: usize,
    endpoints: Vec<Endpoint>,
    schemas: Vec<SchemaSummary>,
}

/// Wire shape of a stored digest; the count is recomputed on load.
#[derive(Deserialize)]
struct DigestRecord {
    title: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
    #[serde(default)]
    schemas: Vec<SchemaSummary>,
}

impl From<DigestRecord> for SpecDigest {
    fn from(r: DigestRecord) -> Self {
        SpecDigest::new(r.title, r.endpoints)
            .with_info(r.version, r.description, r.base_url)
            .with_schemas(r.schemas)
    }
}

impl SpecDigest {
    pub fn new(title: impl Into<String>, endpoints: Vec<Endpoint>) -> Self {
        Self {
            title: title.into(),
            version: None,
            description: None,
            base_url: None,
            endpoint_count: endpoints.len(),
            endpoints,
            schemas: Vec::new(),
        }
    }

    pub fn with_info(
        mut self,
        version: Option<String>,
        description: Option<String>,
        base_url: Option<String>,
    ) -> Self {
        self.version = version;
        self.description = description;
        self.base_url = base_url;
        self
    }

    pub fn with_schemas(mut self, schemas: Vec<SchemaSummary>) -> Self {
        self.schemas = schemas;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoint_count
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn schemas(&self) -> &[SchemaSummary] {
        &self.schemas
    }

    /// SHA-256 hex of the canonical JSON encoding.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&canonical))
    }

    /// Suggested filename for downloads: `Pet_Store_Tests.java`.
    pub fn download_filename(&self) -> String {
        let stem: String = self
            .title
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if stem.is_empty() {
            "generated_Tests.java".to_string()
        } else {
            format!("{}_Tests.java", stem)
        }
    }
}

/// What produced an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub digest: SpecDigest,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub parent_key: Option<String>,
}

impl Provenance {
    /// Provenance of a first-generation artifact.
    pub fn initial(digest: SpecDigest) -> Self {
        Self {
            digest,
            feedback: None,
            parent_key: None,
        }
    }

    /// Provenance of an artifact refined from `parent_key` with `feedback`.
    pub fn refined(digest: SpecDigest, feedback: String, parent_key: String) -> Self {
        Self {
            digest,
            feedback: Some(feedback),
            parent_key: Some(parent_key),
        }
    }
}

/// A stored generated test-suite source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub key: String,
    pub source_text: String,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            key: self.key.clone(),
            api_title: self.provenance.digest.title().to_string(),
            parent_key: self.provenance.parent_key.clone(),
            created_at: self.created_at,
        }
    }
}

/// Lightweight artifact listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSummary {
    pub key: String,
    pub api_title: String,
    pub parent_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful generate or regenerate call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationResult {
    pub key: String,
    pub api_title: String,
    pub endpoints_count: usize,
    pub source_text: String,
    pub parent_key: Option<String>,
    pub feedback: Option<String>,
}

impl GenerationResult {
    /// Describes `artifact`, which must be the artifact just stored.
    pub fn from_artifact(artifact: &Artifact) -> Self {
        let digest = &artifact.provenance.digest;
        Self {
            key: artifact.key.clone(),
            api_title: digest.title().to_string(),
            endpoints_count: digest.endpoint_count(),
            source_text: artifact.source_text.clone(),
            parent_key: artifact.provenance.parent_key.clone(),
            feedback: artifact.provenance.feedback.clone(),
        }
    }
}

/// Response body returned to HTTP and `--json` CLI callers.
///
/// `filename` is the opaque artifact key; callers pass it back unchanged
/// for download and regenerate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoints_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_cases: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub improvements_applied: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl From<GenerationResult> for GenerationResponse {
    fn from(r: GenerationResult) -> Self {
        Self {
            success: true,
            filename: Some(r.key),
            api_title: Some(r.api_title),
            endpoints_count: Some(r.endpoints_count),
            test_cases: Some(r.source_text),
            parent: r.parent_key,
            improvements_applied: r.feedback,
            error: None,
            code: None,
        }
    }
}

impl From<&PipelineError> for GenerationResponse {
    fn from(err: &PipelineError) -> Self {
        Self {
            success: false,
            filename: None,
            api_title: None,
            endpoints_count: None,
            test_cases: None,
            parent: None,
            improvements_applied: None,
            error: Some(err.to_string()),
            code: Some(err.code().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(method: &str, path: &str) -> Endpoint {
        Endpoint {
            method: method.to_string(),
            path: path.to_string(),
            summary: None,
            operation_id: None,
            parameters: vec![],
            responses: vec![],
        }
    }

    #[test]
    fn format_from_filename() {
        assert_eq!(SpecFormat::from_filename("pets.JSON"), Some(SpecFormat::Json));
        assert_eq!(SpecFormat::from_filename("a.b.yml"), Some(SpecFormat::Yaml));
        assert_eq!(SpecFormat::from_filename("pets.txt"), None);
        assert_eq!(SpecFormat::from_filename("pets"), None);
    }

    #[test]
    fn format_sniffing() {
        assert_eq!(SpecFormat::sniff("  {\"openapi\": 1}"), SpecFormat::Json);
        assert_eq!(SpecFormat::sniff("openapi: 3.0.0"), SpecFormat::Yaml);
    }

    #[test]
    fn count_is_recomputed_on_load() {
        let json = r#"{"title":"T","endpoint_count":99,"endpoints":[
            {"method":"GET","path":"/a"},{"method":"POST","path":"/a"}]}"#;
        let digest: SpecDigest = serde_json::from_str(json).unwrap();
        assert_eq!(digest.endpoint_count(), 2);
        assert_eq!(digest.endpoints().len(), 2);
    }

    #[test]
    fn digest_roundtrips_through_json() {
        let digest = SpecDigest::new("Pets", vec![endpoint("GET", "/pets")])
            .with_info(Some("1.0".into()), None, Some("https://api".into()));
        let json = serde_json::to_string(&digest).unwrap();
        let back: SpecDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
        assert_eq!(back.fingerprint(), digest.fingerprint());
    }

    #[test]
    fn download_filename_from_title() {
        assert_eq!(
            SpecDigest::new("Pet Store API", vec![]).download_filename(),
            "Pet_Store_API_Tests.java"
        );
        assert_eq!(
            SpecDigest::new("../etc", vec![]).download_filename(),
            "___etc_Tests.java"
        );
        assert_eq!(
            SpecDigest::new("  ", vec![]).download_filename(),
            "generated_Tests.java"
        );
    }

    #[test]
    fn failure_response_carries_code() {
        let resp = GenerationResponse::from(&PipelineError::EmptySpec);
        assert!(!resp.success);
        assert_eq!(resp.code.as_deref(), Some("empty_spec"));
        assert!(resp.filename.is_none());
    }
}
