//! API-description digesting.
//!
//! Extracts a [`SpecDigest`] (title, endpoints, data models) from an
//! OpenAPI 3 or Swagger 2 document in JSON or YAML. Both formats are
//! parsed into an order-preserving JSON tree first, so endpoints and
//! schemas come out in exactly the order the document lists them and
//! repeated digesting of the same bytes is reproducible.
//!
//! # Extraction Rules
//!
//! | Field | OpenAPI 3 | Swagger 2 |
//! |-------|-----------|-----------|
//! | title / version / description | `info.*` | `info.*` |
//! | base URL | `servers[0].url` | `{schemes[0]}://{host}{basePath}` |
//! | endpoints | `paths.<path>.<method>` | same |
//! | schemas | `components.schemas` | `definitions` |

use serde_json::{Map, Value};

use crate::error::{PipelineError, Result};
use crate::models::{ApiDescription, Endpoint, SchemaSummary, SpecDigest, SpecFormat};

/// Operation keys recognised under a path item. Anything else
/// (`parameters`, `summary`, `$ref`, extensions) is not an endpoint.
const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Controls which parsed documents are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestPolicy {
    /// Reject documents that declare no endpoints with [`PipelineError::EmptySpec`].
    pub require_non_empty: bool,
}

impl DigestPolicy {
    pub fn strict() -> Self {
        Self {
            require_non_empty: true,
        }
    }

    pub fn lenient() -> Self {
        Self {
            require_non_empty: false,
        }
    }
}

impl Default for DigestPolicy {
    fn default() -> Self {
        Self::strict()
    }
}

/// Digest an API description.
///
/// # Errors
///
/// - [`PipelineError::MalformedSpec`] if the content does not parse as its
///   declared format, the root is not a mapping, or `paths` is not a mapping.
/// - [`PipelineError::EmptySpec`] if no endpoints are declared and the
///   policy requires at least one.
pub fn digest(description: &ApiDescription, policy: DigestPolicy) -> Result<SpecDigest> {
    let root = parse(description)?;
    let root = root.as_object().ok_or_else(|| {
        PipelineError::MalformedSpec("document root must be a mapping".to_string())
    })?;

    let info = root.get("info").and_then(Value::as_object);
    let title = info
        .and_then(|i| i.get("title"))
        .and_then(scalar_to_string)
        .unwrap_or_default();
    let version = info.and_then(|i| i.get("version")).and_then(scalar_to_string);
    let description_text = info
        .and_then(|i| i.get("description"))
        .and_then(scalar_to_string);

    let endpoints = extract_endpoints(root)?;
    if endpoints.is_empty() && policy.require_non_empty {
        return Err(PipelineError::EmptySpec);
    }

    Ok(SpecDigest::new(title, endpoints)
        .with_info(version, description_text, extract_base_url(root))
        .with_schemas(extract_schemas(root)))
}

fn parse(description: &ApiDescription) -> Result<Value> {
    match description.format {
        SpecFormat::Json => serde_json::from_str(&description.content)
            .map_err(|e| PipelineError::MalformedSpec(format!("invalid JSON: {}", e))),
        SpecFormat::Yaml => serde_yaml::from_str::<serde_yaml::Value>(&description.content)
            .map(yaml_to_json)
            .map_err(|e| PipelineError::MalformedSpec(format!("invalid YAML: {}", e))),
    }
}

/// Converts a YAML tree to JSON, stringifying non-string keys
/// (`200:` under `responses` is an integer key in YAML).
fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(seq) => Value::Array(seq.into_iter().map(yaml_to_json).collect()),
        serde_yaml::Value::Mapping(mapping) => {
            let mut out = Map::with_capacity(mapping.len());
            for (k, v) in mapping {
                let key = match yaml_to_json(k) {
                    Value::String(s) => s,
                    other => scalar_to_string(&other).unwrap_or_else(|| other.to_string()),
                };
                out.insert(key, yaml_to_json(v));
            }
            Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Last segment of a `$ref` (`#/components/schemas/Pet` → `Pet`).
fn ref_name(value: &Value) -> Option<String> {
    value
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|r| r.rsplit('/').next())
        .map(str::to_string)
}

fn extract_endpoints(root: &Map<String, Value>) -> Result<Vec<Endpoint>> {
    let paths = match root.get("paths") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(paths)) => paths,
        Some(_) => {
            return Err(PipelineError::MalformedSpec(
                "`paths` must be a mapping".to_string(),
            ))
        }
    };

    let mut endpoints = Vec::new();
    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            continue;
        };
        let shared_params = parameter_names(item.get("parameters"));

        for (key, operation) in item {
            let method = key.to_ascii_lowercase();
            if !HTTP_METHODS.contains(&method.as_str()) {
                continue;
            }

            let mut parameters = shared_params.clone();
            parameters.extend(parameter_names(operation.get("parameters")));

            let responses = operation
                .get("responses")
                .and_then(Value::as_object)
                .map(|r| r.keys().cloned().collect())
                .unwrap_or_default();

            endpoints.push(Endpoint {
                method: method.to_ascii_uppercase(),
                path: path.clone(),
                summary: operation.get("summary").and_then(scalar_to_string),
                operation_id: operation.get("operationId").and_then(scalar_to_string),
                parameters,
                responses,
            });
        }
    }
    Ok(endpoints)
}

fn parameter_names(params: Option<&Value>) -> Vec<String> {
    params
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|p| {
                    p.get("name")
                        .and_then(scalar_to_string)
                        .or_else(|| ref_name(p))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn extract_base_url(root: &Map<String, Value>) -> Option<String> {
    if let Some(url) = root
        .get("servers")
        .and_then(Value::as_array)
        .and_then(|s| s.first())
        .and_then(|s| s.get("url"))
        .and_then(Value::as_str)
    {
        return Some(url.to_string());
    }

    let base_path = root.get("basePath").and_then(Value::as_str).unwrap_or("");
    match root.get("host").and_then(Value::as_str) {
        Some(host) => {
            let scheme = root
                .get("schemes")
                .and_then(Value::as_array)
                .and_then(|s| s.first())
                .and_then(Value::as_str)
                .unwrap_or("https");
            Some(format!("{}://{}{}", scheme, host, base_path))
        }
        None if !base_path.is_empty() => Some(base_path.to_string()),
        None => None,
    }
}

fn extract_schemas(root: &Map<String, Value>) -> Vec<SchemaSummary> {
    let schemas = root
        .get("components")
        .and_then(|c| c.get("schemas"))
        .or_else(|| root.get("definitions"))
        .and_then(Value::as_object);

    let Some(schemas) = schemas else {
        return Vec::new();
    };

    schemas
        .iter()
        .map(|(name, schema)| {
            let properties = schema
                .get("properties")
                .and_then(Value::as_object)
                .map(|props| {
                    props
                        .iter()
                        .map(|(prop, def)| {
                            let ty = def
                                .get("type")
                                .and_then(scalar_to_string)
                                .or_else(|| ref_name(def))
                                .unwrap_or_else(|| "unknown".to_string());
                            (prop.clone(), ty)
                        })
                        .collect()
                })
                .unwrap_or_default();
            SchemaSummary {
                name: name.clone(),
                properties,
            }
        })
        .collect()
}
