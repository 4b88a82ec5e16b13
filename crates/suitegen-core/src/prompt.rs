//! Prompt assembly for test generation.
//!
//! Builds the [`PromptContext`] handed to the text-generation backend.
//! Assembly is a pure function of its inputs: the same digest (and, for
//! regeneration, the same prior source and feedback) always yields a
//! byte-identical context, which [`PromptContext::fingerprint`] exposes
//! for logging and tests.
//!
//! Regeneration embeds the prior source text and the feedback verbatim,
//! without trimming or truncation, so the backend can make targeted edits
//! instead of rewriting blind.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::models::SpecDigest;

const GENERATION_SYSTEM: &str =
    "You are an expert QA engineer specializing in API testing.";

const REGENERATION_SYSTEM: &str = "You are a senior QA automation engineer and Java expert.";

/// Complete input for one text-generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptContext {
    /// Role instruction for chat-style backends.
    pub system: String,
    /// The user prompt.
    pub prompt: String,
}

impl PromptContext {
    /// SHA-256 hex over system and prompt.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.system.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.prompt.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Tiny fixed context used to check that the backend answers at all.
pub fn health_context() -> PromptContext {
    PromptContext {
        system: GENERATION_SYSTEM.to_string(),
        prompt: "Reply with OK.".to_string(),
    }
}

/// Java class name for the generated suite: `Pet Store` → `PetStoreApiTest`.
pub fn test_class_name(digest: &SpecDigest) -> String {
    let stem: String = digest
        .title()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    match stem.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => format!("{}ApiTest", stem),
        Some(_) => format!("Api{}Test", stem),
        None => "GeneratedApiTest".to_string(),
    }
}

/// Context for a first generation from `digest`.
pub fn generation_context(digest: &SpecDigest) -> PromptContext {
    PromptContext {
        system: GENERATION_SYSTEM.to_string(),
        prompt: generation_prompt(digest),
    }
}

/// Context for refining `prior_source` according to `feedback`.
///
/// Includes the original generation prompt so the backend sees the same
/// API information the prior artifact was generated from.
pub fn regeneration_context(digest: &SpecDigest, prior_source: &str, feedback: &str) -> PromptContext {
    let mut prompt = String::new();
    prompt.push_str("Context:\n");
    prompt.push_str(
        "The following JUnit 5 test code was previously generated using the given API specification.\n\n",
    );
    prompt.push_str("ORIGINAL PROMPT:\n");
    prompt.push_str(&generation_prompt(digest));
    prompt.push_str("\n\nEXISTING TEST CODE:\n");
    prompt.push_str(prior_source);
    prompt.push_str("\n\nUSER FEEDBACK:\n");
    prompt.push_str(feedback);
    prompt.push_str("\n\nTASK:\n");
    prompt.push_str(
        "Improve the test code based on the user feedback and regenerate the complete \
         updated test class following best practices. Return only the Java source.\n",
    );

    PromptContext {
        system: REGENERATION_SYSTEM.to_string(),
        prompt,
    }
}

fn or_na(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => "N/A",
    }
}

fn generation_prompt(digest: &SpecDigest) -> String {
    let mut endpoints = String::new();
    for e in digest.endpoints() {
        let params = if e.parameters.is_empty() {
            "None".to_string()
        } else {
            e.parameters.join(", ")
        };
        let responses = if e.responses.is_empty() {
            "N/A".to_string()
        } else {
            e.responses.join(", ")
        };
        endpoints.push_str(&format!(
            "\n- {} {}\n  Summary: {}\n  Parameters: {}\n  Responses: {}",
            e.method,
            e.path,
            or_na(e.summary.as_deref()),
            params,
            responses
        ));
    }
    if endpoints.is_empty() {
        endpoints.push_str("\n- None declared");
    }

    let mut schemas = String::new();
    for s in digest.schemas() {
        let props: Vec<String> = s
            .properties
            .iter()
            .map(|(name, ty)| format!("{}: {}", name, ty))
            .collect();
        schemas.push_str(&format!("- {}: {}\n", s.name, props.join(", ")));
    }
    if schemas.is_empty() {
        schemas.push_str("No schemas defined\n");
    }

    format!(
        "Generate comprehensive JUnit 5 test cases for this REST API.

API Information:
- Title: {title}
- Version: {version}
- Description: {description}
- Base URL: {base_url}

Endpoints:{endpoints}

Data Models:
{schemas}
Requirements:
1. Generate complete JUnit 5 test classes with proper annotations
2. Include positive test cases for valid inputs
3. Include negative test cases for invalid data and error conditions
4. Add boundary value testing for numeric fields
5. Test edge cases (empty strings, null values, special characters)
6. Generate realistic test data matching API schemas
7. Use proper assertions for status codes, headers, and response body
8. Use WebTestClient or TestRestTemplate for API calls
9. Include setup and teardown methods
10. Follow Spring Boot testing best practices

Generate a complete, runnable Java test class named {class} in package com.example.api.test.
Generate the complete test implementation now:",
        title = or_na(Some(digest.title())),
        version = or_na(digest.version()),
        description = or_na(digest.description()),
        base_url = or_na(digest.base_url()),
        endpoints = endpoints,
        schemas = schemas,
        class = test_class_name(digest),
    )
}

/// Extracts source code from a markdown-fenced backend answer.
///
/// A block whose info string is exactly `java` wins; otherwise the first
/// fenced block is used with its info string dropped. Text without a
/// complete fence is returned unchanged.
pub fn extract_code_block(text: &str) -> String {
    let blocks = fenced_blocks(text);

    let chosen = blocks
        .iter()
        .find(|(info, _)| *info == "java")
        .or_else(|| blocks.first());

    match chosen {
        Some((_, body)) => body.trim().to_string(),
        None => text.to_string(),
    }
}

/// Complete fenced blocks as `(info string, body)` pairs, in order.
fn fenced_blocks(text: &str) -> Vec<(&str, &str)> {
    let parts: Vec<&str> = text.split("```").collect();
    // Odd segments sit between an opening and a closing fence; a trailing
    // odd segment has no closing fence and is not a block.
    let complete = parts.len().saturating_sub(1) / 2;

    parts
        .iter()
        .copied()
        .skip(1)
        .step_by(2)
        .take(complete)
        .map(|block| match block.split_once('\n') {
            Some((info, rest)) if !info.trim().contains(' ') => (info.trim(), rest),
            _ => ("", block),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Endpoint, SchemaSummary};

    fn digest() -> SpecDigest {
        SpecDigest::new(
            "Pet Store",
            vec![Endpoint {
                method: "GET".into(),
                path: "/pets".into(),
                summary: Some("List pets".into()),
                operation_id: None,
                parameters: vec!["limit".into()],
                responses: vec!["200".into()],
            }],
        )
        .with_schemas(vec![SchemaSummary {
            name: "Pet".into(),
            properties: vec![("id".into(), "integer".into())],
        }])
    }

    #[test]
    fn generation_context_is_deterministic() {
        let a = generation_context(&digest());
        let b = generation_context(&digest());
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn generation_context_lists_endpoints_and_schemas() {
        let ctx = generation_context(&digest());
        assert!(ctx.prompt.contains("- GET /pets\n  Summary: List pets"));
        assert!(ctx.prompt.contains("Parameters: limit"));
        assert!(ctx.prompt.contains("- Pet: id: integer"));
        assert!(ctx.prompt.contains("- Version: N/A"));
        assert!(ctx.prompt.contains("PetStoreApiTest"));
    }

    #[test]
    fn regeneration_context_embeds_inputs_verbatim() {
        let prior = "  class A {}\n\n\t// trailing   \n";
        let feedback = "\n add auth header test \n";
        let ctx = regeneration_context(&digest(), prior, feedback);
        assert!(ctx.prompt.contains(prior));
        assert!(ctx.prompt.contains(feedback));
        assert!(ctx.prompt.contains(&generation_context(&digest()).prompt));
    }

    #[test]
    fn regeneration_context_depends_on_feedback() {
        let a = regeneration_context(&digest(), "x", "one");
        let b = regeneration_context(&digest(), "x", "two");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn class_names() {
        assert_eq!(test_class_name(&SpecDigest::new("", vec![])), "GeneratedApiTest");
        assert_eq!(test_class_name(&SpecDigest::new("3D Api", vec![])), "Api3DApiTest");
    }

    #[test]
    fn extracts_java_block() {
        let text = "Here you go:\n```java\nclass T {}\n```\nDone.";
        assert_eq!(extract_code_block(text), "class T {}");
    }

    #[test]
    fn extracts_generic_block_without_info_string() {
        let text = "```kotlin\nclass T\n```";
        assert_eq!(extract_code_block(text), "class T");
        let text = "```\nclass U {}\n```";
        assert_eq!(extract_code_block(text), "class U {}");
    }

    #[test]
    fn java_info_string_must_match_exactly() {
        let text = "```javascript\nconsole.log(1)\n```";
        assert_eq!(extract_code_block(text), "console.log(1)");

        let text = "```javadoc\n/** doc */\n```";
        assert_eq!(extract_code_block(text), "/** doc */");

        let text = "```javascript\nconsole.log(1)\n```\nand\n```java\nclass T {}\n```";
        assert_eq!(extract_code_block(text), "class T {}");
    }

    #[test]
    fn unclosed_trailing_fence_is_ignored() {
        let text = "```text\nnotes\n```\n```java\nclass T {";
        assert_eq!(extract_code_block(text), "notes");
    }

    #[test]
    fn unfenced_text_passes_through() {
        assert_eq!(extract_code_block("// updated"), "// updated");
        assert_eq!(extract_code_block("  a ``` b  "), "  a ``` b  ");
    }
}
