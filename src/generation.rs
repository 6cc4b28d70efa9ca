//! Structured output from the generative content service.
//!
//! Prompts carry their context as labelled fields plus an explicit JSON
//! shape. Replies are parsed into a [`GenerationOutcome`]: either the typed
//! value or the raw text, so each caller picks its own fallback. The adapter
//! never guesses at a shape.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::error::EngineError;
use crate::platform::llm::{GenerativeContentPort, PromptMode, PromptOptions};

// =============================================================================
// Outcome
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome<T> {
    Parsed(T),
    /// The reply was not the expected JSON; carries the raw text.
    ParseFailed(String),
}

impl<T> GenerationOutcome<T> {
    pub fn parsed(self) -> Option<T> {
        match self {
            GenerationOutcome::Parsed(value) => Some(value),
            GenerationOutcome::ParseFailed(_) => None,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, GenerationOutcome::Parsed(_))
    }

    /// Collapse into a `Result` for callers with no fallback of their own.
    pub fn into_result(self) -> Result<T, EngineError> {
        match self {
            GenerationOutcome::Parsed(value) => Ok(value),
            GenerationOutcome::ParseFailed(raw) => Err(EngineError::GenerationParse { raw }),
        }
    }
}

/// Parse a model reply as `T`, tolerating fences and surrounding prose.
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> GenerationOutcome<T> {
    let parsed = extract_json_from_response(raw)
        .and_then(|json| serde_json::from_str::<T>(json).ok());
    match parsed {
        Some(value) => GenerationOutcome::Parsed(value),
        None => GenerationOutcome::ParseFailed(raw.to_string()),
    }
}

/// Extract a JSON object or array from the response text.
/// Handles responses with markdown fences or surrounding text.
pub(crate) fn extract_json_from_response(response: &str) -> Option<&str> {
    let looks_like_json = |s: &str| s.starts_with('{') || s.starts_with('[');

    // Try to find JSON in a ```json code fence
    if let Some(start) = response.find("```json") {
        let json_start = start + 7;
        if let Some(end) = response[json_start..].find("```") {
            return Some(response[json_start..json_start + end].trim());
        }
    }
    // Try generic ``` code fence
    if let Some(start) = response.find("```") {
        let after_fence = start + 3;
        if let Some(nl) = response[after_fence..].find('\n') {
            let json_start = after_fence + nl + 1;
            if let Some(end) = response[json_start..].find("```") {
                let candidate = response[json_start..json_start + end].trim();
                if looks_like_json(candidate) {
                    return Some(candidate);
                }
            }
        }
    }

    let trimmed = response.trim();
    if looks_like_json(trimmed) {
        return Some(trimmed);
    }

    // Look for JSON embedded in other text; bracketed prose is skipped.
    let mut offset = 0;
    while let Some(found) = response[offset..].find(['{', '[']) {
        let start = offset + found;
        if let Some(candidate) = balanced_prefix(&response[start..]) {
            if serde_json::from_str::<serde_json::Value>(candidate).is_ok() {
                return Some(candidate);
            }
        }
        offset = start + 1;
    }
    None
}

/// The shortest prefix of `text` whose brackets balance, ignoring string contents.
fn balanced_prefix(text: &str) -> Option<&str> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    for (i, ch) in text.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        if ch == '\\' && in_string {
            escape = true;
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match ch {
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

// =============================================================================
// Prompt construction
// =============================================================================

/// Fixed instruction text plus the endpoint it is sent to.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub instruction: String,
    pub mode: PromptMode,
}

impl PromptTemplate {
    pub fn new(instruction: &str, mode: PromptMode) -> Self {
        Self {
            instruction: instruction.to_string(),
            mode,
        }
    }
}

/// Ordered, labelled context fields embedded in a prompt.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    fields: Vec<(String, String)>,
}

impl PromptContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, label: &str, value: impl std::fmt::Display) -> Self {
        self.fields.push((label.to_string(), value.to_string()));
        self
    }

    /// Absent values are written as "unknown" so the model does not invent them.
    pub fn optional(self, label: &str, value: Option<impl std::fmt::Display>) -> Self {
        match value {
            Some(v) => self.field(label, v),
            None => self.field(label, "unknown"),
        }
    }

    pub fn list(self, label: &str, items: &[String]) -> Self {
        if items.is_empty() {
            self.field(label, "none")
        } else {
            let joined = items.join("; ");
            self.field(label, joined)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn render(&self) -> String {
        self.fields
            .iter()
            .map(|(label, value)| format!("- {}: {}", label, value))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Single prompt: instruction, context block, output contract.
pub fn build_prompt(template: &PromptTemplate, context: &PromptContext, schema_hint: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(template.instruction.trim());
    prompt.push_str("\n\n");
    if !context.is_empty() {
        prompt.push_str("Context:\n");
        prompt.push_str(&context.render());
        prompt.push_str("\n\n");
    }
    prompt.push_str("Respond ONLY with valid JSON matching this shape:\n");
    prompt.push_str(schema_hint.trim());
    prompt.push_str("\nDo not wrap the JSON in markdown and do not add commentary.");
    prompt
}

// =============================================================================
// Adapter
// =============================================================================

pub struct StructuredGenerationAdapter {
    port: Arc<dyn GenerativeContentPort>,
    options: PromptOptions,
}

impl StructuredGenerationAdapter {
    pub fn new(port: Arc<dyn GenerativeContentPort>, options: PromptOptions) -> Self {
        Self { port, options }
    }

    /// Send one prompt and parse the reply as `T`.
    ///
    /// Transport failures are errors; shape mismatches are `ParseFailed`.
    pub async fn generate_structured<T: DeserializeOwned>(
        &self,
        template: &PromptTemplate,
        context: &PromptContext,
        schema_hint: &str,
    ) -> Result<GenerationOutcome<T>, EngineError> {
        let prompt = build_prompt(template, context, schema_hint);
        let resp = self
            .port
            .prompt(&prompt, &self.options, template.mode)
            .await
            .map_err(|e| EngineError::from_platform("generate content", e))?;

        let outcome = parse_structured::<T>(&resp.response);
        if !outcome.is_parsed() {
            log::warn!(
                "Generated reply was not the expected JSON ({} chars)",
                resp.response.len()
            );
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeGenerative;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Draft {
        subject: String,
        content: String,
    }

    #[test]
    fn test_extract_json_fenced() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nThanks";
        assert_eq!(extract_json_from_response(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_extract_json_generic_fence_array() {
        let text = "```\n[{\"a\": 1}]\n```";
        assert_eq!(extract_json_from_response(text), Some("[{\"a\": 1}]"));
    }

    #[test]
    fn test_extract_json_embedded_with_braces_in_strings() {
        let text = r#"Sure! {"subject": "Hi {there}", "content": "x"} Hope that helps."#;
        assert_eq!(
            extract_json_from_response(text),
            Some(r#"{"subject": "Hi {there}", "content": "x"}"#)
        );
    }

    #[test]
    fn test_extract_json_skips_bracketed_prose() {
        let text = "Here are my [ranked] picks:\n[{\"a\": 1}] {see above}";
        assert_eq!(extract_json_from_response(text), Some("[{\"a\": 1}]"));
        assert!(extract_json_from_response("Only [ranked] prose here.").is_none());
    }

    #[test]
    fn test_extract_json_none_for_prose() {
        assert!(extract_json_from_response("Dear donor, we would love to meet you.").is_none());
    }

    #[test]
    fn test_parse_structured_variants() {
        let ok: GenerationOutcome<Draft> =
            parse_structured(r#"{"subject": "Invitation", "content": "Body"}"#);
        assert_eq!(
            ok,
            GenerationOutcome::Parsed(Draft {
                subject: "Invitation".to_string(),
                content: "Body".to_string()
            })
        );

        let wrong_shape: GenerationOutcome<Draft> = parse_structured(r#"{"title": "x"}"#);
        assert_eq!(
            wrong_shape,
            GenerationOutcome::ParseFailed(r#"{"title": "x"}"#.to_string())
        );
    }

    #[test]
    fn test_into_result_maps_parse_failure() {
        let outcome: GenerationOutcome<Draft> = GenerationOutcome::ParseFailed("raw".to_string());
        match outcome.into_result() {
            Err(EngineError::GenerationParse { raw }) => assert_eq!(raw, "raw"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_build_prompt_embeds_context_and_shape() {
        let template = PromptTemplate::new("Write an invitation.", PromptMode::Agent);
        let context = PromptContext::new()
            .field("Purpose", "egg donation")
            .optional("Expected compensation", None::<u64>)
            .list("Requirements", &[]);
        let prompt = build_prompt(&template, &context, r#"{"subject": string}"#);

        assert!(prompt.starts_with("Write an invitation."));
        assert!(prompt.contains("- Purpose: egg donation"));
        assert!(prompt.contains("- Expected compensation: unknown"));
        assert!(prompt.contains("- Requirements: none"));
        assert!(prompt.contains(r#"{"subject": string}"#));
        assert!(prompt.contains("valid JSON"));
    }

    #[tokio::test]
    async fn test_generate_structured_uses_template_mode() {
        let fake = Arc::new(FakeGenerative::replying(&[
            r#"{"subject": "S", "content": "C"}"#,
        ]));
        let adapter = StructuredGenerationAdapter::new(fake.clone(), PromptOptions::default());
        let template = PromptTemplate::new("Write.", PromptMode::Agent);

        let outcome: GenerationOutcome<Draft> = adapter
            .generate_structured(&template, &PromptContext::new(), "{}")
            .await
            .unwrap();
        assert!(outcome.is_parsed());
        assert_eq!(fake.prompts()[0].1, PromptMode::Agent);
    }

    #[tokio::test]
    async fn test_generate_structured_transport_failure_is_error() {
        let adapter = StructuredGenerationAdapter::new(
            Arc::new(FakeGenerative::failing()),
            PromptOptions::default(),
        );
        let template = PromptTemplate::new("Write.", PromptMode::Plain);
        let result: Result<GenerationOutcome<Draft>, _> = adapter
            .generate_structured(&template, &PromptContext::new(), "{}")
            .await;
        assert!(matches!(
            result,
            Err(EngineError::ExternalServiceUnavailable { .. })
        ));
    }
}
