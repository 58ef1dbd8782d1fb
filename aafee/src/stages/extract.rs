//! Pulls fenced code blocks out of model output.

use super::{input_text, Stage};
use crate::core::StageValue;
use crate::errors::{AgentError, FlowError};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```([A-Za-z0-9_+-]*)[ \t]*\r?\n(.*?)```")
        .unwrap_or_else(|err| unreachable!("invalid fence pattern: {err}"))
});

/// Returns the bodies of fenced code blocks in `text`, optionally only
/// those tagged with `language`.
pub(crate) fn extract_code_blocks(text: &str, language: Option<&str>) -> Vec<String> {
    FENCE
        .captures_iter(text)
        .filter(|caps| language.map_or(true, |lang| caps[1].eq_ignore_ascii_case(lang)))
        .map(|caps| caps[2].trim_end().to_string())
        .collect()
}

/// Extracts fenced code blocks from the input text into a list.
#[derive(Debug, Clone)]
pub struct CodeBlockExtractor {
    name: String,
    language: Option<String>,
}

impl CodeBlockExtractor {
    /// Extracts every fenced block.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "code-block-extractor".to_string(),
            language: None,
        }
    }

    /// Extracts only blocks tagged with `language` (e.g. `json`).
    pub fn for_language(language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            ..Self::new()
        }
    }
}

impl Default for CodeBlockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stage for CodeBlockExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: Option<StageValue>) -> Result<StageValue, FlowError> {
        let text = input_text(input.as_ref()).ok_or_else(|| AgentError::NoValidInput {
            agent: self.name.clone(),
        })?;
        Ok(StageValue::List(extract_code_blocks(
            &text,
            self.language.as_deref(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = "intro\n```json\n{\"a\": 1}\n```\nmiddle\n```rust\nfn main() {}\n```\n";

    #[test]
    fn test_extract_all_blocks() {
        let blocks = extract_code_blocks(SAMPLE, None);
        assert_eq!(blocks, vec!["{\"a\": 1}".to_string(), "fn main() {}".to_string()]);
    }

    #[tokio::test]
    async fn test_extract_by_language() {
        let stage = CodeBlockExtractor::for_language("json");
        let output = stage.execute(Some(StageValue::text(SAMPLE))).await.unwrap();
        assert_eq!(output, StageValue::List(vec!["{\"a\": 1}".to_string()]));
    }

    #[tokio::test]
    async fn test_extract_requires_text() {
        let stage = CodeBlockExtractor::new();
        let err = stage.execute(Some(StageValue::None)).await.unwrap_err();
        assert!(matches!(err, FlowError::Agent(AgentError::NoValidInput { .. })));
    }
}
