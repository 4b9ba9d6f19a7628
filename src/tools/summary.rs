//! Text summarization.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::llm::LanguageModel;
use super::{truncate_chars, ToolResult};
use crate::error::ToolError;

const SENTENCE_TERMINATORS: [char; 6] = ['。', '！', '？', '.', '!', '?'];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryOutput {
    pub summary: String,
}

/// Summarizes text with the configured model, or extractively without one.
#[derive(Clone, Default)]
pub struct SummaryTool {
    model: Option<Arc<dyn LanguageModel>>,
}

impl SummaryTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(model: Arc<dyn LanguageModel>) -> Self {
        Self { model: Some(model) }
    }

    pub async fn summarize(&self, text: &str, max_length: usize) -> ToolResult<SummaryOutput> {
        let started = Instant::now();
        let input = json!({
            "text": preview(text),
            "max_length": max_length,
        });

        let outcome = match &self.model {
            Some(model) => self.summarize_with_model(model.as_ref(), text, max_length).await,
            None => Ok(extractive_summary(text, max_length)),
        };

        ToolResult::timed(
            "summarize_text",
            input,
            started,
            outcome.map(|summary| SummaryOutput { summary }),
        )
    }

    async fn summarize_with_model(
        &self,
        model: &dyn LanguageModel,
        text: &str,
        max_length: usize,
    ) -> Result<String, ToolError> {
        let prompt = format!(
            "Summarize the context in at most {max_length} characters. Keep the key facts."
        );
        let summary = model.complete(&prompt, text).await?;
        Ok(clip(summary.trim(), max_length))
    }
}

/// First two sentences plus the last one, clipped to `max_length` characters.
pub fn extractive_summary(text: &str, max_length: usize) -> String {
    let sentences = split_sentences(text);
    let summary = if sentences.len() <= 3 {
        text.trim().to_string()
    } else {
        let last = sentences.len() - 1;
        [sentences[0], sentences[1], sentences[last]].concat()
    };
    clip(&summary, max_length)
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        if SENTENCE_TERMINATORS.contains(&ch) {
            let end = idx + ch.len_utf8();
            if !text[start..end].trim().is_empty() {
                sentences.push(&text[start..end]);
            }
            start = end;
        }
    }
    if !text[start..].trim().is_empty() {
        sentences.push(&text[start..]);
    }
    sentences
}

fn clip(text: &str, max_length: usize) -> String {
    if text.chars().count() > max_length {
        format!("{}...", truncate_chars(text, max_length))
    } else {
        text.to_string()
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > 100 {
        format!("{}...", truncate_chars(text, 100))
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoModel;

    #[async_trait::async_trait]
    impl LanguageModel for EchoModel {
        async fn complete(&self, _prompt: &str, context: &str) -> Result<String, ToolError> {
            Ok(format!("  {}  ", context.to_uppercase()))
        }
    }

    struct BrokenModel;

    #[async_trait::async_trait]
    impl LanguageModel for BrokenModel {
        async fn complete(&self, _prompt: &str, _context: &str) -> Result<String, ToolError> {
            Err(ToolError::Llm("connection refused".into()))
        }
    }

    #[test]
    fn test_short_text_is_kept() {
        assert_eq!(extractive_summary("One. Two.", 100), "One. Two.");
    }

    #[test]
    fn test_long_text_keeps_first_two_and_last() {
        let text = "First. Second. Third. Fourth. Last.";
        assert_eq!(extractive_summary(text, 100), "First. Second. Last.");
    }

    #[test]
    fn test_chinese_sentences() {
        let text = "第一句。第二句。第三句。第四句。最后一句。";
        assert_eq!(extractive_summary(text, 100), "第一句。第二句。最后一句。");
    }

    #[test]
    fn test_truncates_with_ellipsis() {
        let summary = extractive_summary("abcdefghij", 4);
        assert_eq!(summary, "abcd...");
    }

    #[tokio::test]
    async fn test_summarize_without_model() {
        let result = SummaryTool::new().summarize("Only one sentence.", 50).await;
        assert!(result.success);
        assert_eq!(result.tool_name, "summarize_text");
        assert_eq!(result.output.unwrap().summary, "Only one sentence.");
    }

    #[tokio::test]
    async fn test_summarize_with_model() {
        let tool = SummaryTool::with_model(Arc::new(EchoModel));
        let result = tool.summarize("rust", 50).await;
        assert_eq!(result.output.unwrap().summary, "RUST");
    }

    #[tokio::test]
    async fn test_model_failure_is_reported() {
        let tool = SummaryTool::with_model(Arc::new(BrokenModel));
        let result = tool.summarize("rust", 50).await;
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("connection refused"));
    }
}
