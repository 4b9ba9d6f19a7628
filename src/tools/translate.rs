//! Text translation.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::llm::LanguageModel;
use super::ToolResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationOutput {
    pub translated_text: String,
}

/// Translates with the configured model; without one, tags the text with the target language.
#[derive(Clone, Default)]
pub struct TranslationTool {
    model: Option<Arc<dyn LanguageModel>>,
}

impl TranslationTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(model: Arc<dyn LanguageModel>) -> Self {
        Self { model: Some(model) }
    }

    /// `source_language` may be `"auto"`.
    pub async fn translate(
        &self,
        text: &str,
        target_language: &str,
        source_language: &str,
    ) -> ToolResult<TranslationOutput> {
        let started = Instant::now();
        let input = json!({
            "text": text,
            "target_language": target_language,
            "source_language": source_language,
        });

        let outcome = match &self.model {
            Some(model) => {
                let prompt = format!(
                    "Translate the context from {source_language} to {target_language}. \
                     Reply with the translation only."
                );
                model.complete(&prompt, text).await
            }
            None => Ok(tag_language(text, target_language)),
        };

        ToolResult::timed(
            "translate",
            input,
            started,
            outcome.map(|translated_text| TranslationOutput { translated_text }),
        )
    }
}

fn tag_language(text: &str, target_language: &str) -> String {
    match target_language.to_lowercase().as_str() {
        "en" | "english" => format!("[EN] {text}"),
        "zh" | "chinese" | "中文" => format!("[ZH] {text}"),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tags_known_languages() {
        let tool = TranslationTool::new();
        let en = tool.translate("你好", "English", "auto").await;
        assert_eq!(en.output.unwrap().translated_text, "[EN] 你好");

        let zh = tool.translate("hello", "zh", "en").await;
        assert_eq!(zh.output.unwrap().translated_text, "[ZH] hello");
    }

    #[tokio::test]
    async fn test_unknown_language_passes_through() {
        let result = TranslationTool::new().translate("hola", "fr", "es").await;
        assert!(result.success);
        assert_eq!(result.input["target_language"], "fr");
        assert_eq!(result.output.unwrap().translated_text, "hola");
    }
}
