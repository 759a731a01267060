//! Language-model fallback extraction.
//!
//! When structural extraction cannot fill a field, the parser hands the raw
//! HTML and a natural-language description of the field to a
//! [`FallbackExtractor`]. The crate ships one implementation,
//! [`ChatCompletionExtractor`], that talks to any OpenAI-compatible
//! `/chat/completions` endpoint.

use async_trait::async_trait;

use crate::error::BoxError;

/// Extracts one field from raw HTML given a description of what to find.
///
/// Implementations own their timeouts; a timeout is reported as an ordinary
/// error and the parser treats the field as still missing.
#[async_trait]
pub trait FallbackExtractor: Send + Sync {
    async fn extract(&self, html: &str, field_description: &str) -> std::result::Result<String, BoxError>;
}

/// Sentinel the model is asked to answer with when the field is absent.
pub const NOT_FOUND_SENTINEL: &str = "NONE";

/// Builds the user prompt sent for one field.
pub fn build_prompt(html: &str, field_description: &str, max_html_chars: usize) -> String {
    format!(
        "Extract {} from the HTML document below.\n\
         Answer with the value only, as plain text, with no explanation or quoting.\n\
         If the document does not contain it, answer {}.\n\n\
         HTML:\n{}",
        field_description,
        NOT_FOUND_SENTINEL,
        truncate_chars(html, max_html_chars)
    )
}

/// Normalizes a model answer; empty answers and the sentinel are errors.
pub fn clean_answer(answer: &str) -> std::result::Result<String, BoxError> {
    let trimmed = answer.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`').trim();

    if trimmed.is_empty() {
        return Err("model returned an empty answer".into());
    }
    if trimmed.eq_ignore_ascii_case(NOT_FOUND_SENTINEL) {
        return Err("model reported the field as absent".into());
    }
    Ok(trimmed.to_string())
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(feature = "llm")]
pub use chat::{ChatCompletionExtractor, ChatExtractorConfig};

#[cfg(feature = "llm")]
mod chat {
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::Client;
    use serde::{Deserialize, Serialize};

    use super::{FallbackExtractor, build_prompt, clean_answer};
    use crate::error::BoxError;
    use crate::{GleanerError, Result};

    const SYSTEM_PROMPT: &str = "You extract single fields from news web pages. \
        Reply with the requested value only.";

    /// Settings for [`ChatCompletionExtractor`].
    #[derive(Debug, Clone)]
    pub struct ChatExtractorConfig {
        /// Base URL of an OpenAI-compatible API, without the `/chat/completions` suffix.
        pub endpoint: String,
        pub model: String,
        pub api_key: String,
        pub temperature: f32,
        /// HTML beyond this many characters is cut before sending.
        pub max_html_chars: usize,
        /// Request timeout in seconds.
        pub timeout: u64,
    }

    impl Default for ChatExtractorConfig {
        fn default() -> Self {
            Self {
                endpoint: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_key: String::new(),
                temperature: 0.0,
                max_html_chars: 60_000,
                timeout: 60,
            }
        }
    }

    impl ChatExtractorConfig {
        /// Default settings with the key read from `OPENAI_API_KEY`.
        pub fn from_env() -> Result<Self> {
            let api_key = std::env::var("OPENAI_API_KEY")
                .map_err(|_| GleanerError::Config("OPENAI_API_KEY not set".to_string()))?;
            Ok(Self { api_key, ..Self::default() })
        }

        pub fn with_model(mut self, model: impl Into<String>) -> Self {
            self.model = model.into();
            self
        }

        pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
            self.endpoint = endpoint.into();
            self
        }

        fn completions_url(&self) -> String {
            format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
        }
    }

    #[derive(Serialize)]
    struct ChatRequest<'a> {
        model: &'a str,
        messages: Vec<ChatMessage>,
        temperature: f32,
    }

    #[derive(Serialize, Deserialize)]
    struct ChatMessage {
        role: String,
        content: String,
    }

    #[derive(Deserialize)]
    struct ChatResponse {
        choices: Vec<ChatChoice>,
    }

    #[derive(Deserialize)]
    struct ChatChoice {
        message: ChatMessage,
    }

    /// Fallback extractor backed by a chat-completions API.
    #[derive(Debug, Clone)]
    pub struct ChatCompletionExtractor {
        client: Client,
        config: ChatExtractorConfig,
    }

    impl ChatCompletionExtractor {
        pub fn new(config: ChatExtractorConfig) -> Result<Self> {
            if config.api_key.is_empty() {
                return Err(GleanerError::Config("chat extractor needs an API key".to_string()));
            }
            let client = Client::builder()
                .timeout(Duration::from_secs(config.timeout))
                .build()?;
            Ok(Self { client, config })
        }

        /// Builds an extractor from `OPENAI_API_KEY` with default settings.
        pub fn from_env() -> Result<Self> {
            Self::new(ChatExtractorConfig::from_env()?)
        }

        pub fn config(&self) -> &ChatExtractorConfig {
            &self.config
        }
    }

    #[async_trait]
    impl FallbackExtractor for ChatCompletionExtractor {
        async fn extract(&self, html: &str, field_description: &str) -> std::result::Result<String, BoxError> {
            let request = ChatRequest {
                model: &self.config.model,
                messages: vec![
                    ChatMessage { role: "system".to_string(), content: SYSTEM_PROMPT.to_string() },
                    ChatMessage {
                        role: "user".to_string(),
                        content: build_prompt(html, field_description, self.config.max_html_chars),
                    },
                ],
                temperature: self.config.temperature,
            };

            tracing::debug!(model = %self.config.model, field = field_description, "Requesting fallback extraction");

            let response = self
                .client
                .post(self.config.completions_url())
                .header("Authorization", format!("Bearer {}", self.config.api_key))
                .json(&request)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        Box::new(GleanerError::Timeout { timeout: self.config.timeout }) as BoxError
                    } else {
                        Box::new(e) as BoxError
                    }
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(%status, "Chat completion request failed");
                return Err(format!("chat completion failed with {}: {}", status, body).into());
            }

            let parsed: ChatResponse = response.json().await?;
            let answer = parsed
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .ok_or("chat completion returned no choices")?;

            clean_answer(&answer)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_config_defaults() {
            let config = ChatExtractorConfig::default();
            assert_eq!(config.endpoint, "https://api.openai.com/v1");
            assert_eq!(config.temperature, 0.0);
            assert!(config.api_key.is_empty());
        }

        #[test]
        fn test_completions_url_trims_slash() {
            let config = ChatExtractorConfig::default().with_endpoint("http://localhost:8080/v1/");
            assert_eq!(config.completions_url(), "http://localhost:8080/v1/chat/completions");
        }

        #[test]
        fn test_requires_api_key() {
            let result = ChatCompletionExtractor::new(ChatExtractorConfig::default());
            assert!(matches!(result, Err(GleanerError::Config(_))));
        }

        #[test]
        fn test_response_parsing() {
            let body = r#"{"choices":[{"message":{"role":"assistant","content":" Dana Whitfield\n"}}]}"#;
            let parsed: ChatResponse = serde_json::from_str(body).unwrap();
            let answer = parsed.choices.into_iter().next().unwrap().message.content;
            assert_eq!(clean_answer(&answer).unwrap(), "Dana Whitfield");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_carries_description_and_html() {
        let prompt = build_prompt("<p>hello</p>", "the author", 1000);
        assert!(prompt.contains("the author"));
        assert!(prompt.contains("<p>hello</p>"));
        assert!(prompt.contains(NOT_FOUND_SENTINEL));
    }

    #[test]
    fn test_prompt_truncates_on_char_boundary() {
        let prompt = build_prompt("ééééé", "the title", 3);
        assert!(prompt.ends_with("ééé"));
    }

    #[test]
    fn test_clean_answer() {
        assert_eq!(clean_answer("  \"Harbor reopens\" ").unwrap(), "Harbor reopens");
        assert!(clean_answer("   ").is_err());
        assert!(clean_answer("none").is_err());
    }
}
