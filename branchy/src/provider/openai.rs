//! OpenAI-style chat completion provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChatProvider, HistoryEntry};
use crate::error::ProviderError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

const TITLE_SYSTEM_PROMPT: &str = "Generate a concise, descriptive title (3-6 words) \
for a conversation based on the user's question and assistant's response. Focus on the \
main topic or intent. Return only the title, no quotes or additional text.";

/// Provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl ProviderConfig {
    /// Build a configuration from the environment (`OPENAI_API_KEY`,
    /// optional `OPENAI_BASE_URL` and `BRANCHY_MODEL`).
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ProviderError::Config("OPENAI_API_KEY is not set".into()))?;
        Ok(Self {
            api_key,
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: std::env::var("BRANCHY_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        })
    }

    /// Override the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Chat provider backed by an OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn chat(&self, request: CompletionRequest<'_>) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        let body: CompletionResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::Malformed("response contained no choices".into()))
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn complete(&self, history: &[HistoryEntry]) -> Result<String, ProviderError> {
        let messages = history
            .iter()
            .map(|entry| WireMessage {
                role: entry.role.as_str(),
                content: &entry.text,
            })
            .collect();

        self.chat(CompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: None,
            temperature: None,
        })
        .await
    }

    async fn generate_title(
        &self,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<String, ProviderError> {
        let prompt =
            format!("User question: {user_text}\n\nAssistant response: {assistant_text}");
        let messages = vec![
            WireMessage {
                role: "system",
                content: TITLE_SYSTEM_PROMPT,
            },
            WireMessage {
                role: "user",
                content: &prompt,
            },
        ];

        let title = self
            .chat(CompletionRequest {
                model: &self.config.model,
                messages,
                max_tokens: Some(20),
                temperature: Some(0.7),
            })
            .await?;

        Ok(title.trim().trim_matches(['"', '\'']).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_request_serializes_expected_wire_shape() {
        let request = CompletionRequest {
            model: "gpt-3.5-turbo",
            messages: vec![WireMessage {
                role: "user",
                content: "Hello",
            }],
            max_tokens: Some(20),
            temperature: Some(0.7),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "gpt-3.5-turbo");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["max_tokens"], 20);
    }

    #[test]
    fn absent_sampling_knobs_are_omitted() {
        let request = CompletionRequest {
            model: "gpt-3.5-turbo",
            messages: vec![],
            max_tokens: None,
            temperature: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("max_tokens").is_none());
        assert!(value.get("temperature").is_none());
    }

    #[test]
    fn completion_response_extracts_first_choice() {
        let body: CompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"Hi there"}}]}"#,
        )
        .unwrap();
        assert_eq!(body.choices[0].message.content, "Hi there");
    }
}
