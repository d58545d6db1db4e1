use crate::config::LlmConfig;
use crate::error::{AppError, Result};
use crate::metrics::LLM_REQUEST_DURATION_SECONDS;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error};

pub const SYSTEM_PROMPT: &str = "\
You extract Titanic passenger info from a user's natural language message.
ONLY process messages about Titanic passengers. If the message is not about a passenger, return is_relevant: false.
REQUIRED fields (never null): pclass (1|2|3), name (string), sex (male|female)
OPTIONAL fields (can be null): age (number), fare (number)
DEFAULT fields: sibsp=0, parch=0, embarked='S'
IMPORTANT EXTRACTION RULES:
- 'first class' or '1st class' = pclass: 1
- 'second class' or '2nd class' = pclass: 2
- 'third class' or '3rd class' = pclass: 3
- 'girl' or 'woman' or 'female' = sex: 'female'
- 'boy' or 'man' or 'male' = sex: 'male'
- 'Cherbourg' = embarked: 'C'
- 'Queenstown' = embarked: 'Q'
- 'Southampton' = embarked: 'S'
- Extract age numbers (e.g., '8 years old' = age: 8)
- Extract fare numbers (e.g., '30 pounds' = fare: 30)
Always provide a name, even if generic like 'Unknown Passenger'.
Always provide a sex, infer from context if needed.
Always provide a pclass, infer from context if needed.
Return valid JSON with keys: is_relevant (boolean), passenger (object), reasoning (string).";

/// Wrap a user message for the extraction prompt
pub fn user_prompt(message: &str) -> String {
    format!(
        "Message: {}\nOutput strictly in JSON with keys: is_relevant (boolean), passenger (object), reasoning (string).",
        message
    )
}

/// A chat model that answers a system + user prompt pair with text
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run one completion; transport failures are `Integration` errors
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// Model identifier, for logs
    fn name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint
#[derive(Clone)]
pub struct OpenAiChatModel {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: api_key.into(),
            temperature: config.temperature,
        })
    }

    /// Build from config, or `None` when disabled or no API key is set
    pub fn from_config(config: &LlmConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        match config.api_key() {
            Some(key) => Self::new(config, key).map(Some),
            None => Ok(None),
        }
    }

    async fn send(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::integration("llm", format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::integration(
                "llm",
                format!("Chat completion returned {}: {}", status, body),
            ));
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            AppError::integration("llm", format!("Invalid chat completion body: {}", e))
        })?;

        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let start = Instant::now();
        let result = self.send(system, user).await;
        let elapsed = start.elapsed().as_secs_f64();

        match &result {
            Ok(content) => {
                LLM_REQUEST_DURATION_SECONDS
                    .with_label_values(&["success"])
                    .observe(elapsed);
                debug!(model = %self.model, chars = content.len(), "LLM response received");
            }
            Err(e) => {
                LLM_REQUEST_DURATION_SECONDS
                    .with_label_values(&["error"])
                    .observe(elapsed);
                error!(model = %self.model, error = %e, "LLM request failed");
            }
        }

        result
    }

    fn name(&self) -> &str {
        &self.model
    }
}
