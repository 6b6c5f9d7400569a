//! Generation client: the only place that talks to the external text generator.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::{
    config::GenerationConfig,
    error::GenerationError,
    prompt::{self, PromptContext, ScriptGroupPrompt},
    types::Chunk,
};

/// One outbound completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Seam between the pipeline and a text generation service.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Perform exactly one outbound call and return the raw text answer.
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Get the model name for logging
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible `chat/completions` backend.
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsClient {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let api_key = config.provider.validate_api_key()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GenerationError::service(format!("HTTP client setup: {e}"), false))?;

        Ok(Self {
            client,
            api_url: config.api_url(),
            api_key,
            model: config.model(),
        })
    }
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[async_trait]
impl GenerationBackend for ChatCompletionsClient {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [
                    {
                        "role": "system",
                        "content": request.system,
                    },
                    {
                        "role": "user",
                        "content": request.user,
                    },
                ],
                "temperature": request.temperature,
                "max_tokens": request.max_tokens,
            }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let parsed: ApiResponse = serde_json::from_str(&body).map_err(|e| {
            GenerationError::service(format!("Invalid API response body: {e}"), true)
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                GenerationError::service(
                    format!("Invalid API response structure: {}", crate::error::excerpt(&body)),
                    true,
                )
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn transport_error(err: reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        GenerationError::timeout(err.to_string())
    } else {
        GenerationError::service(err.to_string(), true)
    }
}

/// Map a non-success HTTP answer onto the generation error taxonomy.
pub fn classify_status(status: StatusCode, body: &str) -> GenerationError {
    let message = format!("API error {}: {}", status, crate::error::excerpt(body));
    if status == StatusCode::TOO_MANY_REQUESTS
        || body.contains("rate_limit_exceeded")
        || body.contains("tokens per minute")
    {
        GenerationError::rate_limited(message)
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        GenerationError::timeout(message)
    } else if status.is_server_error() {
        GenerationError::service(message, true)
    } else {
        GenerationError::service(message, false)
    }
}

/// Builds prompts for chunks and script groups and sends them, one call each.
#[derive(Clone)]
pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
    config: GenerationConfig,
}

impl GenerationClient {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: GenerationConfig) -> Self {
        Self { backend, config }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Ask for the slides of one content chunk.
    pub async fn generate(
        &self,
        context: &PromptContext,
        chunk: &Chunk,
        total_chunks: usize,
    ) -> Result<String, GenerationError> {
        let max_tokens = if total_chunks > 1 {
            self.config.chunk_max_tokens
        } else {
            self.config.max_tokens
        };
        let request = GenerationRequest {
            system: prompt::slide_system_prompt(),
            user: prompt::slide_user_prompt(context, chunk, total_chunks),
            temperature: self.config.temperature,
            max_tokens,
        };
        debug!(
            chunk = chunk.index,
            total_chunks,
            words = chunk.word_count,
            model = self.model_name(),
            "requesting slides"
        );
        self.backend.complete(&request).await
    }

    /// Ask for the speaker scripts of one slide group.
    pub async fn generate_scripts(
        &self,
        group: &ScriptGroupPrompt<'_>,
        strict: bool,
    ) -> Result<String, GenerationError> {
        let request = GenerationRequest {
            system: prompt::script_system_prompt(),
            user: prompt::script_user_prompt(group, strict),
            temperature: self.config.temperature,
            max_tokens: self.config.script_max_tokens,
        };
        debug!(
            group = group.group_index,
            slides = group.slides.len(),
            strict,
            "requesting scripts"
        );
        self.backend.complete(&request).await
    }
}
