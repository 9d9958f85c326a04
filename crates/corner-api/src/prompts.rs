//! Journal prompt generation through an OpenRouter-compatible chat endpoint.

use std::fmt;
use std::time::Duration;

use corner_core::prompts::PromptCategory;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::AppError;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_FALLBACK: &str =
    "What insights about yourself have you gained today that might help you grow tomorrow?";

#[derive(Clone)]
pub struct PromptService {
    api_key: Option<String>,
    model: String,
    url: String,
    client: reqwest::Client,
}

impl fmt::Debug for PromptService {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PromptService")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Default, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

impl PromptService {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()
            .map_err(|error| AppError::internal(format!("Failed to build HTTP client: {error}")))?;
        Ok(Self {
            api_key: config.openrouter_api_key.clone(),
            model: config.openrouter_model.clone(),
            url: config.openrouter_url.clone(),
            client,
        })
    }

    pub const fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// One reflective question about `prompt_type`.
    pub async fn generate(&self, prompt_type: &str) -> Result<String, AppError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(fallback_prompt(prompt_type).to_string());
        };

        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: format!(
                        "You are a helpful assistant that generates thoughtful, meaningful, and \
                         heartfelt questions about {prompt_type}. Create a single question that \
                         encourages self-reflection and mindfulness without further explanation."
                    ),
                },
                ChatMessage {
                    role: "user",
                    content: format!(
                        "Generate a heartfelt question about {prompt_type} that encourages \
                         self-reflection."
                    ),
                },
            ],
            max_tokens: 300,
            temperature: 0.7,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .header("HTTP-Referer", "https://mycorner.app")
            .header("X-Title", "MyCorner App")
            .json(&request)
            .send()
            .await
            .map_err(|error| AppError::external(format!("Prompt model request failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::external(format!(
                "Prompt model returned HTTP {}: {}",
                status.as_u16(),
                corner_core::util::error_detail(&body)
            )));
        }

        let payload: ChatResponse = response.json().await.map_err(|error| {
            AppError::external(format!("Prompt model returned invalid JSON: {error}"))
        })?;
        let message = payload
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::external("Prompt model returned no choices"))?
            .message;

        Ok(extract_prompt(&message).unwrap_or_else(|| {
            tracing::info!(prompt_type, "Model answer had no question, using fallback");
            fallback_prompt(prompt_type).to_string()
        }))
    }
}

/// `content` when present, else the first question found in `reasoning`.
fn extract_prompt(message: &AssistantMessage) -> Option<String> {
    let content = message.content.as_deref().map_or("", str::trim);
    if !content.is_empty() {
        return Some(content.to_string());
    }
    message
        .reasoning
        .as_deref()?
        .lines()
        .find(|line| line.contains('?') && line.len() > 10 && line.len() < 200)
        .map(|line| line.trim().to_string())
}

pub fn fallback_prompt(prompt_type: &str) -> &'static str {
    match prompt_type.parse::<PromptCategory>() {
        Ok(PromptCategory::Day) => {
            "What moments from today made you feel most connected to your authentic self?"
        }
        Ok(PromptCategory::Emotions) => {
            "How have your emotions been guiding your decisions lately, and what might they be trying to tell you?"
        }
        Ok(PromptCategory::SelfReflection) => {
            "What parts of yourself are you still learning to accept and appreciate?"
        }
        Ok(PromptCategory::Gratitude) => {
            "What unexpected blessing has appeared in your life recently that you haven't fully acknowledged?"
        }
        Ok(PromptCategory::Mindfulness) => {
            "What sensations, sounds, or sights are you aware of right now that you might normally overlook?"
        }
        Ok(PromptCategory::Growth) => {
            "What small step could you take today that aligns with your deeper values and aspirations?"
        }
        Err(_) => DEFAULT_FALLBACK,
    }
}
