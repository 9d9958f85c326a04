//! Journal prompt client with an offline fallback.
//!
//! The generator is best effort: any failure, including a slow answer, is
//! replaced by a prompt from the local table so callers always get text.

mod category;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::util::{error_detail, normalize_base_url};
use crate::{Error, Result};

pub use category::PromptCategory;

/// Upper bound on one generation request.
pub const PROMPT_TIMEOUT: Duration = Duration::from_secs(20);

/// Route of the prompt endpoint, relative to the API base URL.
pub const PROMPT_PATH: &str = "/prompts/generate";

/// Request body of the prompt endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRequest {
    #[serde(rename = "promptType")]
    pub prompt_type: String,
}

/// Response body of the prompt endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptResponse {
    pub prompt: String,
}

/// Where a prompt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptSource {
    Generated,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub source: PromptSource,
}

/// Rotates through each category's offline prompts.
#[derive(Debug, Default)]
pub struct FallbackTable {
    cursor: AtomicUsize,
}

impl FallbackTable {
    pub fn next(&self, category: PromptCategory) -> &'static str {
        let prompts = category.fallback_prompts();
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % prompts.len();
        prompts[index]
    }
}

pub struct PromptClient {
    endpoint: String,
    client: Client,
    timeout: Duration,
    access_token: Option<String>,
    fallbacks: FallbackTable,
}

impl fmt::Debug for PromptClient {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PromptClient")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl PromptClient {
    pub fn new(api_base_url: &str) -> Result<Self> {
        let base = normalize_base_url(api_base_url, "API base URL").map_err(Error::InvalidInput)?;
        Ok(Self {
            endpoint: format!("{base}{PROMPT_PATH}"),
            client: Client::builder().build()?,
            timeout: PROMPT_TIMEOUT,
            access_token: None,
            fallbacks: FallbackTable::default(),
        })
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send `token` as the bearer credential; the hosted endpoint requires one.
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// A prompt for `category`; never fails.
    pub async fn generate(&self, category: PromptCategory) -> Prompt {
        self.with_fallback(category, self.request(category)).await
    }

    /// Await `attempt` within the timeout, substituting a fallback on any failure.
    pub async fn with_fallback<F>(&self, category: PromptCategory, attempt: F) -> Prompt
    where
        F: Future<Output = Result<String>>,
    {
        let failure = match tokio::time::timeout(self.timeout, attempt).await {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                return Prompt {
                    text: text.trim().to_string(),
                    source: PromptSource::Generated,
                };
            }
            Ok(Ok(_)) => "generator returned an empty prompt".to_string(),
            Ok(Err(error)) => error.to_string(),
            Err(_) => format!("no answer within {}s", self.timeout.as_secs()),
        };

        tracing::warn!(category = category.slug(), "Using fallback prompt: {failure}");
        Prompt {
            text: self.fallbacks.next(category).to_string(),
            source: PromptSource::Fallback,
        }
    }

    async fn request(&self, category: PromptCategory) -> Result<String> {
        let body = PromptRequest {
            prompt_type: category.label().to_string(),
        };
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                service: "prompts",
                status: status.as_u16(),
                detail: error_detail(&text),
            });
        }
        Ok(response.json::<PromptResponse>().await?.prompt)
    }
}
