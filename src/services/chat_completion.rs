/// General-purpose language model used for non-recommendation turns
use reqwest::Client as HttpClient;
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    models::{CompletionMessage, CompletionRequest, CompletionResponse},
};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Returns the assistant reply to the conversation so far
    async fn complete(&self, messages: Vec<CompletionMessage>) -> AppResult<String>;

    fn name(&self) -> &'static str;
}

/// OpenAI-compatible `/v1/chat/completions` client
#[derive(Clone)]
pub struct OpenAiChat {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
}

impl OpenAiChat {
    pub fn new(api_key: String, api_url: String, model: String, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            model,
        })
    }
}

#[async_trait::async_trait]
impl ChatCompletion for OpenAiChat {
    async fn complete(&self, messages: Vec<CompletionMessage>) -> AppResult<String> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages,
        };

        let response = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Chat completion returned status {}: {}",
                status, body
            )));
        }

        let completion: CompletionResponse = response.json().await?;
        let reply = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AppError::ExternalApi("Chat completion returned no choices".to_string()))?;

        tracing::debug!(model = %self.model, reply_len = reply.len(), "Chat completion received");
        Ok(reply)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
