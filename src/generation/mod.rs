//! Answer generation through an OpenAI-compatible chat-completion endpoint.
//!
//! The default deployment talks to Groq, but any server exposing `/chat/completions` with bearer
//! authentication works. The rendered RAG prompt is sent as a single user message.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced while asking the chat model for an answer.
#[derive(Debug, Error)]
pub enum GenerationClientError {
    /// Provider was misconfigured or unreachable.
    #[error("Chat provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Prompt handed to the generator once retrieval has assembled the context.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Original user question.
    pub question: String,
    /// Fully rendered prompt containing the question and retrieved context.
    pub prompt: String,
}

/// Interface implemented by answer generators.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Produce a natural-language answer for the rendered prompt.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError>;
}

/// Build a generator for an explicit configuration.
pub fn build_answer_generator(
    config: &Config,
) -> Result<Arc<dyn AnswerGenerator>, GenerationClientError> {
    let api_key = config.chat_api_key.clone().ok_or_else(|| {
        GenerationClientError::ProviderUnavailable(
            "CHAT_API_KEY (or GROQ_API_KEY) is not set".into(),
        )
    })?;
    tracing::info!(
        model = %config.chat_model,
        base_url = %config.chat_api_base_url,
        "Initializing chat client"
    );
    Ok(Arc::new(ChatCompletionClient::new(
        config.chat_api_base_url.clone(),
        api_key,
        config.chat_model.clone(),
        config.chat_temperature,
        Duration::from_secs(config.generation_timeout_secs),
    )?))
}

/// Client for `POST {base_url}/chat/completions`.
pub struct ChatCompletionClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionClient {
    /// Construct a client for the given endpoint and model.
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, GenerationClientError> {
        let http = Client::builder()
            .user_agent("rusty-rag/chat")
            .timeout(timeout)
            .build()
            .map_err(|error| GenerationClientError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            api_key,
            model,
            temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl AnswerGenerator for ChatCompletionClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError> {
        let payload = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "user", "content": request.prompt }
            ],
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationClientError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationClientError::ProviderUnavailable(format!(
                "chat endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationClientError::GenerationFailed(format!(
                "provider returned {status}: {body}"
            )));
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|error| {
            GenerationClientError::InvalidResponse(format!("failed to decode response: {error}"))
        })?;

        let answer = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                GenerationClientError::InvalidResponse("response contained no choices".into())
            })?;

        tracing::debug!(
            model = %self.model,
            question_chars = request.question.len(),
            answer_chars = answer.len(),
            "Chat completion received"
        );
        Ok(answer.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn client(server: &MockServer) -> ChatCompletionClient {
        ChatCompletionClient::new(
            server.base_url(),
            "secret".into(),
            "llama-3.3-70b-versatile".into(),
            0.0,
            Duration::from_secs(5),
        )
        .expect("client")
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            question: "What is Rust?".into(),
            prompt: "Question: What is Rust?\nContext: a language".into(),
        }
    }

    #[tokio::test]
    async fn chat_client_handles_successful_response() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer secret")
                    .body_contains("llama-3.3-70b-versatile");
                then.status(200).json_body(json!({
                    "choices": [
                        { "message": { "role": "assistant", "content": "  A language.  " } }
                    ]
                }));
            })
            .await;

        let answer = client(&server).generate(request()).await.expect("answer");

        mock.assert_async().await;
        assert_eq!(answer, "A language.");
    }

    #[tokio::test]
    async fn chat_client_handles_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(500).body("boom");
            })
            .await;

        let error = client(&server)
            .generate(request())
            .await
            .expect_err("error response");

        assert!(matches!(
            error,
            GenerationClientError::GenerationFailed(ref message) if message.contains("500")
        ));
    }

    #[tokio::test]
    async fn chat_client_rejects_empty_choices() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = client(&server)
            .generate(request())
            .await
            .expect_err("no choices");

        assert!(matches!(error, GenerationClientError::InvalidResponse(_)));
    }
}
