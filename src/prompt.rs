//! Prompt templates for the answer generator.
//!
//! A template is plain text with `{question}` and `{context}` placeholders. The built-in template
//! is the widely used RAG prompt; deployments may point `PROMPT_TEMPLATE_URL` at a remote text
//! file instead, which is fetched once per index build and frozen into that index snapshot.

use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

const QUESTION_PLACEHOLDER: &str = "{question}";
const CONTEXT_PLACEHOLDER: &str = "{context}";

const DEFAULT_TEMPLATE: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, just say that you don't know. \
Use three sentences maximum and keep the answer concise.\n\
Question: {question} \n\
Context: {context} \n\
Answer:";

/// Errors raised while loading a prompt template.
#[derive(Debug, Error)]
pub enum PromptError {
    /// The remote template could not be downloaded.
    #[error("Failed to fetch prompt template from {url}: {message}")]
    Fetch {
        /// Template location.
        url: String,
        /// Transport or status detail.
        message: String,
    },
    /// The template lacks a required placeholder.
    #[error("Prompt template is missing the {0} placeholder")]
    MissingPlaceholder(&'static str),
}

/// A validated prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Validate `text` as a template.
    pub fn parse(text: impl Into<String>) -> Result<Self, PromptError> {
        let text = text.into();
        for placeholder in [QUESTION_PLACEHOLDER, CONTEXT_PLACEHOLDER] {
            if !text.contains(placeholder) {
                return Err(PromptError::MissingPlaceholder(placeholder));
            }
        }
        Ok(Self { text })
    }

    /// Substitute the question and context in a single pass.
    ///
    /// Placeholder-looking text inside the substituted values is left untouched.
    pub fn render(&self, question: &str, context: &str) -> String {
        let mut rendered = String::with_capacity(self.text.len() + question.len() + context.len());
        let mut rest = self.text.as_str();
        while let Some(position) = rest.find('{') {
            rendered.push_str(&rest[..position]);
            let tail = &rest[position..];
            if let Some(after) = tail.strip_prefix(QUESTION_PLACEHOLDER) {
                rendered.push_str(question);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(CONTEXT_PLACEHOLDER) {
                rendered.push_str(context);
                rest = after;
            } else {
                rendered.push('{');
                rest = &tail[1..];
            }
        }
        rendered.push_str(rest);
        rendered
    }

    /// Raw template text.
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Resolves the template used for a new index build.
#[derive(Clone)]
pub struct PromptLoader {
    http: Client,
    url: Option<String>,
}

impl PromptLoader {
    /// Loader that always yields the built-in template.
    pub fn built_in() -> Self {
        Self {
            http: Client::new(),
            url: None,
        }
    }

    /// Loader fetching from `url` when present, with the given request timeout.
    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self, PromptError> {
        let http = Client::builder()
            .user_agent("rusty-rag/prompt")
            .timeout(timeout)
            .build()
            .map_err(|error| PromptError::Fetch {
                url: url.clone().unwrap_or_default(),
                message: error.to_string(),
            })?;
        Ok(Self { http, url })
    }

    /// Fetch (or return) the template for one build.
    pub async fn load(&self) -> Result<PromptTemplate, PromptError> {
        let Some(url) = self.url.as_deref() else {
            return Ok(PromptTemplate::default());
        };

        let fetch_error = |message: String| PromptError::Fetch {
            url: url.to_string(),
            message,
        };
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|error| fetch_error(error.to_string()))?;
        if !response.status().is_success() {
            return Err(fetch_error(format!("status {}", response.status())));
        }
        let text = response
            .text()
            .await
            .map_err(|error| fetch_error(error.to_string()))?;
        tracing::debug!(url, chars = text.len(), "Fetched prompt template");
        PromptTemplate::parse(text)
    }
}
