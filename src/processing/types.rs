//! Core data types and error definitions for the document pipeline.

use crate::{
    embedding::EmbeddingClientError, generation::GenerationClientError, prompt::PromptError,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Session used when a request does not name one.
pub const DEFAULT_SESSION: &str = "default";

/// An uploaded document awaiting ingestion.
#[derive(Debug, Clone)]
pub struct Document {
    /// Display name, usually the uploaded file name.
    pub name: String,
    /// Content type reported by the client, if any.
    pub content_type: Option<String>,
    /// Raw document bytes.
    pub bytes: Vec<u8>,
}

/// A contiguous span of extracted text used as the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Passage {
    /// Position of the passage within its document.
    pub index: usize,
    /// Byte offset where the passage starts in the extracted text.
    pub start: usize,
    /// Byte offset one past the passage end.
    pub end: usize,
    /// Passage text.
    pub text: String,
}

/// A passage paired with its embedding vector.
#[derive(Debug, Clone)]
pub struct IndexedPassage {
    /// Source passage.
    pub passage: Passage,
    /// Embedding of `passage.text`.
    pub vector: Vec<f32>,
}

/// Identifies an isolated pipeline binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    /// Build a key from a client-supplied identifier, falling back to the default session.
    pub fn new(raw: Option<&str>) -> Self {
        match raw.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => Self(value.to_string()),
            None => Self::default(),
        }
    }

    /// Underlying identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionKey {
    fn default() -> Self {
        Self(DEFAULT_SESSION.to_string())
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a session can answer questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    /// No index bound; questions are rejected.
    Empty,
    /// An index is bound; questions are answered against it.
    Ready,
}

/// Observable description of a session binding.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    /// Current state.
    pub state: PipelineState,
    /// Name of the indexed document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    /// Generation tag of the installed index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
    /// Unique identifier of the installed index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_id: Option<Uuid>,
    /// Passage count of the installed index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passages: Option<usize>,
    /// Build completion time (RFC 3339).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub built_at: Option<String>,
}

impl PipelineStatus {
    /// Status of a session with nothing bound.
    pub fn empty() -> Self {
        Self {
            state: PipelineState::Empty,
            document: None,
            generation: None,
            index_id: None,
            passages: None,
            built_at: None,
        }
    }
}

/// Summary of a successful build.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// Name of the indexed document.
    pub document: String,
    /// Generation tag of the installed index.
    pub generation: u64,
    /// Number of passages indexed.
    pub passages: usize,
    /// Characters of extracted text.
    pub characters: usize,
}

/// A retrieved passage and its similarity to the question.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedPassage {
    /// Position of the passage within its document.
    pub index: usize,
    /// Cosine similarity to the question.
    pub score: f32,
    /// Passage text.
    pub text: String,
}

/// Answer produced for one question.
#[derive(Debug, Clone)]
pub struct Answer {
    /// Generated answer text.
    pub answer: String,
    /// Passages used as context, nearest first.
    pub sources: Vec<RetrievedPassage>,
    /// Generation of the index that served the question.
    pub generation: u64,
}

/// Pipeline stage that exceeded its time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Embedding passages or the question.
    Embedding,
    /// Prompt template fetch.
    Prompt,
    /// Chat completion.
    Generation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Embedding => "embedding",
            Self::Prompt => "prompt template",
            Self::Generation => "generation",
        };
        f.write_str(name)
    }
}

/// Errors produced while turning an upload into plain text.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The document format is not recognized.
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),
    /// The bytes could not be parsed.
    #[error("failed to extract text: {0}")]
    Extraction(String),
    /// Extraction succeeded but produced no text.
    #[error("document contains no extractable text")]
    EmptyDocument,
}

/// Errors produced while splitting text into passages.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// Chunk size of zero cannot make progress.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave room for new text in every passage.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    InvalidOverlap {
        /// Configured chunk size.
        size: usize,
        /// Configured overlap.
        overlap: usize,
    },
}

/// Errors produced while assembling a vector index.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexBuildError {
    /// Embeddings and passages did not pair up.
    #[error("received {vectors} vectors for {passages} passages")]
    CountMismatch {
        /// Passage count.
        passages: usize,
        /// Vector count.
        vectors: usize,
    },
    /// A vector had a different size than the first one.
    #[error("passage {index} has dimension {actual}, expected {expected}")]
    InconsistentDimension {
        /// Offending passage.
        index: usize,
        /// Dimension of the first vector.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// Vectors had no components.
    #[error("embedding vectors are empty")]
    EmptyVector,
}

/// Errors emitted by the pipeline controller.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Upload carried no file.
    #[error("No file uploaded.")]
    NoFileProvided,
    /// The upload format is not supported.
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),
    /// Text extraction failed.
    #[error("Text extraction failed: {0}")]
    Extraction(String),
    /// Extraction produced no text.
    #[error("Document contains no extractable text")]
    EmptyDocument,
    /// Chunk parameters were rejected.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed.
    #[error("Embedding service error: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Index assembly failed.
    #[error("Index build failed: {0}")]
    IndexBuild(#[from] IndexBuildError),
    /// Prompt template could not be loaded.
    #[error("Prompt template error: {0}")]
    PromptTemplate(#[from] PromptError),
    /// No index is bound for the session.
    #[error("Index not initialized. Upload a file first.")]
    NotReady,
    /// Question was missing or blank.
    #[error("Question must not be empty.")]
    InvalidQuestion,
    /// Chat provider failed.
    #[error("Generation service error: {0}")]
    Generation(#[from] GenerationClientError),
    /// A collaborator call exceeded its time budget.
    #[error("{stage} timed out after {seconds}s")]
    Timeout {
        /// Stage that timed out.
        stage: Stage,
        /// Budget in seconds.
        seconds: u64,
    },
    /// A newer build for the same session started before this one finished.
    #[error("Build superseded by generation {newer}")]
    Superseded {
        /// Generation that replaced this build.
        newer: u64,
    },
    /// Anything else.
    #[error("Processing failed: {0}")]
    Processing(String),
}

impl PipelineError {
    /// Whether the failure was caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NoFileProvided
                | Self::UnsupportedFormat(_)
                | Self::NotReady
                | Self::InvalidQuestion
        )
    }
}

impl From<IngestError> for PipelineError {
    fn from(error: IngestError) -> Self {
        match error {
            IngestError::UnsupportedFormat(format) => Self::UnsupportedFormat(format),
            IngestError::Extraction(message) => Self::Extraction(message),
            IngestError::EmptyDocument => Self::EmptyDocument,
        }
    }
}
