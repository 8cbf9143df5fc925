#![deny(missing_docs)]

//! Core library for the Rusty RAG question-answering server.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Chat completion client used to answer questions.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline activity counters.
pub mod metrics;
/// Document pipeline: ingestion, chunking, indexing, and answering.
pub mod processing;
/// Prompt template loading and rendering.
pub mod prompt;
