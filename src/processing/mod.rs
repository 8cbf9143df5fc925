//! Document pipeline: ingestion, chunking, indexing, and question answering.

pub mod chunking;
pub mod index;
pub mod ingest;
mod pipeline;
pub mod types;

pub use pipeline::{IndexSnapshot, PipelineApi, PipelineController, PipelineSettings};
pub use types::{
    Answer, BuildOutcome, ChunkingError, Document, IndexBuildError, IngestError, Passage,
    PipelineError, PipelineState, PipelineStatus, RetrievedPassage, SessionKey, Stage,
};
