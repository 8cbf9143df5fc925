//! Pipeline controller: builds per-session indexes and answers questions against them.
//!
//! Each session owns at most one [`IndexSnapshot`]. A build runs ingestion, chunking, embedding,
//! and prompt loading without touching shared state, then installs its snapshot with a single
//! pointer swap under a short write lock. Readers clone the `Arc` and never observe a partially
//! built index.
//!
//! Builds draw a generation ticket before doing any work. A finished build replaces the installed
//! snapshot only when its ticket is newer, so among overlapping builds for one session the one
//! that started last wins, regardless of which finishes first. A failed build leaves the
//! previously installed snapshot in place.

use crate::{
    config::Config,
    embedding::{
        EmbeddingClient, EmbeddingClientError, EmbeddingTask, build_embedding_client,
        ensure_dimension,
    },
    generation::{AnswerGenerator, GenerationRequest, build_answer_generator},
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        chunking::chunk_text,
        index::{DEFAULT_TOP_K, VectorIndex},
        ingest::extract_text,
        types::{
            Answer, BuildOutcome, Document, PipelineError, PipelineState, PipelineStatus,
            RetrievedPassage, SessionKey, Stage,
        },
    },
    prompt::{PromptLoader, PromptTemplate},
};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt, stream};
use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

/// Passages sent to the embedder per call.
const EMBEDDING_BATCH_SIZE: usize = 100;
/// Embedding calls in flight per build.
const EMBEDDING_CONCURRENCY: usize = 4;

/// Abstraction over the pipeline used by the HTTP surface.
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Index a document for `session`, replacing any previous index on success.
    async fn build(
        &self,
        session: &SessionKey,
        document: Document,
    ) -> Result<BuildOutcome, PipelineError>;

    /// Answer a question from the index bound to `session`.
    async fn ask(&self, session: &SessionKey, question: &str) -> Result<Answer, PipelineError>;

    /// Describe the binding currently installed for `session`.
    fn status(&self, session: &SessionKey) -> PipelineStatus;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Tunables for chunking, retrieval, and collaborator time budgets.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Maximum passage length in characters.
    pub chunk_size: usize,
    /// Characters shared by neighbouring passages.
    pub chunk_overlap: usize,
    /// Passages retrieved per question.
    pub top_k: usize,
    /// Separator placed between retrieved passages.
    pub context_delimiter: String,
    /// Expected embedding dimension, checked when set.
    pub embedding_dimension: Option<usize>,
    /// Budget for one embedding call.
    pub embedding_timeout: Duration,
    /// Budget for one chat completion or prompt fetch.
    pub generation_timeout: Duration,
    /// Sessions kept bound at once; the oldest build is dropped past this.
    pub max_sessions: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: DEFAULT_TOP_K,
            context_delimiter: "\n".to_string(),
            embedding_dimension: None,
            embedding_timeout: Duration::from_secs(30),
            generation_timeout: Duration::from_secs(60),
            max_sessions: 64,
        }
    }
}

impl PipelineSettings {
    /// Derive settings from the runtime configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.text_splitter_chunk_size,
            chunk_overlap: config.text_splitter_chunk_overlap,
            top_k: config.retrieval_top_k,
            context_delimiter: config.context_delimiter.clone(),
            embedding_dimension: config.embedding_dimension,
            embedding_timeout: Duration::from_secs(config.embedding_timeout_secs),
            generation_timeout: Duration::from_secs(config.generation_timeout_secs),
            max_sessions: config.max_sessions,
        }
    }
}

/// A complete, immutable index binding.
#[derive(Debug)]
pub struct IndexSnapshot {
    /// Build ticket; higher values started later.
    pub generation: u64,
    /// Unique identifier of this index.
    pub index_id: Uuid,
    /// Name of the indexed document.
    pub document_name: String,
    /// SHA-256 of the uploaded bytes.
    pub document_digest: String,
    /// Build completion time (RFC 3339).
    pub built_at: String,
    /// Template frozen at build time.
    pub prompt: PromptTemplate,
    /// Indexed passages.
    pub index: VectorIndex,
}

/// Owns the per-session bindings and the collaborators shared by all sessions.
pub struct PipelineController {
    embedder: Arc<dyn EmbeddingClient>,
    generator: Arc<dyn AnswerGenerator>,
    prompts: PromptLoader,
    settings: PipelineSettings,
    sessions: RwLock<HashMap<SessionKey, Arc<IndexSnapshot>>>,
    generations: AtomicU64,
    metrics: PipelineMetrics,
}

impl PipelineController {
    /// Wire a controller from explicit collaborators.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        generator: Arc<dyn AnswerGenerator>,
        prompts: PromptLoader,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            embedder,
            generator,
            prompts,
            settings,
            sessions: RwLock::new(HashMap::new()),
            generations: AtomicU64::new(0),
            metrics: PipelineMetrics::new(),
        }
    }

    /// Build collaborators from configuration and wire a controller.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let embedder = build_embedding_client(config)?;
        let generator = build_answer_generator(config)?;
        let prompts = PromptLoader::new(
            config.prompt_template_url.clone(),
            Duration::from_secs(config.generation_timeout_secs),
        )?;
        Ok(Self::new(
            embedder,
            generator,
            prompts,
            PipelineSettings::from_config(config),
        ))
    }

    /// Snapshot currently bound to `session`, if any.
    pub fn current(&self, session: &SessionKey) -> Option<Arc<IndexSnapshot>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session)
            .cloned()
    }

    /// Run the build pipeline and install the result for `session`.
    pub async fn build(
        &self,
        session: &SessionKey,
        document: Document,
    ) -> Result<BuildOutcome, PipelineError> {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(
            session = %session,
            document = %document.name,
            bytes = document.bytes.len(),
            generation,
            "Building index"
        );

        let result = self.build_snapshot(generation, document).await;
        let outcome = result.and_then(|snapshot| self.install(session, snapshot));
        match &outcome {
            Ok(outcome) => {
                self.metrics.record_build(outcome.passages as u64);
                tracing::info!(
                    session = %session,
                    document = %outcome.document,
                    passages = outcome.passages,
                    characters = outcome.characters,
                    generation,
                    "Index ready"
                );
            }
            Err(error) => {
                self.metrics.record_build_failure();
                tracing::warn!(
                    session = %session,
                    generation,
                    error = %error,
                    "Index build failed; previous binding kept"
                );
            }
        }
        outcome
    }

    async fn build_snapshot(
        &self,
        generation: u64,
        document: Document,
    ) -> Result<(IndexSnapshot, usize), PipelineError> {
        let document_name = document.name.clone();
        let document_digest = hex::encode(Sha256::digest(&document.bytes));

        let extracted = tokio::task::spawn_blocking(move || extract_text(&document))
            .await
            .map_err(|error| {
                PipelineError::Processing(format!("extraction task failed: {error}"))
            })??;
        let characters = extracted.text.chars().count();

        let passages = chunk_text(
            &extracted.text,
            self.settings.chunk_size,
            self.settings.chunk_overlap,
        )?;
        tracing::debug!(
            document = %document_name,
            format = ?extracted.format,
            passages = passages.len(),
            chunk_size = self.settings.chunk_size,
            chunk_overlap = self.settings.chunk_overlap,
            "Document chunked"
        );

        let texts: Vec<String> = passages.iter().map(|passage| passage.text.clone()).collect();
        let task = EmbeddingTask::Document {
            title: Some(document_name.clone()),
        };
        let vectors = self.embed_passages(texts, task).await?;
        ensure_dimension(&vectors, self.settings.embedding_dimension)?;
        let index = VectorIndex::from_parts(passages, vectors)?;

        let prompt = with_timeout(
            Stage::Prompt,
            self.settings.generation_timeout,
            self.prompts.load(),
        )
        .await?;
        tracing::debug!(template_chars = prompt.as_str().len(), "Prompt template loaded");

        let built_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        Ok((
            IndexSnapshot {
                generation,
                index_id: Uuid::new_v4(),
                document_name,
                document_digest,
                built_at,
                prompt,
                index,
            },
            characters,
        ))
    }

    /// Embed passage texts in batches, each call under its own time budget.
    async fn embed_passages(
        &self,
        texts: Vec<String>,
        task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, PipelineError> {
        let batches: Vec<Vec<String>> = texts
            .chunks(EMBEDDING_BATCH_SIZE)
            .map(<[String]>::to_vec)
            .collect();
        tracing::debug!(
            passages = texts.len(),
            batches = batches.len(),
            "Embedding passages"
        );
        let results: Vec<Vec<Vec<f32>>> = stream::iter(batches)
            .map(|batch| {
                with_timeout(
                    Stage::Embedding,
                    self.settings.embedding_timeout,
                    self.embedder.generate_embeddings(batch, task.clone()),
                )
            })
            .buffered(EMBEDDING_CONCURRENCY)
            .try_collect()
            .await?;
        Ok(results.into_iter().flatten().collect())
    }

    fn install(
        &self,
        session: &SessionKey,
        (snapshot, characters): (IndexSnapshot, usize),
    ) -> Result<BuildOutcome, PipelineError> {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(installed) = sessions.get(session) {
            if installed.generation > snapshot.generation {
                return Err(PipelineError::Superseded {
                    newer: installed.generation,
                });
            }
        }

        let outcome = BuildOutcome {
            document: snapshot.document_name.clone(),
            generation: snapshot.generation,
            passages: snapshot.index.len(),
            characters,
        };
        tracing::debug!(
            session = %session,
            index_id = %snapshot.index_id,
            digest = %snapshot.document_digest,
            dimension = snapshot.index.dimension(),
            "Installing index snapshot"
        );
        sessions.insert(session.clone(), Arc::new(snapshot));

        while sessions.len() > self.settings.max_sessions.max(1) {
            let Some(oldest) = sessions
                .iter()
                .filter(|(key, _)| *key != session)
                .min_by_key(|(_, installed)| installed.generation)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            sessions.remove(&oldest);
            tracing::info!(
                session = %oldest,
                limit = self.settings.max_sessions,
                "Evicted oldest session index"
            );
        }
        Ok(outcome)
    }

    /// Answer `question` from the index bound to `session`.
    ///
    /// Fails with [`PipelineError::NotReady`] before any collaborator call when nothing is bound.
    pub async fn ask(&self, session: &SessionKey, question: &str) -> Result<Answer, PipelineError> {
        let outcome = self.answer(session, question).await;
        match &outcome {
            Ok(answer) => {
                self.metrics.record_answer();
                tracing::info!(
                    session = %session,
                    generation = answer.generation,
                    sources = answer.sources.len(),
                    "Question answered"
                );
            }
            Err(error) => {
                self.metrics.record_question_failure();
                tracing::warn!(session = %session, error = %error, "Question failed");
            }
        }
        outcome
    }

    async fn answer(&self, session: &SessionKey, question: &str) -> Result<Answer, PipelineError> {
        let snapshot = self.current(session).ok_or(PipelineError::NotReady)?;
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::InvalidQuestion);
        }

        let sources = self.retrieve(&snapshot, question).await?;
        let context = sources
            .iter()
            .map(|source| source.text.as_str())
            .collect::<Vec<_>>()
            .join(&self.settings.context_delimiter);
        let prompt = snapshot.prompt.render(question, &context);

        let answer = with_timeout(
            Stage::Generation,
            self.settings.generation_timeout,
            self.generator.generate(GenerationRequest {
                question: question.to_string(),
                prompt,
            }),
        )
        .await?;

        Ok(Answer {
            answer,
            sources,
            generation: snapshot.generation,
        })
    }

    async fn retrieve(
        &self,
        snapshot: &IndexSnapshot,
        question: &str,
    ) -> Result<Vec<RetrievedPassage>, PipelineError> {
        let vectors = with_timeout(
            Stage::Embedding,
            self.settings.embedding_timeout,
            self.embedder
                .generate_embeddings(vec![question.to_string()], EmbeddingTask::Query),
        )
        .await?;
        ensure_dimension(&vectors, self.settings.embedding_dimension)?;
        let query = vectors.into_iter().next().ok_or_else(|| {
            PipelineError::Processing(
                "embedding provider returned no vector for the question".into(),
            )
        })?;
        let indexed = snapshot.index.dimension();
        if !snapshot.index.is_empty() && query.len() != indexed {
            return Err(EmbeddingClientError::DimensionMismatch {
                expected: indexed,
                actual: query.len(),
            }
            .into());
        }

        let hits = snapshot.index.search(&query, self.settings.top_k);
        tracing::debug!(
            generation = snapshot.generation,
            hits = hits.len(),
            top_score = hits.first().map(|hit| hit.score),
            "Retrieved passages"
        );
        Ok(hits
            .into_iter()
            .map(|hit| RetrievedPassage {
                index: hit.passage.index,
                score: hit.score,
                text: hit.passage.text.clone(),
            })
            .collect())
    }

    /// Describe the binding for `session`.
    pub fn status(&self, session: &SessionKey) -> PipelineStatus {
        match self.current(session) {
            Some(snapshot) => PipelineStatus {
                state: PipelineState::Ready,
                document: Some(snapshot.document_name.clone()),
                generation: Some(snapshot.generation),
                index_id: Some(snapshot.index_id),
                passages: Some(snapshot.index.len()),
                built_at: Some(snapshot.built_at.clone()),
            },
            None => PipelineStatus::empty(),
        }
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl PipelineApi for PipelineController {
    async fn build(
        &self,
        session: &SessionKey,
        document: Document,
    ) -> Result<BuildOutcome, PipelineError> {
        PipelineController::build(self, session, document).await
    }

    async fn ask(&self, session: &SessionKey, question: &str) -> Result<Answer, PipelineError> {
        PipelineController::ask(self, session, question).await
    }

    fn status(&self, session: &SessionKey) -> PipelineStatus {
        PipelineController::status(self, session)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        PipelineController::metrics_snapshot(self)
    }
}

async fn with_timeout<T, E>(
    stage: Stage,
    budget: Duration,
    future: impl Future<Output = Result<T, E>>,
) -> Result<T, PipelineError>
where
    PipelineError: From<E>,
{
    match tokio::time::timeout(budget, future).await {
        Ok(result) => result.map_err(PipelineError::from),
        Err(_) => Err(PipelineError::Timeout {
            stage,
            seconds: budget.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{GoogleEmbeddingClient, HashingEmbeddingClient};
    use crate::generation::GenerationClientError;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct EchoGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AnswerGenerator for EchoGenerator {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<String, GenerationClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(request.prompt)
        }
    }

    /// Embeds with hashing but parks document embeddings until released.
    struct GatedEmbedder {
        inner: HashingEmbeddingClient,
        gate: Notify,
        gated_title: String,
    }

    #[async_trait]
    impl EmbeddingClient for GatedEmbedder {
        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
            task: EmbeddingTask,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            if let EmbeddingTask::Document { title: Some(title) } = &task {
                if *title == self.gated_title {
                    self.gate.notified().await;
                }
            }
            self.inner.generate_embeddings(texts, task).await
        }
    }

    struct SlowEmbedder;

    #[async_trait]
    impl EmbeddingClient for SlowEmbedder {
        async fn generate_embeddings(
            &self,
            _texts: Vec<String>,
            _task: EmbeddingTask,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    fn text_document(name: &str, body: &str) -> Document {
        Document {
            name: name.to_string(),
            content_type: Some("text/plain".into()),
            bytes: body.as_bytes().to_vec(),
        }
    }

    fn settings() -> PipelineSettings {
        PipelineSettings {
            chunk_size: 80,
            chunk_overlap: 10,
            ..PipelineSettings::default()
        }
    }

    fn controller(embedder: Arc<dyn EmbeddingClient>) -> PipelineController {
        PipelineController::new(
            embedder,
            Arc::new(EchoGenerator {
                calls: AtomicUsize::new(0),
            }),
            PromptLoader::built_in(),
            settings(),
        )
    }

    #[tokio::test]
    async fn older_build_finishing_late_is_superseded() {
        let embedder = Arc::new(GatedEmbedder {
            inner: HashingEmbeddingClient::new(64),
            gate: Notify::new(),
            gated_title: "slow.txt".into(),
        });
        let controller = Arc::new(controller(embedder.clone()));
        let session = SessionKey::default();

        let slow = {
            let controller = controller.clone();
            let session = session.clone();
            tokio::spawn(async move {
                controller
                    .build(&session, text_document("slow.txt", "Old facts about herons."))
                    .await
            })
        };
        // Let the slow build take its ticket and park on the gate.
        tokio::task::yield_now().await;
        while controller.generations.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let fast = controller
            .build(&session, text_document("fast.txt", "New facts about otters."))
            .await
            .expect("fast build");
        assert_eq!(fast.generation, 2);

        embedder.gate.notify_one();
        let slow = slow.await.expect("join");
        assert!(matches!(slow, Err(PipelineError::Superseded { newer: 2 })));

        let status = controller.status(&session);
        assert_eq!(status.document.as_deref(), Some("fast.txt"));
        assert_eq!(controller.metrics_snapshot().build_failures, 1);
    }

    #[tokio::test]
    async fn embedding_timeout_is_reported_by_stage() {
        let controller = PipelineController::new(
            Arc::new(SlowEmbedder),
            Arc::new(EchoGenerator {
                calls: AtomicUsize::new(0),
            }),
            PromptLoader::built_in(),
            PipelineSettings {
                embedding_timeout: Duration::from_millis(20),
                ..settings()
            },
        );

        let error = controller
            .build(&SessionKey::default(), text_document("a.txt", "some text"))
            .await
            .expect_err("timeout");

        assert!(matches!(
            error,
            PipelineError::Timeout {
                stage: Stage::Embedding,
                ..
            }
        ));
        assert_eq!(controller.status(&SessionKey::default()).state, PipelineState::Empty);
    }

    #[tokio::test]
    async fn dimension_mismatch_fails_build() {
        let controller = PipelineController::new(
            Arc::new(HashingEmbeddingClient::new(8)),
            Arc::new(EchoGenerator {
                calls: AtomicUsize::new(0),
            }),
            PromptLoader::built_in(),
            PipelineSettings {
                embedding_dimension: Some(16),
                ..settings()
            },
        );

        let error = controller
            .build(&SessionKey::default(), text_document("a.txt", "some text"))
            .await
            .expect_err("mismatch");

        assert!(matches!(
            error,
            PipelineError::Embedding(EmbeddingClientError::DimensionMismatch {
                expected: 16,
                actual: 8
            })
        ));
    }

    #[tokio::test]
    async fn context_joins_sources_with_delimiter() {
        let controller = PipelineController::new(
            Arc::new(HashingEmbeddingClient::new(64)),
            Arc::new(EchoGenerator {
                calls: AtomicUsize::new(0),
            }),
            PromptLoader::built_in(),
            PipelineSettings {
                chunk_size: 20,
                chunk_overlap: 0,
                top_k: 2,
                context_delimiter: " | ".into(),
                ..PipelineSettings::default()
            },
        );
        let session = SessionKey::default();
        controller
            .build(
                &session,
                text_document("a.txt", "otters swim daily.\nherons fish alone.\nbees make honey."),
            )
            .await
            .expect("build");

        let answer = controller
            .ask(&session, "Where do otters swim?")
            .await
            .expect("answer");

        assert_eq!(answer.sources.len(), 2);
        assert!(answer.sources[0].text.contains("otters"));
        let expected_context = format!("{} | {}", answer.sources[0].text, answer.sources[1].text);
        assert!(answer.answer.contains(&expected_context));
        assert!(answer.answer.contains("Question: Where do otters swim?"));
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let controller = controller(Arc::new(HashingEmbeddingClient::new(64)));
        let alice = SessionKey::new(Some("alice"));
        let bob = SessionKey::new(Some("bob"));

        controller
            .build(&alice, text_document("a.txt", "Alice's document."))
            .await
            .expect("build");

        assert_eq!(controller.status(&alice).state, PipelineState::Ready);
        assert_eq!(controller.status(&bob).state, PipelineState::Empty);
        assert!(matches!(
            controller.ask(&bob, "anything?").await,
            Err(PipelineError::NotReady)
        ));
    }

    #[tokio::test]
    async fn blank_question_on_ready_session_is_rejected() {
        let controller = controller(Arc::new(HashingEmbeddingClient::new(64)));
        let session = SessionKey::default();
        controller
            .build(&session, text_document("a.txt", "Some text."))
            .await
            .expect("build");

        assert!(matches!(
            controller.ask(&session, "   ").await,
            Err(PipelineError::InvalidQuestion)
        ));
    }

    /// Returns document vectors of one size and query vectors of another.
    struct SplitDimensionEmbedder;

    #[async_trait]
    impl EmbeddingClient for SplitDimensionEmbedder {
        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
            task: EmbeddingTask,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            let dimension = match task {
                EmbeddingTask::Document { .. } => 4,
                EmbeddingTask::Query => 6,
            };
            Ok(texts.iter().map(|_| vec![1.0; dimension]).collect())
        }
    }

    #[tokio::test]
    async fn each_embedding_batch_gets_its_own_budget() {
        let server = MockServer::start_async().await;
        let batches = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/text-embedding-004:batchEmbedContents");
                then.status(200)
                    .delay(Duration::from_millis(200))
                    .json_body(json!({
                        "embeddings": vec![json!({ "values": [1.0, 0.0] }); 100]
                    }));
            })
            .await;
        let embedder = GoogleEmbeddingClient::new(
            server.base_url(),
            "test-key".into(),
            "text-embedding-004".into(),
            Duration::from_secs(5),
        )
        .expect("client");
        let controller = PipelineController::new(
            Arc::new(embedder),
            Arc::new(EchoGenerator {
                calls: AtomicUsize::new(0),
            }),
            PromptLoader::built_in(),
            PipelineSettings {
                chunk_size: 10,
                chunk_overlap: 0,
                embedding_timeout: Duration::from_millis(500),
                ..PipelineSettings::default()
            },
        );

        // 900 passages of ten characters: nine calls, three rounds of four in flight.
        let outcome = controller
            .build(
                &SessionKey::default(),
                text_document("large.txt", &"abcdefghi ".repeat(900)),
            )
            .await
            .expect("every call fits its budget");

        assert_eq!(outcome.passages, 900);
        batches.assert_hits_async(9).await;
    }

    #[tokio::test]
    async fn oldest_session_is_evicted_past_the_limit() {
        let controller = PipelineController::new(
            Arc::new(HashingEmbeddingClient::new(16)),
            Arc::new(EchoGenerator {
                calls: AtomicUsize::new(0),
            }),
            PromptLoader::built_in(),
            PipelineSettings {
                max_sessions: 2,
                ..settings()
            },
        );
        let sessions: Vec<SessionKey> = ["a", "b", "c"]
            .into_iter()
            .map(|name| SessionKey::new(Some(name)))
            .collect();

        for session in &sessions {
            controller
                .build(session, text_document("doc.txt", "Some text."))
                .await
                .expect("build");
        }
        // Rebuilding an already bound session does not evict anyone.
        controller
            .build(&sessions[2], text_document("doc.txt", "Other text."))
            .await
            .expect("rebuild");

        let states: Vec<PipelineState> = sessions
            .iter()
            .map(|session| controller.status(session).state)
            .collect();
        assert_eq!(
            states,
            vec![PipelineState::Empty, PipelineState::Ready, PipelineState::Ready]
        );
        assert_eq!(controller.sessions.read().expect("lock").len(), 2);
    }

    #[tokio::test]
    async fn question_vector_must_match_index_dimension() {
        let generator = Arc::new(EchoGenerator {
            calls: AtomicUsize::new(0),
        });
        let controller = PipelineController::new(
            Arc::new(SplitDimensionEmbedder),
            generator.clone(),
            PromptLoader::built_in(),
            settings(),
        );
        let session = SessionKey::default();
        controller
            .build(&session, text_document("a.txt", "Some text."))
            .await
            .expect("build");

        let error = controller
            .ask(&session, "Anything?")
            .await
            .expect_err("mismatch");

        assert!(matches!(
            error,
            PipelineError::Embedding(EmbeddingClientError::DimensionMismatch {
                expected: 4,
                actual: 6
            })
        ));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }
}
