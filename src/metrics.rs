use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_indexed: AtomicU64,
    passages_indexed: AtomicU64,
    build_failures: AtomicU64,
    questions_answered: AtomicU64,
    question_failures: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an installed index and its passage count.
    pub fn record_build(&self, passage_count: u64) {
        self.documents_indexed.fetch_add(1, Ordering::Relaxed);
        self.passages_indexed
            .fetch_add(passage_count, Ordering::Relaxed);
    }

    /// Record a build that did not install an index.
    pub fn record_build_failure(&self) {
        self.build_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an answered question.
    pub fn record_answer(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a question that produced an error.
    pub fn record_question_failure(&self) {
        self.question_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            passages_indexed: self.passages_indexed.load(Ordering::Relaxed),
            build_failures: self.build_failures.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            question_failures: self.question_failures.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Indexes installed since startup.
    pub documents_indexed: u64,
    /// Passages across all installed indexes.
    pub passages_indexed: u64,
    /// Builds that failed or were superseded.
    pub build_failures: u64,
    /// Questions answered successfully.
    pub questions_answered: u64,
    /// Questions that returned an error.
    pub question_failures: u64,
}
