use std::{env, sync::Once};

use rustyrag::{
    config::{self, Config},
    embedding::{EmbeddingTask, build_embedding_client},
    processing::{Document, PipelineController, SessionKey},
};

static INIT: Once = Once::new();

fn set_default_env(key: &str, value: &str) {
    let needs_value = env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true);
    if needs_value {
        // SAFETY: Runs once before any configuration is read.
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn live_config() -> &'static Config {
    INIT.call_once(|| {
        set_default_env("EMBEDDING_PROVIDER", "ollama");
        set_default_env("EMBEDDING_MODEL", "nomic-embed-text");
        set_default_env("OLLAMA_URL", "http://127.0.0.1:11434");
    });
    config::init_config().expect("live configuration should load")
}

#[tokio::test]
#[ignore = "Requires live Ollama embeddings"]
async fn live_embedding_roundtrip() {
    let config = live_config();
    let client = build_embedding_client(config).expect("embedding client");
    let vectors = client
        .generate_embeddings(
            vec!["rusty-rag live embedding".to_string()],
            EmbeddingTask::Query,
        )
        .await
        .expect("failed to request embeddings from provider");
    assert_eq!(vectors.len(), 1, "expected embedding per input text");
    if let Some(dimension) = config.embedding_dimension {
        assert_eq!(vectors[0].len(), dimension, "embedding dimension mismatch");
    }
}

#[tokio::test]
#[ignore = "Requires live embedding and chat providers"]
async fn live_upload_then_question() {
    let controller = PipelineController::from_config(live_config()).expect("controller");
    let session = SessionKey::default();

    let outcome = controller
        .build(
            &session,
            Document {
                name: "otters.txt".into(),
                content_type: Some("text/plain".into()),
                bytes: b"Sea otters hold hands while they sleep so they do not drift apart."
                    .to_vec(),
            },
        )
        .await
        .expect("build should succeed");
    assert_eq!(outcome.passages, 1);

    let answer = controller
        .ask(&session, "Why do sea otters hold hands?")
        .await
        .expect("question should be answered");
    assert!(!answer.answer.is_empty());
    assert_eq!(answer.sources.len(), 1);
}
