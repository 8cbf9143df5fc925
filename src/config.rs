use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
const DEFAULT_SERVER_PORT: u16 = 3001;
const DEFAULT_GOOGLE_EMBEDDING_MODEL: &str = "text-embedding-004";
const DEFAULT_OLLAMA_EMBEDDING_MODEL: &str = "nomic-embed-text";
const DEFAULT_GOOGLE_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_CHAT_API_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_CHAT_MODEL: &str = "llama-3.3-70b-versatile";
const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 200;
const DEFAULT_TOP_K: usize = 4;
const DEFAULT_EMBEDDING_TIMEOUT_SECS: u64 = 30;
const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 60;
const DEFAULT_UPLOAD_MAX_BYTES: usize = 20 * 1024 * 1024;
const DEFAULT_MAX_SESSIONS: usize = 64;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Rusty RAG server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Interface the HTTP listener binds to.
    pub server_host: String,
    /// Port the HTTP listener binds to.
    pub server_port: u16,
    /// Embedding provider used to vectorize passages and questions.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Expected dimensionality of produced vectors, checked when present.
    pub embedding_dimension: Option<usize>,
    /// API key for the Google Generative Language embedding endpoint.
    pub google_api_key: Option<String>,
    /// Base URL of the Google Generative Language API.
    pub google_api_base_url: String,
    /// Base URL of a local Ollama runtime.
    pub ollama_url: String,
    /// Bearer token for the chat-completion endpoint.
    pub chat_api_key: Option<String>,
    /// Base URL of an OpenAI-compatible chat-completion API.
    pub chat_api_base_url: String,
    /// Chat model used to generate answers.
    pub chat_model: String,
    /// Sampling temperature forwarded to the chat model.
    pub chat_temperature: f32,
    /// Maximum passage length in characters.
    pub text_splitter_chunk_size: usize,
    /// Characters shared between neighbouring passages.
    pub text_splitter_chunk_overlap: usize,
    /// Number of passages retrieved per question.
    pub retrieval_top_k: usize,
    /// Separator placed between retrieved passages in the prompt context.
    pub context_delimiter: String,
    /// Optional remote prompt template, fetched once per build.
    pub prompt_template_url: Option<String>,
    /// Upper bound for a single embedding call.
    pub embedding_timeout_secs: u64,
    /// Upper bound for a single chat-completion call.
    pub generation_timeout_secs: u64,
    /// Maximum accepted upload body size.
    pub upload_max_bytes: usize,
    /// Sessions kept bound at once before the oldest index is evicted.
    pub max_sessions: usize,
}

/// Supported embedding backends for the indexing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted Google Generative Language embeddings.
    Google,
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic in-process hashing, useful offline.
    Hashing,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let embedding_provider = match load_env_optional("EMBEDDING_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?,
            None => EmbeddingProvider::Google,
        };
        let google_api_key = load_env_optional("GOOGLE_API_KEY");
        if embedding_provider == EmbeddingProvider::Google && google_api_key.is_none() {
            return Err(ConfigError::MissingVariable("GOOGLE_API_KEY".to_string()));
        }
        let default_model = match embedding_provider {
            EmbeddingProvider::Ollama => DEFAULT_OLLAMA_EMBEDDING_MODEL,
            EmbeddingProvider::Google | EmbeddingProvider::Hashing => {
                DEFAULT_GOOGLE_EMBEDDING_MODEL
            }
        };

        let text_splitter_chunk_size =
            parse_env_or("TEXT_SPLITTER_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        let text_splitter_chunk_overlap =
            parse_env_or("TEXT_SPLITTER_CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?;
        if text_splitter_chunk_size == 0 {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_SIZE".to_string(),
            ));
        }
        let max_sessions = parse_env_or("MAX_SESSIONS", DEFAULT_MAX_SESSIONS)?;
        if max_sessions == 0 {
            return Err(ConfigError::InvalidValue("MAX_SESSIONS".to_string()));
        }
        if text_splitter_chunk_overlap >= text_splitter_chunk_size {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_OVERLAP".to_string(),
            ));
        }

        Ok(Self {
            server_host: load_env_optional("SERVER_HOST")
                .unwrap_or_else(|| DEFAULT_SERVER_HOST.to_string()),
            server_port: parse_env_or("SERVER_PORT", DEFAULT_SERVER_PORT)?,
            embedding_provider,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| default_model.to_string()),
            embedding_dimension: parse_env_optional("EMBEDDING_DIMENSION")?,
            google_api_key,
            google_api_base_url: load_env_optional("GOOGLE_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GOOGLE_API_BASE_URL.to_string()),
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            chat_api_key: load_env_optional("CHAT_API_KEY")
                .or_else(|| load_env_optional("GROQ_API_KEY")),
            chat_api_base_url: load_env_optional("CHAT_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_CHAT_API_BASE_URL.to_string()),
            chat_model: load_env_optional("CHAT_MODEL")
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            chat_temperature: parse_env_or("CHAT_TEMPERATURE", 0.0)?,
            text_splitter_chunk_size,
            text_splitter_chunk_overlap,
            retrieval_top_k: parse_env_or("RETRIEVAL_TOP_K", DEFAULT_TOP_K)?,
            context_delimiter: env::var("CONTEXT_DELIMITER")
                .map(|value| unescape_delimiter(&value))
                .unwrap_or_else(|_| "\n".to_string()),
            prompt_template_url: load_env_optional("PROMPT_TEMPLATE_URL"),
            embedding_timeout_secs: parse_env_or(
                "EMBEDDING_TIMEOUT_SECS",
                DEFAULT_EMBEDDING_TIMEOUT_SECS,
            )?,
            generation_timeout_secs: parse_env_or(
                "GENERATION_TIMEOUT_SECS",
                DEFAULT_GENERATION_TIMEOUT_SECS,
            )?,
            upload_max_bytes: parse_env_or("UPLOAD_MAX_BYTES", DEFAULT_UPLOAD_MAX_BYTES)?,
            max_sessions,
        })
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env_optional<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_env_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    Ok(parse_env_optional(key)?.unwrap_or(default))
}

/// `.env` files cannot carry raw newlines comfortably, so `\n` and `\t` escapes are expanded.
fn unescape_delimiter(raw: &str) -> String {
    raw.replace("\\n", "\n").replace("\\t", "\t")
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "google" | "gemini" => Ok(Self::Google),
            "ollama" => Ok(Self::Ollama),
            "hashing" | "local" => Ok(Self::Hashing),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    Ok(CONFIG.get_or_init(|| config))
}
