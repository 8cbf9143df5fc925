//! HTTP server entrypoint.
//!
//! Loads configuration from the environment (and `.env`), wires the document pipeline against the
//! configured embedding and chat providers, and serves the REST API.
use anyhow::{Context, Result};
use clap::Parser;
use rustyrag::{api, config, logging, processing::PipelineController};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "rustyrag", about = "Answer questions about an uploaded document")]
struct Cli {
    /// Address to bind; overrides `SERVER_HOST`.
    #[arg(long)]
    host: Option<String>,
    /// Port to bind; overrides `SERVER_PORT`.
    #[arg(long, short)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("invalid configuration")?;
    logging::init_tracing();
    tracing::debug!(
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        chunk_size = config.text_splitter_chunk_size,
        chunk_overlap = config.text_splitter_chunk_overlap,
        top_k = config.retrieval_top_k,
        "Loaded configuration"
    );

    let controller = PipelineController::from_config(config)
        .context("failed to initialize document pipeline")?;
    let app = api::create_router(Arc::new(controller), config.upload_max_bytes);

    let host = cli.host.unwrap_or_else(|| config.server_host.clone());
    let port = cli.port.unwrap_or(config.server_port);
    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("failed to bind {host}:{port}"))?;
    tracing::info!(
        address = %listener.local_addr()?,
        chat_model = %config.chat_model,
        "Listening"
    );

    axum::serve(listener, app).await.context("server terminated")?;
    Ok(())
}
