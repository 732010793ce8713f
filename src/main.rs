use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cryptomentor::config::{Config, DEFAULT_CONFIG_PATH};
use cryptomentor::db::Db;
use cryptomentor::embedder::Embedder;
use cryptomentor::embedder::openai::OpenAiEmbedder;
use cryptomentor::embedder::tokenizer::{TiktokenCounter, TokenCounter};
use cryptomentor::indexer::core::Indexer;
use cryptomentor::indexer::corpus;
use cryptomentor::llm::{ChatModel, OpenAiChatModel};
use cryptomentor::mcp::server::{McpContext, McpServer};
use cryptomentor::pipeline::assistant::Assistant;
use cryptomentor::server::{self, AppState};
use tokio::sync::Mutex as TokioMutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "cryptomentor",
    version,
    about = "Retrieval-augmented assistant for OKX help articles"
)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, global = true, env = "CRYPTOMENTOR_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chunk the raw article CSV into chunk records (CSV + JSON).
    Prepare,
    /// Embed chunk records into the vector store.
    Index {
        /// Replace the store contents instead of upserting.
        #[arg(long)]
        rebuild: bool,
    },
    /// Answer one question and print the markdown reply.
    Ask {
        #[arg(required = true)]
        question: Vec<String>,
    },
    /// Serve the HTTP front end.
    Serve {
        /// Overrides `server.bind` from the config.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Serve MCP tools over stdio.
    Mcp,
}

/// Service handles built once and shared by every surface.
struct Services {
    db: Arc<TokioMutex<Db>>,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
    counter: Arc<dyn TokenCounter>,
}

impl Services {
    fn build(config: &Config) -> Result<Self> {
        let api_key = config.api_key()?;
        let timeout = Duration::from_secs(config.openai.timeout_secs.max(1));

        let embedder = OpenAiEmbedder::new(
            &api_key,
            &config.openai.base_url,
            config.embedding.model.clone(),
            config.embedding.dimensions,
            config.embedding.batch_size,
            timeout,
        )
        .context("failed to build embedding client")?;
        let chat = OpenAiChatModel::new(
            &api_key,
            &config.openai.base_url,
            config.openai.chat_model.clone(),
            timeout,
        )
        .context("failed to build chat client")?;
        let counter = TiktokenCounter::for_model(&config.openai.chat_model)?;
        let db = Db::open(&config.db_path, config.embedding.dimensions)
            .with_context(|| format!("failed to open vector store {}", config.db_path))?;

        Ok(Self {
            db: Arc::new(TokioMutex::new(db)),
            embedder: Arc::new(embedder),
            chat: Arc::new(chat),
            counter: Arc::new(counter),
        })
    }

    fn assistant(&self, config: &Config) -> Result<Arc<Assistant>> {
        let assistant = Assistant::from_services(
            config,
            self.db.clone(),
            self.embedder.clone(),
            self.chat.clone(),
            self.counter.clone(),
        )?;
        Ok(Arc::new(assistant))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // stdout carries MCP frames and CLI answers
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    config.validate()?;

    match cli.command {
        Command::Prepare => prepare(&config),
        Command::Index { rebuild } => index(&config, rebuild).await,
        Command::Ask { question } => {
            let services = Services::build(&config)?;
            let reply = services.assistant(&config)?.answer(&question.join(" ")).await?;
            println!("{}", reply.to_markdown());
            Ok(())
        }
        Command::Serve { bind } => {
            let services = Services::build(&config)?;
            let state = AppState::new(services.assistant(&config)?)?;
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            server::serve(state, &bind).await
        }
        Command::Mcp => {
            let services = Services::build(&config)?;
            let ctx = McpContext {
                assistant: services.assistant(&config)?,
                db: services.db.clone(),
                embedder: services.embedder.clone(),
                config: Arc::new(config),
            };
            McpServer::new(ctx).start().await
        }
    }
}

fn prepare(config: &Config) -> Result<()> {
    let counter = TiktokenCounter::for_model(&config.openai.chat_model)?;
    let articles = corpus::read_articles(&config.raw_corpus_path)?;
    let topics = corpus::load_topics(config.topics_path.as_deref())?;

    let records = corpus::prepare_corpus(
        &articles,
        &topics,
        &config.language,
        config.chunk_max_tokens,
        &counter,
    );

    corpus::write_chunks_csv(&config.processed_corpus_path, &records)?;
    corpus::write_chunks_json(&config.processed_json_path, &records)?;
    info!(
        "Prepared {} chunks from {} articles → {}",
        records.len(),
        articles.len(),
        config.processed_corpus_path.display()
    );
    Ok(())
}

async fn index(config: &Config, rebuild: bool) -> Result<()> {
    let services = Services::build(config)?;
    let records = corpus::read_chunks_csv(&config.processed_corpus_path)?;

    let mut indexer = Indexer::new(
        services.db.clone(),
        services.embedder.as_ref(),
        config.embedding.batch_size,
    );
    let report = if rebuild {
        indexer.rebuild(&records).await?
    } else {
        indexer.index_records(&records).await?
    };

    info!(
        "Indexed {} chunks in {} batches into {}",
        report.indexed, report.batches, config.db_path
    );
    Ok(())
}
