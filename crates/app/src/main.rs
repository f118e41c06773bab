use chrono::Utc;
use clap::{Parser, Subcommand};
use policy_qa_core::{
    ChatSynthesizer, HttpEmbeddingClient, PipelineOptions, QdrantIndex, QueryPipeline,
    QueryRecordStore, RemoteParsingClient, SqliteRecordStore,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const MAX_QUESTIONS: usize = 20;

#[derive(Parser)]
#[command(name = "policy-qa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Document parse service endpoint
    #[arg(long, env = "PARSE_ENDPOINT", default_value = "http://localhost:8081/parse")]
    parse_endpoint: String,

    /// Bearer token for the parse service
    #[arg(long, env = "PARSE_API_KEY")]
    parse_api_key: Option<String>,

    /// OpenAI-compatible embeddings endpoint
    #[arg(long, env = "EMBEDDING_ENDPOINT", default_value = "http://localhost:8082/v1/embeddings")]
    embedding_endpoint: String,

    /// Embedding model identifier
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "all-MiniLM-L6-v2")]
    embedding_model: String,

    /// Expected embedding dimension
    #[arg(long, env = "EMBEDDING_DIMENSION", default_value = "384")]
    embedding_dimension: usize,

    /// Bearer token for the embedding service
    #[arg(long, env = "EMBEDDING_API_KEY")]
    embedding_api_key: Option<String>,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection name
    #[arg(long, env = "QDRANT_COLLECTION", default_value = "policy_chunks")]
    qdrant_collection: String,

    /// Qdrant API key
    #[arg(long, env = "QDRANT_API_KEY")]
    qdrant_api_key: Option<String>,

    /// OpenAI-compatible chat completions endpoint
    #[arg(long, env = "LLM_ENDPOINT", default_value = "http://localhost:8083/v1/chat/completions")]
    llm_endpoint: String,

    /// Language model identifier
    #[arg(long, env = "LLM_MODEL", default_value = "llama3-8b-8192")]
    llm_model: String,

    /// Bearer token for the language model service
    #[arg(long, env = "LLM_API_KEY")]
    llm_api_key: Option<String>,

    /// Path of the sqlite query record database
    #[arg(long, env = "RECORDS_PATH", default_value = "policy_qa.sqlite3")]
    records_path: String,

    /// Chunk size in characters
    #[arg(long, default_value = "512")]
    chunk_size: usize,

    /// Chunk overlap in characters
    #[arg(long, default_value = "50")]
    chunk_overlap: usize,

    /// Number of chunks retrieved per question
    #[arg(long, default_value = "5")]
    top_k: usize,

    /// Concurrent question answering limit
    #[arg(long, default_value = "4")]
    answer_concurrency: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Answer questions about a policy document.
    Ask {
        /// Document locator (URL)
        #[arg(long)]
        document: String,
        /// Question to answer; repeat for a batch
        #[arg(long = "question", required = true)]
        questions: Vec<String>,
    },
    /// Show recent query records.
    Recent {
        /// Number of records to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "policy-qa boot"
    );

    match cli.command {
        Command::Ask { document, questions } => {
            if questions.len() > MAX_QUESTIONS {
                anyhow::bail!("too many questions: maximum {MAX_QUESTIONS} allowed");
            }

            let parser = RemoteParsingClient::new(&cli.parse_endpoint, cli.parse_api_key.clone())?;
            // A failed probe means the embedding backend is unusable and the
            // process exits here.
            let embedder = HttpEmbeddingClient::connect(
                &cli.embedding_endpoint,
                &cli.embedding_model,
                cli.embedding_dimension,
                cli.embedding_api_key.clone(),
            )
            .await?;

            let index = QdrantIndex::new(
                &cli.qdrant_url,
                &cli.qdrant_collection,
                cli.embedding_dimension,
                cli.qdrant_api_key.clone(),
            );
            index.ensure_collection().await?;

            let synthesizer =
                ChatSynthesizer::new(&cli.llm_endpoint, &cli.llm_model, cli.llm_api_key.clone());
            let records = SqliteRecordStore::open(&cli.records_path).await?;

            let pipeline = QueryPipeline::new(
                parser,
                embedder,
                index,
                synthesizer,
                records,
                PipelineOptions {
                    chunk_size: cli.chunk_size,
                    chunk_overlap: cli.chunk_overlap,
                    top_k: cli.top_k,
                    answer_concurrency: cli.answer_concurrency,
                },
            );

            let result = pipeline.process(&document, &questions).await?;

            println!(
                "document: {} ({}, {} ms{})",
                document,
                result.document_name,
                result.processing_time_ms,
                if result.cached { ", cached" } else { "" }
            );
            for (question, answer) in questions.iter().zip(result.answers.iter()) {
                println!("\nQ: {question}");
                println!("A: {answer}");
            }
        }
        Command::Recent { limit } => {
            let records = SqliteRecordStore::open(&cli.records_path).await?;
            let summaries = records.recent(limit).await?;

            if summaries.is_empty() {
                println!("no query records yet");
            }
            for summary in summaries {
                println!(
                    "{}  {}  questions={}  {}ms  {}",
                    summary.created_at.to_rfc3339(),
                    summary.document_id,
                    summary.question_count,
                    summary.processing_time_ms,
                    summary.document_name,
                );
            }
        }
    }

    Ok(())
}
