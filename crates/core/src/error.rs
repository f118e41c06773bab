use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("parse service error: {0}")]
    Backend(String),

    #[error("document produced no text: {0}")]
    EmptyDocument(String),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("empty batch submitted for embedding")]
    EmptyBatch,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding backend error: {0}")]
    Backend(String),

    #[error("embedding dimension {actual} does not match configured {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("vector index request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("language model backend error: {0}")]
    Backend(String),

    #[error("language model returned no answer")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub enum RecordStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid stored timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

/// A failed stage of first-time document ingest. Any variant aborts the run
/// with nothing persisted.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("document parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("chunk embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector upsert failed: {0}")]
    Index(#[from] IndexError),
}

/// A failure while turning one question into retrieved context. Aborts the
/// remaining questions of the run.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("question embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector query failed: {0}")]
    Query(#[from] IndexError),
}

/// The single error surface of the pipeline. Record-write failures after
/// answers were computed are logged and suppressed, so they never appear
/// here; record-read failures during lookup do.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("ingest failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("answer synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("query record read failed: {0}")]
    Records(#[from] RecordStoreError),
}
