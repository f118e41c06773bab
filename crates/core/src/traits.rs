use crate::error::{EmbeddingError, IndexError, ParseError, RecordStoreError, SynthesisError};
use crate::models::{Chunk, QueryRecord, QueryRecordSummary, RetrievedChunk};
use async_trait::async_trait;

/// Capability: turn a document locator into plain text. Remote-content
/// failures of any shape surface as a single typed error.
#[async_trait]
pub trait DocumentParser {
    async fn parse(&self, locator: &str) -> Result<String, ParseError>;
}

/// Capability: fixed-dimension vector embeddings. The dimension is fixed for
/// the lifetime of the client; `embed_many` never returns fewer vectors than
/// it was given texts.
#[async_trait]
pub trait EmbeddingClient {
    fn dimensions(&self) -> usize;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Capability: store chunk vectors and run top-K similarity queries scoped
/// to a single document.
#[async_trait]
pub trait VectorIndex {
    async fn upsert_chunks(
        &self,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<Vec<String>, IndexError>;

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        document_id: &str,
    ) -> Result<Vec<RetrievedChunk>, IndexError>;
}

/// Capability: synthesize a natural-language answer grounded in the supplied
/// passages.
#[async_trait]
pub trait AnswerSynthesizer {
    async fn synthesize(
        &self,
        question: &str,
        passages: &[RetrievedChunk],
    ) -> Result<String, SynthesisError>;
}

/// Capability: persist and look up one query record per document_id, plus a
/// monitoring read of recent records.
#[async_trait]
pub trait QueryRecordStore {
    async fn find(&self, document_id: &str) -> Result<Option<QueryRecord>, RecordStoreError>;

    async fn upsert(&self, record: &QueryRecord) -> Result<(), RecordStoreError>;

    async fn recent(&self, limit: usize) -> Result<Vec<QueryRecordSummary>, RecordStoreError>;
}
