pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod stores;
pub mod synthesis;
pub mod traits;

pub use chunking::chunk_text;
pub use embeddings::HttpEmbeddingClient;
pub use error::{
    EmbeddingError, IndexError, IngestError, ParseError, PipelineError, RecordStoreError,
    RetrievalError, SynthesisError,
};
pub use models::{
    document_name_from_locator, Chunk, PipelineOptions, ProcessingResult, QueryRecord,
    QueryRecordSummary, QuestionAnswer, QuestionRetrieval, RetrievedChunk,
};
pub use orchestrator::QueryPipeline;
pub use parser::RemoteParsingClient;
pub use stores::{QdrantIndex, SqliteRecordStore};
pub use synthesis::{ChatSynthesizer, GROUNDING_SYSTEM_PROMPT};
pub use traits::{
    AnswerSynthesizer, DocumentParser, EmbeddingClient, QueryRecordStore, VectorIndex,
};
