pub mod qdrant;
pub mod records;

pub use qdrant::QdrantIndex;
pub use records::SqliteRecordStore;
