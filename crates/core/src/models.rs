use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// A bounded contiguous slice of parsed document text. Ordinals are unique
/// and contiguous (0..N-1) within a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub ordinal: u64,
    pub document_id: String,
}

/// A chunk returned by a similarity query. Higher scores are more relevant;
/// ties are broken by ascending ordinal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub text: String,
    pub score: f64,
    pub document_id: String,
    pub ordinal: u64,
}

/// One question answered within a processing run, with its retrieval
/// provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question: String,
    pub retrieved: Vec<RetrievedChunk>,
    pub answer: String,
}

/// Per-question provenance as persisted in the query record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionRetrieval {
    pub question: String,
    pub chunks: Vec<RetrievedChunk>,
}

/// The persisted outcome of a processing run. At most one current record
/// exists per document_id; the orchestrator owns every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub document_id: String,
    pub document_name: String,
    pub questions: Vec<String>,
    pub retrieved_chunks: Vec<QuestionRetrieval>,
    pub answers: Vec<String>,
    pub processing_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Monitoring view of a query record without the full answer payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecordSummary {
    pub document_id: String,
    pub document_name: String,
    pub question_count: usize,
    pub processing_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// The result shape returned to the caller. `answers`, `retrieved_chunks`
/// and the input questions always have equal length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub answers: Vec<String>,
    pub retrieved_chunks: Vec<QuestionRetrieval>,
    pub processing_time_ms: u64,
    pub document_name: String,
    pub cached: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub answer_concurrency: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            top_k: 5,
            answer_concurrency: 4,
        }
    }
}

pub const UNKNOWN_DOCUMENT_NAME: &str = "unknown_document.pdf";

/// Derive a display name from a document locator: the final path segment
/// with the query string stripped, or a fixed placeholder when the locator
/// does not parse as a URL with a usable path.
pub fn document_name_from_locator(locator: &str) -> String {
    Url::parse(locator)
        .ok()
        .and_then(|url| {
            url.path_segments().and_then(|segments| {
                segments
                    .filter(|segment| !segment.is_empty())
                    .last()
                    .map(str::to_string)
            })
        })
        .unwrap_or_else(|| UNKNOWN_DOCUMENT_NAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_name_strips_query_parameters() {
        let name = document_name_from_locator("https://host/files/policy.pdf?sig=abc&ttl=60");
        assert_eq!(name, "policy.pdf");
    }

    #[test]
    fn document_name_uses_last_path_segment() {
        let name = document_name_from_locator("http://x/a/b/terms.pdf");
        assert_eq!(name, "terms.pdf");
    }

    #[test]
    fn document_name_falls_back_on_unparseable_locator() {
        assert_eq!(document_name_from_locator("not a url"), UNKNOWN_DOCUMENT_NAME);
        assert_eq!(document_name_from_locator("https://host"), UNKNOWN_DOCUMENT_NAME);
    }
}
