use crate::error::RecordStoreError;
use crate::models::{QueryRecord, QueryRecordSummary, QuestionRetrieval};
use crate::traits::QueryRecordStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio_rusqlite::{Connection, OptionalExtension};
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS document_queries (
    document_id TEXT PRIMARY KEY,
    document_name TEXT NOT NULL,
    questions TEXT NOT NULL,
    retrieved_chunks TEXT NOT NULL,
    answers TEXT NOT NULL,
    processing_time_ms INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
";

type RecordRow = (String, String, String, String, String, i64, String);

/// Query record store over a local sqlite database: one row per document_id
/// with JSON-encoded question/provenance/answer columns.
pub struct SqliteRecordStore {
    conn: Connection,
}

impl SqliteRecordStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RecordStoreError> {
        let conn = Connection::open(path.as_ref().to_path_buf()).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, RecordStoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, RecordStoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)
                .map_err(tokio_rusqlite::Error::Rusqlite)
        })
        .await?;
        Ok(Self { conn })
    }
}

fn record_from_row(row: RecordRow) -> Result<QueryRecord, RecordStoreError> {
    let (document_id, document_name, questions, retrieved_chunks, answers, time_ms, created_at) =
        row;
    Ok(QueryRecord {
        document_id,
        document_name,
        questions: serde_json::from_str(&questions)?,
        retrieved_chunks: serde_json::from_str::<Vec<QuestionRetrieval>>(&retrieved_chunks)?,
        answers: serde_json::from_str(&answers)?,
        processing_time_ms: time_ms.max(0) as u64,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RecordStoreError> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

#[async_trait]
impl QueryRecordStore for SqliteRecordStore {
    async fn find(&self, document_id: &str) -> Result<Option<QueryRecord>, RecordStoreError> {
        let document_id = document_id.to_string();
        let row: Option<RecordRow> = self
            .conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT document_id, document_name, questions, retrieved_chunks, answers, \
                     processing_time_ms, created_at FROM document_queries WHERE document_id = ?1",
                    [&document_id],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                        ))
                    },
                )
                .optional()
                .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await?;

        row.map(record_from_row).transpose()
    }

    async fn upsert(&self, record: &QueryRecord) -> Result<(), RecordStoreError> {
        let params = (
            record.document_id.clone(),
            record.document_name.clone(),
            serde_json::to_string(&record.questions)?,
            serde_json::to_string(&record.retrieved_chunks)?,
            serde_json::to_string(&record.answers)?,
            record.processing_time_ms as i64,
            record.created_at.to_rfc3339(),
        );

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO document_queries (document_id, document_name, questions, \
                     retrieved_chunks, answers, processing_time_ms, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                     ON CONFLICT(document_id) DO UPDATE SET \
                     document_name = excluded.document_name, \
                     questions = excluded.questions, \
                     retrieved_chunks = excluded.retrieved_chunks, \
                     answers = excluded.answers, \
                     processing_time_ms = excluded.processing_time_ms",
                    params,
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await?;

        debug!(document_id = %record.document_id, "query record stored");
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<QueryRecordSummary>, RecordStoreError> {
        let rows: Vec<(String, String, String, i64, String)> = self
            .conn
            .call(move |conn| {
                let mut statement = conn
                    .prepare(
                        "SELECT document_id, document_name, questions, processing_time_ms, \
                         created_at FROM document_queries ORDER BY created_at DESC LIMIT ?1",
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mapped = statement
                    .query_map([limit as i64], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                        ))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let mut rows = Vec::new();
                for row in mapped {
                    rows.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(document_id, document_name, questions, time_ms, created_at)| {
                Ok(QueryRecordSummary {
                    document_id,
                    document_name,
                    question_count: serde_json::from_str::<Vec<String>>(&questions)?.len(),
                    processing_time_ms: time_ms.max(0) as u64,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetrievedChunk;
    use chrono::Duration;

    fn sample_record(document_id: &str, created_at: DateTime<Utc>) -> QueryRecord {
        QueryRecord {
            document_id: document_id.to_string(),
            document_name: "policy.pdf".to_string(),
            questions: vec!["Does coverage include X?".to_string()],
            retrieved_chunks: vec![QuestionRetrieval {
                question: "Does coverage include X?".to_string(),
                chunks: vec![RetrievedChunk {
                    text: "Coverage includes X.".to_string(),
                    score: 0.93,
                    document_id: document_id.to_string(),
                    ordinal: 0,
                }],
            }],
            answers: vec!["Coverage includes X.".to_string()],
            processing_time_ms: 1200,
            created_at,
        }
    }

    #[tokio::test]
    async fn find_returns_none_for_unknown_document() {
        let store = SqliteRecordStore::open_in_memory().await.unwrap();
        let found = store.find("http://x/missing.pdf").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn upsert_then_find_round_trips_the_record() {
        let store = SqliteRecordStore::open_in_memory().await.unwrap();
        let record = sample_record("http://x/policy.pdf", Utc::now());
        store.upsert(&record).await.unwrap();

        let found = store
            .find("http://x/policy.pdf")
            .await
            .unwrap()
            .expect("record should exist");
        assert_eq!(found.document_name, record.document_name);
        assert_eq!(found.questions, record.questions);
        assert_eq!(found.retrieved_chunks, record.retrieved_chunks);
        assert_eq!(found.answers, record.answers);
        assert_eq!(found.processing_time_ms, record.processing_time_ms);
        assert_eq!(found.created_at, record.created_at);
    }

    #[tokio::test]
    async fn second_upsert_updates_in_place_and_keeps_created_at() {
        let store = SqliteRecordStore::open_in_memory().await.unwrap();
        let original = sample_record("http://x/policy.pdf", Utc::now() - Duration::minutes(5));
        store.upsert(&original).await.unwrap();

        let mut updated = sample_record("http://x/policy.pdf", Utc::now());
        updated.questions = vec!["Is Y excluded?".to_string()];
        updated.answers = vec!["Yes, Y is excluded.".to_string()];
        store.upsert(&updated).await.unwrap();

        let found = store
            .find("http://x/policy.pdf")
            .await
            .unwrap()
            .expect("record should exist");
        assert_eq!(found.questions, updated.questions);
        assert_eq!(found.answers, updated.answers);
        assert_eq!(found.created_at, original.created_at);

        let summaries = store.recent(10).await.unwrap();
        assert_eq!(summaries.len(), 1);
    }

    #[tokio::test]
    async fn recent_lists_newest_records_first() {
        let store = SqliteRecordStore::open_in_memory().await.unwrap();
        let now = Utc::now();
        store
            .upsert(&sample_record("http://x/older.pdf", now - Duration::hours(2)))
            .await
            .unwrap();
        store
            .upsert(&sample_record("http://x/newer.pdf", now))
            .await
            .unwrap();
        store
            .upsert(&sample_record("http://x/oldest.pdf", now - Duration::days(1)))
            .await
            .unwrap();

        let summaries = store.recent(2).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].document_id, "http://x/newer.pdf");
        assert_eq!(summaries[1].document_id, "http://x/older.pdf");
        assert_eq!(summaries[0].question_count, 1);
    }

    #[tokio::test]
    async fn records_survive_reopening_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.sqlite3");

        {
            let store = SqliteRecordStore::open(&path).await.unwrap();
            store
                .upsert(&sample_record("http://x/policy.pdf", Utc::now()))
                .await
                .unwrap();
        }

        let reopened = SqliteRecordStore::open(&path).await.unwrap();
        let found = reopened.find("http://x/policy.pdf").await.unwrap();
        assert!(found.is_some());
    }
}
