use crate::error::IndexError;
use crate::models::{Chunk, RetrievedChunk};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const UPSERT_BATCH_SIZE: usize = 100;
const UPSERT_ATTEMPTS: u32 = 3;
const UPSERT_BACKOFF: Duration = Duration::from_millis(100);
const CREATE_PROPAGATION_WAIT: Duration = Duration::from_secs(2);

/// Vector index adapter over the Qdrant HTTP API. Point ids are derived
/// deterministically from (document_id, ordinal), so re-ingesting a document
/// overwrites its points instead of duplicating them.
pub struct QdrantIndex {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
    api_key: Option<String>,
}

impl QdrantIndex {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
        api_key: Option<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
            api_key,
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(api_key) => builder.header("api-key", api_key),
            None => builder,
        }
    }

    /// Create the collection if it does not exist yet, waiting briefly after
    /// creation so the index is usable for the first upsert.
    pub async fn ensure_collection(&self) -> Result<(), IndexError> {
        let lookup = self
            .request(self.client.get(format!(
                "{}/collections/{}",
                self.endpoint, self.collection
            )))
            .send()
            .await?;

        if lookup.status().is_success() {
            return Ok(());
        }
        if lookup.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(IndexError::BackendResponse {
                backend: "qdrant".to_string(),
                details: lookup.status().to_string(),
            });
        }

        info!(collection = %self.collection, "creating vector collection");
        let created = self
            .request(self.client.put(format!(
                "{}/collections/{}",
                self.endpoint, self.collection
            )))
            .json(&json!({
                "vectors": { "size": self.vector_size, "distance": "Cosine" },
            }))
            .send()
            .await?;

        if !created.status().is_success() {
            return Err(IndexError::BackendResponse {
                backend: "qdrant".to_string(),
                details: created.status().to_string(),
            });
        }

        tokio::time::sleep(CREATE_PROPAGATION_WAIT).await;
        Ok(())
    }

    async fn put_points(&self, points: &[Value]) -> Result<(), IndexError> {
        let response = self
            .request(self.client.put(format!(
                "{}/collections/{}/points?wait=true",
                self.endpoint, self.collection
            )))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IndexError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }
        Ok(())
    }
}

fn point_id(document_id: &str, ordinal: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(ordinal.to_le_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert_chunks(
        &self,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<Vec<String>, IndexError> {
        if chunks.len() != embeddings.len() {
            return Err(IndexError::Request(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let mut ids = Vec::with_capacity(chunks.len());
        let mut points = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            if embedding.len() != self.vector_size {
                return Err(IndexError::Request(format!(
                    "embedding dimension {} != {}",
                    embedding.len(),
                    self.vector_size
                )));
            }

            let id = point_id(&chunk.document_id, chunk.ordinal);
            ids.push(id.clone());
            points.push(json!({
                "id": id,
                "vector": embedding,
                "payload": {
                    "text": chunk.text,
                    "document_id": chunk.document_id,
                    "ordinal": chunk.ordinal,
                },
            }));
        }

        if points.is_empty() {
            return Ok(ids);
        }

        // Batches commit independently; a batch that still fails after the
        // retries leaves earlier batches in place, and the deterministic
        // point ids let a rerun resume without duplicating them.
        for (batch_no, batch) in points.chunks(UPSERT_BATCH_SIZE).enumerate() {
            let mut attempt = 0u32;
            loop {
                match self.put_points(batch).await {
                    Ok(()) => break,
                    Err(error) if attempt + 1 < UPSERT_ATTEMPTS => {
                        attempt += 1;
                        warn!(batch = batch_no, attempt, %error, "vector upsert batch failed; retrying");
                        tokio::time::sleep(UPSERT_BACKOFF * attempt).await;
                    }
                    Err(error) => {
                        return Err(IndexError::Request(format!(
                            "upsert failed at batch {batch_no} with {committed} points already committed: {error}",
                            committed = batch_no * UPSERT_BATCH_SIZE
                        )));
                    }
                }
            }
        }

        debug!(collection = %self.collection, points = points.len(), "vectors upserted");
        Ok(ids)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        document_id: &str,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        if vector.len() != self.vector_size {
            return Err(IndexError::Request(format!(
                "query vector dim {} is not {}",
                vector.len(),
                self.vector_size
            )));
        }

        let response = self
            .request(self.client.post(format!(
                "{}/collections/{}/points/search",
                self.endpoint, self.collection
            )))
            .json(&json!({
                "vector": vector,
                "limit": top_k,
                "with_payload": true,
                "filter": {
                    "must": [
                        { "key": "document_id", "match": { "value": document_id } }
                    ]
                },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IndexError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut result = Vec::with_capacity(hits.len());
        for hit in hits {
            let text = hit
                .pointer("/payload/text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let document_id = hit
                .pointer("/payload/document_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let ordinal = hit
                .pointer("/payload/ordinal")
                .and_then(Value::as_u64)
                .unwrap_or_default();
            let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);

            result.push(RetrievedChunk {
                text,
                score,
                document_id,
                ordinal,
            });
        }

        // Qdrant returns hits ordered by score, but equal scores carry no
        // ordering guarantee; re-sort so ties resolve by ascending ordinal.
        result.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then(left.ordinal.cmp(&right.ordinal))
        });

        Ok(result)
    }
}
