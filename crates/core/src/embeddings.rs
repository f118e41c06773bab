use crate::error::EmbeddingError;
use crate::traits::EmbeddingClient;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

/// Embedding adapter over an OpenAI-compatible `/embeddings` endpoint.
///
/// The output dimension is fixed at construction: `connect` probes the
/// service once and verifies the configured dimension before the client is
/// handed out. A probe failure is meant to be fatal to the hosting process.
#[derive(Debug)]
pub struct HttpEmbeddingClient {
    endpoint: String,
    model: String,
    dimensions: usize,
    api_key: Option<String>,
    client: Client,
}

impl HttpEmbeddingClient {
    pub async fn connect(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
        api_key: Option<String>,
    ) -> Result<Self, EmbeddingError> {
        let client = Self {
            endpoint: endpoint.into(),
            model: model.into(),
            dimensions,
            api_key,
            client: Client::new(),
        };
        client.embed_one("dimension probe").await?;
        Ok(client)
    }

    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Err(EmbeddingError::EmptyBatch);
        }

        debug!(model = %self.model, batch = texts.len(), "requesting embeddings");

        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(EmbeddingError::Backend(format!(
                "embedding service returned {}",
                response.status()
            )));
        }

        let payload: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingError::Backend(error.to_string()))?;

        if payload.data.len() != texts.len() {
            return Err(EmbeddingError::Backend(format!(
                "service returned {} vectors for {} inputs",
                payload.data.len(),
                texts.len()
            )));
        }

        let mut vectors = Vec::with_capacity(payload.data.len());
        for row in payload.data {
            if row.embedding.len() != self.dimensions {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: row.embedding.len(),
                });
            }
            vectors.push(row.embedding);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let batch = [text.to_string()];
        let mut vectors = self.request_embeddings(&batch).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Backend("service returned no vector".to_string()))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.request_embeddings(texts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn vectors_body(count: usize, dimensions: usize) -> serde_json::Value {
        let data: Vec<_> = (0..count)
            .map(|row| json!({ "embedding": vec![row as f32 * 0.5; dimensions] }))
            .collect();
        json!({ "data": data })
    }

    #[tokio::test]
    async fn batch_of_n_texts_yields_n_vectors_of_fixed_dimension() {
        let server = MockServer::start_async().await;
        let mut probe = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200).json_body(vectors_body(1, 3));
            })
            .await;

        let client = HttpEmbeddingClient::connect(server.url("/v1/embeddings"), "test-model", 3, None)
            .await
            .expect("probe should succeed");
        probe.delete_async().await;

        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200).json_body(vectors_body(3, 3));
            })
            .await;

        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let vectors = client.embed_many(&texts).await.expect("batch should embed");
        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|vector| vector.len() == 3));
    }

    #[tokio::test]
    async fn empty_batch_is_rejected_without_a_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200).json_body(vectors_body(1, 2));
            })
            .await;

        let client = HttpEmbeddingClient::connect(server.url("/v1/embeddings"), "test-model", 2, None)
            .await
            .expect("probe should succeed");

        let error = client.embed_many(&[]).await.expect_err("empty batch must fail");
        assert!(matches!(error, EmbeddingError::EmptyBatch));
        assert_eq!(mock.hits_async().await, 1); // only the probe
    }

    #[tokio::test]
    async fn dimension_mismatch_fails_the_startup_probe() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200).json_body(vectors_body(1, 7));
            })
            .await;

        let error = HttpEmbeddingClient::connect(server.url("/v1/embeddings"), "test-model", 384, None)
            .await
            .expect_err("probe must reject the wrong dimension");
        assert!(matches!(
            error,
            EmbeddingError::DimensionMismatch { expected: 384, actual: 7 }
        ));
    }

    #[tokio::test]
    async fn unreachable_service_fails_the_startup_probe() {
        let error = HttpEmbeddingClient::connect("http://127.0.0.1:1/v1/embeddings", "m", 3, None)
            .await
            .expect_err("connect must fail fast");
        assert!(matches!(error, EmbeddingError::Http(_)));
    }
}
