use crate::error::SynthesisError;
use crate::models::RetrievedChunk;
use crate::traits::AnswerSynthesizer;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

/// The grounding contract: the model must answer only from the supplied
/// context and say so when the context is insufficient. Sent verbatim as the
/// system message on every synthesis request.
pub const GROUNDING_SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions \
based on provided context from policy documents. Always ground your answers in the provided \
context. Only use information that is explicitly stated in the context. If the answer cannot \
be found in the context, state that clearly.";

const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f64 = 0.1;

/// Answer synthesis adapter over an OpenAI-compatible chat completions
/// endpoint.
pub struct ChatSynthesizer {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

impl ChatSynthesizer {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
            client: Client::new(),
        }
    }
}

pub fn build_user_prompt(question: &str, passages: &[RetrievedChunk]) -> String {
    let context = passages
        .iter()
        .map(|passage| passage.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Based on the following context from a policy document, answer the question accurately \
and concisely.\n\nContext:\n{context}\n\nQuestion: {question}\n\nAnswer:"
    )
}

#[async_trait]
impl AnswerSynthesizer for ChatSynthesizer {
    async fn synthesize(
        &self,
        question: &str,
        passages: &[RetrievedChunk],
    ) -> Result<String, SynthesisError> {
        debug!(question, passages = passages.len(), "synthesizing answer");

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": GROUNDING_SYSTEM_PROMPT },
                { "role": "user", "content": build_user_prompt(question, passages) },
            ],
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SynthesisError::Backend(format!(
                "chat completion returned {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await?;
        let answer = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .ok_or(SynthesisError::EmptyResponse)?;

        Ok(answer.to_string())
    }
}
