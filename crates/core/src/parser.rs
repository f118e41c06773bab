use crate::error::ParseError;
use crate::traits::DocumentParser;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize)]
struct ParseRequest {
    document_base64: String,
    source_url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ParseResponse {
    #[serde(default)]
    pages: Option<Vec<ParsedPage>>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ParsedPage {
    #[serde(default)]
    text: Option<String>,
}

/// Document parsing adapter: downloads the document bytes and hands them to
/// a remote parse service, returning the extracted plain text.
pub struct RemoteParsingClient {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl RemoteParsingClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self, ParseError> {
        let client = Client::builder().timeout(DOWNLOAD_TIMEOUT).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl DocumentParser for RemoteParsingClient {
    async fn parse(&self, locator: &str) -> Result<String, ParseError> {
        debug!(locator, "downloading document");
        let download = self.client.get(locator).send().await?;
        if !download.status().is_success() {
            return Err(ParseError::Backend(format!(
                "document download returned {}",
                download.status()
            )));
        }
        let bytes = download.bytes().await?;

        let mut request = self.client.post(&self.endpoint).json(&ParseRequest {
            document_base64: STANDARD.encode(&bytes),
            source_url: locator.to_string(),
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ParseError::Backend(format!(
                "parse service returned {}",
                response.status()
            )));
        }

        let payload: ParseResponse = response.json().await?;
        let text =
            response_text(&payload).ok_or_else(|| ParseError::EmptyDocument(locator.to_string()))?;
        info!(locator, length = text.len(), "document parsed");
        Ok(text)
    }
}

fn response_text(payload: &ParseResponse) -> Option<String> {
    if let Some(pages) = &payload.pages {
        let joined = pages
            .iter()
            .filter_map(|page| page.text.as_deref().map(str::trim))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        if !joined.is_empty() {
            return Some(joined);
        }
    }

    payload
        .text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn pages_are_joined_with_blank_lines() {
        let payload = ParseResponse {
            pages: Some(vec![
                ParsedPage {
                    text: Some("First page".to_string()),
                },
                ParsedPage {
                    text: Some("  ".to_string()),
                },
                ParsedPage {
                    text: Some("Second page".to_string()),
                },
            ]),
            text: None,
        };
        assert_eq!(response_text(&payload).unwrap(), "First page\n\nSecond page");
    }

    #[test]
    fn flat_text_is_used_when_no_pages_are_present() {
        let payload = ParseResponse {
            pages: None,
            text: Some(" body \n".to_string()),
        };
        assert_eq!(response_text(&payload).unwrap(), "body");
    }

    #[test]
    fn empty_payload_yields_no_text() {
        let payload = ParseResponse {
            pages: Some(Vec::new()),
            text: Some("   ".to_string()),
        };
        assert!(response_text(&payload).is_none());
    }

    #[tokio::test]
    async fn downloads_then_posts_to_the_parse_service() {
        let server = MockServer::start_async().await;
        let download = server
            .mock_async(|when, then| {
                when.method(GET).path("/files/policy.pdf");
                then.status(200).body("%PDF-1.4 fake");
            })
            .await;
        let parse = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/parse")
                    .header("authorization", "Bearer secret")
                    .body_contains("document_base64");
                then.status(200)
                    .json_body(json!({ "text": "Coverage includes X." }));
            })
            .await;

        let client = RemoteParsingClient::new(server.url("/parse"), Some("secret".to_string()))
            .expect("client should build");
        let text = client
            .parse(&server.url("/files/policy.pdf"))
            .await
            .expect("parse should succeed");

        assert_eq!(text, "Coverage includes X.");
        download.assert_async().await;
        parse.assert_async().await;
    }

    #[tokio::test]
    async fn failed_download_surfaces_as_parse_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/files/missing.pdf");
                then.status(404);
            })
            .await;

        let client =
            RemoteParsingClient::new(server.url("/parse"), None).expect("client should build");
        let error = client
            .parse(&server.url("/files/missing.pdf"))
            .await
            .expect_err("download failure should propagate");
        assert!(matches!(error, ParseError::Backend(_)));
    }
}
