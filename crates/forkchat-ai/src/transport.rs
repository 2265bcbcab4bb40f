//! HTTP transport for chat-completion endpoints

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::{
    error::{Error, Result},
    provider::ResolvedModel,
    types::{CompletionRequest, CompletionResponse},
};

/// Query parameter used to defeat response caching on regenerate
pub const CACHE_BUSTER_PARAM: &str = "nocache";

/// A stream of raw response body chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Sends completion requests to a resolved provider
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a streaming completion and return its body as raw chunks.
    ///
    /// `nonce`, when given, is appended as a cache-defeating query parameter.
    async fn open_stream(
        &self,
        target: &ResolvedModel,
        request: &CompletionRequest,
        nonce: Option<&str>,
    ) -> Result<ByteStream>;

    /// Run a buffered completion and return the first choice's text
    async fn complete(&self, target: &ResolvedModel, request: &CompletionRequest)
    -> Result<String>;
}

/// reqwest-backed transport
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (proxies, timeouts, ...)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build_request(
        &self,
        target: &ResolvedModel,
        request: &CompletionRequest,
        nonce: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(target.completions_url())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(request);

        if request.stream {
            builder = builder.header(reqwest::header::ACCEPT, "text/event-stream");
        }
        if let Some(ref key) = target.api_key {
            builder = builder.bearer_auth(key);
        }
        if let Some(nonce) = nonce {
            builder = builder
                .query(&[(CACHE_BUSTER_PARAM, nonce)])
                .header(reqwest::header::CACHE_CONTROL, "no-cache");
        }
        builder
    }
}

/// Turn a non-success response into an API error carrying its body
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(Error::api(status.as_u16(), text))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open_stream(
        &self,
        target: &ResolvedModel,
        request: &CompletionRequest,
        nonce: Option<&str>,
    ) -> Result<ByteStream> {
        tracing::debug!(
            provider = %target.provider,
            model = %target.model,
            messages = request.messages.len(),
            "Opening completion stream"
        );

        let response = self.build_request(target, request, nonce).send().await?;
        let response = check_status(response).await?;

        let body = response
            .bytes_stream()
            .map(|item| item.map_err(|e| Error::Transport(e.to_string())));
        Ok(Box::pin(body))
    }

    async fn complete(
        &self,
        target: &ResolvedModel,
        request: &CompletionRequest,
    ) -> Result<String> {
        let response = self.build_request(target, request, None).send().await?;
        let response = check_status(response).await?;

        let parsed: CompletionResponse = response.json().await?;
        parsed
            .into_text()
            .ok_or_else(|| Error::UnexpectedResponse("completion had no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    fn target(api_key: Option<&str>) -> ResolvedModel {
        ResolvedModel {
            provider: "OpenAI".into(),
            model: "gpt-4o-mini".into(),
            base_url: "https://api.example.com/v1".into(),
            api_key: api_key.map(String::from),
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::streaming("gpt-4o-mini", vec![ChatMessage::user("Hello")], 0.7, 256)
    }

    #[test]
    fn test_stream_request_shape() {
        let built = HttpTransport::new()
            .build_request(&target(Some("sk-1")), &request(), None)
            .build()
            .unwrap();

        assert_eq!(built.url().as_str(), "https://api.example.com/v1/chat/completions");
        assert!(built.url().query().is_none());
        assert_eq!(built.headers()["authorization"], "Bearer sk-1");
        assert_eq!(built.headers()["accept"], "text/event-stream");

        let body: serde_json::Value =
            serde_json::from_slice(built.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn test_nonce_adds_cache_buster() {
        let built = HttpTransport::new()
            .build_request(&target(None), &request(), Some("abc123"))
            .build()
            .unwrap();

        assert_eq!(built.url().query(), Some("nocache=abc123"));
        assert!(built.headers().get("authorization").is_none());
        assert_eq!(built.headers()["cache-control"], "no-cache");
    }
}
