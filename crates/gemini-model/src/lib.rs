//! A model provider for the Google Gemini API.
//!
//! Replies are streamed from the `streamGenerateContent` endpoint as
//! server-sent events. Failures are classified from the HTTP status and the
//! structured Google error body, so a rejected API key surfaces as
//! [`ErrorKind::AuthRejected`] without looking at error text.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use lumos_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest,
};
use mime::Mime;
use reqwest::{Client, Response, header};
use tracing::Instrument;

pub use config::{
    DEFAULT_BASE_URL, DEFAULT_MODEL, GeminiConfig, GeminiConfigBuilder,
};
use io::{Chunks, Sse};
use proto::ErrorEnvelope;
pub use response::GeminiResponse;

/// Error type for [`GeminiProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
    status: Option<u16>,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
            status: None,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the HTTP status code, if the server answered at all.
    #[inline]
    pub fn status(&self) -> Option<u16> {
        self.status
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {status})", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Gemini model provider.
#[derive(Clone, Debug)]
pub struct GeminiProvider {
    client: Client,
    config: Arc<GeminiConfig>,
}

impl GeminiProvider {
    /// Creates a new `GeminiProvider` with the given configuration.
    #[inline]
    pub fn new(config: GeminiConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    /// Creates a provider sharing an existing HTTP client, so that
    /// providers created for different credentials reuse one connection
    /// pool.
    #[inline]
    pub fn with_client(client: Client, config: GeminiConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }
}

impl ModelProvider for GeminiProvider {
    type Error = Error;
    type Response = GeminiResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let gemini_req = proto::create_request(req);
        let resp_fut = self
            .client
            .post(self.config.stream_url())
            .header("x-goog-api-key", &self.config.api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "text/event-stream")
            .json(&gemini_req)
            .send();
        let model = self.config.model.clone();

        async move {
            let resp = resp_fut.await.map_err(|err| {
                Error::new(format!("{err}"), ErrorKind::Other)
            })?;
            let resp = check_status(resp).await?;

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_valid_content_type = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| m.subtype().as_str() == "event-stream")
                .unwrap_or(false);
            if !is_valid_content_type {
                return Err(Error::new(
                    format!("Unexpected content type: {content_type:?}"),
                    ErrorKind::Other,
                ));
            }

            // Here we got a successful response.
            let chunks = Chunks::from_response(resp);
            let sse = Sse::new(chunks);
            Ok(GeminiResponse::from_sse(sse))
        }
        .instrument(debug_span!("gemini request", model = %model))
    }
}

/// Turns a non-success response into a classified [`Error`].
async fn check_status(resp: Response) -> Result<Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let envelope = serde_json::from_str::<ErrorEnvelope>(&body).ok();
    let api_error = envelope.as_ref().map(|e| &e.error);
    let kind = proto::classify_error(Some(status.as_u16()), api_error);
    let message = match api_error {
        Some(err) if !err.message.is_empty() => err.message.clone(),
        _ => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_owned(),
    };
    warn!("request rejected with {status}: {message} ({kind:?})");

    Err(Error {
        message,
        kind,
        status: Some(status.as_u16()),
    })
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use lumos_model::{
        GenerationConfig, ModelFinishReason, ModelMessage, ModelResponse,
        ModelResponseEvent,
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use super::*;

    /// Answers a single HTTP request with a canned response and returns the
    /// raw request it received.
    async fn serve_once(
        status: &'static str,
        content_type: &'static str,
        body: &'static str,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/v1beta", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![];
            let mut chunk = [0; 4096];
            loop {
                let count = socket.read(&mut chunk).await.unwrap();
                assert!(count > 0, "connection closed mid-request");
                buf.extend_from_slice(&chunk[..count]);

                let text = String::from_utf8_lossy(&buf).into_owned();
                let Some(head_len) = text.find("\r\n\r\n") else {
                    continue;
                };
                let content_length = text[..head_len]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .map(|(_, value)| value.trim().parse::<usize>().unwrap())
                    .unwrap_or(0);
                if buf.len() >= head_len + 4 + content_length {
                    break;
                }
            }

            let resp = format!(
                "HTTP/1.1 {status}\r\ncontent-type: {content_type}\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(resp.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8(buf).unwrap()
        });

        (base_url, handle)
    }

    fn provider(base_url: &str) -> GeminiProvider {
        let client = Client::builder().no_proxy().build().unwrap();
        let config = GeminiConfigBuilder::with_api_key("test-key")
            .with_model("gemini-test")
            .with_base_url(base_url)
            .build();
        GeminiProvider::with_client(client, config)
    }

    fn request() -> ModelRequest {
        ModelRequest {
            messages: vec![
                ModelMessage::System("You are Lumos AI.".to_owned()),
                ModelMessage::User("Hallo".to_owned()),
            ],
            generation: GenerationConfig {
                temperature: 0.7,
                top_k: 40,
                max_output_tokens: 800,
            },
        }
    }

    async fn send_failing(base_url: &str) -> Error {
        match provider(base_url).send_request(&request()).await {
            Ok(_) => panic!("the request should fail"),
            Err(err) => err,
        }
    }

    #[tokio::test]
    async fn test_streamed_reply() {
        let (base_url, server) = serve_once(
            "200 OK",
            "text/event-stream",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hallo\"}]}}]}\n\n\
             data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" zurück\"}]},\"finishReason\":\"STOP\"}]}\n\n",
        )
        .await;

        let resp = provider(&base_url).send_request(&request()).await.unwrap();
        let mut resp = pin!(resp);
        let mut events = vec![];
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await.unwrap()
        {
            events.push(event);
        }
        assert_eq!(
            events,
            [
                ModelResponseEvent::MessageDelta("Hallo".to_owned()),
                ModelResponseEvent::MessageDelta(" zurück".to_owned()),
                ModelResponseEvent::Completed(ModelFinishReason::Stop),
            ]
        );

        let raw = server.await.unwrap();
        let (head, body) = raw.split_once("\r\n\r\n").unwrap();
        let head = head.to_ascii_lowercase();
        assert!(head.starts_with(
            "post /v1beta/models/gemini-test:streamgeneratecontent?alt=sse "
        ));
        assert!(head.contains("\r\nx-goog-api-key: test-key"));
        assert!(head.contains("\r\naccept: text/event-stream"));
        assert!(head.contains("\r\ncontent-type: application/json"));

        let body: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "You are Lumos AI."
        );
    }

    #[tokio::test]
    async fn test_invalid_api_key() {
        let (base_url, server) = serve_once(
            "400 Bad Request",
            "application/json",
            r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT","details":[{"@type":"type.googleapis.com/google.rpc.ErrorInfo","reason":"API_KEY_INVALID","domain":"googleapis.com"}]}}"#,
        )
        .await;

        let err = send_failing(&base_url).await;
        assert_eq!(err.kind(), ErrorKind::AuthRejected);
        assert_eq!(err.status(), Some(400));
        assert_eq!(
            err.to_string(),
            "API key not valid. Please pass a valid API key. (HTTP 400)"
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_plain_bad_request() {
        let (base_url, server) = serve_once(
            "400 Bad Request",
            "application/json",
            r#"{"error":{"code":400,"message":"Invalid JSON payload.","status":"INVALID_ARGUMENT"}}"#,
        )
        .await;

        let err = send_failing(&base_url).await;
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(err.to_string(), "Invalid JSON payload. (HTTP 400)");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unexpected_content_type() {
        let (base_url, server) =
            serve_once("200 OK", "application/json", r#"{"candidates":[]}"#)
                .await;

        let err = send_failing(&base_url).await;
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(err.status(), None);
        assert!(err.message().contains("application/json"));
        server.await.unwrap();
    }
}
