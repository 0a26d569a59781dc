use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::gemini_types::GenerateContentRequest;
use super::types::{HttpReply, LlmTransport};
use super::ExtractionError;
use crate::config::ExtractorConfig;

/// Gemini `generateContent` HTTP client. One request per `generate` call;
/// throttling and retries live in [`super::retry::RetryController`].
pub struct GeminiClient {
    api_url: String,
    api_key: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(api_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ExtractionError::Configuration(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
            timeout,
        })
    }

    pub fn from_config(config: &ExtractorConfig) -> Result<Self, ExtractionError> {
        Self::new(&config.api_url, &config.api_key, config.http_timeout)
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl LlmTransport for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<HttpReply, ExtractionError> {
        let body = GenerateContentRequest::from_prompt(prompt);

        tracing::debug!(
            url = %self.api_url,
            prompt_chars = prompt.chars().count(),
            "Sending prompt to Gemini"
        );

        let response = self
            .client
            .post(&self.api_url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| self.network_error(e))?;

        Ok(HttpReply::new(status, text))
    }
}

impl GeminiClient {
    /// The request URL carries the API key, so it is stripped from every error.
    fn network_error(&self, e: reqwest::Error) -> ExtractionError {
        if e.is_timeout() {
            ExtractionError::NetworkFailure(format!(
                "Request timed out after {}s",
                self.timeout.as_secs()
            ))
        } else if e.is_connect() {
            ExtractionError::NetworkFailure(format!(
                "Could not connect to {}",
                redacted_host(&self.api_url)
            ))
        } else {
            ExtractionError::NetworkFailure(e.without_url().to_string())
        }
    }
}

fn redacted_host(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// Build a success envelope carrying `text` as the generated output.
pub fn success_envelope(text: &str) -> String {
    serde_json::json!({
        "candidates": [ { "content": { "parts": [ { "text": text } ], "role": "model" } } ]
    })
    .to_string()
}

/// Scripted transport for tests: replays queued replies in order and
/// records when each call was made.
pub struct MockTransport {
    replies: Mutex<VecDeque<Result<HttpReply, ExtractionError>>>,
    calls: Mutex<Vec<(Instant, String)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a raw HTTP reply.
    pub fn with_reply(self, status: u16, body: &str) -> Self {
        self.push(Ok(HttpReply::new(status, body)));
        self
    }

    /// Queue a 200 reply whose envelope carries `text`.
    pub fn with_generated_text(self, text: &str) -> Self {
        self.push(Ok(HttpReply::new(200, success_envelope(text))));
        self
    }

    /// Queue a failure to get any response.
    pub fn with_network_failure(self, message: &str) -> Self {
        self.push(Err(ExtractionError::NetworkFailure(message.to_string())));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// When each call reached the transport, in call order.
    pub fn call_instants(&self) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(at, _)| *at)
            .collect()
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }

    fn push(&self, reply: Result<HttpReply, ExtractionError>) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmTransport for MockTransport {
    async fn generate(&self, prompt: &str) -> Result<HttpReply, ExtractionError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((Instant::now(), prompt.to_string()));
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Err(ExtractionError::NetworkFailure(
                    "mock transport has no reply queued".into(),
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::collections::HashMap;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/v1beta/generate")
    }

    /// Echoes the prompt back inside a success envelope when the key matches.
    async fn echo_handler(
        Query(params): Query<HashMap<String, String>>,
        Json(body): Json<serde_json::Value>,
    ) -> (StatusCode, String) {
        if params.get("key").map(String::as_str) != Some("test-key") {
            return (StatusCode::FORBIDDEN, r#"{"error":{"message":"bad key"}}"#.into());
        }
        let prompt = body["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        (StatusCode::OK, success_envelope(&format!("echo: {prompt}")))
    }

    #[tokio::test]
    async fn posts_prompt_with_key_query_parameter() {
        let url = serve(Router::new().route("/v1beta/generate", post(echo_handler))).await;
        let client = GeminiClient::new(&url, "test-key", Duration::from_secs(5)).unwrap();

        let reply = client.generate("extract this").await.unwrap();
        assert_eq!(reply.status, 200);
        let envelope: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
        assert_eq!(
            envelope["candidates"][0]["content"]["parts"][0]["text"],
            "echo: extract this"
        );
    }

    #[tokio::test]
    async fn non_success_status_returned_as_reply() {
        let router = Router::new().route(
            "/v1beta/generate",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    r#"{"error":{"code":429,"message":"slow down"}}"#,
                )
            }),
        );
        let url = serve(router).await;
        let client = GeminiClient::new(&url, "test-key", Duration::from_secs(5)).unwrap();

        let reply = client.generate("p").await.unwrap();
        assert_eq!(reply.status, 429);
        assert!(reply.body.contains("slow down"));
    }

    #[tokio::test]
    async fn connection_refused_is_network_failure_without_key() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{addr}/v1beta/generate");
        let client = GeminiClient::new(&url, "secret-key-123", Duration::from_secs(5)).unwrap();

        let err = client.generate("p").await.unwrap_err();
        assert!(matches!(err, ExtractionError::NetworkFailure(_)));
        assert!(!err.to_string().contains("secret-key-123"));
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client =
            GeminiClient::new("http://localhost:8080/generate/", "k", Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.api_url(), "http://localhost:8080/generate");
    }

    #[tokio::test]
    async fn mock_replays_in_order_then_fails() {
        let mock = MockTransport::new()
            .with_reply(429, "{}")
            .with_generated_text("ok");

        assert_eq!(mock.generate("a").await.unwrap().status, 429);
        assert_eq!(mock.generate("b").await.unwrap().status, 200);
        assert!(matches!(
            mock.generate("c").await,
            Err(ExtractionError::NetworkFailure(_))
        ));
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.prompts(), vec!["a", "b", "c"]);
    }

    #[test]
    fn success_envelope_shape() {
        let envelope: serde_json::Value = serde_json::from_str(&success_envelope("hi")).unwrap();
        assert_eq!(envelope["candidates"][0]["content"]["parts"][0]["text"], "hi");
    }
}
