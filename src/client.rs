use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::Config;
use crate::error::ApiError;
use crate::observability::{
    CLIENT_NOT_CONFIGURED, CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS,
};

const CHAT_COMPLETIONS_PATH: &str = "chat/completions";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Parameters of a single-turn chat completion.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    /// Content of the `system` message.
    pub system_prompt: String,
    /// Content of the `user` message.
    pub user_content: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
}

impl CompletionRequest {
    /// Builds a request from the configured model, prompt, and temperature.
    pub fn from_config(config: &Config, user_content: impl Into<String>) -> Self {
        Self {
            system_prompt: config.system_prompt.clone(),
            user_content: user_content.into(),
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 2],
    temperature: f64,
}

impl<'a> From<&'a CompletionRequest> for WireRequest<'a> {
    fn from(request: &'a CompletionRequest) -> Self {
        WireRequest {
            model: &request.model,
            messages: [
                WireMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                WireMessage {
                    role: "user",
                    content: &request.user_content,
                },
            ],
            temperature: request.temperature,
        }
    }
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Deserialize)]
struct WireChoiceMessage {
    content: Option<String>,
}

/// Connection state derived from a [`Config`].
struct Backend {
    http: ReqwestClient,
    endpoint: Url,
    api_key: String,
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

/// Client for an OpenAI-compatible chat-completions endpoint.
///
/// A client is an immutable handle built from one configuration by
/// [`ChatClient::configure`]; reconfiguring produces a new client.  Cloning
/// is cheap and clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ChatClient {
    backend: Option<Arc<Backend>>,
    timeout: Duration,
}

impl ChatClient {
    /// Creates a client for `config` with the default 60 second timeout.
    ///
    /// When the API URL or key is missing (or the URL does not parse) the
    /// client has no backend and every call fails with
    /// [`ApiError::NotConfigured`].
    pub fn configure(config: &Config) -> Result<Self, ApiError> {
        Self::with_timeout(config, DEFAULT_TIMEOUT)
    }

    /// Creates a client for `config` with a custom request timeout.
    pub fn with_timeout(config: &Config, timeout: Duration) -> Result<Self, ApiError> {
        if !config.has_credentials() {
            return Ok(Self::unconfigured_with_timeout(timeout));
        }
        let endpoint = match completions_endpoint(config.api_url.trim()) {
            Ok(endpoint) => endpoint,
            Err(err) => {
                tracing::warn!(api_url = %config.api_url, error = %err, "unusable API URL");
                return Ok(Self::unconfigured_with_timeout(timeout));
            }
        };
        let http = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ApiError::transport(
                    format!("Failed to build HTTP client: {}", e),
                    false,
                    Some(Box::new(e)),
                )
            })?;
        tracing::debug!(%endpoint, "chat client configured");
        Ok(Self {
            backend: Some(Arc::new(Backend {
                http,
                endpoint,
                api_key: config.api_key.trim().to_string(),
            })),
            timeout,
        })
    }

    /// A client without a backend.
    pub fn unconfigured() -> Self {
        Self::unconfigured_with_timeout(DEFAULT_TIMEOUT)
    }

    fn unconfigured_with_timeout(timeout: Duration) -> Self {
        Self {
            backend: None,
            timeout,
        }
    }

    /// Returns true if requests can be issued.
    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    /// The URL requests are posted to, if configured.
    pub fn endpoint(&self) -> Option<&Url> {
        self.backend.as_ref().map(|b| &b.endpoint)
    }

    /// The request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Create and return default headers for API requests.
    fn default_headers(api_key: &str) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let mut bearer = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| {
            ApiError::transport(
                "API key contains characters that cannot be sent in a header",
                false,
                Some(Box::new(e)),
            )
        })?;
        bearer.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Issues a chat completion with a system and a user message and returns
    /// the text of the first choice.
    ///
    /// There is no retry: a failed attempt is returned as is.
    ///
    /// # Example
    ///
    /// ```
    /// use palaver::{ChatClient, CompletionRequest, Config};
    ///
    /// # tokio_test::block_on(async {
    /// let client = ChatClient::configure(&Config::default()).unwrap();
    /// let request = CompletionRequest::from_config(&Config::default(), "hello");
    /// let err = client.complete(&request).await.unwrap_err();
    /// assert!(err.is_not_configured());
    /// # });
    /// ```
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, ApiError> {
        let Some(backend) = self.backend.as_ref() else {
            CLIENT_NOT_CONFIGURED.click();
            return Err(ApiError::NotConfigured);
        };
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let result = self.complete_with(backend, request).await;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
        if let Err(err) = &result {
            CLIENT_REQUEST_ERRORS.click();
            tracing::warn!(endpoint = %backend.endpoint, error = %err, "chat completion failed");
        }
        result
    }

    async fn complete_with(
        &self,
        backend: &Backend,
        request: &CompletionRequest,
    ) -> Result<String, ApiError> {
        let body = WireRequest::from(request);
        tracing::debug!(
            endpoint = %backend.endpoint,
            model = %request.model,
            temperature = request.temperature,
            "sending chat completion"
        );

        let response = backend
            .http
            .post(backend.endpoint.clone())
            .headers(Self::default_headers(&backend.api_key)?)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::transport(
                        format!("no response within {:.0?}: {}", self.timeout, e),
                        true,
                        Some(Box::new(e)),
                    )
                } else {
                    ApiError::transport(format!("Request failed: {}", e), false, Some(Box::new(e)))
                }
            })?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "chat completion response");
        if !status.is_success() {
            return Err(Self::process_error_response(response).await);
        }

        let text = response.text().await.map_err(|e| {
            ApiError::transport(
                format!("Failed to read response: {}", e),
                e.is_timeout(),
                Some(Box::new(e)),
            )
        })?;
        extract_content(&text)
    }

    /// Wrap a non-success response, keeping its status and body.
    async fn process_error_response(response: Response) -> ApiError {
        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => ApiError::backend(status, body),
            Err(e) => {
                tracing::debug!(status, error = %e, "failed to read error body");
                ApiError::backend(status, String::new())
            }
        }
    }
}

/// The chat-completions URL under `base`.  A trailing slash on the base is
/// optional: `https://host/v1` and `https://host/v1/` resolve the same.
fn completions_endpoint(base: &str) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(base)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(CHAT_COMPLETIONS_PATH)
}

/// Pull `choices[0].message.content` out of a response body.
fn extract_content(body: &str) -> Result<String, ApiError> {
    let response: WireResponse = serde_json::from_str(body)
        .map_err(|e| ApiError::malformed_response(format!("Failed to parse response: {e}")))?;
    response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::malformed_response("response has no choices"))?
        .message
        .content
        .ok_or_else(|| ApiError::malformed_response("first choice has no message content"))
}
