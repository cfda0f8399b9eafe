use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::client_logger::ClientLogger;
use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_PAYMENT_REQUIRED, CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS,
};
use crate::sse::process_sse;
use crate::transport::{ChatTransport, FrameStream};
use crate::types::{
    AuthTokens, ConversationDetail, ConversationId, ConversationInfo, LoginRequest, ModelInfo,
    PromptTemplate, StreamFrame, StreamRequest, TokenUsage, TokenUsageReport, TopUpRequest,
    TopUpResponse, provider_for_model_id,
};

const DEFAULT_API_URL: &str = "http://localhost:8000/api/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variable holding the API base URL.
pub const API_URL_ENV: &str = "BYTEFORGE_API_URL";
/// Environment variable holding the bearer access token.
pub const ACCESS_TOKEN_ENV: &str = "BYTEFORGE_ACCESS_TOKEN";

/// Client for the ByteForge backend.
///
/// Streaming turns are bounded only by the connect timeout; once the
/// response headers arrive a turn may run as long as the backend keeps the
/// body open.  Every other call is bounded by the request timeout.
#[derive(Clone)]
pub struct ByteForge {
    access_token: Option<String>,
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl fmt::Debug for ByteForge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteForge")
            .field("authenticated", &self.access_token.is_some())
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

impl ByteForge {
    /// Create a new ByteForge client.
    ///
    /// The access token can be provided directly or read from the
    /// BYTEFORGE_ACCESS_TOKEN environment variable.
    pub fn new(access_token: Option<String>) -> Result<Self> {
        Self::with_options(access_token, None, None)
    }

    /// Create a new client with custom settings.
    ///
    /// Without an explicit base URL, BYTEFORGE_API_URL is consulted before
    /// falling back to a local development server.
    pub fn with_options(
        access_token: Option<String>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let access_token = match access_token {
            Some(token) => token,
            None => env::var(ACCESS_TOKEN_ENV).map_err(|_| {
                Error::authentication(
                    "access token not provided and BYTEFORGE_ACCESS_TOKEN environment variable not set",
                )
            })?,
        };
        Self::build(Some(access_token), base_url, timeout)
    }

    /// Create a client without credentials, suitable only for [`ByteForge::login`].
    pub fn anonymous(base_url: Option<String>) -> Result<Self> {
        Self::build(None, base_url, None)
    }

    fn build(
        access_token: Option<String>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let base_url = base_url
            .or_else(|| env::var(API_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let base_url = normalize_base_url(&base_url)?;

        let client = ReqwestClient::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            access_token,
            client,
            base_url,
            timeout: timeout.unwrap_or(DEFAULT_TIMEOUT),
            logger: None,
        })
    }

    /// Attach a logger that observes every streamed turn.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Replace the access token, e.g. after [`ByteForge::login`].
    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(|e| {
            Error::url(format!("Invalid endpoint path {path:?}: {e}"), Some(e))
        })
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = &self.access_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                Error::validation(
                    "access token contains characters not allowed in a header",
                    Some("access_token".to_string()),
                )
            })?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    fn map_request_error(&self, e: reqwest::Error) -> Error {
        CLIENT_REQUEST_ERRORS.click();
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {e}"),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }

    /// Process API response errors and convert to our Error type.
    async fn process_error_response(response: Response) -> Error {
        CLIENT_REQUEST_ERRORS.click();
        let status_code = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };
        let error = error_for_status(status_code, &body, retry_after);
        if error.is_payment_required() {
            CLIENT_PAYMENT_REQUIRED.click();
        }
        tracing::debug!(status_code, error = %error, "request failed");
        error
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }
        Ok(response)
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.endpoint(path)?;
        tracing::debug!(method = method.as_str(), url = url.as_str(), "request");
        Ok(self
            .client
            .request(method, url)
            .headers(self.default_headers()?)
            .timeout(self.timeout))
    }

    async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        response.json::<T>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {e}"),
                Some(Box::new(e)),
            )
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.execute(self.request(Method::GET, path)?).await?;
        Self::parse_json(response).await
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = self.request(method, path)?.json(body);
        let response = self.execute(request).await?;
        Self::parse_json(response).await
    }

    /// Open the streaming response for one chat turn.
    ///
    /// Resolves once the response headers arrive.  A non-2xx status is
    /// returned as an error before any frame is read; 402 becomes
    /// [`Error::PaymentRequired`] carrying the backend's counters.
    pub async fn stream_turn(&self, request: &StreamRequest) -> Result<FrameStream> {
        let url = self.endpoint("chat/stream/")?;
        let mut headers = self.default_headers()?;
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );

        if let Some(logger) = &self.logger {
            logger.log_request(request);
        }
        tracing::debug!(
            url = url.as_str(),
            conversation_id = ?request.conversation_id,
            model = %request.model,
            persona = %request.persona,
            "opening stream"
        );

        let response = self
            .execute(self.client.post(url).headers(headers).json(request))
            .await?;

        let frames = process_sse(response.bytes_stream());
        match self.logger.clone() {
            Some(logger) => Ok(Box::pin(frames.inspect(move |frame| {
                if let Ok(frame) = frame {
                    logger.log_frame(frame);
                    if let StreamFrame::Done(done) = frame {
                        logger.log_turn_complete(done);
                    }
                }
            }))),
            None => Ok(Box::pin(frames)),
        }
    }

    /// Exchange email and password for a token pair.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthTokens> {
        #[derive(Deserialize)]
        struct LoginResponse {
            tokens: AuthTokens,
        }

        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: LoginResponse = self.send_json(Method::POST, "auth/login/", &body).await?;
        Ok(response.tokens)
    }

    /// List the caller's conversations, newest first.
    pub async fn list_conversations(&self) -> Result<Vec<ConversationInfo>> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum ConversationList {
            Page { results: Vec<ConversationInfo> },
            Plain(Vec<ConversationInfo>),
        }

        match self.get_json("chat/conversations/").await? {
            ConversationList::Page { results } => Ok(results),
            ConversationList::Plain(conversations) => Ok(conversations),
        }
    }

    /// Fetch a conversation with its full transcript.
    pub async fn get_conversation(&self, id: &ConversationId) -> Result<ConversationDetail> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum DetailResponse {
            Wrapped { conversation: ConversationDetail },
            Plain(ConversationDetail),
        }

        let path = format!("chat/conversations/{id}/");
        match self.get_json(&path).await? {
            DetailResponse::Wrapped { conversation } => Ok(conversation),
            DetailResponse::Plain(conversation) => Ok(conversation),
        }
    }

    pub async fn delete_conversation(&self, id: &ConversationId) -> Result<()> {
        let path = format!("chat/conversations/{id}/");
        self.execute(self.request(Method::DELETE, &path)?).await?;
        Ok(())
    }

    /// Remove every message from a conversation, keeping the conversation itself.
    pub async fn clear_conversation(&self, id: &ConversationId) -> Result<()> {
        let path = format!("chat/conversations/{id}/clear/");
        self.execute(self.request(Method::POST, &path)?).await?;
        Ok(())
    }

    /// Fetch aggregate counters for one conversation, or for the caller's
    /// most recent conversation when `conversation_id` is `None`.
    pub async fn token_usage(
        &self,
        conversation_id: Option<&ConversationId>,
    ) -> Result<TokenUsageReport> {
        let mut url = self.endpoint("chat/token-usage/")?;
        if let Some(id) = conversation_id {
            url.query_pairs_mut()
                .append_pair("conversation_id", id.as_str());
        }
        // Passing the full URL keeps the query string; `join` would drop it.
        self.get_json(url.as_str()).await
    }

    /// Fetch the model catalog.  Models the backend did not tag with a
    /// provider get one inferred from their id.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        #[derive(Deserialize)]
        struct ModelsResponse {
            #[serde(default)]
            models: Vec<ModelInfo>,
        }

        let response: ModelsResponse = self.get_json("chat/models/").await?;
        Ok(response
            .models
            .into_iter()
            .map(|mut model| {
                if model.provider.is_empty() {
                    model.provider = provider_for_model_id(&model.id).to_string();
                }
                model
            })
            .collect())
    }

    /// Fetch the prompt library, optionally filtered server-side by category.
    pub async fn list_prompts(&self, category: Option<&str>) -> Result<Vec<PromptTemplate>> {
        #[derive(Deserialize)]
        struct PromptsResponse {
            #[serde(default)]
            prompts: Vec<PromptTemplate>,
        }

        let mut url = self.endpoint("prompts/")?;
        if let Some(category) = category {
            url.query_pairs_mut().append_pair("category", category);
        }
        let response: PromptsResponse = self.get_json(url.as_str()).await?;
        Ok(response.prompts)
    }

    /// Buy more tokens for a conversation.
    ///
    /// The backend answers with the replenished counters, which lift the
    /// send gate once applied to the conversation.
    pub async fn top_up(
        &self,
        conversation_id: &ConversationId,
        amount: f64,
    ) -> Result<TopUpResponse> {
        if !(amount.is_finite() && amount > 0.0) {
            return Err(Error::validation(
                format!("top-up amount must be positive, got {amount}"),
                Some("amount".to_string()),
            ));
        }
        let body = TopUpRequest {
            conversation_id: conversation_id.clone(),
            amount,
        };
        let response: TopUpResponse = self
            .send_json(Method::POST, "payments/create/", &body)
            .await?;
        if !response.success {
            return Err(Error::bad_request(
                response
                    .message
                    .unwrap_or_else(|| "payment was not accepted".to_string()),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatTransport for ByteForge {
    async fn open_stream(&self, request: &StreamRequest) -> Result<FrameStream> {
        self.stream_turn(request).await
    }
}

fn normalize_base_url(base_url: &str) -> Result<Url> {
    let mut base_url = base_url.trim().to_string();
    if !base_url.ends_with('/') {
        base_url.push('/');
    }
    Url::parse(&base_url)
        .map_err(|e| Error::url(format!("Invalid base URL {base_url:?}: {e}"), Some(e)))
}

/// Map a non-2xx status and its body to an error.
///
/// The message is taken from the body's `message`, `error` or `detail`
/// field, in that order, falling back to the raw body.
pub(crate) fn error_for_status(status_code: u16, body: &str, retry_after: Option<u64>) -> Error {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(|v| v.as_str())
            .map(String::from)
    };
    let message = field("message")
        .or_else(|| field("error"))
        .or_else(|| field("detail"))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("HTTP {status_code}")
            } else {
                body.to_string()
            }
        });

    match status_code {
        400 => Error::bad_request(message),
        401 => Error::authentication(message),
        402 => {
            let token_usage = parsed
                .as_ref()
                .and_then(|v| v.get("token_usage"))
                .and_then(|v| serde_json::from_value::<TokenUsage>(v.clone()).ok());
            Error::payment_required(message, token_usage)
        }
        403 => Error::permission(message),
        404 => Error::not_found(message, None, None),
        408 => Error::timeout(message, None),
        429 => Error::rate_limit(message, retry_after),
        500 => Error::internal_server(message),
        502..=504 => Error::service_unavailable(message, retry_after),
        _ => Error::api(status_code, message),
    }
}
