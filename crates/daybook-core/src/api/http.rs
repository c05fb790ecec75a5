//! Generic HTTP request primitive.
//!
//! `HttpClient::request` sends one request and reports `{ ok, status, body }`
//! without turning non-success statuses into errors; classification is left
//! to the caller.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::ApiError;

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// How to interpret the response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parser {
    /// JSON when it parses, raw text otherwise
    #[default]
    Json,
    Text,
}

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    /// Bearer token; `AuthedClient` fills this in
    pub token: Option<String>,
    pub parse: Parser,
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post() -> Self {
        Self::method(Method::POST)
    }

    pub fn method(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }
}

/// Parsed response body
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Json(Value),
    Text(String),
}

impl ResponseBody {
    pub fn parse(text: String, parser: Parser) -> Self {
        match parser {
            Parser::Text => ResponseBody::Text(text),
            Parser::Json if text.is_empty() => ResponseBody::Empty,
            Parser::Json => match serde_json::from_str(&text) {
                Ok(value) => ResponseBody::Json(value),
                Err(_) => ResponseBody::Text(text),
            },
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Non-empty string field of a JSON object body
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.as_json()?
            .get(key)?
            .as_str()
            .filter(|s| !s.is_empty())
    }

    /// Server-supplied error message: `message`, then `error`
    pub fn message(&self) -> Option<String> {
        self.str_field("message")
            .or_else(|| self.str_field("error"))
            .map(str::to_string)
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self {
            ResponseBody::Empty => serde_json::from_value(Value::Null),
            ResponseBody::Json(value) => T::deserialize(value),
            ResponseBody::Text(text) => serde_json::from_str(text),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub ok: bool,
    pub status: StatusCode,
    pub body: ResponseBody,
}

/// HTTP client for the daybook API.
/// Clone is cheap - reqwest::Client uses Arc internally, so clones share the
/// connection pool and the cookie store.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Default headers merged with the caller's. A caller header replaces a
    /// default of the same name instead of being sent alongside it.
    fn build_headers(options: &RequestOptions) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(ref token) = options.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidRequest("credential is not a valid header value".to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ApiError::InvalidRequest(format!("invalid header name '{}'", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ApiError::InvalidRequest(format!("invalid value for header '{}'", name)))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    /// Send one request. Fails only on transport errors or cancellation.
    pub async fn request(&self, path: &str, options: &RequestOptions) -> Result<ApiResponse, ApiError> {
        let url = self.url(path);

        // Headers go in before the body so `json` keeps our content type
        let mut request = self
            .client
            .request(options.method.clone(), &url)
            .headers(Self::build_headers(options)?);
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(ref body) = options.body {
            request = request.json(body);
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let text = response.text().await?;
            Ok::<_, reqwest::Error>((status, text))
        };

        let (status, text) = match options.cancel {
            Some(ref cancel) => tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(method = %options.method, url = %url, "Request cancelled");
                    return Err(ApiError::Cancelled);
                }
                result = exchange => result?,
            },
            None => exchange.await?,
        };

        debug!(method = %options.method, url = %url, status = status.as_u16(), "Request completed");

        Ok(ApiResponse {
            ok: status.is_success(),
            status,
            body: ResponseBody::parse(text, options.parse),
        })
    }
}
