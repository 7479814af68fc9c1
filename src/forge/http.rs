//! forge::http
//!
//! REST transport shared by the provider adapters.
//!
//! # Design
//!
//! Every adapter talks JSON over HTTPS with a token header. [`RestClient`]
//! owns the `reqwest::Client`, the API base URL and the default headers,
//! and turns every non-2xx response into a classified [`ScmError`]:
//!
//! | Response | Kind |
//! |---|---|
//! | 404, or a "does not exist" message | `NotFound` |
//! | 409, or an "already exists" message | `Conflict` |
//! | 408, 429, 5xx, connect/timeout failures | `Transient` |
//! | anything else | `Provider` |
//!
//! Path segments are appended with [`reqwest::Url::path_segments_mut`], so a
//! segment containing `/` (a GitLab project path, a GitLab file path) is
//! percent-encoded as `%2F` while separate segments stay separate.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::ScmError;

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = concat!("forgeops/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on pages fetched by [`RestClient::get_all_pages`].
pub const MAX_PAGES: u32 = 100;

/// How the token is presented to the provider.
#[derive(Clone)]
pub enum Auth {
    /// `Authorization: Bearer <token>` (GitHub).
    Bearer(String),
    /// `PRIVATE-TOKEN: <token>` (GitLab).
    PrivateToken(String),
    /// `Authorization: token <token>` (Forgejo, Gitea).
    Token(String),
}

impl Auth {
    fn header(&self) -> Option<(HeaderName, String)> {
        let (name, value) = match self {
            Auth::Bearer(t) => (AUTHORIZATION, format!("Bearer {}", t)),
            Auth::PrivateToken(t) => (HeaderName::from_static("private-token"), t.clone()),
            Auth::Token(t) => (AUTHORIZATION, format!("token {}", t)),
        };
        if self.token().is_empty() {
            None
        } else {
            Some((name, value))
        }
    }

    fn token(&self) -> &str {
        match self {
            Auth::Bearer(t) | Auth::PrivateToken(t) | Auth::Token(t) => t,
        }
    }
}

// Never print the token.
impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Auth::Bearer(_) => "Bearer",
            Auth::PrivateToken(_) => "PrivateToken",
            Auth::Token(_) => "Token",
        };
        f.debug_struct("Auth")
            .field("kind", &kind)
            .field("has_token", &!self.token().is_empty())
            .finish()
    }
}

/// A JSON REST client bound to one API base URL.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base: Url,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base", &self.base.as_str())
            .finish()
    }
}

impl RestClient {
    /// Build a client for `api_base`, sending `auth` and `extra` headers on
    /// every request.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the base URL does not parse or the token cannot
    /// be used as a header value.
    pub fn new(
        api_base: &str,
        auth: Auth,
        extra: &[(&'static str, &'static str)],
    ) -> Result<Self, ScmError> {
        let base = Url::parse(api_base.trim_end_matches('/')).map_err(|e| {
            ScmError::InvalidArgument(format!("invalid API base URL '{}': {}", api_base, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(ScmError::InvalidArgument(format!(
                "API base URL '{}' cannot carry a path",
                api_base
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        for &(name, value) in extra {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        if let Some((name, value)) = auth.header() {
            let mut value = HeaderValue::from_str(&value).map_err(|_| {
                ScmError::InvalidArgument("token contains characters not allowed in a header".into())
            })?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ScmError::provider("build HTTP client", None, e.to_string()))?;

        Ok(Self { client, base })
    }

    /// The API base URL.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Append `segments` to the base URL, percent-encoding each one.
    pub fn url<S: AsRef<str>>(&self, segments: &[S]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.push(segment.as_ref());
            }
        }
        url
    }

    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url)
    }

    pub fn get(&self, url: Url) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: Url) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: Url) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    pub fn patch(&self, url: Url) -> RequestBuilder {
        self.request(Method::PATCH, url)
    }

    pub fn delete(&self, url: Url) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    /// Send a request and return the response if it succeeded.
    ///
    /// # Errors
    ///
    /// A classified [`ScmError`] for transport failures and non-2xx statuses.
    pub async fn send(&self, context: &str, request: RequestBuilder) -> Result<Response, ScmError> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(context, &e))?;
        let status = response.status();
        debug!(context, status = status.as_u16(), "provider response");
        if status.is_success() {
            Ok(response)
        } else {
            Err(error_from_response(context, response).await)
        }
    }

    /// Send a request and decode a JSON body.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        context: &str,
        request: RequestBuilder,
    ) -> Result<T, ScmError> {
        let response = self.send(context, request).await?;
        decode_json(context, response).await
    }

    /// Send a request and discard the body.
    pub async fn send_empty(&self, context: &str, request: RequestBuilder) -> Result<(), ScmError> {
        self.send(context, request).await.map(|_| ())
    }

    /// Fetch every page of a list endpoint.
    ///
    /// Pages are requested with `page` and `per_page_param` query
    /// parameters. An `X-Next-Page` header drives iteration when present
    /// (GitLab); otherwise a short page ends it.
    ///
    /// # Errors
    ///
    /// Any request failure, or a `Provider` error once more than
    /// [`MAX_PAGES`] pages would be needed.
    pub async fn get_all_pages<T: DeserializeOwned>(
        &self,
        context: &str,
        url: Url,
        per_page_param: &str,
        per_page: usize,
    ) -> Result<Vec<T>, ScmError> {
        self.get_all_pages_with(context, url, per_page_param, per_page, |items: Vec<T>| items)
            .await
    }

    /// [`get_all_pages`](Self::get_all_pages) for endpoints that wrap each
    /// page in an object, such as GitHub check runs. `items` pulls the list
    /// out of one decoded page.
    pub async fn get_all_pages_with<W, T, F>(
        &self,
        context: &str,
        url: Url,
        per_page_param: &str,
        per_page: usize,
        items: F,
    ) -> Result<Vec<T>, ScmError>
    where
        W: DeserializeOwned,
        F: Fn(W) -> Vec<T>,
    {
        let mut all = Vec::new();
        let mut page: u32 = 1;

        loop {
            let mut page_url = url.clone();
            page_url
                .query_pairs_mut()
                .append_pair(per_page_param, &per_page.to_string())
                .append_pair("page", &page.to_string());

            let response = self.send(context, self.get(page_url)).await?;
            let next_page = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string());
            let batch = items(decode_json::<W>(context, response).await?);
            let short = batch.len() < per_page;
            all.extend(batch);

            page = match next_page {
                Some(next) if next.is_empty() => break,
                Some(next) => match next.parse() {
                    Ok(n) => n,
                    Err(_) => break,
                },
                None if short => break,
                None => page + 1,
            };
            if page > MAX_PAGES {
                warn!(context, pages = MAX_PAGES, "result set exceeds the page limit");
                return Err(ScmError::provider(
                    context,
                    None,
                    format!(
                        "more than {} pages of results; refusing to return a partial list",
                        MAX_PAGES
                    ),
                ));
            }
        }

        Ok(all)
    }
}

async fn decode_json<T: DeserializeOwned>(context: &str, response: Response) -> Result<T, ScmError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(context, &e))?;
    serde_json::from_str(&body).map_err(|e| {
        ScmError::provider(
            context,
            Some(status.as_u16()),
            format!("unexpected response body: {}", e),
        )
    })
}

/// Decode a base64 file body into text.
///
/// GitHub wraps the encoded body at 60 columns, so whitespace is dropped
/// before decoding.
pub fn decode_base64(context: &str, raw: &str) -> Result<String, ScmError> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact.as_bytes()).map_err(|e| {
        ScmError::provider(context, None, format!("invalid base64 content: {}", e))
    })?;
    String::from_utf8(bytes)
        .map_err(|e| ScmError::provider(context, None, format!("file content is not UTF-8: {}", e)))
}

pub fn encode_base64(content: &str) -> String {
    STANDARD.encode(content.as_bytes())
}

/// Classify a reqwest transport failure.
pub fn transport_error(context: &str, err: &reqwest::Error) -> ScmError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        ScmError::transient(context, err.to_string())
    } else {
        ScmError::provider(context, err.status().map(|s| s.as_u16()), err.to_string())
    }
}

async fn error_from_response(context: &str, response: Response) -> ScmError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    classify(context, status, &error_message(status, &body))
}

/// Extract a human-readable message from a provider error body.
///
/// GitHub and Forgejo send `{"message": "..."}`. GitLab sends either
/// `{"message": "..."}`, `{"message": {"field": ["..."]}}` or
/// `{"error": "..."}`.
pub fn error_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        match (v.get("message"), v.get("error")) {
            (Some(Value::String(m)), _) => Some(m.clone()),
            (Some(other), _) if !other.is_null() => Some(other.to_string()),
            (_, Some(Value::String(e))) => Some(e.clone()),
            _ => None,
        }
    });
    match from_json {
        Some(m) if !m.is_empty() => m,
        _ if !body.trim().is_empty() => body.trim().chars().take(200).collect(),
        _ => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    }
}

/// Map an HTTP status and message to an [`ScmError`].
pub fn classify(context: &str, status: StatusCode, message: &str) -> ScmError {
    let lower = message.to_ascii_lowercase();
    match status {
        StatusCode::NOT_FOUND => ScmError::not_found(context, message),
        StatusCode::CONFLICT => ScmError::conflict(context, message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            ScmError::transient(context, message)
        }
        _ if status.is_server_error() => ScmError::transient(context, message),
        _ if lower.contains("already exists") || lower.contains("has already been taken") => {
            ScmError::conflict(context, message)
        }
        _ if lower.contains("does not exist") => ScmError::not_found(context, message),
        _ => ScmError::provider(context, Some(status.as_u16()), message),
    }
}
