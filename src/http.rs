use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use url::Url;

use crate::backend::{
    BackendApi, HttpMethod, LoginRequest, PermissionQuery, RegisterRequest, ResourceApi,
    ResourceRequest, TokenGrant,
};
use crate::error::{ApiError, Error};
use crate::permission::PermissionTree;
use crate::session::SessionEvents;
use crate::types::AccessToken;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend API location.
///
/// ```rust,ignore
/// use admin_access::ApiConfig;
///
/// let config = ApiConfig::new("https://admin.example.com/api".parse()?)
///     .with_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ApiConfig {
    pub(crate) base_url: Url,
    pub(crate) timeout: Duration,
}

impl ApiConfig {
    /// Endpoints resolve relative to `base_url`; a missing trailing `/` is added.
    #[must_use]
    pub fn new(mut base_url: Url) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            base_url,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Read `ADMIN_API_URL` (required) and `ADMIN_API_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is missing or either value is invalid.
    pub fn from_env() -> Result<Self, Error> {
        let raw = std::env::var("ADMIN_API_URL")
            .map_err(|_| Error::Config("ADMIN_API_URL is not set".into()))?;
        let base_url = Url::parse(raw.trim())
            .map_err(|e| Error::Config(format!("ADMIN_API_URL is not a valid URL: {e}")))?;
        let mut config = Self::new(base_url);

        if let Ok(secs) = std::env::var("ADMIN_API_TIMEOUT_SECS") {
            config.timeout = parse_timeout(&secs)?;
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn endpoint(&self, path: &str, operation: &'static str) -> Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::Transport {
                operation,
                detail: format!("invalid endpoint {path:?}: {e}"),
            })
    }
}

fn parse_timeout(raw: &str) -> Result<Duration, Error> {
    let secs: u64 = raw.trim().parse().map_err(|_| {
        Error::Config(format!(
            "ADMIN_API_TIMEOUT_SECS must be a whole number of seconds, got {raw:?}"
        ))
    })?;
    if secs == 0 {
        return Err(Error::Config("ADMIN_API_TIMEOUT_SECS must be positive".into()));
    }
    Ok(Duration::from_secs(secs))
}

/// reqwest implementation of [`BackendApi`] and [`ResourceApi`].
///
/// A 401 on a bearer-authenticated call is reported through the attached
/// [`SessionEvents`] before the error is returned.
pub struct HttpBackend {
    config: ApiConfig,
    http: reqwest::Client,
    events: Option<SessionEvents>,
}

impl HttpBackend {
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            events: None,
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: SessionEvents) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        operation: &'static str,
    ) -> Result<RequestBuilder, ApiError> {
        let url = self.config.endpoint(path, operation)?;
        Ok(self
            .http
            .request(method, url)
            .timeout(self.config.timeout)
            .header(ACCEPT, "application/json"))
    }

    async fn execute(
        &self,
        request: RequestBuilder,
        operation: &'static str,
        authenticated: bool,
    ) -> Result<reqwest::Response, ApiError> {
        let response = request.send().await.map_err(|e| ApiError::Transport {
            operation,
            detail: e.to_string(),
        })?;

        if let (true, Some(events)) = (authenticated, &self.events) {
            match response.status() {
                StatusCode::UNAUTHORIZED => {
                    tracing::debug!(operation, "Backend rejected the bearer token");
                    events.unauthorized();
                }
                StatusCode::FORBIDDEN => {
                    tracing::debug!(operation, "Backend refused access");
                    events.forbidden();
                }
                _ => {}
            }
        }
        Self::ensure_success(response, operation).await
    }

    /// Returns the response on 2xx, otherwise an error carrying the body's `message`.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            operation,
            status,
            message: error_message(&body),
        })
    }

    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<T, ApiError> {
        let body = response.bytes().await.map_err(|e| ApiError::Transport {
            operation,
            detail: e.to_string(),
        })?;
        let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            &body
        };
        serde_json::from_slice(body).map_err(|e| ApiError::Decode {
            operation,
            detail: e.to_string(),
        })
    }
}

/// `message` string of a JSON error body.
fn error_message(body: &str) -> Option<String> {
    let value: JsonValue = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_owned)
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

impl BackendApi for HttpBackend {
    async fn login(&self, request: &LoginRequest) -> Result<TokenGrant, ApiError> {
        let builder = self.request(Method::POST, "login", "login")?.json(request);
        let response = self.execute(builder, "login", false).await?;
        Self::read_json(response, "login").await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<JsonValue, ApiError> {
        let builder = self.request(Method::POST, "register", "register")?.json(request);
        let response = self.execute(builder, "register", false).await?;
        Self::read_json(response, "register").await
    }

    async fn refresh(&self, token: &AccessToken) -> Result<TokenGrant, ApiError> {
        let builder = self
            .request(Method::POST, "refresh", "refresh")?
            .bearer_auth(token.as_str());
        let response = self.execute(builder, "refresh", true).await?;
        Self::read_json(response, "refresh").await
    }

    async fn logout(&self, token: &AccessToken) -> Result<(), ApiError> {
        let builder = self
            .request(Method::POST, "logout", "logout")?
            .bearer_auth(token.as_str());
        self.execute(builder, "logout", true).await?;
        Ok(())
    }

    async fn user_permissions(
        &self,
        token: &AccessToken,
        query: &PermissionQuery,
    ) -> Result<PermissionTree, ApiError> {
        let builder = self
            .request(Method::POST, "user-permissions", "user permissions")?
            .bearer_auth(token.as_str())
            .json(query);
        let response = self.execute(builder, "user permissions", true).await?;
        Self::read_json(response, "user permissions").await
    }
}

impl ResourceApi for HttpBackend {
    async fn send(
        &self,
        token: &AccessToken,
        request: &ResourceRequest,
    ) -> Result<JsonValue, ApiError> {
        let operation = request.operation();
        let mut builder = self
            .request(request.method().into(), &request.path(), operation)?
            .bearer_auth(token.as_str());
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }
        let response = self.execute(builder, operation, true).await?;
        Self::read_json(response, operation).await
    }
}
