//! Contract with the REST backend.
//!
//! The session core only depends on these traits. [`HttpBackend`](crate::http::HttpBackend)
//! is the reqwest implementation; tests plug in their own.

use std::future::Future;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::ApiError;
use crate::permission::PermissionTree;
use crate::types::{AccessToken, ModuleId, OpaqueId, UserData, UserId};

/// Login form payload, forwarded to the backend as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoginRequest(Map<String, JsonValue>);

impl LoginRequest {
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Username/password form.
    #[must_use]
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new()
            .with_field("username", username.into())
            .with_field("password", password.into())
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn fields(&self) -> &Map<String, JsonValue> {
        &self.0
    }
}

impl Default for LoginRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Sign-up form payload; same free-form shape as a login.
pub type RegisterRequest = LoginRequest;

/// Response of `login` and `refresh`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct TokenGrant {
    pub user: UserData,
    pub token: AccessToken,
    /// Token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl TokenGrant {
    #[must_use]
    pub fn new(user: UserData, token: AccessToken) -> Self {
        Self {
            user,
            token,
            expires_in: None,
        }
    }

    #[must_use]
    pub fn with_expires_in(mut self, seconds: u64) -> Self {
        self.expires_in = Some(seconds);
        self
    }
}

/// Body of `POST /user-permissions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PermissionQuery {
    pub user_id: UserId,
    pub module_id: ModuleId,
    pub sub: Option<String>,
}

/// Session endpoints.
pub trait BackendApi: Send + Sync + 'static {
    fn login(
        &self,
        request: &LoginRequest,
    ) -> impl Future<Output = Result<TokenGrant, ApiError>> + Send;

    /// `POST /register`, unauthenticated. The created account is returned as sent.
    fn register(
        &self,
        request: &RegisterRequest,
    ) -> impl Future<Output = Result<JsonValue, ApiError>> + Send;

    fn refresh(
        &self,
        token: &AccessToken,
    ) -> impl Future<Output = Result<TokenGrant, ApiError>> + Send;

    fn logout(&self, token: &AccessToken) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn user_permissions(
        &self,
        token: &AccessToken,
        query: &PermissionQuery,
    ) -> impl Future<Output = Result<PermissionTree, ApiError>> + Send;
}

/// Verb of a [`ResourceRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum HttpMethod {
    #[display("POST")]
    Post,
    #[display("PUT")]
    Put,
    #[display("DELETE")]
    Delete,
}

/// One call against a catalog resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceRequest {
    /// `POST {resource}/search?page&limit`
    Search {
        resource: String,
        page: u32,
        limit: u32,
        filters: JsonValue,
    },
    /// `POST {resource}`
    Create { resource: String, body: JsonValue },
    /// `PUT {resource}/{id}`
    Update {
        resource: String,
        id: OpaqueId,
        body: JsonValue,
    },
    /// `DELETE {resource}/{id}`
    Delete { resource: String, id: OpaqueId },
    /// `POST {resource}/batch`
    Batch { resource: String, body: JsonValue },
}

impl ResourceRequest {
    /// Path relative to the API base, including the query string.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Search {
                resource,
                page,
                limit,
                ..
            } => format!("{}/search?page={page}&limit={limit}", trim(resource)),
            Self::Create { resource, .. } => trim(resource).to_owned(),
            Self::Update { resource, id, .. } | Self::Delete { resource, id } => {
                format!("{}/{}", trim(resource), urlencoding::encode(&id.to_string()))
            }
            Self::Batch { resource, .. } => format!("{}/batch", trim(resource)),
        }
    }

    #[must_use]
    pub fn method(&self) -> HttpMethod {
        match self {
            Self::Search { .. } | Self::Create { .. } | Self::Batch { .. } => HttpMethod::Post,
            Self::Update { .. } => HttpMethod::Put,
            Self::Delete { .. } => HttpMethod::Delete,
        }
    }

    #[must_use]
    pub fn body(&self) -> Option<&JsonValue> {
        match self {
            Self::Search { filters, .. } => Some(filters),
            Self::Create { body, .. } | Self::Update { body, .. } | Self::Batch { body, .. } => {
                Some(body)
            }
            Self::Delete { .. } => None,
        }
    }

    /// Short label used in error messages and logs.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Search { .. } => "search",
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Batch { .. } => "batch",
        }
    }
}

fn trim(resource: &str) -> &str {
    resource.trim_matches('/')
}

/// Uniform CRUD + batch endpoints shared by every catalog.
pub trait ResourceApi: Send + Sync + 'static {
    fn send(
        &self,
        token: &AccessToken,
        request: &ResourceRequest,
    ) -> impl Future<Output = Result<JsonValue, ApiError>> + Send;
}
