#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use admin_access::{
    AccessToken, ApiError, BackendApi, LoginRequest, MemoryStorage, NotificationKind,
    NotificationQueue, PermissionQuery, PermissionTree, RegisterRequest, ResourceApi,
    ResourceRequest, SessionConfig, SessionEvents, SessionManager, TokenGrant, UserData,
};
use parking_lot::Mutex;
use serde_json::{Value as JsonValue, json};
use tokio::sync::Notify;

pub type TestManager = SessionManager<MockBackend, Arc<MemoryStorage>>;

/// Scriptable backend. Every call yields once so concurrent callers interleave.
#[derive(Default)]
pub struct MockBackend {
    pub login_calls: AtomicU64,
    pub register_calls: AtomicU64,
    pub refresh_calls: AtomicU64,
    pub logout_calls: AtomicU64,
    pub permission_calls: AtomicU64,

    pub fail_login: AtomicBool,
    pub fail_register: AtomicBool,
    pub fail_refresh: AtomicBool,
    pub fail_logout: AtomicBool,
    pub fail_permissions: AtomicBool,
    /// Permission fetch answers 401 and reports it on `events`.
    pub reject_token: AtomicBool,
    /// Resource calls answer 403 and report it on `events`.
    pub forbid_resources: AtomicBool,

    /// When set, permission fetches wait for a permit before answering.
    pub permission_gate: Mutex<Option<Arc<Notify>>>,
    pub last_query: Mutex<Option<PermissionQuery>>,
    pub resource_requests: Mutex<Vec<ResourceRequest>>,
    pub resource_response: Mutex<Option<Result<JsonValue, ApiError>>>,
    tokens_issued: AtomicU64,
    events: Option<SessionEvents>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(mut self, events: SessionEvents) -> Self {
        self.events = Some(events);
        self
    }

    pub fn gate(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.permission_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub fn respond_with(&self, response: Result<JsonValue, ApiError>) {
        *self.resource_response.lock() = Some(response);
    }

    fn grant(&self, user: UserData) -> TokenGrant {
        let n = self.tokens_issued.fetch_add(1, Ordering::SeqCst) + 1;
        TokenGrant::new(user, AccessToken::new(format!("token-{n}"))).with_expires_in(3600)
    }

    fn status(operation: &'static str, status: u16, message: Option<&str>) -> ApiError {
        ApiError::Status {
            operation,
            status,
            message: message.map(str::to_owned),
        }
    }
}

pub fn user() -> UserData {
    UserData::new(7_i64).with_sub("auth0|7").with_field("name", "Ana")
}

pub fn permission_tree() -> PermissionTree {
    PermissionTree::from_value(json!([
        {
            "id": 1,
            "name": "Administration",
            "module_id": 1,
            "parent_id": null,
            "icon": "mdi-cog",
            "children": [
                {
                    "id": 2,
                    "route": "users-list",
                    "name": "Users",
                    "module_id": 1,
                    "parent_id": 1,
                    "children": [],
                    "main_options": [
                        { "id": 1, "name": "List" },
                        { "id": 2, "name": "Create" }
                    ]
                },
                {
                    "id": 3,
                    "route": "roles-list",
                    "name": "Roles",
                    "module_id": 1,
                    "parent_id": 1,
                    "children": null,
                    "main_options": [{ "id": 1, "name": "List" }]
                }
            ],
            "main_options": []
        }
    ]))
}

impl BackendApi for MockBackend {
    async fn login(&self, request: &LoginRequest) -> Result<TokenGrant, ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_login.load(Ordering::SeqCst) {
            return Err(Self::status("login", 422, Some("Invalid credentials")));
        }
        let name = request
            .fields()
            .get("username")
            .cloned()
            .unwrap_or(JsonValue::Null);
        Ok(self.grant(user().with_field("username", name)))
    }

    async fn register(&self, request: &RegisterRequest) -> Result<JsonValue, ApiError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(Self::status("register", 422, Some("Email already registered")));
        }
        let mut created = request.fields().clone();
        created.remove("password");
        created.insert("id".into(), json!(42));
        Ok(JsonValue::Object(created))
    }

    async fn refresh(&self, token: &AccessToken) -> Result<TokenGrant, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_refresh.load(Ordering::SeqCst) || token.as_str().is_empty() {
            return Err(Self::status("refresh", 500, None));
        }
        Ok(self.grant(user()))
    }

    async fn logout(&self, _token: &AccessToken) -> Result<(), ApiError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(ApiError::Transport {
                operation: "logout",
                detail: "connection refused".into(),
            });
        }
        Ok(())
    }

    async fn user_permissions(
        &self,
        _token: &AccessToken,
        query: &PermissionQuery,
    ) -> Result<PermissionTree, ApiError> {
        self.permission_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock() = Some(query.clone());
        tokio::task::yield_now().await;

        let gate = self.permission_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.reject_token.load(Ordering::SeqCst) {
            if let Some(events) = &self.events {
                events.unauthorized();
            }
            return Err(Self::status("user permissions", 401, Some("Token expired")));
        }
        if self.fail_permissions.load(Ordering::SeqCst) {
            return Err(Self::status("user permissions", 503, Some("Service unavailable")));
        }
        Ok(permission_tree())
    }
}

impl ResourceApi for MockBackend {
    async fn send(
        &self,
        _token: &AccessToken,
        request: &ResourceRequest,
    ) -> Result<JsonValue, ApiError> {
        self.resource_requests.lock().push(request.clone());
        tokio::task::yield_now().await;
        if self.forbid_resources.load(Ordering::SeqCst) {
            if let Some(events) = &self.events {
                events.forbidden();
            }
            return Err(Self::status(request.operation(), 403, Some("Forbidden")));
        }
        let scripted = self.resource_response.lock().clone();
        scripted.unwrap_or_else(|| Ok(json!({ "ok": true })))
    }
}

pub struct Harness {
    pub manager: TestManager,
    pub storage: Arc<MemoryStorage>,
    pub toasts: Arc<NotificationQueue>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_storage(Arc::new(MemoryStorage::new()))
    }

    /// A fresh manager over existing storage, as after a page reload.
    pub fn with_storage(storage: Arc<MemoryStorage>) -> Self {
        let toasts = Arc::new(NotificationQueue::new());
        let manager = SessionManager::with_backend(
            Arc::clone(&storage),
            Arc::clone(&toasts),
            SessionConfig::new(),
            |events| MockBackend::new().with_events(events),
        );
        Self {
            manager,
            storage,
            toasts,
        }
    }

    pub fn backend(&self) -> &MockBackend {
        self.manager.backend()
    }

    pub async fn logged_in() -> Self {
        let harness = Self::new();
        harness
            .manager
            .login(&LoginRequest::password("ana", "secret"))
            .await
            .unwrap();
        harness
    }

    pub fn toasts_with_durations(&self, kind: NotificationKind) -> Vec<(String, Duration)> {
        self.toasts
            .all()
            .into_iter()
            .filter(|n| n.kind == kind)
            .map(|n| (n.text, n.duration))
            .collect()
    }

    pub fn toasts_of(&self, kind: NotificationKind) -> Vec<String> {
        self.toasts
            .all()
            .into_iter()
            .filter(|n| n.kind == kind)
            .map(|n| n.text)
            .collect()
    }
}
