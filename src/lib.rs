#![doc = include_str!("../README.md")]

pub mod backend;
pub mod cache;
pub mod catalog;
pub mod config;
#[cfg(feature = "cookies")]
pub mod cookies;
pub mod credentials;
pub mod error;
pub mod guard;
#[cfg(feature = "http")]
pub mod http;
pub mod menu;
pub mod notify;
pub mod permission;
pub mod session;
pub mod types;

// Re-exports for convenient access
pub use backend::{
    BackendApi, HttpMethod, LoginRequest, PermissionQuery, RegisterRequest, ResourceApi,
    ResourceRequest, TokenGrant,
};
pub use cache::PermissionTreeCache;
pub use catalog::{Catalog, CatalogMessages, Page};
pub use config::{SessionConfig, SessionMessages};
#[cfg(feature = "cookies")]
pub use cookies::{CookieSettings, CookieStorage};
pub use credentials::{CredentialStore, MemoryStorage, Storage, StoredCredentials};
pub use error::{ApiError, Error};
pub use guard::{AccessContext, Decision, RouteMeta, RouteTarget, decide};
#[cfg(feature = "http")]
pub use http::{ApiConfig, HttpBackend};
pub use menu::{NavItem, navigation};
pub use notify::{Notification, NotificationKind, NotificationQueue, Notifier, TracingNotifier};
pub use permission::{MainOption, PermissionNode, PermissionTree};
pub use session::{Session, SessionEvent, SessionEvents, SessionManager, SessionState};
pub use types::{AccessToken, ModuleId, NodeId, OpaqueId, OptionId, UserData, UserId};
