//! Session lifecycle: login, refresh, logout, forced reset and the
//! permission tree that belongs to the session.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use admin_access::{ApiConfig, HttpBackend, MemoryStorage, NotificationQueue, SessionConfig, SessionManager};
//!
//! let api = ApiConfig::from_env()?;
//! let manager = SessionManager::with_backend(
//!     MemoryStorage::new(),
//!     NotificationQueue::new(),
//!     SessionConfig::from_env()?,
//!     |events| HttpBackend::new(api).with_events(events),
//! );
//!
//! manager.login(&LoginRequest::password("ana", "secret")).await?;
//! let decision = manager.authorize(&RouteTarget::new(Some("users-list"), "/users")).await?;
//! ```

mod events;
mod state;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use time::OffsetDateTime;
use tokio::sync::mpsc;

pub use events::{SessionEvent, SessionEvents};
pub(crate) use state::Identity;
pub use state::{Session, SessionState};

use crate::backend::{BackendApi, LoginRequest, PermissionQuery, RegisterRequest, TokenGrant};
use crate::cache::PermissionTreeCache;
use crate::config::SessionConfig;
use crate::credentials::{CredentialStore, Storage};
use crate::error::{ApiError, Error};
use crate::menu::{self, NavItem};
use crate::notify::{Notification, NotificationKind, Notifier};
use crate::permission::{MainOption, PermissionTree};
use crate::types::{AccessToken, UserData};

type PendingFetch = Shared<BoxFuture<'static, Result<PermissionTree, Error>>>;

struct Inner {
    state: SessionState,
    identity: Option<Identity>,
    /// Bumped whenever the session is torn down; responses to requests
    /// started under an older epoch are discarded.
    epoch: u64,
    pending: Option<(u64, PendingFetch)>,
}

/// State shared between the manager and its in-flight permission fetch.
///
/// Lock order: `inner`, then `cache`, then the credential storage.
pub(crate) struct Core<S> {
    inner: Mutex<Inner>,
    cache: PermissionTreeCache,
    credentials: CredentialStore<S>,
    events: Mutex<mpsc::UnboundedReceiver<SessionEvent>>,
    /// Set by a 403 until [`SessionManager::take_forbidden`] reads it.
    forbidden: AtomicBool,
    notifier: Arc<dyn Notifier>,
    config: SessionConfig,
}

impl<S: Storage> Core<S> {
    /// Apply every transport event received so far.
    pub(crate) fn drain_events(&self) {
        loop {
            let event = self.events.lock().try_recv();
            match event {
                Ok(SessionEvent::Unauthorized) => self.reset_unauthorized(),
                Ok(SessionEvent::Forbidden) => {
                    tracing::debug!("Backend refused access to a resource");
                    self.forbidden.store(true, Ordering::SeqCst);
                }
                Err(_) => break,
            }
        }
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    pub(crate) fn access_token(&self) -> Option<AccessToken> {
        self.inner
            .lock()
            .identity
            .as_ref()
            .map(|i| i.token.clone())
    }

    fn restore(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.identity.is_some() || inner.state != SessionState::Anonymous {
            return inner.identity.is_some();
        }
        match self.credentials.load() {
            Some(stored) => {
                tracing::debug!(user_id = %stored.user.id, "Restored stored credentials");
                inner.identity = Some(Identity::from(stored));
                inner.state = SessionState::Authenticated;
                true
            }
            None => false,
        }
    }

    /// Drop the whole local session. Returns whether there was one.
    fn clear_local(&self) -> bool {
        let had_identity = {
            let mut inner = self.inner.lock();
            let had = inner.identity.take().is_some();
            inner.state = SessionState::Anonymous;
            inner.epoch = inner.epoch.wrapping_add(1);
            inner.pending = None;
            self.cache.clear();
            self.forbidden.store(false, Ordering::SeqCst);
            had
        };
        let had_stored = self.credentials.is_logged_in();
        self.credentials.clear();
        had_identity || had_stored
    }

    /// Drop the in-memory session only, leaving stored credentials in place.
    fn drop_identity(&self, epoch: u64) {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            return;
        }
        inner.identity = None;
        inner.state = SessionState::Anonymous;
        inner.epoch = inner.epoch.wrapping_add(1);
        inner.pending = None;
        self.cache.clear();
    }

    fn reset_unauthorized(&self) {
        if self.clear_local() {
            tracing::warn!("Backend rejected the session token; session cleared");
            self.notify(
                NotificationKind::Warning,
                self.config.messages.session_expired.clone(),
            );
        }
    }

    fn finish_fetch(
        &self,
        epoch: u64,
        result: Result<PermissionTree, ApiError>,
    ) -> Result<PermissionTree, Error> {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            tracing::debug!("Discarding permission tree fetched for a previous session");
            return Err(Error::SessionInvalidated);
        }
        inner.pending = None;
        match result {
            Ok(tree) => {
                self.cache.set(tree.clone());
                tracing::debug!(nodes = tree.node_count(), "Permission tree cached");
                Ok(tree)
            }
            Err(e) => {
                drop(inner);
                let err = Error::from(e);
                self.notify_failure(&err, &self.config.messages.permissions_failed);
                Err(err)
            }
        }
    }

    pub(crate) fn post(&self, notification: Notification) {
        self.notifier.notify(notification);
    }

    pub(crate) fn notify(&self, kind: NotificationKind, text: String) {
        let duration = match kind {
            NotificationKind::Success => self.config.success_duration,
            NotificationKind::Error => self.config.error_duration,
            NotificationKind::Warning => self.config.warning_duration,
            NotificationKind::Info => crate::notify::INFO_DURATION,
        };
        self.post(Notification::new(kind, text, duration));
    }

    /// Report a failure with the backend's message, or `default` when it gave none.
    pub(crate) fn notify_failure(&self, err: &Error, default: &str) {
        let text = err.backend_message().unwrap_or(default).to_owned();
        self.notify(NotificationKind::Error, text);
    }
}

/// Restores `fallback` if a login/refresh future is dropped mid-flight.
struct Transition<'a, S: Storage> {
    core: &'a Core<S>,
    epoch: u64,
    fallback: SessionState,
    armed: bool,
}

impl<'a, S: Storage> Transition<'a, S> {
    fn new(core: &'a Core<S>, epoch: u64, fallback: SessionState) -> Self {
        Self {
            core,
            epoch,
            fallback,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<S: Storage> Drop for Transition<'_, S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.core.inner.lock();
        if inner.epoch == self.epoch {
            inner.state = self.fallback;
        }
    }
}

/// Clears the local session when dropped, however the logout ended.
struct ClearOnDrop<'a, S: Storage>(&'a Core<S>);

impl<S: Storage> Drop for ClearOnDrop<'_, S> {
    fn drop(&mut self) {
        self.0.clear_local();
    }
}

/// Owns the session for one application instance.
pub struct SessionManager<B, S> {
    backend: Arc<B>,
    core: Arc<Core<S>>,
    events: SessionEvents,
}

impl<B: BackendApi, S: Storage> SessionManager<B, S> {
    /// Create a manager and restore any stored credentials.
    #[must_use]
    pub fn new(backend: B, storage: S, notifier: impl Notifier, config: SessionConfig) -> Self {
        Self::with_backend(storage, notifier, config, |_| backend)
    }

    /// Like [`new`](Self::new), for backends that report 401s back to the manager.
    ///
    /// `make_backend` receives the event sender the backend should signal on.
    #[must_use]
    pub fn with_backend<F>(
        storage: S,
        notifier: impl Notifier,
        config: SessionConfig,
        make_backend: F,
    ) -> Self
    where
        F: FnOnce(SessionEvents) -> B,
    {
        let (events, receiver) = SessionEvents::channel();
        let backend = Arc::new(make_backend(events.clone()));
        let core = Core {
            inner: Mutex::new(Inner {
                state: SessionState::Anonymous,
                identity: None,
                epoch: 0,
                pending: None,
            }),
            cache: PermissionTreeCache::new(),
            credentials: CredentialStore::new(storage),
            events: Mutex::new(receiver),
            forbidden: AtomicBool::new(false),
            notifier: Arc::new(notifier),
            config,
        };
        core.restore();
        Self {
            backend,
            core: Arc::new(core),
            events,
        }
    }

    /// Re-read stored credentials into an anonymous manager.
    ///
    /// Returns `true` when the manager holds an identity afterwards.
    pub fn restore(&self) -> bool {
        self.core.drain_events();
        self.core.restore()
    }

    /// Sender for transports to report a rejected token.
    #[must_use]
    pub fn events(&self) -> SessionEvents {
        self.events.clone()
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialStore<S> {
        &self.core.credentials
    }

    #[must_use]
    pub fn cache(&self) -> &PermissionTreeCache {
        &self.core.cache
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.core.config
    }

    pub(crate) fn core(&self) -> &Core<S> {
        &self.core
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.core.drain_events();
        self.core.inner.lock().state
    }

    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.core.drain_events();
        let inner = self.core.inner.lock();
        Session::new(inner.state, inner.identity.as_ref(), self.core.cache.get())
    }

    #[must_use]
    pub fn access_token(&self) -> Option<AccessToken> {
        self.core.drain_events();
        self.core.access_token()
    }

    #[must_use]
    pub fn user(&self) -> Option<UserData> {
        self.core.drain_events();
        self.core
            .inner
            .lock()
            .identity
            .as_ref()
            .map(|i| i.user.clone())
    }

    /// Sign in.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidTransition`] unless the session is anonymous;
    /// [`Error::Api`] when the backend rejects the credentials or is unreachable;
    /// [`Error::SessionInvalidated`] when a logout or forced reset landed while
    /// the request was in flight. Backend failures are also reported to the notifier.
    pub async fn login(&self, request: &LoginRequest) -> Result<TokenGrant, Error> {
        self.core.drain_events();
        let epoch = {
            let mut inner = self.core.inner.lock();
            if inner.state != SessionState::Anonymous {
                return Err(Error::InvalidTransition {
                    operation: "log in",
                    state: inner.state,
                });
            }
            inner.state = SessionState::Authenticating;
            inner.epoch
        };
        let transition = Transition::new(&self.core, epoch, SessionState::Anonymous);

        let result = self.backend.login(request).await;
        self.core.drain_events();

        match result {
            Ok(grant) => {
                transition.disarm();
                let identity = Identity {
                    user: grant.user.clone(),
                    token: grant.token.clone(),
                    issued_at: Some(OffsetDateTime::now_utc()),
                    expires_in: grant.expires_in.unwrap_or(0),
                };
                {
                    let mut inner = self.core.inner.lock();
                    if inner.epoch != epoch {
                        tracing::debug!("Discarding login response after the session was reset");
                        return Err(Error::SessionInvalidated);
                    }
                    inner.pending = None;
                    self.core.cache.clear();
                    self.core.credentials.save(&identity.to_stored());
                    inner.identity = Some(identity);
                    inner.state = SessionState::Authenticated;
                }
                tracing::info!(user_id = %grant.user.id, "Login successful");
                self.core.notify(
                    NotificationKind::Success,
                    self.core.config.messages.login_success.clone(),
                );
                Ok(grant)
            }
            Err(e) => {
                drop(transition);
                let err = Error::from(e);
                tracing::debug!(error = %err, "Login rejected");
                self.core
                    .notify_failure(&err, &self.core.config.messages.login_failed);
                Err(err)
            }
        }
    }

    /// Create an account. The session itself is left alone; the new user
    /// signs in with [`login`](Self::login) afterwards.
    ///
    /// # Errors
    ///
    /// [`Error::Api`] when the backend rejects the form or is unreachable.
    /// Failures are also reported to the notifier.
    pub async fn register(&self, request: &RegisterRequest) -> Result<JsonValue, Error> {
        self.core.drain_events();
        match self.backend.register(request).await {
            Ok(created) => {
                tracing::info!("Registration accepted");
                self.core.post(Notification::success(
                    self.core.config.messages.register_success.clone(),
                ));
                Ok(created)
            }
            Err(e) => {
                let err = Error::from(e);
                tracing::debug!(error = %err, "Registration rejected");
                self.core
                    .notify_failure(&err, &self.core.config.messages.register_failed);
                Err(err)
            }
        }
    }

    /// Exchange the current token for a new one.
    ///
    /// On failure the in-memory session is dropped; the caller is expected to
    /// follow up with [`logout`](Self::logout).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidTransition`] unless authenticated; [`Error::Api`] on
    /// backend failure; [`Error::SessionInvalidated`] if the session was reset
    /// while the request was in flight.
    pub async fn refresh(&self) -> Result<TokenGrant, Error> {
        self.core.drain_events();
        let (token, epoch, previous_expiry) = {
            let mut inner = self.core.inner.lock();
            let (token, expires_in) = match (&inner.identity, inner.state) {
                (Some(identity), SessionState::Authenticated) => {
                    (identity.token.clone(), identity.expires_in)
                }
                _ => {
                    return Err(Error::InvalidTransition {
                        operation: "refresh",
                        state: inner.state,
                    });
                }
            };
            inner.state = SessionState::Refreshing;
            (token, inner.epoch, expires_in)
        };
        let transition = Transition::new(&self.core, epoch, SessionState::Authenticated);

        let result = self.backend.refresh(&token).await;
        self.core.drain_events();
        transition.disarm();

        match result {
            Ok(grant) => {
                let identity = Identity {
                    user: grant.user.clone(),
                    token: grant.token.clone(),
                    issued_at: Some(OffsetDateTime::now_utc()),
                    expires_in: grant.expires_in.unwrap_or(previous_expiry),
                };
                {
                    let mut inner = self.core.inner.lock();
                    if inner.epoch != epoch {
                        tracing::debug!("Discarding refresh response for a previous session");
                        return Err(Error::SessionInvalidated);
                    }
                    self.core.credentials.save(&identity.to_stored());
                    inner.identity = Some(identity);
                    inner.state = SessionState::Authenticated;
                }
                tracing::info!(user_id = %grant.user.id, "Token refreshed");
                Ok(grant)
            }
            Err(e) => {
                self.core.drop_identity(epoch);
                let err = Error::from(e);
                tracing::debug!(error = %err, "Token refresh failed");
                self.core
                    .notify_failure(&err, &self.core.config.messages.refresh_failed);
                Err(err)
            }
        }
    }

    /// Refresh when the token expires within `leeway`. Returns whether a refresh happened.
    ///
    /// # Errors
    ///
    /// Same as [`refresh`](Self::refresh).
    pub async fn refresh_if_due(&self, leeway: time::Duration) -> Result<bool, Error> {
        let session = self.snapshot();
        if session.state != SessionState::Authenticated
            || !session.expires_within(OffsetDateTime::now_utc(), leeway)
        {
            return Ok(false);
        }
        self.refresh().await.map(|_| true)
    }

    /// Sign out.
    ///
    /// The backend call is best-effort; stored credentials, the permission
    /// cache and the in-memory session are cleared no matter how it ends.
    ///
    /// # Errors
    ///
    /// [`Error::Api`] when the remote logout failed (local state is cleared anyway).
    pub async fn logout(&self) -> Result<(), Error> {
        self.core.drain_events();
        let _cleanup = ClearOnDrop(&self.core);
        let token = self
            .core
            .access_token()
            .or_else(|| self.core.credentials.load().map(|c| c.access_token));
        let Some(token) = token else {
            return Ok(());
        };

        match self.backend.logout(&token).await {
            Ok(()) => {
                tracing::info!("Logout successful");
                self.core.notify(
                    NotificationKind::Success,
                    self.core.config.messages.logout_success.clone(),
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Remote logout failed; clearing local session anyway");
                let err = Error::from(e);
                self.core
                    .notify_failure(&err, &self.core.config.messages.logout_failed);
                Err(err)
            }
        }
    }

    /// Forced reset after the backend rejected the token.
    pub fn handle_unauthorized(&self) {
        self.core.drain_events();
        self.core.reset_unauthorized();
    }

    /// Whether a 403 arrived since the last call, clearing the flag.
    ///
    /// Callers route to the not-authorized page when this returns `true`.
    #[must_use]
    pub fn take_forbidden(&self) -> bool {
        self.core.drain_events();
        self.core.forbidden.swap(false, Ordering::SeqCst)
    }

    /// Permission tree of the current session, fetched on first use.
    ///
    /// Concurrent callers share one backend request. Anonymous sessions get an
    /// empty tree without touching the backend.
    ///
    /// # Errors
    ///
    /// [`Error::Api`] when the fetch fails (reported once to the notifier);
    /// [`Error::SessionInvalidated`] when the session was reset mid-fetch.
    pub async fn get_permissions(&self) -> Result<PermissionTree, Error> {
        self.core.drain_events();
        let fetch = {
            let mut inner = self.core.inner.lock();
            let cached = self.core.cache.get();
            if !cached.is_empty() {
                return Ok(cached);
            }
            let Some(identity) = inner.identity.clone() else {
                return Ok(cached);
            };
            let epoch = inner.epoch;
            let joinable = inner
                .pending
                .as_ref()
                .filter(|(started, _)| *started == epoch)
                .map(|(_, fetch)| fetch.clone());
            match joinable {
                Some(fetch) => {
                    tracing::debug!("Joining in-flight permission fetch");
                    fetch
                }
                None => {
                    let fetch = self.permission_fetch(&identity, epoch);
                    inner.pending = Some((epoch, fetch.clone()));
                    fetch
                }
            }
        };
        fetch.await
    }

    fn permission_fetch(&self, identity: &Identity, epoch: u64) -> PendingFetch {
        let backend = Arc::clone(&self.backend);
        // Weak: the fetch is stored inside `core.inner.pending`.
        let core = Arc::downgrade(&self.core);
        let token = identity.token.clone();
        let query = PermissionQuery {
            user_id: identity.user.id.clone(),
            module_id: self.core.config.module_id.clone(),
            sub: identity.user.sub().map(str::to_owned),
        };
        tracing::debug!(
            user_id = %query.user_id,
            module_id = %query.module_id,
            "Fetching permission tree"
        );

        async move {
            let result = backend.user_permissions(&token, &query).await;
            let Some(core) = core.upgrade() else {
                return Err(Error::SessionInvalidated);
            };
            core.drain_events();
            core.finish_fetch(epoch, result)
        }
        .boxed()
        .shared()
    }

    /// Main options the cached tree grants on `route`.
    #[must_use]
    pub fn options_for(&self, route: &str) -> Vec<MainOption> {
        self.core.cache.get().options_for(route).to_vec()
    }

    /// Whether the cached tree grants `option` ("List", "Create", ...) on `route`.
    #[must_use]
    pub fn has_permission(&self, route: &str, option: &str) -> bool {
        self.core.cache.get().has_permission(route, option)
    }

    /// Navigation menu for the cached tree.
    #[must_use]
    pub fn navigation(&self) -> Vec<NavItem> {
        menu::navigation(&self.core.cache.get())
    }
}
