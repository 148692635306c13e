//! Integration tests for the session lifecycle.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use admin_access::credentials::{ACCESS_TOKEN_KEY, EXPIRES_IN_KEY, USER_DATA_KEY};
use admin_access::{Error, LoginRequest, NotificationKind, RegisterRequest, SessionState, Storage};
use common::Harness;

#[tokio::test]
async fn login_persists_credentials_and_notifies() {
    let h = Harness::new();
    assert_eq!(h.manager.state(), SessionState::Anonymous);

    let grant = h
        .manager
        .login(&LoginRequest::password("ana", "secret"))
        .await
        .unwrap();

    assert_eq!(h.manager.state(), SessionState::Authenticated);
    assert_eq!(grant.token.as_str(), "token-1");
    assert_eq!(h.storage.get(ACCESS_TOKEN_KEY).as_deref(), Some("token-1"));
    assert!(h.storage.get(USER_DATA_KEY).unwrap().contains("\"username\":\"ana\""));
    assert_eq!(h.storage.get(EXPIRES_IN_KEY).as_deref(), Some("3600"));
    assert_eq!(h.manager.user().unwrap().sub(), Some("auth0|7"));
    assert_eq!(h.toasts_of(NotificationKind::Success), ["Signed in successfully"]);
}

#[tokio::test]
async fn failed_login_leaves_store_untouched() {
    let h = Harness::new();
    h.backend().fail_login.store(true, Ordering::SeqCst);

    let err = h
        .manager
        .login(&LoginRequest::password("ana", "wrong"))
        .await
        .unwrap_err();

    assert!(matches!(&err, Error::Api(e) if e.backend_message() == Some("Invalid credentials")));
    assert_eq!(h.manager.state(), SessionState::Anonymous);
    assert!(h.storage.is_empty());
    assert_eq!(h.toasts_of(NotificationKind::Error), ["Invalid credentials"]);

    h.backend().fail_login.store(false, Ordering::SeqCst);
    h.manager
        .login(&LoginRequest::password("ana", "secret"))
        .await
        .unwrap();
    assert_eq!(h.manager.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn login_answered_after_logout_is_discarded() {
    let h = Harness::new();
    let request = LoginRequest::password("ana", "secret");

    let mut login = Box::pin(h.manager.login(&request));
    assert!(futures::poll!(&mut login).is_pending());
    h.manager.logout().await.unwrap();
    h.manager.handle_unauthorized();
    let result = login.await;

    assert!(matches!(result, Err(Error::SessionInvalidated)));
    assert_eq!(h.manager.state(), SessionState::Anonymous);
    assert!(h.manager.access_token().is_none());
    assert!(h.storage.is_empty());
    assert!(h.toasts_of(NotificationKind::Success).is_empty());

    h.manager.login(&request).await.unwrap();
    assert_eq!(h.manager.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn login_answered_after_rejected_token_event_is_discarded() {
    let h = Harness::new();
    let request = LoginRequest::password("ana", "secret");

    let mut login = Box::pin(h.manager.login(&request));
    assert!(futures::poll!(&mut login).is_pending());
    h.manager.events().unauthorized();

    assert!(matches!(login.await, Err(Error::SessionInvalidated)));
    assert_eq!(h.manager.state(), SessionState::Anonymous);
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn register_notifies_and_leaves_session_anonymous() {
    let h = Harness::new();
    let request = RegisterRequest::password("bo", "secret").with_field("email", "bo@example.com");

    let created = h.manager.register(&request).await.unwrap();

    assert_eq!(created["id"], 42);
    assert_eq!(created["email"], "bo@example.com");
    assert!(created.get("password").is_none());
    assert_eq!(h.manager.state(), SessionState::Anonymous);
    assert!(h.storage.is_empty());
    assert_eq!(
        h.toasts_with_durations(NotificationKind::Success),
        [("Registration successful, please sign in".to_owned(), Duration::from_secs(3))]
    );
}

#[tokio::test]
async fn failed_register_reports_backend_message() {
    let h = Harness::new();
    h.backend().fail_register.store(true, Ordering::SeqCst);

    let err = h
        .manager
        .register(&RegisterRequest::password("bo", "secret"))
        .await
        .unwrap_err();

    assert_eq!(err.backend_message(), Some("Email already registered"));
    assert_eq!(h.backend().register_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.toasts_with_durations(NotificationKind::Error),
        [("Email already registered".to_owned(), Duration::from_secs(4))]
    );
}

#[tokio::test]
async fn login_twice_is_rejected() {
    let h = Harness::logged_in().await;
    let err = h
        .manager
        .login(&LoginRequest::password("ana", "secret"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidTransition {
            state: SessionState::Authenticated,
            ..
        }
    ));
    assert_eq!(h.backend().login_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn refresh_rotates_token() {
    let h = Harness::logged_in().await;
    let grant = h.manager.refresh().await.unwrap();

    assert_eq!(grant.token.as_str(), "token-2");
    assert_eq!(h.manager.access_token().unwrap().as_str(), "token-2");
    assert_eq!(h.storage.get(ACCESS_TOKEN_KEY).as_deref(), Some("token-2"));
    assert_eq!(h.manager.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn refresh_requires_session() {
    let h = Harness::new();
    let err = h.manager.refresh().await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidTransition {
            state: SessionState::Anonymous,
            ..
        }
    ));
    assert_eq!(h.backend().refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_refresh_drops_in_memory_session() {
    let h = Harness::logged_in().await;
    h.manager.get_permissions().await.unwrap();
    h.backend().fail_refresh.store(true, Ordering::SeqCst);

    let err = h.manager.refresh().await.unwrap_err();
    assert!(matches!(err, Error::Api(_)));
    assert_eq!(h.manager.state(), SessionState::Anonymous);
    assert!(h.manager.access_token().is_none());
    assert!(h.manager.cache().is_empty());
    assert_eq!(h.toasts_of(NotificationKind::Error), ["Unable to refresh the session"]);

    // Stored credentials stay until the caller logs out.
    assert!(h.manager.credentials().is_logged_in());
    h.manager.logout().await.unwrap();
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn refresh_if_due_skips_fresh_tokens() {
    let h = Harness::logged_in().await;
    let refreshed = h
        .manager
        .refresh_if_due(time::Duration::seconds(60))
        .await
        .unwrap();
    assert!(!refreshed);

    let refreshed = h
        .manager
        .refresh_if_due(time::Duration::hours(2))
        .await
        .unwrap();
    assert!(refreshed);
    assert_eq!(h.backend().refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn logout_clears_everything() {
    let h = Harness::logged_in().await;
    h.manager.get_permissions().await.unwrap();

    h.manager.logout().await.unwrap();

    assert_eq!(h.manager.state(), SessionState::Anonymous);
    assert!(h.storage.is_empty());
    assert!(h.manager.cache().is_empty());
    assert!(h.manager.navigation().is_empty());
    assert_eq!(h.backend().logout_calls.load(Ordering::SeqCst), 1);
    assert!(
        h.toasts_of(NotificationKind::Success)
            .contains(&"Signed out successfully".to_owned())
    );
}

#[tokio::test]
async fn failed_remote_logout_still_clears_local_state() {
    let h = Harness::logged_in().await;
    h.manager.get_permissions().await.unwrap();
    h.backend().fail_logout.store(true, Ordering::SeqCst);

    let err = h.manager.logout().await.unwrap_err();

    assert!(matches!(err, Error::Api(_)));
    assert_eq!(h.manager.state(), SessionState::Anonymous);
    assert!(h.storage.is_empty());
    assert!(h.manager.cache().is_empty());
    assert_eq!(h.toasts_of(NotificationKind::Error), ["Unable to sign out"]);
}

#[tokio::test]
async fn logout_without_session_is_a_no_op() {
    let h = Harness::new();
    h.manager.logout().await.unwrap();
    assert_eq!(h.backend().logout_calls.load(Ordering::SeqCst), 0);
    assert!(h.toasts.all().is_empty());
}

#[tokio::test]
async fn cancelled_logout_still_clears() {
    let h = Harness::logged_in().await;
    h.manager.get_permissions().await.unwrap();

    let mut logout = Box::pin(h.manager.logout());
    assert!(futures::poll!(&mut logout).is_pending());
    assert_eq!(h.backend().logout_calls.load(Ordering::SeqCst), 1);
    drop(logout);

    assert_eq!(h.manager.state(), SessionState::Anonymous);
    assert!(h.storage.is_empty());
    assert!(h.manager.cache().is_empty());
}

#[tokio::test]
async fn cancelled_login_returns_to_anonymous() {
    let h = Harness::new();
    let request = LoginRequest::password("ana", "secret");
    let mut login = Box::pin(h.manager.login(&request));
    assert!(futures::poll!(&mut login).is_pending());
    assert_eq!(h.manager.state(), SessionState::Authenticating);
    drop(login);

    assert_eq!(h.manager.state(), SessionState::Anonymous);
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn session_survives_reload() {
    let first = Harness::logged_in().await;
    let storage = Arc::clone(&first.storage);
    drop(first);

    let reloaded = Harness::with_storage(storage);
    assert_eq!(reloaded.manager.state(), SessionState::Authenticated);
    assert_eq!(reloaded.manager.access_token().unwrap().as_str(), "token-1");
    assert_eq!(reloaded.manager.snapshot().expires_in_seconds, 3600);

    // Permissions are not persisted; the reloaded session fetches them again.
    assert!(reloaded.manager.cache().is_empty());
    let tree = reloaded.manager.get_permissions().await.unwrap();
    assert_eq!(tree.node_count(), 3);
}

#[tokio::test]
async fn corrupt_stored_user_is_treated_as_signed_out() {
    let storage = Arc::new(admin_access::MemoryStorage::new());
    storage.set(ACCESS_TOKEN_KEY, "token-9".into());
    storage.set(USER_DATA_KEY, "{not json".into());

    let h = Harness::with_storage(storage);
    assert_eq!(h.manager.state(), SessionState::Anonymous);
    assert!(h.manager.access_token().is_none());
}

#[tokio::test]
async fn unauthorized_reset_clears_and_warns_once() {
    let h = Harness::logged_in().await;
    h.manager.get_permissions().await.unwrap();

    h.manager.events().unauthorized();
    h.manager.events().unauthorized();

    assert_eq!(h.manager.state(), SessionState::Anonymous);
    assert!(h.storage.is_empty());
    assert!(h.manager.cache().is_empty());
    assert_eq!(
        h.toasts_of(NotificationKind::Warning),
        ["Your session has expired, please sign in again"]
    );

    // A second forced reset with nothing left is silent.
    h.manager.handle_unauthorized();
    assert_eq!(h.toasts_of(NotificationKind::Warning).len(), 1);
}
