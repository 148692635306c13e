//! Outcome notifications (the UI's snackbar).

use std::sync::Arc;
use std::time::{Duration, Instant};

use derive_more::Display;
use parking_lot::Mutex;

pub const SUCCESS_DURATION: Duration = Duration::from_millis(3000);
/// Session transitions (login/logout) use a shorter success toast.
pub const SESSION_SUCCESS_DURATION: Duration = Duration::from_millis(2000);
pub const ERROR_DURATION: Duration = Duration::from_millis(4000);
pub const WARNING_DURATION: Duration = Duration::from_millis(3500);
pub const INFO_DURATION: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum NotificationKind {
    #[display("success")]
    Success,
    #[display("error")]
    Error,
    #[display("warning")]
    Warning,
    #[display("info")]
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Notification {
    pub kind: NotificationKind,
    pub text: String,
    /// How long the message stays visible. `Duration::ZERO` keeps it until closed.
    pub duration: Duration,
}

impl Notification {
    #[must_use]
    pub fn new(kind: NotificationKind, text: impl Into<String>, duration: Duration) -> Self {
        Self {
            kind,
            text: text.into(),
            duration,
        }
    }

    #[must_use]
    pub fn success(text: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, text, SUCCESS_DURATION)
    }

    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, text, ERROR_DURATION)
    }

    #[must_use]
    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(NotificationKind::Warning, text, WARNING_DURATION)
    }

    #[must_use]
    pub fn info(text: impl Into<String>) -> Self {
        Self::new(NotificationKind::Info, text, INFO_DURATION)
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Receives success/failure outcomes for display.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notification: Notification);
}

impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    fn notify(&self, notification: Notification) {
        (**self).notify(notification);
    }
}

/// Writes notifications to the log instead of a UI.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: Notification) {
        match n.kind {
            NotificationKind::Error => tracing::warn!(kind = %n.kind, "{}", n.text),
            _ => tracing::info!(kind = %n.kind, "{}", n.text),
        }
    }
}

/// Currently displayed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveNotification {
    pub id: u64,
    pub notification: Notification,
    pub posted_at: Instant,
}

impl ActiveNotification {
    fn expired(&self, now: Instant) -> bool {
        !self.notification.duration.is_zero()
            && now.saturating_duration_since(self.posted_at) >= self.notification.duration
    }
}

#[derive(Debug, Default)]
struct QueueState {
    entries: Vec<ActiveNotification>,
    next_id: u64,
}

/// In-memory notification list with per-message expiry.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    state: Mutex<QueueState>,
}

impl NotificationQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a notification posted at `now`; returns its id.
    pub fn push_at(&self, notification: Notification, now: Instant) -> u64 {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.entries.push(ActiveNotification {
            id,
            notification,
            posted_at: now,
        });
        id
    }

    /// Notifications still visible at `now`, oldest first. Expired ones are dropped.
    pub fn active_at(&self, now: Instant) -> Vec<ActiveNotification> {
        let mut state = self.state.lock();
        state.entries.retain(|n| !n.expired(now));
        state.entries.clone()
    }

    #[must_use]
    pub fn active(&self) -> Vec<ActiveNotification> {
        self.active_at(Instant::now())
    }

    /// Every notification ever pushed and not yet removed, ignoring expiry.
    #[must_use]
    pub fn all(&self) -> Vec<Notification> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|n| n.notification.clone())
            .collect()
    }

    pub fn remove(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|n| n.id != id);
        state.entries.len() != before
    }

    pub fn close_all(&self) {
        self.state.lock().entries.clear();
    }
}

impl Notifier for NotificationQueue {
    fn notify(&self, notification: Notification) {
        self.push_at(notification, Instant::now());
    }
}
