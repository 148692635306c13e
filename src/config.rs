use std::time::Duration;

use crate::error::Error;
use crate::notify::{ERROR_DURATION, SESSION_SUCCESS_DURATION, WARNING_DURATION};
use crate::types::{ModuleId, OpaqueId};

/// User-facing texts used when the backend does not supply a message.
///
/// Replace these to localise the notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct SessionMessages {
    pub login_success: String,
    pub login_failed: String,
    pub refresh_failed: String,
    pub logout_success: String,
    pub logout_failed: String,
    pub permissions_failed: String,
    pub session_expired: String,
    pub register_success: String,
    pub register_failed: String,
}

impl Default for SessionMessages {
    fn default() -> Self {
        Self {
            login_success: "Signed in successfully".into(),
            login_failed: "Unable to sign in".into(),
            refresh_failed: "Unable to refresh the session".into(),
            logout_success: "Signed out successfully".into(),
            logout_failed: "Unable to sign out".into(),
            permissions_failed: "Unable to load user permissions".into(),
            session_expired: "Your session has expired, please sign in again".into(),
            register_success: "Registration successful, please sign in".into(),
            register_failed: "Unable to register".into(),
        }
    }
}

/// Session manager settings.
///
/// ```rust,ignore
/// let config = SessionConfig::new()
///     .with_module_id(2_i64)
///     .with_messages(spanish_messages());
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct SessionConfig {
    pub(crate) module_id: ModuleId,
    pub(crate) messages: SessionMessages,
    pub(crate) success_duration: Duration,
    pub(crate) error_duration: Duration,
    pub(crate) warning_duration: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            module_id: ModuleId(OpaqueId::Number(1)),
            messages: SessionMessages::default(),
            success_duration: SESSION_SUCCESS_DURATION,
            error_duration: ERROR_DURATION,
            warning_duration: WARNING_DURATION,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `ADMIN_MODULE_ID`: module whose permission tree is loaded (default `1`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `ADMIN_MODULE_ID` is set but empty.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::new();
        if let Ok(raw) = std::env::var("ADMIN_MODULE_ID") {
            config = config.with_module_id(parse_module_id(&raw)?);
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_module_id(mut self, module_id: impl Into<OpaqueId>) -> Self {
        self.module_id = ModuleId(module_id.into());
        self
    }

    #[must_use]
    pub fn with_messages(mut self, messages: SessionMessages) -> Self {
        self.messages = messages;
        self
    }

    #[must_use]
    pub fn with_success_duration(mut self, duration: Duration) -> Self {
        self.success_duration = duration;
        self
    }

    #[must_use]
    pub fn with_error_duration(mut self, duration: Duration) -> Self {
        self.error_duration = duration;
        self
    }

    #[must_use]
    pub fn with_warning_duration(mut self, duration: Duration) -> Self {
        self.warning_duration = duration;
        self
    }

    #[must_use]
    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }

    #[must_use]
    pub fn messages(&self) -> &SessionMessages {
        &self.messages
    }
}

fn parse_module_id(raw: &str) -> Result<OpaqueId, Error> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::Config("ADMIN_MODULE_ID is set but empty".into()));
    }
    Ok(raw
        .parse::<i64>()
        .map_or_else(|_| OpaqueId::Text(raw.to_owned()), OpaqueId::Number))
}
