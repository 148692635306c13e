use crate::session::SessionState;

/// Failure reported by (or while talking to) the backend API.
///
/// `Clone` so a single failed permission fetch can be handed to every
/// caller that joined it.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ApiError {
    /// Backend answered with a non-success status.
    #[error("{operation} failed with HTTP {status}{}", message_suffix(.message))]
    Status {
        operation: &'static str,
        status: u16,
        /// `message` field of the backend error body, when present.
        message: Option<String>,
    },

    /// Request never produced a response (connect, timeout, TLS, ...).
    #[error("{operation} transport error: {detail}")]
    Transport {
        operation: &'static str,
        detail: String,
    },

    /// Response arrived but could not be decoded.
    #[error("{operation} returned a malformed response: {detail}")]
    Decode {
        operation: &'static str,
        detail: String,
    },
}

fn message_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .filter(|m| !m.is_empty())
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

impl ApiError {
    /// HTTP 401: the session is no longer valid and must be reset.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401, .. })
    }

    /// Human-readable message supplied by the backend, if any.
    #[must_use]
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            Self::Status { message, .. } => message.as_deref().filter(|m| !m.is_empty()),
            Self::Transport { .. } | Self::Decode { .. } => None,
        }
    }

    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Status { operation, .. }
            | Self::Transport { operation, .. }
            | Self::Decode { operation, .. } => operation,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Operation is not valid from the current session state.
    #[error("cannot {operation} while session is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: SessionState,
    },

    /// Operation needs a bearer token and none is stored.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The session was reset while a request was in flight; its response was discarded.
    #[error("Session was reset while the request was in flight")]
    SessionInvalidated,

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Backend-supplied message, for notification text.
    #[must_use]
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            Self::Api(e) => e.backend_message(),
            _ => None,
        }
    }
}
