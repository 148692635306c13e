use derive_more::Display;
use time::{Duration, OffsetDateTime};

use crate::credentials::StoredCredentials;
use crate::permission::PermissionTree;
use crate::types::{AccessToken, UserData};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum SessionState {
    #[display("anonymous")]
    Anonymous,
    #[display("authenticating")]
    Authenticating,
    #[display("authenticated")]
    Authenticated,
    #[display("refreshing")]
    Refreshing,
}

/// Token and user of an authenticated session.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Identity {
    pub(crate) user: UserData,
    pub(crate) token: AccessToken,
    pub(crate) issued_at: Option<OffsetDateTime>,
    pub(crate) expires_in: u64,
}

impl From<StoredCredentials> for Identity {
    fn from(c: StoredCredentials) -> Self {
        Self {
            user: c.user,
            token: c.access_token,
            issued_at: c.issued_at,
            expires_in: c.expires_in.unwrap_or(0),
        }
    }
}

impl Identity {
    pub(crate) fn to_stored(&self) -> StoredCredentials {
        let mut stored = StoredCredentials::new(self.token.clone(), self.user.clone());
        if self.expires_in > 0 {
            stored = stored.with_expires_in(self.expires_in);
        }
        if let Some(at) = self.issued_at {
            stored = stored.with_issued_at(at);
        }
        stored
    }
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct Session {
    pub state: SessionState,
    pub user: Option<UserData>,
    pub access_token: Option<AccessToken>,
    pub permission_tree: PermissionTree,
    pub token_issued_at: Option<OffsetDateTime>,
    /// Token lifetime reported by the backend; 0 when unknown.
    pub expires_in_seconds: u64,
}

impl Session {
    pub(crate) fn new(
        state: SessionState,
        identity: Option<&Identity>,
        permission_tree: PermissionTree,
    ) -> Self {
        Self {
            state,
            user: identity.map(|i| i.user.clone()),
            access_token: identity.map(|i| i.token.clone()),
            permission_tree,
            token_issued_at: identity.and_then(|i| i.issued_at),
            expires_in_seconds: identity.map_or(0, |i| i.expires_in),
        }
    }

    /// Both a token and a user are present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some() && self.user.is_some()
    }

    /// Instant the token stops being valid, when both issue time and lifetime are known.
    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        if self.expires_in_seconds == 0 {
            return None;
        }
        let lifetime = Duration::seconds(i64::try_from(self.expires_in_seconds).ok()?);
        self.token_issued_at.map(|at| at + lifetime)
    }

    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at().is_some_and(|at| now >= at)
    }

    /// The token expires within `leeway` of `now` (or already has).
    #[must_use]
    pub fn expires_within(&self, now: OffsetDateTime, leeway: Duration) -> bool {
        self.expires_at().is_some_and(|at| now + leeway >= at)
    }
}
