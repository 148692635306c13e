//! Persistence of the access token and user identity across reloads.

use std::collections::HashMap;

use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::types::{AccessToken, UserData};

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const USER_DATA_KEY: &str = "userData";
pub const USER_PERMISSIONS_KEY: &str = "userPermissions";
pub const EXPIRES_IN_KEY: &str = "expires_in";
pub const ISSUED_AT_KEY: &str = "getTimeToken";

const ALL_KEYS: [&str; 5] = [
    ACCESS_TOKEN_KEY,
    USER_DATA_KEY,
    USER_PERMISSIONS_KEY,
    EXPIRES_IN_KEY,
    ISSUED_AT_KEY,
];

/// String key/value medium the credentials live in (cookies, local storage, memory).
///
/// Operations are synchronous and must not block on I/O.
pub trait Storage: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String);

    fn remove(&self, key: &str);
}

/// Process-local storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.values.lock().insert(key.to_owned(), value);
    }

    fn remove(&self, key: &str) {
        self.values.lock().remove(key);
    }
}

impl<T: Storage> Storage for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: String) {
        (**self).set(key, value);
    }

    fn remove(&self, key: &str) {
        (**self).remove(key);
    }
}

/// Credentials as persisted between page loads.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct StoredCredentials {
    pub access_token: AccessToken,
    pub user: UserData,
    /// Token lifetime in seconds, when the backend reported one.
    pub expires_in: Option<u64>,
    pub issued_at: Option<OffsetDateTime>,
}

impl StoredCredentials {
    #[must_use]
    pub fn new(access_token: AccessToken, user: UserData) -> Self {
        Self {
            access_token,
            user,
            expires_in: None,
            issued_at: None,
        }
    }

    #[must_use]
    pub fn with_expires_in(mut self, seconds: u64) -> Self {
        self.expires_in = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_issued_at(mut self, at: OffsetDateTime) -> Self {
        self.issued_at = Some(at);
        self
    }
}

/// Reads and writes [`StoredCredentials`] under fixed keys of a [`Storage`].
#[derive(Debug)]
pub struct CredentialStore<S> {
    storage: S,
}

impl<S: Storage> CredentialStore<S> {
    #[must_use]
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Underlying medium (e.g. to emit cookies on a response).
    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Persist token and user.
    ///
    /// The token is written last: `load` needs both, so a reader never pairs
    /// a fresh token with the previous user's data.
    pub fn save(&self, credentials: &StoredCredentials) {
        let user_json = match serde_json::to_string(&credentials.user) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "User data not serializable; credentials not saved");
                return;
            }
        };
        self.storage.remove(ACCESS_TOKEN_KEY);
        self.storage.set(USER_DATA_KEY, user_json);

        match credentials.expires_in {
            Some(secs) => self.storage.set(EXPIRES_IN_KEY, secs.to_string()),
            None => self.storage.remove(EXPIRES_IN_KEY),
        }
        match credentials.issued_at {
            Some(at) => self
                .storage
                .set(ISSUED_AT_KEY, at.unix_timestamp().to_string()),
            None => self.storage.remove(ISSUED_AT_KEY),
        }

        self.storage
            .set(ACCESS_TOKEN_KEY, credentials.access_token.as_str().to_owned());
    }

    /// Restore stored credentials.
    ///
    /// Missing token, missing user data, or user data that does not parse
    /// all read as "nothing stored".
    #[must_use]
    pub fn load(&self) -> Option<StoredCredentials> {
        let token = self
            .storage
            .get(ACCESS_TOKEN_KEY)
            .filter(|t| !t.is_empty())?;
        let raw_user = self.storage.get(USER_DATA_KEY)?;
        let user = match serde_json::from_str::<UserData>(&raw_user) {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(error = %e, "Stored user data is corrupt; treating as signed out");
                return None;
            }
        };

        let expires_in = self
            .storage
            .get(EXPIRES_IN_KEY)
            .and_then(|v| v.trim().parse::<u64>().ok());
        let issued_at = self
            .storage
            .get(ISSUED_AT_KEY)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok());

        Some(StoredCredentials {
            access_token: AccessToken::new(token),
            user,
            expires_in,
            issued_at,
        })
    }

    /// `true` when a complete, parseable credential pair is stored.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.load().is_some()
    }

    /// Remove token, user data and every auxiliary field.
    pub fn clear(&self) {
        for key in ALL_KEYS {
            self.storage.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OpaqueId, UserId};

    fn store() -> CredentialStore<MemoryStorage> {
        CredentialStore::new(MemoryStorage::new())
    }

    fn alice() -> UserData {
        UserData::new(OpaqueId::Number(11))
            .with_sub("kc-alice")
            .with_field("name", "Alice")
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = store();
        let issued = OffsetDateTime::from_unix_timestamp(1_760_000_000).unwrap();
        let creds = StoredCredentials::new(AccessToken::new("tok-1"), alice())
            .with_expires_in(3600)
            .with_issued_at(issued);

        store.save(&creds);

        assert_eq!(store.load(), Some(creds));
    }

    #[test]
    fn load_without_auxiliary_fields() {
        let store = store();
        let creds = StoredCredentials::new(AccessToken::new("tok-1"), alice());
        store.save(&creds);

        let loaded = store.load().unwrap();
        assert_eq!(loaded.expires_in, None);
        assert_eq!(loaded.issued_at, None);
        assert_eq!(loaded.user.id, UserId(OpaqueId::Number(11)));
    }

    #[test]
    fn stored_user_json_is_kept_verbatim() {
        let store = store();
        let user: UserData =
            serde_json::from_str(r#"{"id":5,"sub":null,"roles":["admin"]}"#).unwrap();
        store.save(&StoredCredentials::new(AccessToken::new("tok"), user.clone()));

        assert_eq!(
            store.storage().get(USER_DATA_KEY).as_deref(),
            Some(r#"{"id":5,"sub":null,"roles":["admin"]}"#)
        );
        assert_eq!(store.load().unwrap().user, user);
    }

    #[test]
    fn empty_store_loads_nothing() {
        assert_eq!(store().load(), None);
    }

    #[test]
    fn corrupt_user_data_reads_as_absent() {
        let store = store();
        store.storage().set(ACCESS_TOKEN_KEY, "tok".into());
        store.storage().set(USER_DATA_KEY, "{not json".into());

        assert_eq!(store.load(), None);
        assert!(!store.is_logged_in());
    }

    #[test]
    fn user_data_without_id_reads_as_absent() {
        let store = store();
        store.storage().set(ACCESS_TOKEN_KEY, "tok".into());
        store.storage().set(USER_DATA_KEY, r#"{"name":"x"}"#.into());

        assert_eq!(store.load(), None);
    }

    #[test]
    fn token_without_user_reads_as_absent() {
        let store = store();
        store.storage().set(ACCESS_TOKEN_KEY, "tok".into());
        assert_eq!(store.load(), None);
    }

    #[test]
    fn garbage_auxiliary_fields_are_ignored() {
        let store = store();
        store.save(&StoredCredentials::new(AccessToken::new("tok"), alice()));
        store.storage().set(EXPIRES_IN_KEY, "soon".into());
        store.storage().set(ISSUED_AT_KEY, "yesterday".into());

        let loaded = store.load().unwrap();
        assert_eq!(loaded.expires_in, None);
        assert_eq!(loaded.issued_at, None);
    }

    #[test]
    fn clear_removes_every_key() {
        let store = store();
        store.save(
            &StoredCredentials::new(AccessToken::new("tok"), alice())
                .with_expires_in(60)
                .with_issued_at(OffsetDateTime::now_utc()),
        );
        store.storage().set(USER_PERMISSIONS_KEY, "[]".into());

        store.clear();

        assert_eq!(store.load(), None);
        assert!(store.storage().is_empty());
    }

    #[test]
    fn save_replaces_previous_auxiliary_fields() {
        let store = store();
        store.save(&StoredCredentials::new(AccessToken::new("a"), alice()).with_expires_in(60));
        store.save(&StoredCredentials::new(AccessToken::new("b"), alice()));

        let loaded = store.load().unwrap();
        assert_eq!(loaded.access_token.as_str(), "b");
        assert_eq!(loaded.expires_in, None);
    }
}
