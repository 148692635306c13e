//! Cookie-jar storage medium.
//!
//! Wraps an axum-extra [`CookieJar`]: load it from the incoming request,
//! hand it to the [`CredentialStore`](crate::CredentialStore), then return
//! [`CookieStorage::jar`] from the handler to emit the changes.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use parking_lot::Mutex;
use time::Duration;

use crate::credentials::Storage;

/// Attributes of every cookie written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct CookieSettings {
    pub(crate) secure: bool,
    pub(crate) max_age_days: i64,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            secure: true,
            max_age_days: 1,
        }
    }
}

impl CookieSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `Secure` flag (default `true`; disable for plain-HTTP development).
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn with_max_age_days(mut self, days: i64) -> Self {
        self.max_age_days = days;
        self
    }

    #[must_use]
    pub fn secure(&self) -> bool {
        self.secure
    }

    #[must_use]
    pub fn max_age_days(&self) -> i64 {
        self.max_age_days
    }
}

/// [`Storage`] over a cookie jar. Values are percent-encoded.
#[derive(Debug, Default)]
pub struct CookieStorage {
    jar: Mutex<CookieJar>,
    settings: CookieSettings,
}

impl CookieStorage {
    #[must_use]
    pub fn new(settings: CookieSettings) -> Self {
        Self::from_jar(CookieJar::new(), settings)
    }

    /// Start from the cookies a request carried.
    #[must_use]
    pub fn from_jar(jar: CookieJar, settings: CookieSettings) -> Self {
        Self {
            jar: Mutex::new(jar),
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &CookieSettings {
        &self.settings
    }

    /// Current jar, including pending additions and removals.
    #[must_use]
    pub fn jar(&self) -> CookieJar {
        self.jar.lock().clone()
    }

    fn update(&self, f: impl FnOnce(CookieJar) -> CookieJar) {
        let mut jar = self.jar.lock();
        let current = std::mem::take(&mut *jar);
        *jar = f(current);
    }
}

impl Storage for CookieStorage {
    fn get(&self, key: &str) -> Option<String> {
        let jar = self.jar.lock();
        let raw = jar.get(key)?.value().to_owned();
        match urlencoding::decode(&raw) {
            Ok(value) => Some(value.into_owned()),
            Err(e) => {
                tracing::warn!(cookie = key, error = %e, "Ignoring cookie that is not valid percent-encoded UTF-8");
                None
            }
        }
    }

    fn set(&self, key: &str, value: String) {
        let cookie = Cookie::build((key.to_owned(), urlencoding::encode(&value).into_owned()))
            .secure(self.settings.secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(Duration::days(self.settings.max_age_days))
            .build();
        self.update(|jar| jar.add(cookie));
    }

    fn remove(&self, key: &str) {
        let removal = Cookie::build((key.to_owned(), "")).path("/").build();
        self.update(|jar| jar.remove(removal));
    }
}
