use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Identifier as sent by the backend.
///
/// The REST API mixes numeric and string keys, so ids are kept exactly as
/// they arrived and written back the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From)]
#[serde(untagged)]
pub enum OpaqueId {
    Number(i64),
    Text(String),
}

impl From<&str> for OpaqueId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

/// Backend user identifier (`userData.id`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub OpaqueId);

/// Permission tree node identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct NodeId(pub OpaqueId);

/// Application module identifier (the permission tree is scoped per module).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct ModuleId(pub OpaqueId);

/// Main option (capability flag) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct OptionId(pub OpaqueId);

/// Bearer access token.
///
/// `Debug` is redacted so tokens never end up in logs by accident.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, From, Into)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Authenticated user as returned by the backend.
///
/// Only `id` is decoded into a typed field. Everything else, `sub`
/// included, stays in `extra` exactly as received, so a stored user
/// restores byte for byte (an explicit `"sub": null` survives).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct UserData {
    pub id: UserId,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl UserData {
    #[must_use]
    pub fn new(id: impl Into<OpaqueId>) -> Self {
        Self {
            id: UserId(id.into()),
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_sub(mut self, sub: impl Into<String>) -> Self {
        self.extra.insert("sub".into(), JsonValue::String(sub.into()));
        self
    }

    /// Identity-provider subject, forwarded on permission lookups.
    ///
    /// `None` when absent, `null` or not a string.
    #[must_use]
    pub fn sub(&self) -> Option<&str> {
        self.extra.get("sub").and_then(JsonValue::as_str)
    }

    /// Attach an arbitrary backend field (name, email, role, ...).
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}
