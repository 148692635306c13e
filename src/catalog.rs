//! Catalog resources: the uniform search/create/update/delete/batch endpoints.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::backend::{BackendApi, ResourceApi, ResourceRequest};
use crate::credentials::Storage;
use crate::error::{ApiError, Error};
use crate::notify::Notification;
use crate::session::{Core, SessionManager};
use crate::types::{OpaqueId, UserData};

pub const DEFAULT_PAGE_SIZE: u32 = 15;

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    /// Pagination block as the backend sends it.
    #[serde(default)]
    pub meta: JsonValue,
}

/// Texts for one catalog's notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct CatalogMessages {
    pub created: String,
    pub updated: String,
    pub deleted: String,
    pub batch_done: String,
    pub search_failed: String,
    pub create_failed: String,
    pub update_failed: String,
    pub delete_failed: String,
    pub batch_failed: String,
}

impl Default for CatalogMessages {
    fn default() -> Self {
        Self {
            created: "Record created successfully".into(),
            updated: "Record updated successfully".into(),
            deleted: "Record deleted successfully".into(),
            batch_done: "Records saved successfully".into(),
            search_failed: "Unable to load records".into(),
            create_failed: "Unable to create the record".into(),
            update_failed: "Unable to update the record".into(),
            delete_failed: "Unable to delete the record".into(),
            batch_failed: "Unable to save the records".into(),
        }
    }
}

/// Client for one catalog resource (`users`, `main-options`, `module/3/mains-of-accesses`, ...).
///
/// Every call needs an authenticated session. Mutations report success to
/// the notifier; every failure is reported, then returned.
pub struct Catalog<'a, B, S> {
    backend: &'a B,
    core: &'a Core<S>,
    resource: String,
    messages: CatalogMessages,
}

impl<B: BackendApi + ResourceApi, S: Storage> SessionManager<B, S> {
    #[must_use]
    pub fn catalog(&self, resource: impl Into<String>) -> Catalog<'_, B, S> {
        Catalog {
            backend: self.backend(),
            core: self.core(),
            resource: resource.into(),
            messages: CatalogMessages::default(),
        }
    }

    /// First user whose `sub` (identity-provider subject) matches.
    ///
    /// Silent: failures are returned without a notification.
    ///
    /// # Errors
    ///
    /// Same as [`Catalog::search`].
    pub async fn user_by_sub(&self, sub: &str) -> Result<Option<UserData>, Error> {
        let filters = serde_json::json!({
            "filters": [{ "field": "sub", "operator": "=", "value": sub }],
        });
        let users = self.catalog("users");
        let request = users.search_request(filters, 1, DEFAULT_PAGE_SIZE);
        let value = users.send(&request, None).await?;
        let page: Page<UserData> = decode_page(value)?;
        Ok(page.data.into_iter().next())
    }
}

impl<B: ResourceApi, S: Storage> Catalog<'_, B, S> {
    #[must_use]
    pub fn with_messages(mut self, messages: CatalogMessages) -> Self {
        self.messages = messages;
        self
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// `POST {resource}/search?page&limit`, with `filters` as the body.
    ///
    /// # Errors
    ///
    /// [`Error::NotAuthenticated`] without a session, [`Error::Api`] on backend
    /// failure, [`Error::Api`] with [`ApiError::Decode`] when the page does not
    /// match `T`.
    pub async fn search<T: DeserializeOwned>(
        &self,
        filters: JsonValue,
        page: u32,
        limit: u32,
    ) -> Result<Page<T>, Error> {
        let request = self.search_request(filters, page, limit);
        let failed = self.messages.search_failed.as_str();
        let value = self.send(&request, Some(failed)).await?;
        decode_page(value).inspect_err(|err| self.core.notify_failure(err, failed))
    }

    /// [`search`](Self::search) with [`DEFAULT_PAGE_SIZE`] records per page.
    ///
    /// # Errors
    ///
    /// Same as [`search`](Self::search).
    pub async fn search_page<T: DeserializeOwned>(
        &self,
        filters: JsonValue,
        page: u32,
    ) -> Result<Page<T>, Error> {
        self.search(filters, page, DEFAULT_PAGE_SIZE).await
    }

    /// # Errors
    ///
    /// Same as [`search`](Self::search), without decoding.
    pub async fn create(&self, body: JsonValue) -> Result<JsonValue, Error> {
        let request = ResourceRequest::Create {
            resource: self.resource.clone(),
            body,
        };
        let value = self.send(&request, Some(self.messages.create_failed.as_str())).await?;
        self.success(&self.messages.created);
        Ok(value)
    }

    /// # Errors
    ///
    /// Same as [`create`](Self::create).
    pub async fn update(
        &self,
        id: impl Into<OpaqueId>,
        body: JsonValue,
    ) -> Result<JsonValue, Error> {
        let request = ResourceRequest::Update {
            resource: self.resource.clone(),
            id: id.into(),
            body,
        };
        let value = self.send(&request, Some(self.messages.update_failed.as_str())).await?;
        self.success(&self.messages.updated);
        Ok(value)
    }

    /// # Errors
    ///
    /// Same as [`create`](Self::create).
    pub async fn delete(&self, id: impl Into<OpaqueId>) -> Result<JsonValue, Error> {
        let request = ResourceRequest::Delete {
            resource: self.resource.clone(),
            id: id.into(),
        };
        let value = self.send(&request, Some(self.messages.delete_failed.as_str())).await?;
        self.success(&self.messages.deleted);
        Ok(value)
    }

    /// # Errors
    ///
    /// Same as [`create`](Self::create).
    pub async fn batch(&self, body: JsonValue) -> Result<JsonValue, Error> {
        let request = ResourceRequest::Batch {
            resource: self.resource.clone(),
            body,
        };
        let value = self.send(&request, Some(self.messages.batch_failed.as_str())).await?;
        self.success(&self.messages.batch_done);
        Ok(value)
    }

    fn search_request(&self, filters: JsonValue, page: u32, limit: u32) -> ResourceRequest {
        ResourceRequest::Search {
            resource: self.resource.clone(),
            page: page.max(1),
            limit,
            filters,
        }
    }

    /// `failed` is the fallback error text; `None` keeps the call silent.
    async fn send(
        &self,
        request: &ResourceRequest,
        failed: Option<&str>,
    ) -> Result<JsonValue, Error> {
        self.core.drain_events();
        let Some(token) = self.core.access_token() else {
            let err = Error::NotAuthenticated;
            if let Some(failed) = failed {
                self.core.notify_failure(&err, failed);
            }
            return Err(err);
        };
        let epoch = self.core.epoch();

        let result = self.backend.send(&token, request).await;
        self.core.drain_events();

        match result {
            Ok(_) if self.core.epoch() != epoch => Err(Error::SessionInvalidated),
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::debug!(
                    resource = %self.resource,
                    operation = request.operation(),
                    error = %e,
                    "Catalog request failed"
                );
                let err = Error::from(e);
                if let Some(failed) = failed {
                    self.core.notify_failure(&err, failed);
                }
                Err(err)
            }
        }
    }

    fn success(&self, text: &str) {
        self.core.post(Notification::success(text));
    }
}

fn decode_page<T: DeserializeOwned>(value: JsonValue) -> Result<Page<T>, Error> {
    serde_json::from_value(value).map_err(|e| {
        Error::from(ApiError::Decode {
            operation: "search",
            detail: e.to_string(),
        })
    })
}
