//! Route access decisions.

use crate::backend::BackendApi;
use crate::credentials::Storage;
use crate::error::Error;
use crate::permission::PermissionTree;
use crate::session::SessionManager;

pub const LOGIN_PATH: &str = "/login";
pub const NOT_AUTHORIZED_PATH: &str = "/not-authorized";
pub const ROOT_PATH: &str = "/";
/// Query parameter carrying the path to resume after login.
pub const SAVED_PATH_PARAM: &str = "to";

/// Route flags declared by the router.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct RouteMeta {
    /// Reachable by everyone (landing page, 404, terms).
    pub public: bool,
    /// Only for signed-out users (login, register, forgot-password).
    pub unauthenticated_only: bool,
}

impl RouteMeta {
    #[must_use]
    pub fn public() -> Self {
        Self {
            public: true,
            unauthenticated_only: false,
        }
    }

    #[must_use]
    pub fn unauthenticated_only() -> Self {
        Self {
            public: false,
            unauthenticated_only: true,
        }
    }
}

/// Where a navigation is heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteTarget<'a> {
    /// Route name, matched against the permission tree.
    pub name: Option<&'a str>,
    pub path: &'a str,
    /// Path including query and hash; defaults to `path`.
    pub full_path: &'a str,
    pub meta: Option<&'a RouteMeta>,
}

impl<'a> RouteTarget<'a> {
    #[must_use]
    pub fn new(name: Option<&'a str>, path: &'a str) -> Self {
        Self {
            name,
            path,
            full_path: path,
            meta: None,
        }
    }

    #[must_use]
    pub fn with_meta(mut self, meta: &'a RouteMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    #[must_use]
    pub fn with_full_path(mut self, full_path: &'a str) -> Self {
        self.full_path = full_path;
        self
    }

    fn is_root(&self) -> bool {
        self.path == ROOT_PATH
    }
}

/// What the router should do with a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Send to the login page, remembering where the user was going.
    RedirectToLogin { saved_path: Option<String> },
    RedirectToNotAuthorized,
    RedirectToRoot,
}

impl Decision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Redirect target as a path, `None` for [`Decision::Allow`].
    #[must_use]
    pub fn location(&self) -> Option<String> {
        match self {
            Self::Allow => None,
            Self::RedirectToLogin { saved_path: None } => Some(LOGIN_PATH.to_owned()),
            Self::RedirectToLogin {
                saved_path: Some(path),
            } => Some(format!(
                "{LOGIN_PATH}?{SAVED_PATH_PARAM}={}",
                urlencoding::encode(path)
            )),
            Self::RedirectToNotAuthorized => Some(NOT_AUTHORIZED_PATH.to_owned()),
            Self::RedirectToRoot => Some(ROOT_PATH.to_owned()),
        }
    }
}

/// Session facts a decision depends on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessContext {
    /// Token and user data are both stored.
    pub logged_in: bool,
    pub permissions: PermissionTree,
}

/// Rules that need no permission tree. `None` means "consult the tree".
fn precheck(target: &RouteTarget<'_>, logged_in: bool) -> Option<Decision> {
    let meta = target.meta.copied().unwrap_or_default();
    if meta.public {
        return Some(Decision::Allow);
    }
    if meta.unauthenticated_only {
        return Some(if logged_in {
            Decision::RedirectToRoot
        } else {
            Decision::Allow
        });
    }
    if !logged_in {
        let saved_path = (!target.is_root()).then(|| target.full_path.to_owned());
        return Some(Decision::RedirectToLogin { saved_path });
    }
    None
}

/// Decide a navigation. First matching rule wins:
///
/// 1. public route: allow
/// 2. unauthenticated-only route: root if logged in, else allow
/// 3. not logged in: login, saving the target unless it is `/`
/// 4. route name in the permission tree: allow
/// 5. otherwise: not-authorized, except `/` which is always allowed
#[must_use]
pub fn decide(target: &RouteTarget<'_>, access: &AccessContext) -> Decision {
    if let Some(decision) = precheck(target, access.logged_in) {
        return decision;
    }
    let granted = target
        .name
        .is_some_and(|name| access.permissions.find_by_route_name(name).is_some());
    if granted || target.is_root() {
        Decision::Allow
    } else {
        Decision::RedirectToNotAuthorized
    }
}

impl<B: BackendApi, S: Storage> SessionManager<B, S> {
    /// Route guard: decide `target`, loading the permission tree first when needed.
    ///
    /// Login state is read from the credential store so a freshly reloaded
    /// page is judged by what it has stored.
    ///
    /// # Errors
    ///
    /// Propagates [`get_permissions`](Self::get_permissions) failures so the
    /// caller can abort the navigation.
    pub async fn authorize(&self, target: &RouteTarget<'_>) -> Result<Decision, Error> {
        if target.meta.is_some_and(|m| m.public) {
            return Ok(Decision::Allow);
        }
        self.core().drain_events();
        let logged_in = self.credentials().is_logged_in();
        if let Some(decision) = precheck(target, logged_in) {
            return Ok(decision);
        }

        let permissions = self.get_permissions().await?;
        let decision = decide(
            target,
            &AccessContext {
                logged_in,
                permissions,
            },
        );
        if decision == Decision::RedirectToNotAuthorized {
            tracing::debug!(route = ?target.name, path = target.path, "Route not granted");
        }
        Ok(decision)
    }
}
