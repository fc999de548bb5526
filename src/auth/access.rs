//! Role-based route guarding
//!
//! [`AccessController::authorize`] is a pure function of the session snapshot
//! and the roles a destination admits. It never redirects to a "forbidden"
//! page: a signed-in user who may not see a destination is sent to their own
//! landing area instead, and only anonymous visitors are sent to login.

use serde::{Deserialize, Serialize};

use crate::auth::models::Role;
use crate::auth::session::SessionSnapshot;

/// Landing view per role plus the login view.
///
/// `landing` matches on [`Role`] exhaustively, so adding a role fails to
/// compile until it has a landing area here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRoutes {
    #[serde(default = "default_login")]
    pub login: String,

    /// Query parameter carrying the return-to path on the login view
    #[serde(default = "default_return_param")]
    pub return_param: String,

    #[serde(default = "default_admin")]
    pub admin: String,

    #[serde(default = "default_client")]
    pub client: String,

    #[serde(default = "default_expert")]
    pub expert: String,
}

fn default_login() -> String {
    "/auth".to_string()
}

fn default_return_param() -> String {
    "redirect".to_string()
}

fn default_admin() -> String {
    "/admin/dashboard".to_string()
}

fn default_client() -> String {
    "/client/dashboard".to_string()
}

fn default_expert() -> String {
    "/expert/dashboard".to_string()
}

impl Default for RoleRoutes {
    fn default() -> Self {
        Self {
            login: default_login(),
            return_param: default_return_param(),
            admin: default_admin(),
            client: default_client(),
            expert: default_expert(),
        }
    }
}

impl RoleRoutes {
    pub fn landing(&self, role: Role) -> &str {
        match role {
            Role::Admin => &self.admin,
            Role::Client => &self.client,
            Role::Expert => &self.expert,
        }
    }

    /// Login view carrying `return_to` for the post-login redirect
    pub fn login_with_return(&self, return_to: &str) -> String {
        format!(
            "{}?{}={}",
            self.login,
            self.return_param,
            urlencoding::encode(return_to)
        )
    }
}

/// Outcome of a navigation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Session bootstrap has not finished; show a neutral waiting state
    Wait,
    /// Render the destination
    Allow,
    /// Anonymous visitor; go to login and come back to `return_to` afterwards
    Login { location: String, return_to: String },
    /// Signed in but not permitted here; go to the role's own landing area
    Landing { location: String, role: Role },
}

impl Decision {
    pub fn redirect_location(&self) -> Option<&str> {
        match self {
            Decision::Login { location, .. } | Decision::Landing { location, .. } => {
                Some(location)
            }
            Decision::Wait | Decision::Allow => None,
        }
    }
}

/// Decides, per navigation, whether the session may view a destination
#[derive(Debug, Clone, Default)]
pub struct AccessController {
    routes: RoleRoutes,
}

impl AccessController {
    pub fn new(routes: RoleRoutes) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &RoleRoutes {
        &self.routes
    }

    /// Check `destination` (path plus optional query) against `allowed_roles`
    pub fn authorize(
        &self,
        session: &SessionSnapshot,
        destination: &str,
        allowed_roles: &[Role],
    ) -> Decision {
        if session.loading {
            return Decision::Wait;
        }

        let Some(user) = session.user.as_ref() else {
            return Decision::Login {
                location: self.routes.login_with_return(destination),
                return_to: destination.to_string(),
            };
        };

        if !allowed_roles.contains(&user.role) {
            return Decision::Landing {
                location: self.routes.landing(user.role).to_string(),
                role: user.role,
            };
        }

        Decision::Allow
    }

    /// Pull the return-to path out of a login view query string.
    ///
    /// Only safe local paths are returned; anything that could leave the
    /// application (absolute URLs, protocol-relative paths) is dropped.
    pub fn return_target(&self, query: &str) -> Option<String> {
        let query = query.strip_prefix('?').unwrap_or(query);
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            if key != self.routes.return_param {
                return None;
            }
            let decoded = urlencoding::decode(value).ok()?;
            is_local_path(&decoded).then(|| decoded.into_owned())
        })
    }
}

/// True for in-app paths such as `/client/tasks?page=2`
pub fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') && !path.contains("://")
}
