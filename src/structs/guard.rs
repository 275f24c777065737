//! Route protection.
//!
//! A `RouteGuard` decides, for one mounted protected view, whether to show the
//! view, keep showing the fallback, or navigate away.

use std::fmt;

use super::session::Session;
use super::user::Role;

pub const LOGIN_PATH: &str = "/login";
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";
pub const DEFAULT_FALLBACK: &str = "Verificando acesso...";

/// Navigation targets the client produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Login view, optionally asked to come back to `redirect` afterwards.
    Login { redirect: Option<String> },
    Chat,
    AdminDashboard,
    BetaDashboard,
    Dashboard,
    Unauthorized,
    Other(String),
}

impl Route {
    /// Landing view after a successful login.
    pub fn after_login(role: Role) -> Self {
        match role {
            Role::Admin => Route::AdminDashboard,
            Role::BetaTester => Route::BetaDashboard,
            Role::User => Route::Chat,
        }
    }

    /// Landing view after a successful registration.
    pub fn after_register(role: Role) -> Self {
        match role {
            Role::Admin => Route::AdminDashboard,
            Role::BetaTester => Route::BetaDashboard,
            Role::User => Route::Dashboard,
        }
    }

    pub fn login() -> Self {
        Route::Login { redirect: None }
    }

    /// Resolves a path into a known route where one matches.
    pub fn from_path(path: &str) -> Self {
        match path {
            LOGIN_PATH => Route::login(),
            "/chatbot" => Route::Chat,
            "/admin/dashboard" => Route::AdminDashboard,
            "/beta/dashboard" => Route::BetaDashboard,
            "/dashboard" => Route::Dashboard,
            UNAUTHORIZED_PATH => Route::Unauthorized,
            other => Route::Other(other.to_string()),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Login { redirect: None } => LOGIN_PATH.to_string(),
            Route::Login {
                redirect: Some(back),
            } => {
                let encoded: String = url::form_urlencoded::byte_serialize(back.as_bytes()).collect();
                format!("{}?redirect={}", LOGIN_PATH, encoded)
            }
            Route::Chat => "/chatbot".to_string(),
            Route::AdminDashboard => "/admin/dashboard".to_string(),
            Route::BetaDashboard => "/beta/dashboard".to_string(),
            Route::Dashboard => "/dashboard".to_string(),
            Route::Unauthorized => UNAUTHORIZED_PATH.to_string(),
            Route::Other(path) => path.clone(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Checking,
    Redirecting(Route),
    Authorized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Render {
    /// The "checking access" placeholder.
    Fallback,
    /// The protected view itself.
    Protected,
}

/// What the view should do after an evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub render: Render,
    /// Set only the first time a given redirect is decided.
    pub navigate: Option<Route>,
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    required_role: Option<Role>,
    redirect_to: Route,
    current_path: String,
    fallback: String,
    state: GuardState,
}

impl RouteGuard {
    /// Guard for the view mounted at `current_path`, redirecting to the login view.
    pub fn new(current_path: impl Into<String>) -> Self {
        Self {
            required_role: None,
            redirect_to: Route::login(),
            current_path: current_path.into(),
            fallback: DEFAULT_FALLBACK.to_string(),
            state: GuardState::Checking,
        }
    }

    pub fn require_role(mut self, role: Role) -> Self {
        self.required_role = Some(role);
        self
    }

    pub fn redirect_to(mut self, route: Route) -> Self {
        self.redirect_to = route;
        self
    }

    pub fn fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = text.into();
        self
    }

    pub fn state(&self) -> &GuardState {
        &self.state
    }

    pub fn fallback_text(&self) -> &str {
        &self.fallback
    }

    /// Re-evaluates the guard against the current session. Call on mount and
    /// whenever the session changes.
    pub fn evaluate(&mut self, session: &Session) -> Decision {
        if session.loading {
            self.state = GuardState::Checking;
            return Decision {
                render: Render::Fallback,
                navigate: None,
            };
        }

        let target = match &session.user {
            None => Some(self.login_target()),
            Some(user) => match self.required_role {
                Some(role) if user.role != role => Some(Route::Unauthorized),
                _ => None,
            },
        };

        match target {
            None => {
                self.state = GuardState::Authorized;
                Decision {
                    render: Render::Protected,
                    navigate: None,
                }
            }
            Some(route) => {
                let already_sent = self.state == GuardState::Redirecting(route.clone());
                self.state = GuardState::Redirecting(route.clone());
                Decision {
                    render: Render::Fallback,
                    navigate: (!already_sent).then_some(route),
                }
            }
        }
    }

    fn login_target(&self) -> Route {
        match &self.redirect_to {
            Route::Login { redirect: None } => Route::Login {
                redirect: Some(self.current_path.clone()),
            },
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::user::{User, UserPayload};

    fn user_with_role(role: Role) -> User {
        UserPayload {
            id: "u1".into(),
            email: "doc@example.com".into(),
            name: "Dr. Silva".into(),
            role: Some(role),
            ..Default::default()
        }
        .normalize()
    }

    fn session(user: Option<User>, loading: bool) -> Session {
        Session { user, loading }
    }

    #[test]
    fn loading_never_renders_protected() {
        let mut guard = RouteGuard::new("/chatbot");

        for user in [None, Some(user_with_role(Role::Admin))] {
            let decision = guard.evaluate(&session(user, true));
            assert_eq!(decision.render, Render::Fallback);
            assert_eq!(decision.navigate, None);
            assert_eq!(guard.state(), &GuardState::Checking);
        }
    }

    #[test]
    fn anonymous_redirects_once_with_return_hint() {
        let mut guard = RouteGuard::new("/profile");
        let anonymous = session(None, false);

        let first = guard.evaluate(&anonymous);
        assert_eq!(first.render, Render::Fallback);
        let target = first.navigate.expect("first evaluation navigates");
        assert_eq!(target.path(), "/login?redirect=%2Fprofile");

        let second = guard.evaluate(&anonymous);
        assert_eq!(second.render, Render::Fallback);
        assert_eq!(second.navigate, None);
    }

    #[test]
    fn custom_redirect_has_no_hint() {
        let mut guard = RouteGuard::new("/profile").redirect_to(Route::Other("/welcome".into()));
        let decision = guard.evaluate(&session(None, false));
        assert_eq!(decision.navigate, Some(Route::Other("/welcome".into())));
    }

    #[test]
    fn wrong_role_goes_to_unauthorized() {
        let mut guard = RouteGuard::new("/admin/dashboard").require_role(Role::Admin);
        let decision = guard.evaluate(&session(Some(user_with_role(Role::User)), false));

        assert_eq!(decision.render, Render::Fallback);
        assert_eq!(decision.navigate, Some(Route::Unauthorized));
        assert_eq!(guard.state(), &GuardState::Redirecting(Route::Unauthorized));
    }

    #[test]
    fn matching_role_is_authorized() {
        let mut guard = RouteGuard::new("/admin/dashboard").require_role(Role::Admin);
        let decision = guard.evaluate(&session(Some(user_with_role(Role::Admin)), false));

        assert_eq!(decision.render, Render::Protected);
        assert_eq!(guard.state(), &GuardState::Authorized);
    }

    #[test]
    fn redirecting_recovers_after_login_elsewhere() {
        let mut guard = RouteGuard::new("/chatbot");
        guard.evaluate(&session(None, false));
        assert!(matches!(guard.state(), GuardState::Redirecting(_)));

        guard.evaluate(&session(None, true));
        assert_eq!(guard.state(), &GuardState::Checking);

        let decision = guard.evaluate(&session(Some(user_with_role(Role::User)), false));
        assert_eq!(decision.render, Render::Protected);
        assert_eq!(guard.state(), &GuardState::Authorized);
    }

    #[test]
    fn landing_routes_by_role() {
        assert_eq!(Route::after_login(Role::User).path(), "/chatbot");
        assert_eq!(Route::after_login(Role::Admin).path(), "/admin/dashboard");
        assert_eq!(Route::after_login(Role::BetaTester).path(), "/beta/dashboard");
        assert_eq!(Route::after_register(Role::User).path(), "/dashboard");
        assert_eq!(Route::from_path("/chatbot"), Route::Chat);
        assert_eq!(Route::login().to_string(), "/login");
    }

    #[test]
    fn default_fallback_text() {
        let guard = RouteGuard::new("/chatbot");
        assert_eq!(guard.fallback_text(), "Verificando acesso...");
        assert_eq!(RouteGuard::new("/x").fallback("Carregando chat...").fallback_text(), "Carregando chat...");
    }
}
