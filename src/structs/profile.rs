use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::session::SessionManager;
use super::user::{ProfileUpdate, Subscription, User};
use super::{profile_from_response, success_data};
use crate::errors::DrPilotError;

const PROFILE_PATH: &str = "/api/auth/profile";
const CHANGE_PASSWORD_PATH: &str = "/api/auth/change-password";

/// Page size `recent_queries` asks for.
pub const DEFAULT_QUERIES_PAGE_SIZE: u32 = 20;

/// What a profile view shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileState {
    pub profile: Option<User>,
    pub loading: bool,
    /// Message of the last failed call, cleared when the next call starts.
    pub error: Option<String>,
}

/// Reads and edits the current user's profile and account.
pub struct ProfileController {
    session: Arc<SessionManager>,
    state: RwLock<ProfileState>,
}

impl ProfileController {
    /// Starts from the user the session already holds.
    pub async fn new(session: Arc<SessionManager>) -> Self {
        let profile = session.user().await;

        Self {
            session,
            state: RwLock::new(ProfileState {
                profile,
                loading: false,
                error: None,
            }),
        }
    }

    pub async fn state(&self) -> ProfileState {
        self.state.read().await.clone()
    }

    pub async fn profile(&self) -> Option<User> {
        self.state.read().await.profile.clone()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    fn token(&self) -> Result<String, DrPilotError> {
        self.session.token().ok_or(DrPilotError::NotAuthenticated)
    }

    async fn begin(&self, loading: bool) {
        let mut state = self.state.write().await;
        state.error = None;
        state.loading = loading;
    }

    async fn finish<T>(&self, what: &str, result: Result<T, DrPilotError>) -> Result<T, DrPilotError> {
        let mut state = self.state.write().await;
        state.loading = false;

        if let Err(e) = &result {
            error!(error = %e, "{} failed", what);
            state.error = Some(e.to_string());
        }

        result
    }

    /// Loads the profile from the backend. A rejected token logs the session out.
    pub async fn fetch_profile(&self) -> Result<User, DrPilotError> {
        self.begin(true).await;
        let result = self.load_profile().await;
        self.finish("profile fetch", result).await
    }

    async fn load_profile(&self) -> Result<User, DrPilotError> {
        let token = self.token()?;
        let generation = self.session.generation();

        let body = match self
            .session
            .client()
            .api_call(Method::GET, PROFILE_PATH, Some(&token), None, None)
            .await
        {
            Ok(body) => body,
            Err(DrPilotError::Unauthorized(message)) => {
                warn!(%message, "token rejected, ending session");
                self.session.logout().await;
                self.state.write().await.profile = None;
                return Err(DrPilotError::SessionExpired);
            }
            Err(e) => return Err(e),
        };

        let user = profile_from_response(body)?.normalize();
        self.publish(generation, &user).await?;

        info!(user_id = %user.id, "profile loaded");
        Ok(user)
    }

    /// Saves profile fields and returns the record the backend confirmed.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, DrPilotError> {
        self.begin(false).await;
        let result = self.save_profile(update).await;
        self.finish("profile update", result).await
    }

    async fn save_profile(&self, update: &ProfileUpdate) -> Result<User, DrPilotError> {
        let token = self.token()?;
        let generation = self.session.generation();
        let body = serde_json::to_value(update).map_err(|e| DrPilotError::InvalidRequest(e.to_string()))?;

        let response = self
            .session
            .client()
            .api_call(Method::PUT, PROFILE_PATH, Some(&token), Some(&body), None)
            .await?;

        let user = profile_from_response(response)?.normalize();
        self.publish(generation, &user).await?;

        info!(user_id = %user.id, "profile updated");
        Ok(user)
    }

    // Hand the record to the session unless it changed hands during the call,
    // then keep the local copy.
    async fn publish(&self, generation: u64, user: &User) -> Result<(), DrPilotError> {
        if self.session.generation() != generation {
            return Err(DrPilotError::Superseded);
        }

        self.session.update_local_profile(user.clone()).await?;
        self.state.write().await.profile = Some(user.clone());

        Ok(())
    }

    /// Changes the password. Wrong current password, policy violations and
    /// network failures all come back as errors carrying the backend message.
    pub async fn update_password(&self, current: &str, new: &str) -> Result<Value, DrPilotError> {
        self.begin(false).await;
        let result = self.change_password(current, new).await;
        self.finish("password change", result).await
    }

    async fn change_password(&self, current: &str, new: &str) -> Result<Value, DrPilotError> {
        let token = self.token()?;
        let body = json!({ "currentPassword": current, "newPassword": new });

        let response = self
            .session
            .client()
            .api_call(Method::PUT, CHANGE_PASSWORD_PATH, Some(&token), Some(&body), None)
            .await?;

        info!("password changed");
        Ok(response)
    }

    async fn account_call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Option<Value>, DrPilotError> {
        let token = self.token()?;

        let response = self
            .session
            .client()
            .api_call(method, path, Some(&token), body.as_ref(), None)
            .await?;

        Ok(success_data(response))
    }

    /// Usage statistics of the current user.
    pub async fn user_stats(&self) -> Result<Option<Value>, DrPilotError> {
        self.account_call(Method::GET, "/api/users/stats", None).await
    }

    /// Details of the current plan.
    pub async fn subscription_info(&self) -> Result<Option<Value>, DrPilotError> {
        self.account_call(Method::GET, "/api/users/subscription", None).await
    }

    pub async fn recent_activity(&self) -> Result<Option<Value>, DrPilotError> {
        self.account_call(Method::GET, "/api/users/activity", None).await
    }

    /// One page of past queries, optionally only the saved (or unsaved) ones.
    pub async fn my_queries(
        &self,
        page: u32,
        limit: u32,
        saved: Option<bool>,
    ) -> Result<Option<Value>, DrPilotError> {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("page", &page.to_string())
            .append_pair("limit", &limit.to_string());
        if let Some(saved) = saved {
            query.append_pair("saved", &saved.to_string());
        }

        let path = format!("/api/users/my-queries?{}", query.finish());
        self.account_call(Method::GET, &path, None).await
    }

    /// First page of past queries.
    pub async fn recent_queries(&self) -> Result<Option<Value>, DrPilotError> {
        self.my_queries(1, DEFAULT_QUERIES_PAGE_SIZE, None).await
    }

    /// Asks for a plan upgrade. Only paid plans can be requested.
    pub async fn request_upgrade(&self, plan: Subscription) -> Result<Option<Value>, DrPilotError> {
        if !plan.is_unlimited() {
            return Err(DrPilotError::InvalidRequest(format!(
                "cannot upgrade to the {} plan",
                plan.as_str()
            )));
        }

        info!(plan = plan.as_str(), "upgrade requested");
        let body = json!({ "plan": plan });
        self.account_call(Method::POST, "/api/users/upgrade-plan", Some(body))
            .await
    }

    pub async fn reset_usage(&self) -> Result<Option<Value>, DrPilotError> {
        self.account_call(Method::POST, "/api/users/reset-usage", None).await
    }
}
