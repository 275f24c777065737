//! Session state: who is logged in.
//!
//! `SessionManager` is the only writer of the persisted session and of the
//! in-memory user. Everyone else reads through it.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::client::Client;
use super::guard::Route;
use super::store::{FileStore, MemoryStore, SessionStore, TOKEN_KEY, USER_KEY};
use super::user::{RegistrationForm, Role, User};
use super::{stored_user_from_str, AuthData};
use crate::config::Settings;
use crate::errors::DrPilotError;

const LOGIN_FALLBACK: &str = "Erro ao fazer login";
const REGISTER_FALLBACK: &str = "Erro ao cadastrar";

/// Snapshot of the session state.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// `None` means not authenticated.
    pub user: Option<User>,
    /// True until the store has been read, and while a login or registration is in flight.
    pub loading: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            user: None,
            loading: true,
        }
    }
}

/// Clears the flag when dropped, including when the owning future is cancelled.
pub(crate) struct ClearOnDrop<'a>(pub(crate) &'a AtomicBool);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// One login or registration in flight. Counted so that overlapping calls
// keep the session loading until the last one settles.
struct PendingCall<'a>(&'a AtomicUsize);

impl<'a> PendingCall<'a> {
    fn start(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SessionManager {
    client: Client,
    store: Arc<dyn SessionStore>,
    user: RwLock<Option<User>>,
    // Bumped by login, register and logout. A completion whose generation is
    // no longer current is discarded.
    generation: AtomicU64,
    initialized: AtomicBool,
    restoring: AtomicBool,
    pending: AtomicUsize,
}

impl SessionManager {
    pub fn new(client: Client, store: Arc<dyn SessionStore>) -> Self {
        Self {
            client,
            store,
            user: RwLock::new(None),
            generation: AtomicU64::new(0),
            initialized: AtomicBool::new(false),
            restoring: AtomicBool::new(true),
            pending: AtomicUsize::new(0),
        }
    }

    /// Builds a manager from settings, persisting to the configured session file.
    pub fn from_settings(settings: &Settings) -> Result<Self, DrPilotError> {
        let client = Client::from_settings(settings)?;

        let store: Arc<dyn SessionStore> = match settings.storage_path() {
            Some(path) => {
                debug!(path = %path.display(), "using session file");
                Arc::new(FileStore::new(path))
            }
            None => {
                warn!("no data directory found, the session will not survive a restart");
                Arc::new(MemoryStore::new())
            }
        };

        Ok(Self::new(client, store))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn snapshot(&self) -> Session {
        let user = self.user.read().await.clone();

        Session {
            user,
            loading: self.loading(),
        }
    }

    pub async fn user(&self) -> Option<User> {
        self.user.read().await.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.loading()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.user.read().await.is_some()
    }

    fn loading(&self) -> bool {
        self.restoring.load(Ordering::SeqCst) || self.pending.load(Ordering::SeqCst) > 0
    }

    /// Current value of the session generation counter.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// The stored bearer token, if any.
    pub fn token(&self) -> Option<String> {
        match self.store.get(TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "failed to read token");
                None
            }
        }
    }

    /// Hydrates the session from the store. Only the first call does anything.
    ///
    /// A missing or unreadable session is not an error: the user simply stays logged out.
    pub async fn initialize(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }

        let _restoring = ClearOnDrop(&self.restoring);
        let generation = self.generation();

        // Store reads may hit the disk
        let store = Arc::clone(&self.store);
        let restored = tokio::task::spawn_blocking(move || restore(store.as_ref()))
            .await
            .unwrap_or_else(|e| Err(DrPilotError::Storage(e.to_string())));

        let mut current = self.user.write().await;
        if self.generation() != generation {
            debug!("session changed while restoring, stored session skipped");
            return;
        }

        match restored {
            Ok(Some(user)) => {
                info!(user_id = %user.id, "session restored");
                *current = Some(user);
            }
            Ok(None) => debug!("no stored session"),
            Err(e) => warn!(error = %e, "ignoring stored session"),
        }
    }

    /// Logs in and returns the landing view for the user's role.
    pub async fn login(&self, email: &str, password: &str) -> Result<Route, DrPilotError> {
        info!(%email, "login requested");
        let body = json!({ "email": email, "password": password });

        self.authenticate("/api/auth/login", body, LOGIN_FALLBACK, Route::after_login)
            .await
    }

    /// Registers a new account, logs it in and returns its landing view.
    pub async fn register(&self, form: &RegistrationForm) -> Result<Route, DrPilotError> {
        info!(email = %form.email, "registration requested");
        let body = serde_json::to_value(form)
            .map_err(|e| DrPilotError::InvalidRequest(e.to_string()))?;

        self.authenticate("/api/auth/register", body, REGISTER_FALLBACK, Route::after_register)
            .await
    }

    async fn authenticate(
        &self,
        path: &str,
        body: Value,
        fallback: &str,
        landing: fn(Role) -> Route,
    ) -> Result<Route, DrPilotError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let pending = PendingCall::start(&self.pending);

        self.client.debug_progress("[AUTH] Authenticating...");

        let result = match self
            .client
            .api_call(Method::POST, path, None, Some(&body), Some(fallback))
            .await
        {
            Ok(response) => match AuthData::from_response(response) {
                Ok(auth) => self.commit(generation, auth).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        drop(pending);

        match result {
            Ok(user) => {
                info!(user_id = %user.id, role = user.role.as_str(), "authenticated");
                self.client.debug_line("[AUTH] Successfully authenticated.");
                self.client
                    .debug_line(&format!("[AUTH] Welcome, {}.", display_name(&user)));

                Ok(landing(user.role))
            }
            Err(e) => {
                match &e {
                    DrPilotError::Superseded => warn!("authentication result discarded"),
                    _ => error!(error = %e, "authentication failed"),
                }
                self.client.debug_failure("[AUTH]", &e);

                Err(e)
            }
        }
    }

    // Normalize, persist, then publish. Nothing is written when the session
    // moved on while the request was in flight.
    async fn commit(&self, generation: u64, auth: AuthData) -> Result<User, DrPilotError> {
        let user = auth.user.normalize();

        let mut current = self.user.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            return Err(DrPilotError::Superseded);
        }

        self.persist(&auth.token, &user)?;
        *current = Some(user.clone());

        Ok(user)
    }

    fn persist(&self, token: &str, user: &User) -> Result<(), DrPilotError> {
        let blob = serde_json::to_string(user).map_err(|e| DrPilotError::Storage(e.to_string()))?;
        let previous_token = self.store.get(TOKEN_KEY)?;

        self.store.set(TOKEN_KEY, token)?;

        if let Err(e) = self.store.set(USER_KEY, &blob) {
            // Put the old token back so token and user still belong together
            let rollback = match previous_token {
                Some(previous) => self.store.set(TOKEN_KEY, &previous),
                None => self.store.remove(TOKEN_KEY),
            };
            if let Err(rollback_err) = rollback {
                error!(error = %rollback_err, "failed to roll back token");
            }

            return Err(e);
        }

        Ok(())
    }

    /// Clears the session and returns the login view. Never fails.
    pub async fn logout(&self) -> Route {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let mut current = self.user.write().await;

        for key in [TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.store.remove(key) {
                warn!(key, error = %e, "failed to clear stored session entry");
            }
        }

        if let Some(user) = current.take() {
            info!(user_id = %user.id, "logged out");
        }

        self.client.debug_line("[AUTH] Logged out.");
        Route::login()
    }

    /// Replaces the stored and in-memory user without calling the backend.
    /// Used after the backend already confirmed a profile change.
    pub async fn update_local_profile(&self, user: User) -> Result<(), DrPilotError> {
        let mut current = self.user.write().await;

        if self.token().is_none() {
            return Err(DrPilotError::NotAuthenticated);
        }

        let blob = serde_json::to_string(&user).map_err(|e| DrPilotError::Storage(e.to_string()))?;
        self.store.set(USER_KEY, &blob)?;

        debug!(user_id = %user.id, "local profile updated");
        *current = Some(user);

        Ok(())
    }
}

fn restore(store: &dyn SessionStore) -> Result<Option<User>, DrPilotError> {
    let token = store.get(TOKEN_KEY)?.filter(|t| !t.is_empty());
    let blob = store.get(USER_KEY)?;

    match (token, blob) {
        (Some(_), Some(blob)) => Ok(Some(stored_user_from_str(&blob)?.normalize())),
        _ => Ok(None),
    }
}

fn display_name(user: &User) -> &str {
    if user.name.is_empty() {
        &user.email
    } else {
        &user.name
    }
}
