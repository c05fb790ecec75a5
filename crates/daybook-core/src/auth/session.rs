//! Session lifecycle management.
//!
//! `SessionManager` owns every change to the current credential:
//! - `initialize` restores a session from the server-side refresh cookie,
//!   once, and then marks the session ready whatever the outcome
//! - `refresh` is single-flight: concurrent callers share one request
//! - `set_credential` stores the credential and re-arms the proactive
//!   refresh timer, which fires one minute before the token expires
//! - `logout` always clears local state, even when the server is unreachable

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::api::{HttpClient, RequestOptions, ResponseBody};

use super::error::{AuthAction, AuthError, SessionError};
use super::scheduler::{ScheduledTask, Scheduler, TokioScheduler};
use super::{Credential, CredentialStore};

// ============================================================================
// Constants
// ============================================================================

/// Refresh this long before the credential expires.
pub const DEFAULT_REFRESH_LEAD_SECS: u64 = 60;

/// Upper bound on the remote logout call. Logout must never block the user.
pub const LOGOUT_TIMEOUT_SECS: u64 = 5;

const REFRESH_PATH: &str = "/auth/refresh";
const LOGIN_PATH: &str = "/auth/login";
const REGISTER_PATH: &str = "/auth/register";
const LOGOUT_PATH: &str = "/auth/logout";

/// Refresh response fields holding the new token, in lookup order.
/// `accessToken` is current; the others are older response shapes.
const ACCESS_TOKEN_FIELDS: [&str; 3] = ["accessToken", "token", "access_token"];

type RefreshFuture = Shared<BoxFuture<'static, Result<(), SessionError>>>;
type InitFuture = Shared<BoxFuture<'static, ()>>;

/// Response from the login and register endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Clone)]
pub struct SessionOptions {
    pub refresh_lead: Duration,
    /// How long `logout` waits for the server before clearing locally
    pub logout_timeout: Duration,
    pub scheduler: Arc<dyn Scheduler>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            refresh_lead: Duration::from_secs(DEFAULT_REFRESH_LEAD_SECS),
            logout_timeout: Duration::from_secs(LOGOUT_TIMEOUT_SECS),
            scheduler: Arc::new(TokioScheduler),
        }
    }
}

/// Session lifecycle manager.
/// Clone is cheap; clones share one session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    http: HttpClient,
    store: CredentialStore,
    scheduler: Arc<dyn Scheduler>,
    refresh_lead: Duration,
    logout_timeout: Duration,
    /// Held for the whole store write + timer re-arm
    refresh_timer: Mutex<Option<ArmedTimer>>,
    /// Source of `ArmedTimer::id`
    timer_seq: AtomicU64,
    inflight_refresh: Mutex<Option<RefreshFuture>>,
    init: OnceLock<InitFuture>,
    ready: AtomicBool,
    /// Bumped on logout; refreshes started earlier must not restore the session
    generation: AtomicU64,
}

/// The pending proactive refresh. `id` tells a firing timer whether it is
/// still the current one.
struct ArmedTimer {
    id: u64,
    task: ScheduledTask,
}

/// Time to wait before proactively refreshing a credential that expires at
/// `expires_at`: `max(0, expires_at - now - lead)`.
pub fn refresh_delay(expires_at: DateTime<Utc>, now: DateTime<Utc>, lead: Duration) -> Duration {
    let lead_ms = i64::try_from(lead.as_millis()).unwrap_or(i64::MAX);
    let remaining_ms = (expires_at - now).num_milliseconds().saturating_sub(lead_ms);
    if remaining_ms <= 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(remaining_ms as u64)
    }
}

/// Pull the new access token out of a refresh response
fn extract_access_token(body: &ResponseBody) -> Option<&str> {
    ACCESS_TOKEN_FIELDS
        .iter()
        .find_map(|field| body.str_field(field))
}

impl SessionManager {
    pub fn new(http: HttpClient, store: CredentialStore) -> Self {
        Self::with_options(http, store, SessionOptions::default())
    }

    pub fn with_options(http: HttpClient, store: CredentialStore, options: SessionOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                store,
                scheduler: options.scheduler,
                refresh_lead: options.refresh_lead,
                logout_timeout: options.logout_timeout,
                refresh_timer: Mutex::new(None),
                timer_seq: AtomicU64::new(0),
                inflight_refresh: Mutex::new(None),
                init: OnceLock::new(),
                ready: AtomicBool::new(false),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn credential_store(&self) -> &CredentialStore {
        &self.inner.store
    }

    /// Check if a credential is held (route guard)
    pub fn is_authenticated(&self) -> bool {
        self.inner.store.is_present()
    }

    // ===== Initialization =====

    /// Restore the session from the refresh cookie, once.
    ///
    /// Every call awaits the same attempt. Failure is not an error here: the
    /// session simply starts logged out.
    pub async fn initialize(&self) {
        let init = self
            .inner
            .init
            .get_or_init(|| {
                let manager = self.clone();
                tokio::spawn(async move {
                    match manager.refresh().await {
                        Ok(()) => info!("Session restored"),
                        Err(e) => debug!(error = %e, "No session to restore"),
                    }
                    manager.inner.ready.store(true, Ordering::Release);
                })
                .map(|joined| {
                    if let Err(e) = joined {
                        warn!(error = %e, "Session initialization task failed");
                    }
                })
                .boxed()
                .shared()
            })
            .clone();
        init.await
    }

    /// True once the first `initialize` attempt has settled
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    // ===== Credential writes =====

    /// Store a credential (or clear it) and re-arm the proactive refresh timer.
    pub fn set_credential(&self, credential: Option<Credential>) {
        self.write_credential(credential, None);
    }

    /// Clear the credential only if it is still `rejected`.
    /// Returns whether it was cleared.
    pub fn invalidate(&self, rejected: &Credential) -> bool {
        let mut timer = self.inner.refresh_timer.lock();
        if self.inner.store.get().as_ref() != Some(rejected) {
            return false;
        }
        self.inner.store.set(None);
        if let Some(previous) = timer.take() {
            previous.task.cancel();
        }
        debug!("Rejected credential cleared");
        true
    }

    /// Store + re-arm under the timer lock. With `expected_generation`, the
    /// write is skipped if a logout happened since that generation.
    fn write_credential(&self, credential: Option<Credential>, expected_generation: Option<u64>) -> bool {
        let mut timer = self.inner.refresh_timer.lock();
        if let Some(expected) = expected_generation {
            if self.inner.generation.load(Ordering::Acquire) != expected {
                return false;
            }
        }

        self.inner.store.set(credential.clone());

        if let Some(previous) = timer.take() {
            previous.task.cancel();
        }
        let Some(credential) = credential else {
            return true;
        };
        let Some(expires_at) = credential.expires_at() else {
            debug!("Credential has no decodable expiry, relying on reactive refresh");
            return true;
        };

        let delay = refresh_delay(expires_at, Utc::now(), self.inner.refresh_lead);
        debug!(delay_secs = delay.as_secs(), %expires_at, "Scheduling proactive refresh");

        let id = self.inner.timer_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let session = Arc::downgrade(&self.inner);
        let task = self
            .inner
            .scheduler
            .schedule(delay, Self::proactive_refresh(session, id).boxed());
        *timer = Some(ArmedTimer { id, task });
        true
    }

    async fn proactive_refresh(session: Weak<Inner>, id: u64) {
        let Some(inner) = session.upgrade() else {
            return;
        };
        {
            let mut timer = inner.refresh_timer.lock();
            if timer.as_ref().map(|armed| armed.id) != Some(id) {
                debug!("Superseded refresh timer fired, ignoring");
                return;
            }
            // Fired: empty the slot without aborting the running task
            if let Some(fired) = timer.take() {
                fired.task.disarm();
            }
        }
        let manager = SessionManager { inner };
        if let Err(e) = manager.refresh().await {
            warn!(error = %e, "Proactive refresh failed");
        }
    }

    // ===== Refresh =====

    /// Refresh the credential, joining the in-flight refresh if there is one.
    ///
    /// On failure the stored credential is left as it was.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        let pending = {
            let mut inflight = self.inner.inflight_refresh.lock();
            match inflight.as_ref() {
                Some(pending) => {
                    debug!("Joining in-flight refresh");
                    pending.clone()
                }
                None => {
                    let manager = self.clone();
                    let session = Arc::downgrade(&self.inner);
                    let pending = tokio::spawn(async move {
                        let result = manager.refresh_once().await;
                        manager.inner.inflight_refresh.lock().take();
                        result
                    })
                    .map(move |joined| {
                        joined.unwrap_or_else(|e| {
                            if let Some(inner) = session.upgrade() {
                                inner.inflight_refresh.lock().take();
                            }
                            Err(SessionError::RefreshFailed(format!("refresh task failed: {}", e)))
                        })
                    })
                    .boxed()
                    .shared();
                    *inflight = Some(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    async fn refresh_once(&self) -> Result<(), SessionError> {
        let generation = self.inner.generation.load(Ordering::Acquire);
        debug!("Requesting credential refresh");

        let response = self
            .inner
            .http
            .request(REFRESH_PATH, &RequestOptions::post())
            .await
            .map_err(|e| SessionError::RefreshFailed(e.to_string()))?;

        if !response.ok {
            return Err(SessionError::RefreshFailed(format!(
                "refresh rejected with HTTP {}",
                response.status.as_u16()
            )));
        }

        let token = extract_access_token(&response.body).ok_or_else(|| {
            SessionError::RefreshFailed("refresh response carried no access token".to_string())
        })?;

        if !self.write_credential(Some(Credential::new(token)), Some(generation)) {
            debug!("Session ended during refresh, discarding new credential");
            return Err(SessionError::RefreshFailed(
                "session ended while refresh was in flight".to_string(),
            ));
        }

        info!("Credential refreshed");
        Ok(())
    }

    /// True if a credential is held, or one refresh produced one.
    pub async fn ensure_credential(&self) -> bool {
        if self.inner.store.is_present() {
            return true;
        }
        match self.refresh().await {
            Ok(()) => self.inner.store.is_present(),
            Err(e) => {
                debug!(error = %e, "Could not obtain a credential");
                false
            }
        }
    }

    // ===== Login / logout =====

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, AuthError> {
        self.authenticate(AuthAction::Login, username, password).await
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<LoginResponse, AuthError> {
        self.authenticate(AuthAction::Register, username, password).await
    }

    async fn authenticate(
        &self,
        action: AuthAction,
        username: &str,
        password: &str,
    ) -> Result<LoginResponse, AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let path = match action {
            AuthAction::Login => LOGIN_PATH,
            AuthAction::Register => REGISTER_PATH,
        };
        let options = RequestOptions::post().json(json!({
            "username": username,
            "password": password,
        }));

        let response = self.inner.http.request(path, &options).await?;
        if !response.ok {
            let status = response.status.as_u16();
            warn!(action = action.as_str(), status, "Authentication rejected");
            return Err(AuthError::from_status(action, status, &response.body));
        }

        let login: LoginResponse = response
            .body
            .deserialize()
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        self.set_credential(Some(Credential::new(login.token.clone())));
        info!(action = action.as_str(), username, "Authenticated");
        Ok(login)
    }

    /// End the session. Always clears local state; the server call is best
    /// effort.
    pub async fn logout(&self) {
        let options = RequestOptions::post();
        let remote = self.inner.http.request(LOGOUT_PATH, &options);
        match tokio::time::timeout(self.inner.logout_timeout, remote).await {
            Ok(Ok(response)) => debug!(status = response.status.as_u16(), "Remote logout completed"),
            Ok(Err(e)) => debug!(error = %e, "Remote logout failed, clearing local session anyway"),
            Err(_) => debug!("Remote logout timed out, clearing local session anyway"),
        }

        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        self.set_credential(None);
        info!("Logged out");
    }

    /// Whether a proactive refresh timer is currently armed
    pub fn has_refresh_timer(&self) -> bool {
        self.inner.refresh_timer.lock().is_some()
    }
}
