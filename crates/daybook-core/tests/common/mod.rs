//! Common Test Utilities for Integration Tests
//!
//! Shared helpers used across integration test modules.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use daybook_core::api::{AuthedClient, HttpClient};
use daybook_core::auth::scheduler::Task;
use daybook_core::auth::{
    CredentialStore, ScheduledTask, Scheduler, SessionManager, SessionOptions,
};
use parking_lot::Mutex;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Signed-token lookalike whose payload carries `exp`
pub fn token_expiring_at(exp: i64, subject: &str) -> String {
    format!(
        "{}.{}.signature",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(json!({"sub": subject, "exp": exp}).to_string())
    )
}

pub fn token_expiring_in(secs: i64, subject: &str) -> String {
    token_expiring_at(Utc::now().timestamp() + secs, subject)
}

pub fn http_for(server: &MockServer) -> HttpClient {
    HttpClient::with_timeout(server.uri(), Duration::from_secs(5)).expect("http client")
}

/// Session backed by the real Tokio timer
pub fn session_for(server: &MockServer) -> SessionManager {
    SessionManager::new(http_for(server), CredentialStore::new())
}

pub fn session_with_scheduler(server: &MockServer, scheduler: Arc<RecordingScheduler>) -> SessionManager {
    session_with_options(
        server,
        SessionOptions {
            scheduler,
            ..Default::default()
        },
    )
}

pub fn session_with_options(server: &MockServer, options: SessionOptions) -> SessionManager {
    SessionManager::with_options(http_for(server), CredentialStore::new(), options)
}

pub fn authed_for(server: &MockServer) -> (SessionManager, AuthedClient) {
    let session = session_for(server);
    let client = AuthedClient::new(http_for(server), session.clone());
    (session, client)
}

/// Mount a refresh endpoint answering with `accessToken`
pub async fn mount_refresh_ok(server: &MockServer, token: &str, delay: Duration, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"accessToken": token}))
                .set_delay(delay),
        )
        .expect(expected)
        .mount(server)
        .await;
}

pub async fn mount_refresh_status(server: &MockServer, status: u16, delay: Duration, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(status)
                .set_body_json(json!({"message": "refresh cookie missing"}))
                .set_delay(delay),
        )
        .expect(expected)
        .mount(server)
        .await;
}

pub async fn refresh_calls(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/auth/refresh")
        .count()
}

/// A timer that never fires on its own. Tests inspect the requested delays
/// and run the tasks by hand.
#[derive(Default)]
pub struct RecordingScheduler {
    scheduled: Mutex<Vec<Recorded>>,
}

struct Recorded {
    delay: Duration,
    task: Option<Task>,
    cancelled: Arc<AtomicBool>,
}

impl Scheduler for RecordingScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.scheduled.lock().push(Recorded {
            delay,
            task: Some(task),
            cancelled: cancelled.clone(),
        });
        ScheduledTask::new(move || cancelled.store(true, Ordering::SeqCst))
    }
}

impl RecordingScheduler {
    pub fn count(&self) -> usize {
        self.scheduled.lock().len()
    }

    pub fn delay(&self, index: usize) -> Duration {
        self.scheduled.lock()[index].delay
    }

    pub fn is_cancelled(&self, index: usize) -> bool {
        self.scheduled.lock()[index].cancelled.load(Ordering::SeqCst)
    }

    /// Run the task as if its timer fired
    pub async fn fire(&self, index: usize) {
        let task = self.scheduled.lock()[index].task.take().expect("task already fired");
        task.await;
    }
}
