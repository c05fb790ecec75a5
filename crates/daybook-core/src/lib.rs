//! Core library for daybook.
//!
//! This crate provides:
//! - `auth`: the in-memory credential store and the session lifecycle
//!   manager (initialization, proactive and single-flight refresh, logout)
//! - `api`: the generic HTTP request primitive, the authenticated client
//!   with refresh-and-retry, and the journal endpoints
//! - `config`: application configuration

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiError, AuthedClient, HttpClient, JournalApi, RequestOptions, ResponseBody};
pub use auth::{AuthError, Credential, CredentialStore, SessionError, SessionManager};
pub use config::Config;

/// The fully wired client stack: one credential store shared by the
/// session manager and the authenticated client.
#[derive(Clone)]
pub struct DaybookClient {
    pub session: SessionManager,
    pub journals: JournalApi,
}

impl DaybookClient {
    /// Build the client stack from configuration.
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let http = HttpClient::with_timeout(&config.api_base, config.request_timeout())?;
        let options = auth::SessionOptions {
            refresh_lead: config.refresh_lead(),
            ..Default::default()
        };
        let session = SessionManager::with_options(http.clone(), CredentialStore::new(), options);
        let journals = JournalApi::new(AuthedClient::new(http, session.clone()));
        Ok(Self { session, journals })
    }
}
