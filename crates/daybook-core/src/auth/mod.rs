//! Session and credential management.
//!
//! This module provides:
//! - `Credential`: the bearer access token and its decoded expiry
//! - `CredentialStore`: the in-memory holder of the current credential
//! - `SessionManager`: initialization, proactive refresh, single-flight
//!   refresh deduplication, login and logout
//! - `Scheduler`: cancellable one-shot timers used for proactive refresh
//!
//! Credentials are never written to disk. They live as long as the process
//! or until logout.

pub mod credential;
pub mod error;
pub mod scheduler;
pub mod session;
pub mod store;

pub use credential::Credential;
pub use error::{AuthAction, AuthError, SessionError};
pub use scheduler::{ScheduledTask, Scheduler, TokioScheduler};
pub use session::{LoginResponse, SessionManager, SessionOptions};
pub use store::CredentialStore;
