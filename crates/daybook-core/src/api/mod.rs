//! REST API client module for the daybook journal service.
//!
//! This module provides:
//! - `HttpClient`: the generic request primitive (never fails on status)
//! - `AuthedClient`: bearer-authenticated requests with one
//!   refresh-and-retry cycle on 401
//! - `JournalApi`: the journal endpoints
//!
//! The service uses short-lived bearer tokens; the refresh state lives in a
//! cookie held by the client's cookie store.

pub mod authed;
pub mod error;
pub mod http;
pub mod journal;

pub use authed::AuthedClient;
pub use error::ApiError;
pub use http::{ApiResponse, HttpClient, Parser, RequestOptions, ResponseBody};
pub use journal::{date_key, DayEntries, DayEntriesOptions, Journal, JournalApi, JournalDraft};
