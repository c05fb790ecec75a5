//! Journal endpoints.

use chrono::NaiveDate;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ApiError, AuthedClient, RequestOptions};

const JOURNALS_PATH: &str = "/journals";
const DAY_ENTRIES_PATH: &str = "/journals/by-day";

/// Timezone used to bucket entries into days when none is configured
pub const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Journal {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub mood: Vec<String>,
}

impl Journal {
    pub fn title_display(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ => "(untitled)",
        }
    }
}

/// Body of a create or update request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JournalDraft {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub mood: Vec<String>,
}

impl JournalDraft {
    pub fn new(title: &str, content: impl Into<String>) -> Self {
        Self {
            title: title.trim().to_string(),
            content: content.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DayEntriesOptions {
    /// Preview size; `None` or 0 fetches the whole day
    pub limit: Option<usize>,
    pub tz: Option<String>,
    pub cancel: Option<CancellationToken>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayEntries {
    pub items: Vec<Journal>,
    /// Only meaningful with a limit: the preview may be cut short
    pub has_more: bool,
}

/// Format a date as the `YYYY-MM-DD` key the API expects
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[derive(Clone)]
pub struct JournalApi {
    client: AuthedClient,
}

impl JournalApi {
    pub fn new(client: AuthedClient) -> Self {
        Self { client }
    }

    /// Fetch the journal entries written on `date`.
    pub async fn day_entries(&self, date: NaiveDate, options: DayEntriesOptions) -> Result<DayEntries, ApiError> {
        let limit = options.limit.filter(|limit| *limit > 0);
        let request = Self::day_entries_request(date, limit, options.tz.as_deref(), options.cancel);

        let items: Vec<Journal> = match self.client.authed_json(DAY_ENTRIES_PATH, request).await {
            Ok(items) => items,
            Err(ApiError::EmptyResult) => {
                debug!(date = %date_key(date), "No journals found");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let has_more = limit.is_some_and(|limit| items.len() >= limit);
        Ok(DayEntries { items, has_more })
    }

    /// Create a journal entry. The server must assign an id.
    pub async fn create(&self, draft: &JournalDraft) -> Result<Journal, ApiError> {
        let request = RequestOptions::post().json(Self::draft_body(draft)?);
        let created: Journal = self.client.authed_json(JOURNALS_PATH, request).await?;
        if created.id.is_none() {
            return Err(ApiError::InvalidResponse(
                "server did not return new journal id".to_string(),
            ));
        }
        debug!(id = ?created.id, "Journal created");
        Ok(created)
    }

    pub async fn update(&self, id: &str, draft: &JournalDraft) -> Result<Journal, ApiError> {
        let request = RequestOptions::method(Method::PUT).json(Self::draft_body(draft)?);
        self.client.authed_json(&Self::journal_path(id), request).await
    }

    /// Delete a journal entry. A 204 answer is the normal outcome here.
    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let request = RequestOptions::method(Method::DELETE);
        match self.client.authed(&Self::journal_path(id), request).await {
            Ok(_) | Err(ApiError::EmptyResult) => {
                debug!(id, "Journal deleted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn journal_path(id: &str) -> String {
        format!("{}/{}", JOURNALS_PATH, id)
    }

    fn draft_body(draft: &JournalDraft) -> Result<serde_json::Value, ApiError> {
        serde_json::to_value(draft).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    fn day_entries_request(
        date: NaiveDate,
        limit: Option<usize>,
        tz: Option<&str>,
        cancel: Option<CancellationToken>,
    ) -> RequestOptions {
        let mut request = RequestOptions::get()
            .query("date", date_key(date))
            .query("tz", tz.unwrap_or(DEFAULT_TIMEZONE));
        if let Some(limit) = limit {
            request = request.query("limit", limit.to_string());
        }
        if let Some(cancel) = cancel {
            request = request.cancel(cancel);
        }
        request
    }
}
