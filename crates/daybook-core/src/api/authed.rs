//! Authenticated requests with one refresh-and-retry cycle.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::SessionManager;

use super::{ApiError, ApiResponse, HttpClient, RequestOptions, ResponseBody};

/// Sends requests with the session's bearer credential.
///
/// A 401 triggers exactly one refresh followed by exactly one retry; a
/// session the server keeps rejecting fails instead of looping.
#[derive(Clone)]
pub struct AuthedClient {
    http: HttpClient,
    session: SessionManager,
}

impl AuthedClient {
    pub fn new(http: HttpClient, session: SessionManager) -> Self {
        Self { http, session }
    }

    /// Perform an authenticated request and return the parsed body.
    pub async fn authed(&self, path: &str, options: RequestOptions) -> Result<ResponseBody, ApiError> {
        let store = self.session.credential_store();
        let Some(credential) = store.get() else {
            return Err(ApiError::NotAuthenticated);
        };

        let mut options = options;
        options.token = Some(credential.as_str().to_string());
        let response = self.http.request(path, &options).await?;

        if response.status != StatusCode::UNAUTHORIZED {
            return Self::classify(response);
        }

        // A cancelled caller must not start a refresh on its way out
        if options.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        debug!(path, "Credential rejected, refreshing before retry");
        // Cancelling stops waiting; the shared refresh keeps running for others
        let refreshed = match options.cancel {
            Some(ref cancel) => tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(path, "Request cancelled during refresh");
                    return Err(ApiError::Cancelled);
                }
                result = self.session.refresh() => result,
            },
            None => self.session.refresh().await,
        };
        let refresh_error = refreshed.err();
        if let Some(ref e) = refresh_error {
            warn!(path, error = %e, "Refresh after 401 failed");
            self.session.invalidate(&credential);
        }

        let Some(renewed) = store.get() else {
            return Err(ApiError::RefreshFailed(
                refresh_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no credential after refresh".to_string()),
            ));
        };

        options.token = Some(renewed.as_str().to_string());
        let response = self.http.request(path, &options).await?;
        Self::classify(response)
    }

    /// Perform an authenticated request and deserialize the JSON body.
    pub async fn authed_json<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let body = self.authed(path, options).await?;
        body.deserialize()
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", path, e)))
    }

    /// 204 is a distinguished empty result; other 2xx return the body.
    fn classify(response: ApiResponse) -> Result<ResponseBody, ApiError> {
        if response.status == StatusCode::NO_CONTENT {
            Err(ApiError::EmptyResult)
        } else if response.ok {
            Ok(response.body)
        } else {
            Err(ApiError::from_response(response.status, response.body))
        }
    }
}
