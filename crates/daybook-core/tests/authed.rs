//! Authenticated request and journal API tests against a mock service.

use std::time::Duration;

use chrono::NaiveDate;
use daybook_core::api::{DayEntriesOptions, JournalApi, JournalDraft, RequestOptions, ResponseBody};
use daybook_core::{ApiError, Credential};
use futures::future::join_all;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::*;

const JOURNALS: &str = "/journals/by-day";

async fn mount_journals(server: &MockServer, bearer: &str, response: ResponseTemplate, expected: u64) {
    Mock::given(method("GET"))
        .and(path(JOURNALS))
        .and(header("authorization", format!("Bearer {}", bearer).as_str()))
        .respond_with(response)
        .expect(expected)
        .mount(server)
        .await;
}

fn journals_json() -> serde_json::Value {
    json!([
        {"id": "j1", "title": "Morning pages", "mood": ["calm"]},
        {"id": "j2", "title": "Standup notes", "tags": ["work"]}
    ])
}

mod authed_requests {
    use super::*;

    #[tokio::test]
    async fn missing_credential_fails_without_request() {
        let server = MockServer::start().await;
        let (_session, client) = authed_for(&server);

        let err = client
            .authed(JOURNALS, RequestOptions::get())
            .await
            .expect_err("no credential");
        assert!(matches!(err, ApiError::NotAuthenticated));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn attaches_bearer_credential() {
        let server = MockServer::start().await;
        mount_journals(&server, "t1", ResponseTemplate::new(200).set_body_json(journals_json()), 1).await;

        let (session, client) = authed_for(&server);
        session.set_credential(Some(Credential::new("t1")));

        let body = client.authed(JOURNALS, RequestOptions::get()).await.expect("success");
        assert_eq!(body, ResponseBody::Json(journals_json()));
    }

    #[tokio::test]
    async fn expired_credential_is_refreshed_and_retried_once() {
        let server = MockServer::start().await;
        mount_journals(&server, "expired", ResponseTemplate::new(401), 1).await;
        mount_journals(&server, "renewed", ResponseTemplate::new(200).set_body_json(journals_json()), 1).await;
        mount_refresh_ok(&server, "renewed", Duration::ZERO, 1).await;

        let (session, client) = authed_for(&server);
        session.set_credential(Some(Credential::new("expired")));

        let body = client.authed(JOURNALS, RequestOptions::get()).await.expect("retried success");
        assert_eq!(body, ResponseBody::Json(journals_json()));
        assert_eq!(session.credential_store().get(), Some(Credential::new("renewed")));
        server.verify().await;
    }

    #[tokio::test]
    async fn failing_refresh_surfaces_refresh_failed_without_retry() {
        let server = MockServer::start().await;
        mount_journals(&server, "expired", ResponseTemplate::new(401), 1).await;
        mount_refresh_status(&server, 401, Duration::ZERO, 1).await;

        let (session, client) = authed_for(&server);
        session.set_credential(Some(Credential::new("expired")));

        let err = client
            .authed(JOURNALS, RequestOptions::get())
            .await
            .expect_err("refresh failed");
        assert!(matches!(err, ApiError::RefreshFailed(_)), "got {err:?}");
        assert!(!session.is_authenticated());
        server.verify().await;
    }

    #[tokio::test]
    async fn second_rejection_is_not_retried_again() {
        let server = MockServer::start().await;
        mount_journals(&server, "expired", ResponseTemplate::new(401), 1).await;
        mount_journals(
            &server,
            "renewed",
            ResponseTemplate::new(401).set_body_json(json!({"error": "session revoked"})),
            1,
        )
        .await;
        mount_refresh_ok(&server, "renewed", Duration::ZERO, 1).await;

        let (session, client) = authed_for(&server);
        session.set_credential(Some(Credential::new("expired")));

        let err = client
            .authed(JOURNALS, RequestOptions::get())
            .await
            .expect_err("still unauthorized");
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.to_string(), "session revoked");
        server.verify().await;
    }

    #[tokio::test]
    async fn burst_of_rejections_triggers_one_refresh() {
        let server = MockServer::start().await;
        mount_journals(&server, "expired", ResponseTemplate::new(401), 5).await;
        mount_journals(&server, "renewed", ResponseTemplate::new(200).set_body_json(json!([])), 5).await;
        mount_refresh_ok(&server, "renewed", Duration::from_millis(300), 1).await;

        let (session, client) = authed_for(&server);
        session.set_credential(Some(Credential::new("expired")));

        let results = join_all((0..5).map(|_| {
            let client = client.clone();
            async move { client.authed(JOURNALS, RequestOptions::get()).await }
        }))
        .await;

        assert!(results.iter().all(|r| r.is_ok()), "results: {results:?}");
        assert_eq!(refresh_calls(&server).await, 1);
    }

    #[tokio::test]
    async fn no_content_is_empty_result() {
        let server = MockServer::start().await;
        mount_journals(&server, "t1", ResponseTemplate::new(204), 1).await;

        let (session, client) = authed_for(&server);
        session.set_credential(Some(Credential::new("t1")));

        let err = client
            .authed(JOURNALS, RequestOptions::get())
            .await
            .expect_err("204");
        assert!(err.is_empty_result());
    }

    #[tokio::test]
    async fn other_failures_carry_status_and_payload() {
        let server = MockServer::start().await;
        mount_journals(
            &server,
            "t1",
            ResponseTemplate::new(422).set_body_json(json!({"message": "tz is invalid"})),
            1,
        )
        .await;

        let (session, client) = authed_for(&server);
        session.set_credential(Some(Credential::new("t1")));

        match client.authed(JOURNALS, RequestOptions::get()).await {
            Err(ApiError::Http { status, message, payload }) => {
                assert_eq!(status, 422);
                assert_eq!(message, "tz is invalid");
                assert_eq!(payload, ResponseBody::Json(json!({"message": "tz is invalid"})));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn text_error_body_falls_back_to_generic_message() {
        let server = MockServer::start().await;
        mount_journals(
            &server,
            "t1",
            ResponseTemplate::new(502).set_body_string("Bad Gateway"),
            1,
        )
        .await;

        let (session, client) = authed_for(&server);
        session.set_credential(Some(Credential::new("t1")));

        let err = client
            .authed(JOURNALS, RequestOptions::get())
            .await
            .expect_err("502");
        assert_eq!(err.to_string(), "HTTP 502");
    }

    #[tokio::test]
    async fn cancelled_request_aborts_and_skips_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JOURNALS))
            .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;
        mount_refresh_ok(&server, "renewed", Duration::ZERO, 0).await;

        let (session, client) = authed_for(&server);
        session.set_credential(Some(Credential::new("expired")));

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let err = client
            .authed(JOURNALS, RequestOptions::get().cancel(cancel))
            .await
            .expect_err("cancelled");
        assert!(matches!(err, ApiError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(refresh_calls(&server).await, 0);
        assert_eq!(session.credential_store().get(), Some(Credential::new("expired")));
    }

    #[tokio::test]
    async fn cancel_during_refresh_returns_promptly() {
        let server = MockServer::start().await;
        mount_journals(&server, "expired", ResponseTemplate::new(401), 1).await;
        mount_refresh_ok(&server, "renewed", Duration::from_secs(3), 1).await;

        let (session, client) = authed_for(&server);
        session.set_credential(Some(Credential::new("expired")));

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let err = client
            .authed(JOURNALS, RequestOptions::get().cancel(cancel))
            .await
            .expect_err("cancelled");
        assert!(matches!(err, ApiError::Cancelled), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
        assert_eq!(refresh_calls(&server).await, 1);
    }

    #[tokio::test]
    async fn caller_content_type_replaces_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/journals/import"))
            .and(header("content-type", "text/markdown"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let (session, client) = authed_for(&server);
        session.set_credential(Some(Credential::new("t1")));

        client
            .authed(
                "/journals/import",
                RequestOptions::post()
                    .json(json!({"doc": "# today"}))
                    .header("Content-Type", "text/markdown"),
            )
            .await
            .expect("success");

        let requests = server.received_requests().await.unwrap_or_default();
        let content_types: Vec<_> = requests[0].headers.get_all("content-type").iter().collect();
        assert_eq!(content_types.len(), 1);
    }
}

mod journal_api {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date")
    }

    #[tokio::test]
    async fn day_entries_preview_reports_more() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JOURNALS))
            .and(query_param("date", "2026-10-19"))
            .and(query_param("tz", "America/Los_Angeles"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(journals_json()))
            .expect(1)
            .mount(&server)
            .await;

        let (session, client) = authed_for(&server);
        session.set_credential(Some(Credential::new("t1")));
        let journals = JournalApi::new(client);

        let options = DayEntriesOptions {
            limit: Some(2),
            ..Default::default()
        };
        let entries = journals.day_entries(day(), options).await.expect("entries");
        assert_eq!(entries.items.len(), 2);
        assert_eq!(entries.items[0].title_display(), "Morning pages");
        assert!(entries.has_more);
    }

    #[tokio::test]
    async fn full_day_has_no_more() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JOURNALS))
            .and(query_param("tz", "Europe/Paris"))
            .respond_with(ResponseTemplate::new(200).set_body_json(journals_json()))
            .mount(&server)
            .await;

        let (session, client) = authed_for(&server);
        session.set_credential(Some(Credential::new("t1")));
        let journals = JournalApi::new(client);

        let options = DayEntriesOptions {
            tz: Some("Europe/Paris".to_string()),
            ..Default::default()
        };
        let entries = journals.day_entries(day(), options).await.expect("entries");
        assert_eq!(entries.items.len(), 2);
        assert!(!entries.has_more);
    }

    #[tokio::test]
    async fn no_content_is_an_empty_day() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JOURNALS))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let (session, client) = authed_for(&server);
        session.set_credential(Some(Credential::new("t1")));
        let journals = JournalApi::new(client);

        let entries = journals
            .day_entries(day(), DayEntriesOptions::default())
            .await
            .expect("empty day");
        assert!(entries.items.is_empty());
        assert!(!entries.has_more);
    }

    #[tokio::test]
    async fn create_posts_draft() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/journals"))
            .and(header("authorization", "Bearer t1"))
            .and(body_json(json!({"title": "Evening", "content": "<p>done</p>", "tags": [], "mood": []})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "j9", "title": "Evening"})))
            .expect(1)
            .mount(&server)
            .await;

        let (session, client) = authed_for(&server);
        session.set_credential(Some(Credential::new("t1")));
        let journals = JournalApi::new(client);

        let created = journals
            .create(&JournalDraft::new(" Evening ", "<p>done</p>"))
            .await
            .expect("created");
        assert_eq!(created.id.as_deref(), Some("j9"));
    }

    #[tokio::test]
    async fn create_without_id_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/journals"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"title": "Evening"})))
            .mount(&server)
            .await;

        let (session, client) = authed_for(&server);
        session.set_credential(Some(Credential::new("t1")));
        let journals = JournalApi::new(client);

        let err = journals
            .create(&JournalDraft::new("Evening", ""))
            .await
            .expect_err("no id");
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn create_retries_once_after_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/journals"))
            .and(header("authorization", "Bearer expired"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/journals"))
            .and(header("authorization", "Bearer renewed"))
            .and(body_json(json!({"title": "Retry", "content": "", "tags": [], "mood": []})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "j10"})))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh_ok(&server, "renewed", Duration::ZERO, 1).await;

        let (session, client) = authed_for(&server);
        session.set_credential(Some(Credential::new("expired")));
        let journals = JournalApi::new(client);

        let created = journals
            .create(&JournalDraft::new("Retry", ""))
            .await
            .expect("created after refresh");
        assert_eq!(created.id.as_deref(), Some("j10"));
        server.verify().await;
    }

    #[tokio::test]
    async fn update_puts_draft_to_entry() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/journals/j1"))
            .and(body_json(json!({"title": "Renamed", "content": "<p>x</p>", "tags": [], "mood": []})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "j1", "title": "Renamed"})))
            .expect(1)
            .mount(&server)
            .await;

        let (session, client) = authed_for(&server);
        session.set_credential(Some(Credential::new("t1")));
        let journals = JournalApi::new(client);

        let updated = journals
            .update("j1", &JournalDraft::new("Renamed", "<p>x</p>"))
            .await
            .expect("updated");
        assert_eq!(updated.title_display(), "Renamed");
    }

    #[tokio::test]
    async fn delete_accepts_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/journals/j1"))
            .and(header("authorization", "Bearer t1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let (session, client) = authed_for(&server);
        session.set_credential(Some(Credential::new("t1")));
        let journals = JournalApi::new(client);

        journals.delete("j1").await.expect("deleted");
    }

    #[tokio::test]
    async fn delete_of_missing_entry_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/journals/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "not found"})))
            .mount(&server)
            .await;

        let (session, client) = authed_for(&server);
        session.set_credential(Some(Credential::new("t1")));
        let journals = JournalApi::new(client);

        let err = journals.delete("gone").await.expect_err("404");
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JOURNALS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": "nope"})))
            .mount(&server)
            .await;

        let (session, client) = authed_for(&server);
        session.set_credential(Some(Credential::new("t1")));
        let journals = JournalApi::new(client);

        let err = journals
            .day_entries(day(), DayEntriesOptions::default())
            .await
            .expect_err("object is not a list");
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }
}
