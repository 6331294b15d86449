use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::storage::config::GoogleConfig;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const API_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";
const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
    List,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create event",
            Operation::Update => "update event",
            Operation::Delete => "delete event",
            Operation::List => "list events",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Google Calendar not configured")]
    NotConfigured,
    #[error("Token request rejected with status {status}: {body}")]
    TokenExchangeFailed { status: u16, body: String },
    #[error("Google Calendar {operation} failed with status {status}: {body}")]
    ProviderCallFailed {
        operation: Operation,
        status: u16,
        body: String,
    },
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Event in the provider's JSON shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: RemoteDateTime,
    pub end: RemoteDateTime,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDateTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    /// Set instead of `date_time` for all-day events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct EventListResponse {
    items: Option<Vec<RemoteEvent>>,
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

/// Calls made against the external calendar provider. Each call is a
/// single request; failures surface to the caller without retries.
#[async_trait]
pub trait CalendarApi: Send + Sync {
    fn auth_url(&self, state: &str) -> Result<String, ApiError>;

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ApiError>;

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedToken, ApiError>;

    async fn create_event(&self, access_token: &str, event: &RemoteEvent) -> Result<String, ApiError>;

    async fn update_event(
        &self,
        access_token: &str,
        event_id: &str,
        event: &RemoteEvent,
    ) -> Result<(), ApiError>;

    async fn delete_event(&self, access_token: &str, event_id: &str) -> Result<(), ApiError>;

    async fn list_events(
        &self,
        access_token: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<RemoteEvent>, ApiError>;
}

pub struct GoogleCalendarClient {
    config: GoogleConfig,
    auth_url: String,
    token_url: String,
    base_url: String,
    client: reqwest::Client,
}

impl GoogleCalendarClient {
    pub fn new(config: GoogleConfig) -> Self {
        Self {
            config,
            auth_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            base_url: API_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_token_url(mut self, token_url: String) -> Self {
        self.token_url = token_url;
        self
    }

    fn ensure_configured(&self) -> Result<(), ApiError> {
        if self.config.is_configured() {
            Ok(())
        } else {
            Err(ApiError::NotConfigured)
        }
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(&self.config.calendar_id)
        )
    }

    fn event_url(&self, event_id: &str) -> String {
        format!("{}/{}", self.events_url(), urlencoding::encode(event_id))
    }

    async fn post_token_form<T>(&self, params: &[(&str, &str)]) -> Result<T, ApiError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self.client.post(&self.token_url).form(params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            tracing::error!("Token endpoint rejected grant. Status: {}, Body: {}", status, body);
            return Err(ApiError::TokenExchangeFailed {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    async fn check_status(
        response: reqwest::Response,
        operation: Operation,
    ) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        tracing::info!("{} response status: {}", operation, status);

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await?;
        tracing::error!("Failed to {}. Status: {}, Body: {}", operation, status, body);
        Err(ApiError::ProviderCallFailed {
            operation,
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl CalendarApi for GoogleCalendarClient {
    fn auth_url(&self, state: &str) -> Result<String, ApiError> {
        self.ensure_configured()?;

        Ok(format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
            self.auth_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(CALENDAR_SCOPE),
            urlencoding::encode(state)
        ))
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ApiError> {
        self.ensure_configured()?;

        tracing::info!("Exchanging authorization code for tokens");
        self.post_token_form(&[
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ])
        .await
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedToken, ApiError> {
        self.ensure_configured()?;

        tracing::info!("Refreshing access token");
        self.post_token_form(&[
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn create_event(&self, access_token: &str, event: &RemoteEvent) -> Result<String, ApiError> {
        let url = self.events_url();

        tracing::info!("Creating remote event: {:?}", event.summary);
        tracing::debug!("POST {} with payload: {:?}", url, event);

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await?;

        let created: CreatedEvent = Self::check_status(response, Operation::Create)
            .await?
            .json()
            .await?;
        tracing::info!("Remote event created with ID: {}", created.id);

        Ok(created.id)
    }

    async fn update_event(
        &self,
        access_token: &str,
        event_id: &str,
        event: &RemoteEvent,
    ) -> Result<(), ApiError> {
        let url = self.event_url(event_id);

        tracing::info!("Updating remote event {}: {:?}", event_id, event.summary);
        tracing::debug!("PUT {} with payload: {:?}", url, event);

        let response = self
            .client
            .put(&url)
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await?;

        Self::check_status(response, Operation::Update).await?;
        Ok(())
    }

    async fn delete_event(&self, access_token: &str, event_id: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.event_url(event_id))
            .bearer_auth(access_token)
            .send()
            .await?;

        Self::check_status(response, Operation::Delete).await?;
        Ok(())
    }

    async fn list_events(
        &self,
        access_token: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<RemoteEvent>, ApiError> {
        let time_min = time_min.to_rfc3339_opts(SecondsFormat::Secs, true);
        let time_max = time_max.to_rfc3339_opts(SecondsFormat::Secs, true);

        tracing::info!("Fetching remote events from {} to {}", time_min, time_max);

        let response = self
            .client
            .get(self.events_url())
            .bearer_auth(access_token)
            .query(&[
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
            ])
            .send()
            .await?;

        let list: EventListResponse = Self::check_status(response, Operation::List)
            .await?
            .json()
            .await?;
        let events = list.items.unwrap_or_default();

        tracing::info!("Fetched {} remote events", events.len());
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> GoogleConfig {
        GoogleConfig {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            redirect_uri: "https://family.example/auth/google-callback".to_string(),
            calendar_id: "primary".to_string(),
            time_zone: "America/New_York".to_string(),
        }
    }

    fn client_for(server: &MockServer) -> GoogleCalendarClient {
        GoogleCalendarClient::new(test_config())
            .with_base_url(server.uri())
            .with_token_url(format!("{}/token", server.uri()))
    }

    fn remote_event(summary: &str) -> RemoteEvent {
        RemoteEvent {
            id: None,
            summary: Some(summary.to_string()),
            description: Some(String::new()),
            start: RemoteDateTime {
                date_time: Some("2026-10-20T17:00:00+00:00".to_string()),
                date: None,
                time_zone: Some("America/New_York".to_string()),
            },
            end: RemoteDateTime {
                date_time: Some("2026-10-20T18:00:00+00:00".to_string()),
                date: None,
                time_zone: Some("America/New_York".to_string()),
            },
        }
    }

    #[test]
    fn google_calendar_client_has_default_urls() {
        let client = GoogleCalendarClient::new(test_config());

        assert_eq!(client.base_url, "https://www.googleapis.com/calendar/v3");
        assert_eq!(client.token_url, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn auth_url_carries_offline_consent_and_state() {
        let client = GoogleCalendarClient::new(test_config());

        let url = client.auth_url("state-token").unwrap();

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains(
            "redirect_uri=https%3A%2F%2Ffamily.example%2Fauth%2Fgoogle-callback"
        ));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fcalendar"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.ends_with("state=state-token"));
    }

    #[test]
    fn auth_url_requires_credentials() {
        let mut config = test_config();
        config.redirect_uri = String::new();
        let client = GoogleCalendarClient::new(config);

        let result = client.auth_url("state");

        assert!(matches!(result, Err(ApiError::NotConfigured)));
    }

    #[test]
    fn remote_event_serializes_in_provider_shape() {
        let value = serde_json::to_value(remote_event("Dinner")).unwrap();

        assert_eq!(
            value,
            json!({
                "summary": "Dinner",
                "description": "",
                "start": {"dateTime": "2026-10-20T17:00:00+00:00", "timeZone": "America/New_York"},
                "end": {"dateTime": "2026-10-20T18:00:00+00:00", "timeZone": "America/New_York"}
            })
        );
    }

    #[tokio::test]
    async fn exchange_code_posts_authorization_code_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-1",
                "refresh_token": "refresh-1",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let grant = client_for(&server).exchange_code("abc").await.unwrap();

        assert_eq!(
            grant,
            TokenGrant {
                access_token: "access-1".to_string(),
                refresh_token: Some("refresh-1".to_string()),
                expires_in: 3599,
            }
        );
    }

    #[tokio::test]
    async fn exchange_code_failure_is_token_exchange_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let result = client_for(&server).exchange_code("bad").await;

        match result {
            Err(ApiError::TokenExchangeFailed { status, body }) => {
                assert_eq!(status, 400);
                assert_eq!(body, "invalid_grant");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn refresh_posts_refresh_token_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-2",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let refreshed = client_for(&server)
            .refresh_access_token("refresh-1")
            .await
            .unwrap();

        assert_eq!(refreshed.access_token, "access-2");
        assert_eq!(refreshed.expires_in, 3600);
    }

    #[tokio::test]
    async fn create_event_returns_remote_id() {
        let server = MockServer::start().await;
        let event = remote_event("Dinner");
        Mock::given(method("POST"))
            .and(path("/calendars/primary/events"))
            .and(header("authorization", "Bearer access-1"))
            .and(body_json(&event))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "g1"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = client_for(&server)
            .create_event("access-1", &event)
            .await
            .unwrap();

        assert_eq!(id, "g1");
    }

    #[tokio::test]
    async fn update_event_puts_to_event_url() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/calendars/primary/events/g1"))
            .and(header("authorization", "Bearer access-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "g1"})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .update_event("access-1", "g1", &remote_event("Dinner"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_event_failure_is_provider_call_failed() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/calendars/primary/events/g1"))
            .respond_with(ResponseTemplate::new(410).set_body_string("gone"))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server).delete_event("access-1", "g1").await;

        assert!(matches!(
            result,
            Err(ApiError::ProviderCallFailed {
                operation: Operation::Delete,
                status: 410,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn list_events_requests_single_events_in_window() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(query_param("timeMin", "2026-10-18T00:00:00Z"))
            .and(query_param("timeMax", "2026-11-17T00:00:00Z"))
            .and(query_param("singleEvents", "true"))
            .and(query_param("orderBy", "startTime"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {
                        "id": "g1",
                        "summary": "A",
                        "start": {"dateTime": "2026-10-19T10:00:00Z"},
                        "end": {"dateTime": "2026-10-19T11:00:00Z"}
                    },
                    {
                        "id": "g2",
                        "start": {"date": "2026-10-21"},
                        "end": {"date": "2026-10-22"}
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let time_min = "2026-10-18T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let time_max = time_min + chrono::Duration::days(30);
        let events = client_for(&server)
            .list_events("access-1", time_min, time_max)
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id.as_deref(), Some("g1"));
        assert_eq!(events[1].summary, None);
        assert_eq!(events[1].start.date.as_deref(), Some("2026-10-21"));
    }

    #[tokio::test]
    async fn list_events_without_items_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kind": "calendar#events"})))
            .mount(&server)
            .await;

        let now = Utc::now();
        let events = client_for(&server)
            .list_events("access-1", now, now + chrono::Duration::days(1))
            .await
            .unwrap();

        assert!(events.is_empty());
    }
}
