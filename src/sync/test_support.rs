use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

use crate::sync::google_api::{
    ApiError, CalendarApi, Operation, RefreshedToken, RemoteEvent, TokenGrant,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Exchange(String),
    Refresh(String),
    Create { token: String, summary: Option<String> },
    Update { token: String, event_id: String },
    Delete { token: String, event_id: String },
    List { token: String, time_min: DateTime<Utc>, time_max: DateTime<Utc> },
}

/// In-memory provider that records every call it receives.
#[derive(Default)]
pub struct FakeCalendar {
    calls: Mutex<Vec<Call>>,
    remote_events: Vec<RemoteEvent>,
    refresh_fails: bool,
    provider_fails: bool,
    unconfigured: bool,
    expires_in: Option<i64>,
}

impl FakeCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote_events(mut self, events: Vec<RemoteEvent>) -> Self {
        self.remote_events = events;
        self
    }

    pub fn failing_refresh(mut self) -> Self {
        self.refresh_fails = true;
        self
    }

    pub fn failing_provider(mut self) -> Self {
        self.provider_fails = true;
        self
    }

    /// Token endpoint calls fail with `NotConfigured`.
    pub fn unconfigured(mut self) -> Self {
        self.unconfigured = true;
        self
    }

    /// Lifetime reported for exchanged and refreshed tokens (default one hour).
    pub fn with_expires_in(mut self, expires_in: i64) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    fn token_lifetime(&self) -> i64 {
        self.expires_in.unwrap_or(3600)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) -> usize {
        let mut calls = self.calls.lock().unwrap();
        calls.push(call);
        calls.len()
    }

    fn provider_result(&self, operation: Operation) -> Result<(), ApiError> {
        if self.provider_fails {
            Err(ApiError::ProviderCallFailed {
                operation,
                status: 500,
                body: "backend error".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CalendarApi for FakeCalendar {
    fn auth_url(&self, state: &str) -> Result<String, ApiError> {
        Ok(format!("https://auth.example/authorize?state={}", state))
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ApiError> {
        self.record(Call::Exchange(code.to_string()));
        if self.unconfigured {
            return Err(ApiError::NotConfigured);
        }
        Ok(TokenGrant {
            access_token: "exchanged-access".to_string(),
            refresh_token: Some("exchanged-refresh".to_string()),
            expires_in: self.token_lifetime(),
        })
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedToken, ApiError> {
        self.record(Call::Refresh(refresh_token.to_string()));
        if self.unconfigured {
            return Err(ApiError::NotConfigured);
        }
        if self.refresh_fails {
            return Err(ApiError::TokenExchangeFailed {
                status: 400,
                body: "invalid_grant".to_string(),
            });
        }
        Ok(RefreshedToken {
            access_token: "refreshed-token".to_string(),
            expires_in: self.token_lifetime(),
        })
    }

    async fn create_event(&self, access_token: &str, event: &RemoteEvent) -> Result<String, ApiError> {
        let n = self.record(Call::Create {
            token: access_token.to_string(),
            summary: event.summary.clone(),
        });
        self.provider_result(Operation::Create)?;
        Ok(format!("remote-{}", n))
    }

    async fn update_event(
        &self,
        access_token: &str,
        event_id: &str,
        _event: &RemoteEvent,
    ) -> Result<(), ApiError> {
        self.record(Call::Update {
            token: access_token.to_string(),
            event_id: event_id.to_string(),
        });
        self.provider_result(Operation::Update)
    }

    async fn delete_event(&self, access_token: &str, event_id: &str) -> Result<(), ApiError> {
        self.record(Call::Delete {
            token: access_token.to_string(),
            event_id: event_id.to_string(),
        });
        self.provider_result(Operation::Delete)
    }

    async fn list_events(
        &self,
        access_token: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<RemoteEvent>, ApiError> {
        self.record(Call::List {
            token: access_token.to_string(),
            time_min,
            time_max,
        });
        self.provider_result(Operation::List)?;
        Ok(self.remote_events.clone())
    }
}
