use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::store::{Store, StoreError};
use crate::sync::google_api::{ApiError, CalendarApi};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Google Calendar not connected")]
    NotConnected,
    #[error("Failed to refresh access token: {0}")]
    TokenRefreshFailed(String),
    #[error("Invalid state parameter")]
    InvalidState,
    #[error("Authorization was denied by the provider: {0}")]
    AuthorizationDenied(String),
    #[error("Callback is missing the '{0}' parameter")]
    InvalidCallback(&'static str),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Calendar credentials stored on a member.
///
/// While `sync_enabled` is true an access token is expected to be present;
/// a row that breaks this is treated as not connected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenState {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub sync_enabled: bool,
    pub last_sync: Option<DateTime<Utc>>,
}

impl TokenState {
    pub fn connected(access_token: &str, refresh_token: Option<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: Some(access_token.to_string()),
            refresh_token,
            expires_at: Some(expires_at),
            sync_enabled: true,
            last_sync: None,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            expires_at: None,
            sync_enabled: false,
            last_sync: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.sync_enabled && self.access_token.is_some()
    }

    /// A missing expiry counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at <= now)
    }
}

/// `None` when `expires_in` seconds from now is not a representable instant.
fn expiry_after(expires_in: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(expires_in).and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Disconnected,
    Connected { last_sync: Option<DateTime<Utc>> },
}

/// Reads and refreshes a member's calendar tokens on demand.
///
/// Refresh happens only inside [`TokenManager::ensure_valid_token`], right
/// before the token is used; there is no background refresh.
pub struct TokenManager<'a, A> {
    api: &'a A,
    store: &'a Store,
}

impl<'a, A: CalendarApi> TokenManager<'a, A> {
    pub fn new(api: &'a A, store: &'a Store) -> Self {
        Self { api, store }
    }

    pub async fn ensure_valid_token(&self, member_id: &str) -> Result<String, AuthError> {
        let state = self
            .store
            .load_token_state(member_id)?
            .filter(TokenState::is_connected)
            .ok_or(AuthError::NotConnected)?;

        let now = Utc::now();
        if !state.is_expired_at(now) {
            return state.access_token.ok_or(AuthError::NotConnected);
        }

        tracing::info!("Access token for member {} expired, refreshing", member_id);

        let refresh_token = state.refresh_token.ok_or_else(|| {
            tracing::warn!("Member {} has no refresh token stored", member_id);
            AuthError::TokenRefreshFailed("no refresh token stored".to_string())
        })?;

        let refreshed = match self.api.refresh_access_token(&refresh_token).await {
            Ok(refreshed) => refreshed,
            // Passes through unchanged; the stored tokens are not at fault.
            Err(ApiError::NotConfigured) => return Err(ApiError::NotConfigured.into()),
            Err(err) => {
                // The connection stays enabled so the member can retry or disconnect.
                tracing::warn!("Token refresh failed for member {}: {}", member_id, err);
                return Err(AuthError::TokenRefreshFailed(err.to_string()));
            }
        };

        let Some(expires_at) = expiry_after(refreshed.expires_in) else {
            tracing::warn!(
                "Refreshed token for member {} has unusable lifetime {}s",
                member_id,
                refreshed.expires_in
            );
            return Err(AuthError::TokenRefreshFailed(format!(
                "token lifetime {}s out of range",
                refreshed.expires_in
            )));
        };
        self.store
            .update_access_token(member_id, &refreshed.access_token, expires_at)?;

        tracing::info!("Access token for member {} refreshed until {}", member_id, expires_at);
        Ok(refreshed.access_token)
    }

    pub async fn connect(&self, member_id: &str, code: &str) -> Result<TokenState, AuthError> {
        let grant = self.api.exchange_code(code).await?;

        let expires_at = expiry_after(grant.expires_in).ok_or_else(|| ApiError::TokenExchangeFailed {
            status: 200,
            body: format!("token lifetime {}s out of range", grant.expires_in),
        })?;
        let state = TokenState::connected(&grant.access_token, grant.refresh_token, expires_at);
        self.store.save_token_state(member_id, &state)?;

        tracing::info!("Member {} connected Google Calendar", member_id);
        Ok(state)
    }

    /// Clearing an already disconnected member succeeds.
    pub fn disconnect(&self, member_id: &str) -> Result<(), AuthError> {
        self.store
            .save_token_state(member_id, &TokenState::disconnected())?;
        tracing::info!("Member {} disconnected Google Calendar", member_id);
        Ok(())
    }

    pub fn status(&self, member_id: &str) -> Result<ConnectionStatus, AuthError> {
        let status = match self.store.load_token_state(member_id)? {
            Some(state) if state.is_connected() => ConnectionStatus::Connected {
                last_sync: state.last_sync,
            },
            _ => ConnectionStatus::Disconnected,
        };
        Ok(status)
    }

    /// Issues a single-use, expiring authorization state for `member_id`.
    pub fn issue_state(&self, member_id: &str, ttl: Duration) -> Result<String, AuthError> {
        let now = Utc::now();
        self.store.purge_expired_oauth_states(now)?;

        let state = uuid::Uuid::new_v4().simple().to_string();
        self.store.insert_oauth_state(&state, member_id, now + ttl)?;
        Ok(state)
    }

    /// Consumes `state`; it must exist, be unexpired, and belong to `member_id`.
    pub fn verify_state(&self, member_id: &str, state: &str) -> Result<(), AuthError> {
        let (owner, expires_at) = self
            .store
            .take_oauth_state(state)?
            .ok_or(AuthError::InvalidState)?;

        if owner != member_id {
            tracing::warn!("Authorization state issued to {} presented by {}", owner, member_id);
            return Err(AuthError::InvalidState);
        }
        if expires_at <= Utc::now() {
            tracing::warn!("Authorization state for {} expired at {}", member_id, expires_at);
            return Err(AuthError::InvalidState);
        }
        Ok(())
    }
}
