use chrono::Utc;
use thiserror::Error;

use crate::calendar::{FamilyMember, LocalEvent};
use crate::storage::config::{Config, ConfigError};
use crate::storage::store::{Store, StoreError};
use crate::sync::google_api::{ApiError, CalendarApi, RemoteEvent};
use crate::sync::google_auth::{AuthError, ConnectionStatus, TokenManager};
use crate::sync::sync_log::{ItemOutcome, SyncLogEntry, SyncStatus, SyncType, collect_errors};
use crate::sync::translate::{self, TranslateError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Authentication error: {0}")]
    AuthError(#[from] AuthError),
    #[error("API error: {0}")]
    ApiError(#[from] ApiError),
    #[error("Storage error: {0}")]
    StoreError(#[from] StoreError),
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("{0}")]
    TranslateError(#[from] TranslateError),
    #[error("Event not found: {0}")]
    EventNotFound(String),
    #[error("Family member not found: {0}")]
    MemberNotFound(String),
}

/// Result of one import run. Per-item failures are reported here, not raised.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    pub imported_count: u32,
    pub skipped_count: u32,
    pub errors: Vec<String>,
    pub status: SyncStatus,
}

/// Query parameters delivered to the OAuth redirect target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

pub struct SyncEngine<A> {
    config: Config,
    api: A,
    store: Store,
}

impl<A: CalendarApi> SyncEngine<A> {
    pub fn new(config: Config, api: A, store: Store) -> Self {
        Self { config, api, store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    fn tokens(&self) -> TokenManager<'_, A> {
        TokenManager::new(&self.api, &self.store)
    }

    pub fn begin_authorization(&self, member_id: &str) -> Result<String, SyncError> {
        let ttl = self.config.sync.state_ttl()?;
        let state = self.tokens().issue_state(member_id, ttl)?;

        match self.api.auth_url(&state) {
            Ok(url) => Ok(url),
            Err(err) => {
                self.store.take_oauth_state(&state)?;
                Err(err.into())
            }
        }
    }

    pub async fn complete_authorization(
        &self,
        member_id: &str,
        params: &CallbackParams,
    ) -> Result<(), SyncError> {
        if let Some(error) = &params.error {
            tracing::warn!("Member {} cancelled authorization: {}", member_id, error);
            return Err(AuthError::AuthorizationDenied(error.clone()).into());
        }

        let code = non_empty(&params.code).ok_or(AuthError::InvalidCallback("code"))?;
        let state = non_empty(&params.state).ok_or(AuthError::InvalidCallback("state"))?;

        let tokens = self.tokens();
        tokens.verify_state(member_id, state)?;
        tokens.connect(member_id, code).await?;
        Ok(())
    }

    pub fn disconnect(&self, member_id: &str) -> Result<(), SyncError> {
        self.tokens().disconnect(member_id)?;
        Ok(())
    }

    pub fn status(&self, member_id: &str) -> Result<ConnectionStatus, SyncError> {
        Ok(self.tokens().status(member_id)?)
    }

    pub fn sync_logs(&self, member_id: &str) -> Result<Vec<SyncLogEntry>, SyncError> {
        Ok(self.store.sync_logs(member_id)?)
    }

    /// Pushes one local event to the remote calendar and returns its remote id.
    pub async fn export_event(&self, member_id: &str, event_id: &str) -> Result<String, SyncError> {
        let access_token = self.tokens().ensure_valid_token(member_id).await?;

        let member = self.load_member(member_id)?;
        let event = self
            .store
            .load_event(event_id)?
            .filter(|event| event.family_id == member.family_id)
            .ok_or_else(|| SyncError::EventNotFound(event_id.to_string()))?;

        let outcome = self.push_event(&access_token, &event).await;

        let errors = match &outcome {
            Ok(_) => Vec::new(),
            Err(err) => vec![format!("Failed to export \"{}\": {}", event.title, err)],
        };
        self.store
            .append_sync_log(&SyncLogEntry::for_run(member_id, SyncType::Export, 1, errors))?;

        outcome
    }

    async fn push_event(&self, access_token: &str, event: &LocalEvent) -> Result<String, SyncError> {
        let remote = translate::to_remote(event, &self.config.google.time_zone);

        match &event.google_calendar_id {
            Some(remote_id) => {
                self.api.update_event(access_token, remote_id, &remote).await?;
                tracing::info!("Exported update of event {} to {}", event.id, remote_id);
                Ok(remote_id.clone())
            }
            None => {
                let remote_id = self.api.create_event(access_token, &remote).await?;
                self.store.link_remote_event(&event.id, &remote_id)?;
                tracing::info!("Exported new event {} as {}", event.id, remote_id);
                Ok(remote_id)
            }
        }
    }

    /// Imports remote events in `[now, now + import_window_days)`.
    ///
    /// Fails only when the member is not connected, the token cannot be
    /// refreshed, or the remote list cannot be fetched. Items are processed
    /// in provider order, one at a time.
    pub async fn import_events(&self, member_id: &str) -> Result<ImportReport, SyncError> {
        let window = self.config.sync.import_window()?;
        let access_token = self.tokens().ensure_valid_token(member_id).await?;
        let member = self.load_member(member_id)?;

        let time_min = Utc::now();
        let time_max = time_min
            .checked_add_signed(window)
            .ok_or(ConfigError::InvalidValue {
                field: "sync.import_window_days",
                value: u64::from(self.config.sync.import_window_days),
                reason: "window ends past the last representable date",
            })?;
        let remote_events = self
            .api
            .list_events(&access_token, time_min, time_max)
            .await?;

        let tally = collect_errors(
            &remote_events,
            |remote| self.import_one(remote, &member),
            |remote, err| {
                format!(
                    "Failed to import \"{}\": {}",
                    remote.summary.as_deref().unwrap_or_default(),
                    err
                )
            },
        );

        self.store.set_last_sync(member_id, Utc::now())?;
        let entry = SyncLogEntry::for_run(
            member_id,
            SyncType::Import,
            tally.processed,
            tally.errors.clone(),
        );
        self.store.append_sync_log(&entry)?;

        tracing::info!(
            "Import for member {} finished: {} imported, {} skipped, {} errors ({})",
            member_id,
            tally.applied,
            tally.skipped,
            tally.errors.len(),
            entry.status
        );

        Ok(ImportReport {
            imported_count: tally.applied,
            skipped_count: tally.skipped,
            status: tally.status(),
            errors: tally.errors,
        })
    }

    fn import_one(&self, remote: &RemoteEvent, member: &FamilyMember) -> Result<ItemOutcome, SyncError> {
        if let Some(remote_id) = &remote.id
            && self.store.find_event_by_remote_id(remote_id)?.is_some()
        {
            tracing::debug!("Remote event {} already imported, skipping", remote_id);
            return Ok(ItemOutcome::Skipped);
        }

        let event = translate::to_local(remote, &member.family_id, &member.id)?;
        self.store.insert_event(&event)?;
        Ok(ItemOutcome::Applied)
    }

    fn load_member(&self, member_id: &str) -> Result<FamilyMember, SyncError> {
        self.store
            .load_member(member_id)?
            .ok_or_else(|| SyncError::MemberNotFound(member_id.to_string()))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
