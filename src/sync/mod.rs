pub mod google_api;
pub mod google_auth;
pub mod sync_engine;
pub mod sync_log;
pub mod translate;

#[cfg(test)]
pub(crate) mod test_support;

pub use google_api::{ApiError, CalendarApi, GoogleCalendarClient, RemoteEvent};
pub use google_auth::{AuthError, ConnectionStatus, TokenManager, TokenState};
pub use sync_engine::{CallbackParams, ImportReport, SyncEngine, SyncError};
pub use sync_log::{SyncLogEntry, SyncStatus, SyncType};
