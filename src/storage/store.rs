use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, Row, params};
use std::path::Path;
use thiserror::Error;

use crate::calendar::{
    EventType, Family, FamilyMember, LocalEvent, NotificationPreferences, Participant,
    ParticipantStatus,
};
use crate::notify::{NotificationKind, NotificationRecord};
use crate::sync::google_auth::TokenState;
use crate::sync::sync_log::{SyncLogEntry, SyncStatus, SyncType};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Failed to create database directory: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Family member not found: {0}")]
    MemberNotFound(String),
    #[error("Event not found: {0}")]
    EventNotFound(String),
}

const EVENT_COLUMNS: &str = "id, family_id, created_by, title, description, start_time, end_time, \
     location, color, event_type, is_all_day, google_calendar_id, sync_to_google";

const MEMBER_COLUMNS: &str = "id, family_id, user_id, name, color, phone_number, \
     sms_notifications_enabled, notification_preferences";

/// Persistent collaborator for the sync subsystem: events, participants,
/// families, members (including their calendar tokens), sync logs,
/// notification records and pending OAuth states.
pub struct Store {
    conn: Connection,
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn event_from_row(row: &Row) -> SqliteResult<LocalEvent> {
    let event_type: String = row.get(9)?;
    Ok(LocalEvent {
        id: row.get(0)?,
        family_id: row.get(1)?,
        created_by: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        start_time: row.get(5)?,
        end_time: row.get(6)?,
        location: row.get(7)?,
        color: row.get(8)?,
        event_type: event_type
            .parse::<EventType>()
            .map_err(|e| conversion_error(9, e))?,
        is_all_day: row.get(10)?,
        google_calendar_id: row.get(11)?,
        sync_to_google: row.get(12)?,
    })
}

fn member_from_row(row: &Row, offset: usize) -> SqliteResult<FamilyMember> {
    let preferences: Option<String> = row.get(offset + 7)?;
    let notification_preferences = match preferences {
        Some(json) => serde_json::from_str::<NotificationPreferences>(&json)
            .map_err(|e| conversion_error(offset + 7, e))?,
        None => NotificationPreferences::default(),
    };

    Ok(FamilyMember {
        id: row.get(offset)?,
        family_id: row.get(offset + 1)?,
        user_id: row.get(offset + 2)?,
        name: row.get(offset + 3)?,
        color: row.get(offset + 4)?,
        phone_number: row.get(offset + 5)?,
        sms_notifications_enabled: row.get(offset + 6)?,
        notification_preferences,
    })
}

fn sync_log_from_row(row: &Row) -> SqliteResult<SyncLogEntry> {
    let sync_type: String = row.get(1)?;
    let status: String = row.get(2)?;
    let details: Option<String> = row.get(5)?;

    let error_details = match details {
        Some(json) => {
            let value: serde_json::Value =
                serde_json::from_str(&json).map_err(|e| conversion_error(5, e))?;
            let errors = value
                .get("errors")
                .cloned()
                .unwrap_or(serde_json::Value::Array(Vec::new()));
            Some(serde_json::from_value(errors).map_err(|e| conversion_error(5, e))?)
        }
        None => None,
    };

    Ok(SyncLogEntry {
        family_member_id: row.get(0)?,
        sync_type: SyncType::parse(&sync_type)
            .ok_or_else(|| rusqlite::Error::InvalidColumnType(1, "sync_type".into(), Type::Text))?,
        status: SyncStatus::parse(&status)
            .ok_or_else(|| rusqlite::Error::InvalidColumnType(2, "status".into(), Type::Text))?,
        events_processed: row.get(3)?,
        errors_count: row.get(4)?,
        error_details,
        completed_at: row.get(6)?,
    })
}

impl Store {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self::new(Connection::open(path)?);
        store.initialize()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self::new(Connection::open_in_memory()?);
        store.initialize()?;
        Ok(store)
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS families (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                invite_code TEXT NOT NULL UNIQUE
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS family_members (
                id TEXT PRIMARY KEY,
                family_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                color TEXT NOT NULL,
                phone_number TEXT,
                sms_notifications_enabled INTEGER NOT NULL DEFAULT 0,
                notification_preferences TEXT,
                google_access_token TEXT,
                google_refresh_token TEXT,
                google_token_expires_at TEXT,
                google_calendar_sync_enabled INTEGER NOT NULL DEFAULT 0,
                google_calendar_last_sync TEXT
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                family_id TEXT NOT NULL,
                created_by TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                location TEXT,
                color TEXT NOT NULL,
                event_type TEXT NOT NULL,
                is_all_day INTEGER NOT NULL,
                google_calendar_id TEXT,
                sync_to_google INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_events_google_calendar_id
                ON events (google_calendar_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS event_participants (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT NOT NULL,
                family_member_id TEXT NOT NULL,
                status TEXT NOT NULL,
                is_organizer INTEGER NOT NULL DEFAULT 0,
                UNIQUE (event_id, family_member_id)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS calendar_sync_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                family_member_id TEXT NOT NULL,
                sync_type TEXT NOT NULL,
                status TEXT NOT NULL,
                events_processed INTEGER NOT NULL,
                errors_count INTEGER NOT NULL,
                error_details TEXT,
                completed_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                family_member_id TEXT NOT NULL,
                event_id TEXT NOT NULL,
                type TEXT NOT NULL,
                message TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS oauth_states (
                state TEXT PRIMARY KEY,
                family_member_id TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    pub fn table_exists(&self, table_name: &str) -> bool {
        let result: SqliteResult<i32> = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [table_name],
            |row| row.get(0),
        );
        result.unwrap_or(0) > 0
    }

    pub fn insert_family(&self, family: &Family) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO families (id, name, invite_code) VALUES (?1, ?2, ?3)",
            params![&family.id, &family.name, &family.invite_code],
        )?;
        Ok(())
    }

    pub fn family_name(&self, family_id: &str) -> Result<Option<String>, StoreError> {
        let name = self
            .conn
            .query_row("SELECT name FROM families WHERE id = ?1", [family_id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(name)
    }

    pub fn insert_member(&self, member: &FamilyMember) -> Result<(), StoreError> {
        let preferences = serde_json::to_string(&member.notification_preferences)?;
        self.conn.execute(
            &format!("INSERT INTO family_members ({MEMBER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                &member.id,
                &member.family_id,
                &member.user_id,
                &member.name,
                &member.color,
                &member.phone_number,
                member.sms_notifications_enabled,
                preferences,
            ],
        )?;
        Ok(())
    }

    pub fn load_member(&self, member_id: &str) -> Result<Option<FamilyMember>, StoreError> {
        let member = self
            .conn
            .query_row(
                &format!("SELECT {MEMBER_COLUMNS} FROM family_members WHERE id = ?1"),
                [member_id],
                |row| member_from_row(row, 0),
            )
            .optional()?;
        Ok(member)
    }

    /// `None` when the member does not exist.
    pub fn load_token_state(&self, member_id: &str) -> Result<Option<TokenState>, StoreError> {
        let state = self
            .conn
            .query_row(
                "SELECT google_access_token, google_refresh_token, google_token_expires_at,
                        google_calendar_sync_enabled, google_calendar_last_sync
                 FROM family_members WHERE id = ?1",
                [member_id],
                |row| {
                    Ok(TokenState {
                        access_token: row.get(0)?,
                        refresh_token: row.get(1)?,
                        expires_at: row.get(2)?,
                        sync_enabled: row.get(3)?,
                        last_sync: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    /// Writes every token column. `last_sync` is left untouched.
    pub fn save_token_state(&self, member_id: &str, state: &TokenState) -> Result<(), StoreError> {
        let updated = self.conn.execute(
            "UPDATE family_members
             SET google_access_token = ?2, google_refresh_token = ?3,
                 google_token_expires_at = ?4, google_calendar_sync_enabled = ?5
             WHERE id = ?1",
            params![
                member_id,
                &state.access_token,
                &state.refresh_token,
                &state.expires_at,
                state.sync_enabled,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::MemberNotFound(member_id.to_string()));
        }
        Ok(())
    }

    pub fn update_access_token(
        &self,
        member_id: &str,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let updated = self.conn.execute(
            "UPDATE family_members SET google_access_token = ?2, google_token_expires_at = ?3
             WHERE id = ?1",
            params![member_id, access_token, expires_at],
        )?;
        if updated == 0 {
            return Err(StoreError::MemberNotFound(member_id.to_string()));
        }
        Ok(())
    }

    pub fn set_last_sync(&self, member_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE family_members SET google_calendar_last_sync = ?2 WHERE id = ?1",
            params![member_id, at],
        )?;
        Ok(())
    }

    pub fn insert_event(&self, event: &LocalEvent) -> Result<(), StoreError> {
        self.conn.execute(
            &format!(
                "INSERT INTO events ({EVENT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
            ),
            params![
                &event.id,
                &event.family_id,
                &event.created_by,
                &event.title,
                &event.description,
                event.start_time,
                event.end_time,
                &event.location,
                &event.color,
                event.event_type.as_str(),
                event.is_all_day,
                &event.google_calendar_id,
                event.sync_to_google,
            ],
        )?;
        Ok(())
    }

    pub fn load_event(&self, id: &str) -> Result<Option<LocalEvent>, StoreError> {
        let event = self
            .conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
                [id],
                event_from_row,
            )
            .optional()?;
        Ok(event)
    }

    /// Id of the local event already linked to `remote_id`, if any.
    pub fn find_event_by_remote_id(&self, remote_id: &str) -> Result<Option<String>, StoreError> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM events WHERE google_calendar_id = ?1",
                [remote_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn link_remote_event(&self, event_id: &str, remote_id: &str) -> Result<(), StoreError> {
        let updated = self.conn.execute(
            "UPDATE events SET google_calendar_id = ?2, sync_to_google = 1 WHERE id = ?1",
            params![event_id, remote_id],
        )?;
        if updated == 0 {
            return Err(StoreError::EventNotFound(event_id.to_string()));
        }
        Ok(())
    }

    pub fn events_for_family(&self, family_id: &str) -> Result<Vec<LocalEvent>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE family_id = ?1 ORDER BY start_time, rowid"
        ))?;
        let events = stmt
            .query_map([family_id], event_from_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(events)
    }

    pub fn add_participant(&self, participant: &Participant) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO event_participants (event_id, family_member_id, status, is_organizer)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                &participant.event_id,
                &participant.family_member_id,
                participant.status.as_str(),
                participant.is_organizer,
            ],
        )?;
        Ok(())
    }

    pub fn participants_with_members(
        &self,
        event_id: &str,
    ) -> Result<Vec<(Participant, FamilyMember)>, StoreError> {
        let member_columns = MEMBER_COLUMNS
            .split(", ")
            .map(|c| format!("m.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT p.event_id, p.family_member_id, p.status, p.is_organizer, {member_columns}
             FROM event_participants p
             JOIN family_members m ON m.id = p.family_member_id
             WHERE p.event_id = ?1
             ORDER BY p.id"
        ))?;

        let rows = stmt
            .query_map([event_id], |row| {
                let status: String = row.get(2)?;
                let participant = Participant {
                    event_id: row.get(0)?,
                    family_member_id: row.get(1)?,
                    status: ParticipantStatus::parse(&status).ok_or_else(|| {
                        rusqlite::Error::InvalidColumnType(2, "status".into(), Type::Text)
                    })?,
                    is_organizer: row.get(3)?,
                };
                Ok((participant, member_from_row(row, 4)?))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<(), StoreError> {
        let details = match &entry.error_details {
            Some(errors) => Some(serde_json::to_string(&serde_json::json!({ "errors": errors }))?),
            None => None,
        };
        self.conn.execute(
            "INSERT INTO calendar_sync_logs
                (family_member_id, sync_type, status, events_processed, errors_count, error_details, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &entry.family_member_id,
                entry.sync_type.as_str(),
                entry.status.as_str(),
                entry.events_processed,
                entry.errors_count,
                details,
                entry.completed_at,
            ],
        )?;
        Ok(())
    }

    /// Oldest first.
    pub fn sync_logs(&self, member_id: &str) -> Result<Vec<SyncLogEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT family_member_id, sync_type, status, events_processed, errors_count,
                    error_details, completed_at
             FROM calendar_sync_logs WHERE family_member_id = ?1 ORDER BY id",
        )?;
        let entries = stmt
            .query_map([member_id], sync_log_from_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn record_notification(&self, record: &NotificationRecord) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO notifications (family_member_id, event_id, type, message, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &record.family_member_id,
                &record.event_id,
                record.kind.as_str(),
                &record.message,
                if record.sent { "sent" } else { "failed" },
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    pub fn notifications_for_event(&self, event_id: &str) -> Result<Vec<NotificationRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT family_member_id, event_id, type, message, status
             FROM notifications WHERE event_id = ?1 ORDER BY id",
        )?;
        let records = stmt
            .query_map([event_id], |row| {
                let kind: String = row.get(2)?;
                let status: String = row.get(4)?;
                Ok(NotificationRecord {
                    family_member_id: row.get(0)?,
                    event_id: row.get(1)?,
                    kind: NotificationKind::parse(&kind).ok_or_else(|| {
                        rusqlite::Error::InvalidColumnType(2, "type".into(), Type::Text)
                    })?,
                    message: row.get(3)?,
                    sent: status == "sent",
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(records)
    }

    pub fn insert_oauth_state(
        &self,
        state: &str,
        member_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO oauth_states (state, family_member_id, expires_at) VALUES (?1, ?2, ?3)",
            params![state, member_id, expires_at],
        )?;
        Ok(())
    }

    /// Removes the state and returns its owner and expiry. A state can be taken once.
    pub fn take_oauth_state(&self, state: &str) -> Result<Option<(String, DateTime<Utc>)>, StoreError> {
        let found: Option<(String, DateTime<Utc>)> = self
            .conn
            .query_row(
                "SELECT family_member_id, expires_at FROM oauth_states WHERE state = ?1",
                [state],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if found.is_some() {
            self.conn
                .execute("DELETE FROM oauth_states WHERE state = ?1", [state])?;
        }
        Ok(found)
    }

    pub fn purge_expired_oauth_states(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM oauth_states WHERE expires_at <= ?1", params![now])?;
        Ok(removed)
    }
}
