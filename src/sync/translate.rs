//! Conversions between [`LocalEvent`] and the provider's [`RemoteEvent`].
//!
//! Fields missing on one side are defaulted, never inferred.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use thiserror::Error;

use crate::calendar::{DEFAULT_EVENT_COLOR, EventType, LocalEvent};
use crate::sync::google_api::{RemoteDateTime, RemoteEvent};

#[derive(Debug, Error, PartialEq)]
pub enum TranslateError {
    #[error("remote event has no id")]
    MissingId,
    #[error("missing {0} time")]
    MissingTime(&'static str),
    #[error("invalid {field} time '{value}'")]
    InvalidTime { field: &'static str, value: String },
}

pub fn to_remote(event: &LocalEvent, time_zone: &str) -> RemoteEvent {
    let stamp = |at: DateTime<Utc>| RemoteDateTime {
        date_time: Some(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        date: None,
        time_zone: Some(time_zone.to_string()),
    };

    RemoteEvent {
        id: None,
        summary: Some(event.title.clone()),
        description: Some(event.description.clone().unwrap_or_default()),
        start: stamp(event.start_time),
        end: stamp(event.end_time),
    }
}

fn parse_remote_time(
    field: &'static str,
    value: &RemoteDateTime,
) -> Result<(DateTime<Utc>, bool), TranslateError> {
    if let Some(date_time) = &value.date_time {
        let parsed = DateTime::parse_from_rfc3339(date_time).map_err(|_| {
            TranslateError::InvalidTime {
                field,
                value: date_time.clone(),
            }
        })?;
        return Ok((parsed.with_timezone(&Utc), false));
    }

    if let Some(date) = &value.date {
        let midnight = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| TranslateError::InvalidTime {
                field,
                value: date.clone(),
            })?;
        return Ok((midnight.and_utc(), true));
    }

    Err(TranslateError::MissingTime(field))
}

/// Builds a new local event owned by `family_id` and created by `created_by`.
pub fn to_local(
    remote: &RemoteEvent,
    family_id: &str,
    created_by: &str,
) -> Result<LocalEvent, TranslateError> {
    let remote_id = remote.id.clone().ok_or(TranslateError::MissingId)?;
    let (start_time, start_all_day) = parse_remote_time("start", &remote.start)?;
    let (end_time, _) = parse_remote_time("end", &remote.end)?;

    Ok(LocalEvent {
        id: uuid::Uuid::new_v4().to_string(),
        family_id: family_id.to_string(),
        created_by: created_by.to_string(),
        title: remote.summary.clone().unwrap_or_default(),
        description: Some(remote.description.clone().unwrap_or_default()),
        start_time,
        end_time,
        location: None,
        color: DEFAULT_EVENT_COLOR.to_string(),
        event_type: EventType::General,
        is_all_day: start_all_day,
        google_calendar_id: Some(remote_id),
        sync_to_google: true,
    })
}
