use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_EVENT_COLOR: &str = "#3B82F6";

#[derive(Debug, Error, PartialEq)]
pub enum EventError {
    #[error("Title is required")]
    MissingTitle,
    #[error("End time {end} is before start time {start}")]
    EndBeforeStart {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    #[default]
    General,
    Appointment,
    Meeting,
    Birthday,
    Holiday,
    Work,
    Personal,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::General => "general",
            EventType::Appointment => "appointment",
            EventType::Meeting => "meeting",
            EventType::Birthday => "birthday",
            EventType::Holiday => "holiday",
            EventType::Work => "work",
            EventType::Personal => "personal",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(EventType::General),
            "appointment" => Ok(EventType::Appointment),
            "meeting" => Ok(EventType::Meeting),
            "birthday" => Ok(EventType::Birthday),
            "holiday" => Ok(EventType::Holiday),
            "work" => Ok(EventType::Work),
            "personal" => Ok(EventType::Personal),
            other => Err(EventError::UnknownEventType(other.to_string())),
        }
    }
}

/// A family calendar event as stored locally.
///
/// `google_calendar_id` links the event to at most one remote event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalEvent {
    pub id: String,
    pub family_id: String,
    pub created_by: String,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: Option<String>,
    pub color: String,
    pub event_type: EventType,
    pub is_all_day: bool,
    pub google_calendar_id: Option<String>,
    pub sync_to_google: bool,
}

/// Member-entered event fields before an id is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: Option<String>,
    pub color: Option<String>,
    pub event_type: EventType,
    pub is_all_day: bool,
}

impl NewEvent {
    pub fn into_event(self, family_id: &str, created_by: &str) -> Result<LocalEvent, EventError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(EventError::MissingTitle);
        }
        if self.end_time < self.start_time {
            return Err(EventError::EndBeforeStart {
                start: self.start_time,
                end: self.end_time,
            });
        }

        Ok(LocalEvent {
            id: uuid::Uuid::new_v4().to_string(),
            family_id: family_id.to_string(),
            created_by: created_by.to_string(),
            title: title.to_string(),
            description: self.description.filter(|d| !d.is_empty()),
            start_time: self.start_time,
            end_time: self.end_time,
            location: self.location.filter(|l| !l.is_empty()),
            color: self.color.unwrap_or_else(|| DEFAULT_EVENT_COLOR.to_string()),
            event_type: self.event_type,
            is_all_day: self.is_all_day,
            google_calendar_id: None,
            sync_to_google: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_event(title: &str, minutes: i64) -> NewEvent {
        let start = Utc::now();
        NewEvent {
            title: title.to_string(),
            description: Some(String::new()),
            start_time: start,
            end_time: start + chrono::Duration::minutes(minutes),
            location: None,
            color: None,
            event_type: EventType::default(),
            is_all_day: false,
        }
    }

    #[test]
    fn new_event_gets_default_color_and_type() {
        let event = new_event("Dinner", 60).into_event("fam1", "member1").unwrap();

        assert_eq!(event.color, DEFAULT_EVENT_COLOR);
        assert_eq!(event.event_type, EventType::General);
        assert_eq!(event.family_id, "fam1");
        assert_eq!(event.created_by, "member1");
        assert_eq!(event.google_calendar_id, None);
        assert!(!event.sync_to_google);
    }

    #[test]
    fn empty_description_is_dropped() {
        let event = new_event("Dinner", 60).into_event("fam1", "member1").unwrap();

        assert_eq!(event.description, None);
    }

    #[test]
    fn blank_title_is_rejected() {
        let result = new_event("   ", 60).into_event("fam1", "member1");

        assert_eq!(result, Err(EventError::MissingTitle));
    }

    #[test]
    fn end_before_start_is_rejected() {
        let result = new_event("Backwards", -30).into_event("fam1", "member1");

        assert!(matches!(result, Err(EventError::EndBeforeStart { .. })));
    }

    #[test]
    fn event_type_parses_known_values() {
        assert_eq!("birthday".parse::<EventType>(), Ok(EventType::Birthday));
        assert_eq!(EventType::Holiday.to_string(), "holiday");
        assert!("party".parse::<EventType>().is_err());
    }
}
