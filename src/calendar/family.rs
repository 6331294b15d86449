use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Family {
    pub id: String,
    pub name: String,
    pub invite_code: String,
}

impl Family {
    pub fn new(name: &str) -> Self {
        let code = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            invite_code: code[..8].to_uppercase(),
        }
    }
}

/// Which kinds of notification a member wants to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotificationPreferences {
    #[serde(default)]
    pub event_reminders: bool,
    #[serde(default)]
    pub event_invites: bool,
    #[serde(default)]
    pub schedule_changes: bool,
}

impl NotificationPreferences {
    pub fn all() -> Self {
        Self {
            event_reminders: true,
            event_invites: true,
            schedule_changes: true,
        }
    }
}

/// Profile columns of a family member. Token columns live in
/// [`TokenState`](crate::sync::google_auth::TokenState).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyMember {
    pub id: String,
    pub family_id: String,
    pub user_id: String,
    pub name: String,
    pub color: String,
    pub phone_number: Option<String>,
    pub sms_notifications_enabled: bool,
    pub notification_preferences: NotificationPreferences,
}

impl FamilyMember {
    pub fn new(family_id: &str, user_id: &str, name: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            family_id: family_id.to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            color: crate::calendar::DEFAULT_EVENT_COLOR.to_string(),
            phone_number: None,
            sms_notifications_enabled: false,
            notification_preferences: NotificationPreferences::default(),
        }
    }

    pub fn with_phone(mut self, phone_number: &str, preferences: NotificationPreferences) -> Self {
        self.phone_number = Some(phone_number.to_string());
        self.sms_notifications_enabled = true;
        self.notification_preferences = preferences;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Invited,
    Accepted,
    Declined,
    Maybe,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Invited => "invited",
            ParticipantStatus::Accepted => "accepted",
            ParticipantStatus::Declined => "declined",
            ParticipantStatus::Maybe => "maybe",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "invited" => Some(ParticipantStatus::Invited),
            "accepted" => Some(ParticipantStatus::Accepted),
            "declined" => Some(ParticipantStatus::Declined),
            "maybe" => Some(ParticipantStatus::Maybe),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub event_id: String,
    pub family_member_id: String,
    pub status: ParticipantStatus,
    pub is_organizer: bool,
}

impl Participant {
    /// The organizer accepts implicitly; everyone else starts out invited.
    pub fn for_event(event_id: &str, member_id: &str, organizer_id: &str) -> Self {
        let is_organizer = member_id == organizer_id;
        Self {
            event_id: event_id.to_string(),
            family_member_id: member_id.to_string(),
            status: if is_organizer {
                ParticipantStatus::Accepted
            } else {
                ParticipantStatus::Invited
            },
            is_organizer,
        }
    }
}
