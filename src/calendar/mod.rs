pub mod event;
pub mod family;

pub use event::{DEFAULT_EVENT_COLOR, EventError, EventType, LocalEvent, NewEvent};
pub use family::{Family, FamilyMember, NotificationPreferences, Participant, ParticipantStatus};
