use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use crate::calendar::{LocalEvent, NotificationPreferences};
use crate::storage::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Event not found: {0}")]
    EventNotFound(String),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Reminder,
    Invite,
    Update,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Reminder => "reminder",
            NotificationKind::Invite => "invite",
            NotificationKind::Update => "update",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reminder" => Some(NotificationKind::Reminder),
            "invite" => Some(NotificationKind::Invite),
            "update" => Some(NotificationKind::Update),
            _ => None,
        }
    }

    pub fn wanted_by(&self, preferences: &NotificationPreferences) -> bool {
        match self {
            NotificationKind::Reminder => preferences.event_reminders,
            NotificationKind::Invite => preferences.event_invites,
            NotificationKind::Update => preferences.schedule_changes,
        }
    }
}

/// One delivery attempt as persisted in the notifications table.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    pub family_member_id: String,
    pub event_id: String,
    pub kind: NotificationKind,
    pub message: String,
    pub sent: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryResult {
    pub member_name: String,
    pub sent: bool,
    pub message: String,
}

/// Delivery provider for text notifications. Returns whether the message was accepted.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> bool;
}

/// Sender used when no provider is configured; nothing is delivered.
pub struct DisabledSender;

#[async_trait]
impl NotificationSender for DisabledSender {
    async fn send(&self, to: &str, _body: &str) -> bool {
        tracing::warn!("Notification provider not configured - message to {} not sent", to);
        false
    }
}

fn phone_regex() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| Regex::new(r"^\+[1-9][0-9]{7,14}$").expect("valid phone regex"))
}

pub fn is_valid_phone(phone: &str) -> bool {
    phone_regex().is_match(phone)
}

fn format_when(at: DateTime<Utc>) -> String {
    at.format("%A, %B %-d, %Y at %-I:%M %p UTC").to_string()
}

pub fn reminder_message(event: &LocalEvent, family_name: &str) -> String {
    format!(
        "Family Calendar Reminder\n\n\"{}\" is coming up on {}.\n\nFamily: {}",
        event.title,
        format_when(event.start_time),
        family_name
    )
}

pub fn invite_message(event: &LocalEvent, family_name: &str, inviter_name: &str) -> String {
    format!(
        "Family Event Invitation\n\n{} invited you to \"{}\" on {}.\n\nFamily: {}\n\nCheck your family calendar for details!",
        inviter_name,
        event.title,
        format_when(event.start_time),
        family_name
    )
}

pub fn schedule_change_message(event: &LocalEvent, change: &str, family_name: &str) -> String {
    format!(
        "Family Schedule Change\n\n\"{}\" has been {}.\n\nFamily: {}",
        event.title, change, family_name
    )
}

pub struct NotificationDispatcher<'a, S> {
    store: &'a Store,
    sender: &'a S,
}

impl<'a, S: NotificationSender> NotificationDispatcher<'a, S> {
    pub fn new(store: &'a Store, sender: &'a S) -> Self {
        Self { store, sender }
    }

    /// Notifies every participant of `event_id` who has a valid phone number,
    /// has text notifications on, and opted in to `kind`.
    pub async fn send_event_notifications(
        &self,
        event_id: &str,
        kind: NotificationKind,
    ) -> Result<Vec<DeliveryResult>, NotifyError> {
        let event = self
            .store
            .load_event(event_id)?
            .ok_or_else(|| NotifyError::EventNotFound(event_id.to_string()))?;
        let family_name = self.store.family_name(&event.family_id)?.unwrap_or_default();
        let inviter_name = self
            .store
            .load_member(&event.created_by)?
            .map(|m| m.name)
            .unwrap_or_default();

        let body = match kind {
            NotificationKind::Reminder => reminder_message(&event, &family_name),
            NotificationKind::Invite => invite_message(&event, &family_name, &inviter_name),
            NotificationKind::Update => schedule_change_message(&event, "updated", &family_name),
        };
        let summary = match kind {
            NotificationKind::Reminder => format!("Reminder sent for \"{}\"", event.title),
            NotificationKind::Invite => format!("Invitation sent for \"{}\"", event.title),
            NotificationKind::Update => format!("Update notification sent for \"{}\"", event.title),
        };

        let mut results = Vec::new();
        for (participant, member) in self.store.participants_with_members(event_id)? {
            let Some(phone) = member.phone_number.as_deref() else {
                continue;
            };
            if !member.sms_notifications_enabled || !kind.wanted_by(&member.notification_preferences) {
                continue;
            }
            if !is_valid_phone(phone) {
                tracing::warn!("Skipping {}: invalid phone number {}", member.name, phone);
                continue;
            }

            let sent = self.sender.send(phone, &body).await;
            if !sent {
                tracing::warn!("Failed to send {} for event {} to {}", kind.as_str(), event_id, member.name);
            }

            self.store.record_notification(&NotificationRecord {
                family_member_id: participant.family_member_id.clone(),
                event_id: event_id.to_string(),
                kind,
                message: summary.clone(),
                sent,
            })?;

            results.push(DeliveryResult {
                member_name: member.name,
                sent,
                message: summary.clone(),
            });
        }

        tracing::info!("Dispatched {} {} notifications for event {}", results.len(), kind.as_str(), event_id);
        Ok(results)
    }
}
