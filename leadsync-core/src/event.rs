//! Notification events delivered by the live update feed.

use crate::types::{Submission, SubmissionId, SubmissionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured event produced by the notification channel.
///
/// Events carry no ownership beyond the hand-off to their single consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// New submissions arrived since the last cursor.
    NewItems {
        #[serde(default)]
        items: Vec<Submission>,
    },

    /// Liveness marker; its timestamp becomes the next `lastCheck` cursor.
    Heartbeat { timestamp: DateTime<Utc> },

    /// A submission moved to a new workflow status.
    StatusChanged {
        id: SubmissionId,
        new_status: SubmissionStatus,
    },

    /// An operator response was sent for a submission.
    ResponseSent { id: SubmissionId },
}

impl NotificationEvent {
    /// Get the event type as a string.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::NewItems { .. } => "new_items",
            Self::Heartbeat { .. } => "heartbeat",
            Self::StatusChanged { .. } => "status_changed",
            Self::ResponseSent { .. } => "response_sent",
        }
    }

    /// The submission this event is about, if it targets a single one.
    pub fn submission_id(&self) -> Option<SubmissionId> {
        match self {
            Self::StatusChanged { id, .. } | Self::ResponseSent { id } => Some(*id),
            _ => None,
        }
    }
}
