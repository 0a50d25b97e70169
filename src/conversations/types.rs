//! Types for conversation management.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ai::formatter::{HistoryMessage, USER_SENDER};
use crate::ai::gateway::SummaryRef;

/// Sender tag for messages typed by the user.
pub const SENDER_USER: &str = USER_SENDER;
/// Sender tag for messages produced by the gateway.
pub const SENDER_AI: &str = "ai";

/// Lifecycle state of a conversation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// Accepting messages.
    #[default]
    Active,
    /// Summarized and closed.
    Ended,
}

impl ConversationStatus {
    /// Stable string form for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConversationStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "ended" => Ok(Self::Ended),
            _ => Err(value.to_string()),
        }
    }
}

/// A persisted message.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Row identifier.
    pub id: i64,
    /// Owning conversation.
    pub conversation_id: i64,
    /// Message body.
    pub content: String,
    /// Sender tag, `user` or `ai`.
    pub sender: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl HistoryMessage for Message {
    fn sender(&self) -> &str {
        &self.sender
    }

    fn content(&self) -> &str {
        &self.content
    }
}

/// A conversation with its messages in chronological order.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Row identifier.
    pub id: i64,
    /// Display title.
    pub title: String,
    /// Creation time.
    pub start_time: DateTime<Utc>,
    /// Time the conversation was ended.
    pub end_time: Option<DateTime<Utc>>,
    /// Lifecycle state.
    pub status: ConversationStatus,
    /// Summary written when the conversation ends; empty before that.
    pub summary: String,
    /// Messages, oldest first.
    pub messages: Vec<Message>,
}

impl SummaryRef for Conversation {
    fn summary(&self) -> Option<&str> {
        Some(self.summary.as_str())
    }
}

/// Partial update of a conversation's editable fields.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConversationPatch {
    /// New title.
    pub title: Option<String>,
    /// New status.
    pub status: Option<ConversationStatus>,
    /// New summary.
    pub summary: Option<String>,
}

impl ConversationPatch {
    /// Whether the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none() && self.status.is_none() && self.summary.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_storage_form() {
        for status in [ConversationStatus::Active, ConversationStatus::Ended] {
            assert_eq!(status.as_str().parse::<ConversationStatus>(), Ok(status));
        }
        assert!("archived".parse::<ConversationStatus>().is_err());
    }

    #[test]
    fn test_conversation_json_shape() {
        let conversation = Conversation {
            id: 7,
            title: "Trip".to_string(),
            start_time: Utc::now(),
            end_time: None,
            status: ConversationStatus::Active,
            summary: String::new(),
            messages: Vec::new(),
        };
        let json = serde_json::to_value(&conversation).unwrap();
        assert_eq!(json["status"], "active");
        assert_eq!(json["summary"], "");
        assert!(json["end_time"].is_null());
        assert!(json["messages"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_patch_deserializes_partially() {
        let patch: ConversationPatch = serde_json::from_str(r#"{"status":"ended"}"#).unwrap();
        assert_eq!(patch.status, Some(ConversationStatus::Ended));
        assert!(patch.title.is_none());
        assert!(!patch.is_empty());
        assert!(ConversationPatch::default().is_empty());
    }
}
