//! Wire types for the chat backend's JSON responses.
//!
//! DESIGN
//! ======
//! The backend is not ours and its payloads are loosely shaped: ids arrive as
//! numbers or strings, optional objects arrive as `null`, and list entries can
//! be malformed. Every field that is not essential is optional or defaulted,
//! and list fields decode leniently (bad entries are dropped with a warning)
//! so one broken message degrades rendering instead of failing the whole load.
//! Roles and attachment kinds are closed enums with a catch-all variant, which
//! keeps the render pipeline's matches exhaustive.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::error::ChatError;

// =============================================================================
// IDS
// =============================================================================

/// An identifier the backend may serialize as either a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct WireId(pub String);

impl WireId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric view of the id, if it is one.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        self.0.trim().parse().ok()
    }
}

impl From<&str> for WireId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl std::fmt::Display for WireId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for WireId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Signed(n) => Self(n.to_string()),
            Raw::Unsigned(n) => Self(n.to_string()),
        })
    }
}

/// Decode a JSON array, dropping entries that do not fit `T`. `null` or a
/// missing field yields an empty list.
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<T>(value) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(error = %e, "dropping malformed list entry");
                None
            }
        })
        .collect())
}

// =============================================================================
// MESSAGES
// =============================================================================

/// Role of a message author as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    Customer,
    User,
    BaseUser,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub id: Option<WireId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub role: Option<SenderRole>,
}

/// How an attachment is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    #[serde(alias = "voice")]
    Audio,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_type: Option<AttachmentKind>,
}

impl Attachment {
    #[must_use]
    pub fn kind(&self) -> AttachmentKind {
        self.file_type.unwrap_or(AttachmentKind::Other)
    }
}

/// Snapshot of the message being replied to, embedded by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentMessage {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, rename = "message")]
    pub body: Option<String>,
    #[serde(default)]
    pub sender: Option<Sender>,
}

/// One chat message. Immutable once created; the backend returns them in
/// thread order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    #[serde(default)]
    pub thread_id: Option<WireId>,
    #[serde(default)]
    pub reference_id: Option<WireId>,
    #[serde(default)]
    pub sender: Option<Sender>,
    #[serde(default, rename = "message")]
    pub body: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub parent_message_id: Option<i64>,
    #[serde(default)]
    pub parent_message: Option<ParentMessage>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Whether `user_id` authored this message.
    #[must_use]
    pub fn is_from(&self, user_id: Option<i64>) -> bool {
        let Some(user_id) = user_id else {
            return false;
        };
        self.sender
            .as_ref()
            .and_then(|s| s.id.as_ref())
            .and_then(WireId::as_i64)
            == Some(user_id)
    }
}

// =============================================================================
// RESPONSES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ThreadInfo {
    pub thread_id: WireId,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageList {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub messages: Vec<Message>,
}

/// Answer to "are there unread messages for this entry?".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct NewMessagesCheck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub new_messages_exist: bool,
    #[serde(default)]
    pub unread_count: Option<u32>,
}

impl NewMessagesCheck {
    /// Unread count to show on a badge; zero unless the check succeeded.
    #[must_use]
    pub fn badge_count(&self) -> u32 {
        if self.success { self.unread_count.unwrap_or(0) } else { 0 }
    }
}

/// `{ success, error? }` acknowledgement returned by POST endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Ack {
    /// Turn `success: false` into [`ChatError::Rejected`].
    ///
    /// # Errors
    ///
    /// Returns the backend's `error` (or `message`, or `fallback`) when the
    /// acknowledgement is negative.
    pub fn into_result(self, fallback: &str) -> Result<(), ChatError> {
        if self.success {
            return Ok(());
        }
        let reason = self
            .error
            .or(self.message)
            .unwrap_or_else(|| fallback.to_owned());
        Err(ChatError::Rejected(reason))
    }
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// One unread chat message surfaced in the topbar dropdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationItem {
    pub id: i64,
    #[serde(default)]
    pub thread_id: Option<WireId>,
    pub module_name: String,
    pub entry_id: WireId,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub docserial: Option<String>,
}

/// Full notification snapshot. Replaced wholesale on every refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationFeed {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub chat_notifications: Vec<NotificationItem>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub questionnaire_reviews: Vec<serde_json::Value>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub monthly_safety_reviews: Vec<serde_json::Value>,
    #[serde(default)]
    pub total_count: Option<u32>,
    #[serde(default)]
    pub chat_count: Option<u32>,
    #[serde(default)]
    pub questionnaire_count: Option<u32>,
    #[serde(default)]
    pub safety_count: Option<u32>,
}

impl NotificationFeed {
    #[must_use]
    pub fn chat(&self) -> u32 {
        self.chat_count.unwrap_or_else(|| len_u32(self.chat_notifications.len()))
    }

    #[must_use]
    pub fn questionnaire(&self) -> u32 {
        self.questionnaire_count
            .unwrap_or_else(|| len_u32(self.questionnaire_reviews.len()))
    }

    #[must_use]
    pub fn safety(&self) -> u32 {
        self.safety_count
            .unwrap_or_else(|| len_u32(self.monthly_safety_reviews.len()))
    }

    #[must_use]
    pub fn alerts(&self) -> u32 {
        self.questionnaire().saturating_add(self.safety())
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total_count
            .unwrap_or_else(|| self.chat().saturating_add(self.alerts()))
    }
}

fn len_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Response envelope of `/chat/notifications/get-all`. The counts may sit on
/// the envelope rather than inside `notifications`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub notifications: Option<NotificationFeed>,
    #[serde(default)]
    pub total_count: Option<u32>,
    #[serde(default)]
    pub chat_count: Option<u32>,
    #[serde(default)]
    pub questionnaire_count: Option<u32>,
    #[serde(default)]
    pub safety_count: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
}

impl FeedEnvelope {
    /// Merge envelope-level counts into the feed.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Rejected`] when the backend reports failure.
    pub fn into_feed(self) -> Result<NotificationFeed, ChatError> {
        if !self.success {
            return Err(ChatError::Rejected(
                self.error.unwrap_or_else(|| "notification fetch failed".to_owned()),
            ));
        }
        let mut feed = self.notifications.unwrap_or_default();
        feed.total_count = feed.total_count.or(self.total_count);
        feed.chat_count = feed.chat_count.or(self.chat_count);
        feed.questionnaire_count = feed.questionnaire_count.or(self.questionnaire_count);
        feed.safety_count = feed.safety_count.or(self.safety_count);
        Ok(feed)
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
