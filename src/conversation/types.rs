use crate::llm::types::{ChatMessage, MessageRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Conversation thread discriminator within one song.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Purpose {
    Names,
    Style,
    Hook,
    Words,
    Lyrics,
    /// Synthetic condensed history, hydrated into every purpose.
    Summary,
}

impl Purpose {
    /// Purposes whose conversations are summarized.
    pub const SUMMARIZABLE: [Purpose; 2] = [Purpose::Style, Purpose::Lyrics];

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// One persisted conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub song_id: i64,
    pub purpose: Purpose,
    pub role: MessageRole,
    pub content: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn to_chat(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }
}

/// Read-only diagnostics for one `(song, purpose)` thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationStats {
    pub total: u64,
    pub system: u64,
    pub user: u64,
    pub assistant: u64,
    /// More user turns than assistant turns.
    pub has_incomplete: bool,
    pub has_summaries: bool,
}

/// Whether `roles` satisfy the alternation rule: optional leading system,
/// then `user, assistant, user, …`. A trailing user turn is allowed.
pub fn validate_sequence<'a, I>(roles: I) -> bool
where
    I: IntoIterator<Item = &'a MessageRole>,
{
    let mut expected = MessageRole::User;
    for (index, role) in roles.into_iter().enumerate() {
        if index == 0 && *role == MessageRole::System {
            continue;
        }
        if *role != expected {
            return false;
        }
        expected = match expected {
            MessageRole::User => MessageRole::Assistant,
            _ => MessageRole::User,
        };
    }
    true
}

/// Convenience over [`validate_sequence`] for persisted rows.
pub fn validate_messages(messages: &[Message]) -> bool {
    validate_sequence(messages.iter().map(|message| &message.role))
}

/// Drop everything after the last assistant turn.
pub fn truncate_after_last_assistant(mut messages: Vec<Message>) -> Vec<Message> {
    let keep = messages
        .iter()
        .rposition(|message| message.role == MessageRole::Assistant)
        .map_or(0, |index| index + 1);
    messages.truncate(keep);
    messages
}
