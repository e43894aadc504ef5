use super::store::ConversationStore;
use super::types::Purpose;
use crate::llm::types::{ChatMessage, MessageRole};
use std::fmt;

/// Prefix marking a summary when it is replayed to the model.
pub const SUMMARY_CONTEXT_PREFIX: &str = "[Summary of earlier conversation]\n";

/// Ordered `{role, content}` list sent to the model for one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationBuilder {
    messages: Vec<ChatMessage>,
}

impl ConversationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(content: impl Into<String>) -> Self {
        let mut builder = Self::new();
        builder.add_system(content);
        builder
    }

    pub fn add_system(&mut self, content: impl Into<String>) -> &mut Self {
        self.messages.push(ChatMessage::system(content));
        self
    }

    pub fn add_user(&mut self, content: impl Into<String>) -> &mut Self {
        self.messages.push(ChatMessage::user(content));
        self
    }

    pub fn add_assistant(&mut self, content: impl Into<String>) -> &mut Self {
        self.messages.push(ChatMessage::assistant(content));
        self
    }

    /// Replace everything but a leading system message with the stored valid
    /// history. `false` only when the store could not be read.
    pub async fn hydrate(
        &mut self,
        store: &dyn ConversationStore,
        song_id: i64,
        purpose: Purpose,
        owner: &str,
    ) -> bool {
        let history = match store.try_valid_history(song_id, purpose, owner).await {
            Ok(history) => history,
            Err(error) => {
                tracing::error!(song_id, purpose = %purpose, error = %error, "conversation hydration failed");
                return false;
            }
        };

        let system = self
            .messages
            .first()
            .filter(|message| message.role == MessageRole::System)
            .cloned();
        self.messages.clear();
        self.messages.extend(system);

        for message in &history {
            if message.purpose == Purpose::Summary {
                self.messages.push(ChatMessage::assistant(format!(
                    "{SUMMARY_CONTEXT_PREFIX}{}",
                    message.content
                )));
            } else {
                self.messages.push(message.to_chat());
            }
        }

        tracing::debug!(song_id, purpose = %purpose, loaded = history.len(), "hydrated conversation");
        true
    }

    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == MessageRole::User)
            .map(|message| message.content.as_str())
    }

    pub fn count_by_role(&self, role: MessageRole) -> usize {
        self.messages.iter().filter(|message| message.role == role).count()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// True once there is anything beyond a lone system message.
    pub fn has_history(&self) -> bool {
        match self.messages.as_slice() {
            [] => false,
            [only] => only.role != MessageRole::System,
            _ => true,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn serialize(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    /// Role-prefixed transcript for the conversation log.
    pub fn render(&self) -> String {
        self.messages
            .iter()
            .map(|message| {
                format!(
                    "[{}]\n{}",
                    message.role.as_str().to_ascii_uppercase(),
                    message.content.trim_end()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl fmt::Display for ConversationBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
