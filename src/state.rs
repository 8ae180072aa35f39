//! UI-agnostic conversation state: the message types, the action set, and the
//! pure reducer that produces each new state snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The recent-questions log keeps at most this many entries, newest first.
pub const RECENT_QUESTIONS_LIMIT: usize = 10;

/// The role of a chat message sender. Serializes as the wire/storage
/// spelling (`"user"` / `"assistant"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of the conversation. Immutable once created; the log is
/// append-only until bulk-cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(id: i64, role: Role, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The current conversation snapshot. Mutated only through [`reduce`].
#[derive(Debug, Clone, Default)]
pub struct ChatState {
    pub messages: Vec<Message>,
    /// User-role messages only, newest first, at most
    /// [`RECENT_QUESTIONS_LIMIT`] entries.
    pub recent_questions: Vec<Message>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub enum ChatAction {
    SetLoading(bool),
    SetError(Option<String>),
    AddMessage(Message),
    SetMessages(Vec<Message>),
    ClearMessages,
    SetApiKey(String),
    SetRecentQuestions(Vec<Message>),
}

/// Apply one action to a state snapshot, producing the next snapshot.
pub fn reduce(state: &ChatState, action: ChatAction) -> ChatState {
    let mut next = state.clone();
    match action {
        ChatAction::SetLoading(loading) => next.is_loading = loading,
        ChatAction::SetError(error) => {
            next.error = error;
            next.is_loading = false;
        }
        ChatAction::AddMessage(message) => {
            if message.role == Role::User {
                next.recent_questions.insert(0, message.clone());
                next.recent_questions.truncate(RECENT_QUESTIONS_LIMIT);
            }
            next.messages.push(message);
        }
        ChatAction::SetMessages(messages) => next.messages = messages,
        ChatAction::ClearMessages => next.messages.clear(),
        ChatAction::SetApiKey(key) => next.api_key = key,
        ChatAction::SetRecentQuestions(questions) => next.recent_questions = questions,
    }
    next
}

/// Next message identifier: the millisecond clock, bumped past the last id so
/// ids stay strictly increasing when two messages land in the same millisecond.
pub fn next_message_id(state: &ChatState) -> i64 {
    let now = Utc::now().timestamp_millis();
    match state.messages.last() {
        Some(last) => now.max(last.id + 1),
        None => now,
    }
}

/// Aggregate counts shown on the dashboard. Always derived from the current
/// state, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatStats {
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub recent_questions: usize,
}

impl ChatState {
    pub fn stats(&self) -> ChatStats {
        let user_messages = self
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .count();
        ChatStats {
            total_messages: self.messages.len(),
            user_messages,
            assistant_messages: self.messages.len() - user_messages,
            recent_questions: self.recent_questions.len(),
        }
    }
}
