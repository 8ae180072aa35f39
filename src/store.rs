//! The conversation state store: reducer dispatch with its two persistence
//! side effects, startup hydration, and send orchestration.

use tracing::{debug, warn};

use crate::error::ChatError;
use crate::openai::CompletionApi;
use crate::state::{
    self, ChatAction, ChatState, Message, Role, RECENT_QUESTIONS_LIMIT,
};
use crate::storage::{KvStore, API_KEY_KEY, RECENT_QUESTIONS_KEY};

/// What `begin_send` hands to the network call: the log as it stood before
/// the optimistic append, the new text, and the credential.
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub history: Vec<Message>,
    pub text: String,
    pub api_key: String,
}

/// Sole owner of the conversation state. Views read the latest snapshot
/// through [`ChatStore::state`] and mutate only by dispatching actions.
pub struct ChatStore {
    state: ChatState,
    storage: KvStore,
}

impl ChatStore {
    /// Open the store and hydrate `api_key` and `recent_questions` from
    /// persistent storage. The message log always starts empty.
    pub fn open(storage: KvStore) -> Self {
        let mut store = Self {
            state: ChatState::default(),
            storage,
        };
        store.hydrate();
        store
    }

    fn hydrate(&mut self) {
        // Assigned directly so hydration does not write the key back out.
        self.state.api_key = match self.storage.get(API_KEY_KEY) {
            Ok(Some(key)) => key,
            Ok(None) => String::new(),
            Err(err) => {
                warn!("failed to read stored API key: {err}");
                String::new()
            }
        };

        let recent = self.load_recent_questions().unwrap_or_else(|err| {
            warn!("{err}; starting with an empty recent-questions log");
            Vec::new()
        });
        self.dispatch(ChatAction::SetRecentQuestions(recent));
    }

    fn load_recent_questions(&self) -> Result<Vec<Message>, ChatError> {
        let raw = match self.storage.get(RECENT_QUESTIONS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(Vec::new()),
            Err(err) => return Err(ChatError::StorageParse(err.to_string())),
        };
        let questions: Vec<Message> =
            serde_json::from_str(&raw).map_err(|e| ChatError::StorageParse(e.to_string()))?;

        // Normalize stale or hand-edited files to the state invariant:
        // user-role only, at most the limit.
        let mut questions: Vec<Message> = questions
            .into_iter()
            .filter(|m| m.role == Role::User)
            .collect();
        questions.truncate(RECENT_QUESTIONS_LIMIT);
        Ok(questions)
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    /// Apply an action through the reducer. Side effects are confined here:
    /// `SetApiKey` writes the credential through before the state update, and
    /// any transition that changed `recent_questions` rewrites its key.
    /// Storage failures are logged and do not fail the dispatch.
    pub fn dispatch(&mut self, action: ChatAction) {
        if let ChatAction::SetApiKey(key) = &action {
            if let Err(err) = self.storage.set(API_KEY_KEY, key) {
                warn!("failed to persist API key: {err}");
            }
        }

        let next = state::reduce(&self.state, action);
        let recent_changed = next.recent_questions != self.state.recent_questions;
        self.state = next;

        if recent_changed {
            self.persist_recent_questions();
        }
    }

    fn persist_recent_questions(&self) {
        match serde_json::to_string(&self.state.recent_questions) {
            Ok(json) => {
                if let Err(err) = self.storage.set(RECENT_QUESTIONS_KEY, &json) {
                    warn!("failed to persist recent questions: {err}");
                }
            }
            Err(err) => warn!("failed to serialize recent questions: {err}"),
        }
    }

    /// First half of a send: validate, flip on the loading flag, append the
    /// user message optimistically (it stays visible even if the send fails),
    /// and return the request payload for the network call.
    ///
    /// Rejects with `SendInFlight`, mutating nothing, while another send is
    /// outstanding. The view's input disablement is advisory only; this is
    /// the enforced rule.
    pub fn begin_send(&mut self, text: &str) -> Result<PendingSend, ChatError> {
        if self.state.api_key.is_empty() {
            self.dispatch(ChatAction::SetError(Some(
                ChatError::MissingCredential.to_string(),
            )));
            return Err(ChatError::MissingCredential);
        }
        if self.state.is_loading {
            return Err(ChatError::SendInFlight);
        }

        // SetError also clears the loading flag, so it goes first.
        self.dispatch(ChatAction::SetError(None));
        self.dispatch(ChatAction::SetLoading(true));

        let history = self.state.messages.clone();
        let message = Message::new(state::next_message_id(&self.state), Role::User, text);
        debug!(id = message.id, "sending user message");
        self.dispatch(ChatAction::AddMessage(message));

        Ok(PendingSend {
            history,
            text: text.to_string(),
            api_key: self.state.api_key.clone(),
        })
    }

    /// Second half of a send: append the assistant reply or surface the
    /// error, then always clear the loading flag.
    pub fn finish_send(&mut self, outcome: Result<String, ChatError>) {
        match outcome {
            Ok(reply) => {
                let message =
                    Message::new(state::next_message_id(&self.state), Role::Assistant, reply);
                debug!(id = message.id, "received assistant reply");
                self.dispatch(ChatAction::AddMessage(message));
            }
            Err(err) => {
                debug!("send failed: {err}");
                self.dispatch(ChatAction::SetError(Some(err.to_string())));
            }
        }
        self.dispatch(ChatAction::SetLoading(false));
    }

    /// Both halves in sequence, for headless callers and tests. The TUI runs
    /// the network call on a background task instead.
    pub async fn send_message<C: CompletionApi>(
        &mut self,
        client: &C,
        text: &str,
    ) -> Result<(), ChatError> {
        let pending = self.begin_send(text)?;
        let outcome = client
            .complete(&pending.history, &pending.text, &pending.api_key)
            .await;
        self.finish_send(outcome);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    enum StubOutcome {
        Reply(String),
        Status(u16),
    }

    /// Recording stub: remembers every (history, text) pair it was called
    /// with so request composition can be asserted.
    struct StubClient {
        outcome: StubOutcome,
        calls: Mutex<Vec<(Vec<Message>, String)>>,
    }

    impl StubClient {
        fn replying(reply: &str) -> Self {
            Self {
                outcome: StubOutcome::Reply(reply.to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                outcome: StubOutcome::Status(status),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionApi for StubClient {
        async fn complete(
            &self,
            history: &[Message],
            text: &str,
            _api_key: &str,
        ) -> Result<String, ChatError> {
            self.calls
                .lock()
                .unwrap()
                .push((history.to_vec(), text.to_string()));
            match &self.outcome {
                StubOutcome::Reply(reply) => Ok(reply.clone()),
                StubOutcome::Status(status) => {
                    Err(ChatError::ApiRequestFailed { status: *status })
                }
            }
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> ChatStore {
        ChatStore::open(KvStore::new(dir.path()))
    }

    fn store_with_key(dir: &tempfile::TempDir) -> ChatStore {
        let mut store = store_in(dir);
        store.dispatch(ChatAction::SetApiKey("sk-test".into()));
        store
    }

    #[tokio::test]
    async fn send_without_key_errors_and_appends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        let client = StubClient::replying("4");

        let result = store.send_message(&client, "hi").await;
        assert!(matches!(result, Err(ChatError::MissingCredential)));
        assert!(store.state().messages.is_empty());
        assert!(store.state().error.is_some());
        assert!(client.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn successful_send_appends_user_then_assistant() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with_key(&dir);
        let client = StubClient::replying("4");

        store.send_message(&client, "2+2?").await.unwrap();

        let messages = &store.state().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "2+2?");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "4");
        assert!(!store.state().is_loading);
        assert!(store.state().error.is_none());
    }

    #[tokio::test]
    async fn failed_send_keeps_user_message_and_sets_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with_key(&dir);
        let client = StubClient::failing(401);

        store.send_message(&client, "x").await.unwrap();

        let messages = &store.state().messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        let error = store.state().error.clone().unwrap();
        assert!(error.contains("401"));
        assert!(!store.state().is_loading);
    }

    #[tokio::test]
    async fn request_is_prior_log_plus_new_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with_key(&dir);
        let client = StubClient::replying("4");

        store.send_message(&client, "2+2?").await.unwrap();
        store.send_message(&client, "and 3+3?").await.unwrap();

        let calls = client.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        // First call sees an empty prior log
        assert!(calls[0].0.is_empty());
        assert_eq!(calls[0].1, "2+2?");
        // Second call sees both earlier turns, in order
        let contents: Vec<&str> = calls[1].0.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["2+2?", "4"]);
        assert_eq!(calls[1].1, "and 3+3?");
    }

    #[test]
    fn second_begin_send_is_rejected_while_loading() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with_key(&dir);

        store.begin_send("first").unwrap();
        let before = store.state().clone();

        let result = store.begin_send("second");
        assert!(matches!(result, Err(ChatError::SendInFlight)));
        assert_eq!(store.state().messages, before.messages);
        assert!(store.state().is_loading);
    }

    #[test]
    fn set_api_key_round_trips_through_storage() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = store_in(&dir);
            store.dispatch(ChatAction::SetApiKey("sk-persisted".into()));
        }
        let store = store_in(&dir);
        assert_eq!(store.state().api_key, "sk-persisted");
    }

    #[test]
    fn recent_questions_persist_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = store_with_key(&dir);
            store.begin_send("remember me").unwrap();
        }
        let store = store_in(&dir);
        assert_eq!(store.state().recent_questions.len(), 1);
        assert_eq!(store.state().recent_questions[0].content, "remember me");
        // The message log itself is volatile
        assert!(store.state().messages.is_empty());
    }

    #[test]
    fn corrupt_recent_questions_hydrate_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = KvStore::new(dir.path());
        storage.set(RECENT_QUESTIONS_KEY, "{not json").unwrap();

        let store = ChatStore::open(KvStore::new(dir.path()));
        assert!(store.state().recent_questions.is_empty());
    }

    #[test]
    fn hydration_normalizes_role_and_length() {
        let dir = tempfile::tempdir().unwrap();
        let storage = KvStore::new(dir.path());
        let mut stale: Vec<Message> = (0..12)
            .map(|i| Message::new(i, Role::User, format!("q{i}")))
            .collect();
        stale.push(Message::new(99, Role::Assistant, "not a question"));
        storage
            .set(RECENT_QUESTIONS_KEY, &serde_json::to_string(&stale).unwrap())
            .unwrap();

        let store = ChatStore::open(KvStore::new(dir.path()));
        let recent = &store.state().recent_questions;
        assert_eq!(recent.len(), RECENT_QUESTIONS_LIMIT);
        assert!(recent.iter().all(|m| m.role == Role::User));
    }
}
