use ratatui::widgets::ListState;
use tokio::task::JoinHandle;

use crate::error::ChatError;
use crate::openai::OpenAIClient;
use crate::state::ChatState;
use crate::storage::KvStore;
use crate::store::ChatStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Chat,
    Dashboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,

    // Conversation state store + completion client
    pub store: ChatStore,
    pub client: OpenAIClient,

    // Message input state
    pub input: String,
    pub input_cursor: usize, // cursor position in input (chars)

    // Transcript scroll state
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of transcript area for scroll calculations
    pub chat_width: u16,  // Width of transcript area for wrap calculations

    // Dashboard state
    pub dashboard_state: ListState,

    // API key popup state
    pub show_api_key_input: bool,
    pub api_key_input: String,
    pub api_key_input_cursor: usize,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // In-flight send, polled on tick
    pub send_task: Option<JoinHandle<Result<String, ChatError>>>,
}

impl App {
    pub fn new(storage: KvStore) -> Self {
        let store = ChatStore::open(storage);

        Self {
            should_quit: false,
            screen: Screen::Chat,
            input_mode: InputMode::Normal,

            store,
            client: OpenAIClient::new(),

            input: String::new(),
            input_cursor: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            dashboard_state: ListState::default(),

            show_api_key_input: false,
            api_key_input: String::new(),
            api_key_input_cursor: 0,

            animation_frame: 0,

            send_task: None,
        }
    }

    pub fn state(&self) -> &ChatState {
        self.store.state()
    }

    pub fn send_in_flight(&self) -> bool {
        self.send_task.is_some()
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.state().is_loading {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Finish the in-flight send once its task completes. A join failure
    /// (panicked task) still goes through `finish_send` so the loading flag
    /// always clears.
    pub async fn poll_send_task(&mut self) {
        let finished = matches!(&self.send_task, Some(task) if task.is_finished());
        if !finished {
            return;
        }
        if let Some(task) = self.send_task.take() {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(err) => Err(ChatError::Transport(format!("send task failed: {err}"))),
            };
            self.store.finish_send(outcome);
            self.scroll_chat_to_bottom();
        }
    }

    // Transcript scrolling
    pub fn scroll_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    /// Scroll the transcript so the newest message (or "Thinking...") is
    /// visible.
    pub fn scroll_chat_to_bottom(&mut self) {
        // Use actual transcript width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;

        for msg in &self.state().messages {
            total_lines += 1; // Role line ("You:" or "AI:")
            for line in msg.content.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                if char_count == 0 {
                    total_lines += 1; // Empty line still takes one line
                } else {
                    total_lines += ((char_count / wrap_width) + 1) as u16;
                }
            }
            total_lines += 1; // Blank line after message
        }

        if self.state().is_loading {
            total_lines += 2; // "AI:" + "Thinking..."
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        if total_lines > visible_height {
            self.chat_scroll = total_lines.saturating_sub(visible_height);
        } else {
            self.chat_scroll = 0;
        }
    }

    // Dashboard list navigation
    pub fn dashboard_nav_down(&mut self) {
        let len = self.state().recent_questions.len();
        if len > 0 {
            let i = self.dashboard_state.selected().unwrap_or(0);
            self.dashboard_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn dashboard_nav_up(&mut self) {
        let i = self.dashboard_state.selected().unwrap_or(0);
        self.dashboard_state.select(Some(i.saturating_sub(1)));
    }

    pub fn open_dashboard(&mut self) {
        self.screen = Screen::Dashboard;
        self.input_mode = InputMode::Normal;
        if self.dashboard_state.selected().is_none() && !self.state().recent_questions.is_empty() {
            self.dashboard_state.select(Some(0));
        }
    }

    pub fn open_api_key_popup(&mut self) {
        self.show_api_key_input = true;
        self.api_key_input.clear();
        self.api_key_input_cursor = 0;
    }

    pub fn close_api_key_popup(&mut self) {
        self.show_api_key_input = false;
        self.api_key_input.clear();
        self.api_key_input_cursor = 0;
    }
}
