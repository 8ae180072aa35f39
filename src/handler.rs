use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};

use crate::app::{App, InputMode, Screen};
use crate::error::ChatError;
use crate::openai::CompletionApi;
use crate::state::ChatAction;
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
            app.poll_send_task().await;
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // The popup captures everything while it is open
    if app.show_api_key_input {
        handle_api_key_input(app, key);
        return;
    }

    match (app.screen, app.input_mode) {
        (Screen::Chat, InputMode::Normal) => handle_chat_normal(app, key),
        (Screen::Chat, InputMode::Editing) => handle_chat_editing(app, key),
        (Screen::Dashboard, _) => handle_dashboard(app, key),
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Transcript scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),
        KeyCode::Char('g') => app.chat_scroll = 0,
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),

        // Start typing a message
        KeyCode::Char('i') | KeyCode::Enter => {
            app.input_mode = InputMode::Editing;
            app.input_cursor = app.input.chars().count();
        }

        // Clear the conversation (only when there is one)
        KeyCode::Char('c') => {
            if !app.state().messages.is_empty() {
                app.store.dispatch(ChatAction::ClearMessages);
                app.chat_scroll = 0;
            }
        }

        // Screen switching and settings
        KeyCode::Char('d') | KeyCode::Tab => app.open_dashboard(),
        KeyCode::Char('s') => app.open_api_key_popup(),

        _ => {}
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            let text = app.input.trim().to_string();
            if !text.is_empty() && !app.send_in_flight() {
                start_send(app, &text);
            }
        }
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.input_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
            app.input.insert(byte_pos, c);
            app.input_cursor += 1;
        }
        _ => {}
    }
}

/// Optimistic append plus a spawned network call; the tick handler joins the
/// task and finishes the send.
fn start_send(app: &mut App, text: &str) {
    match app.store.begin_send(text) {
        Ok(pending) => {
            app.input.clear();
            app.input_cursor = 0;
            app.input_mode = InputMode::Normal;
            app.scroll_chat_to_bottom();

            let client = app.client.clone();
            app.send_task = Some(tokio::spawn(async move {
                client
                    .complete(&pending.history, &pending.text, &pending.api_key)
                    .await
            }));
        }
        // Store-enforced single flight; the Enter guard above is advisory
        Err(ChatError::SendInFlight) => {}
        // MissingCredential: the error is already on the state, just show it
        Err(_) => {
            app.input_mode = InputMode::Normal;
        }
    }
}

fn handle_dashboard(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Esc | KeyCode::Tab | KeyCode::Char('d') => {
            app.screen = Screen::Chat;
        }
        KeyCode::Char('j') | KeyCode::Down => app.dashboard_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.dashboard_nav_up(),
        KeyCode::Char('s') => app.open_api_key_popup(),
        _ => {}
    }
}

fn handle_api_key_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.close_api_key_popup();
        }
        KeyCode::Enter => {
            // Only a non-empty key is saved; Enter on empty input is a no-op
            if !app.api_key_input.is_empty() {
                let key = app.api_key_input.clone();
                app.store.dispatch(ChatAction::SetApiKey(key));
                app.close_api_key_popup();
            }
        }
        KeyCode::Backspace => {
            if app.api_key_input_cursor > 0 {
                app.api_key_input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.api_key_input, app.api_key_input_cursor);
                app.api_key_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.api_key_input_cursor = app.api_key_input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.api_key_input.chars().count();
            app.api_key_input_cursor = (app.api_key_input_cursor + 1).min(char_count);
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.api_key_input, app.api_key_input_cursor);
            app.api_key_input.insert(byte_pos, c);
            app.api_key_input_cursor += 1;
        }
        _ => {}
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollDown => match app.screen {
            Screen::Chat => {
                app.scroll_down();
                app.scroll_down();
                app.scroll_down();
            }
            Screen::Dashboard => app.dashboard_nav_down(),
        },
        MouseEventKind::ScrollUp => match app.screen {
            Screen::Chat => {
                app.scroll_up();
                app.scroll_up();
                app.scroll_up();
            }
            Screen::Dashboard => app.dashboard_nav_up(),
        },
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_to_byte_index_handles_multibyte() {
        let s = "héllo";
        assert_eq!(char_to_byte_index(s, 0), 0);
        assert_eq!(char_to_byte_index(s, 1), 1);
        assert_eq!(char_to_byte_index(s, 2), 3);
        assert_eq!(char_to_byte_index(s, 99), s.len());
    }
}
