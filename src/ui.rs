use chrono::Local;
use ratatui::{
    layout::{Constraint, Layout, Margin, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, Clear, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation,
        ScrollbarState, Wrap,
    },
    Frame,
};

use crate::app::{App, InputMode, Screen};
use crate::state::{Message, Role};

/// Recent-question entries are previewed to this many characters.
const PREVIEW_LEN: usize = 100;

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut current_text = String::new();

    while let Some((_, c)) = chars.next() {
        if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
            // Consume the second *
            chars.next();

            // Push any accumulated plain text
            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;

            while let Some((_, c)) = chars.next() {
                if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
                    chars.next(); // consume second *
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

/// Truncate a question for the dashboard list.
fn preview(content: &str) -> String {
    if content.chars().count() > PREVIEW_LEN {
        let cut: String = content.chars().take(PREVIEW_LEN).collect();
        format!("{}...", cut)
    } else {
        content.to_string()
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Chat => render_chat_screen(app, frame, body_area),
        Screen::Dashboard => render_dashboard_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    if app.show_api_key_input {
        render_api_key_input(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let key_indicator = if app.state().api_key.is_empty() {
        Span::styled(" [no API key] ", Style::default().fg(Color::Red))
    } else {
        Span::styled(" [key set] ", Style::default().fg(Color::Green))
    };

    let title = Line::from(vec![
        Span::styled(" chatwrap ", Style::default().fg(Color::Cyan).bold()),
        key_indicator,
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.screen {
        Screen::Chat => " CHAT ",
        Screen::Dashboard => " DASHBOARD ",
    };

    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = if app.show_api_key_input {
        vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" save ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" cancel ", label_style),
        ]
    } else {
        match (app.screen, app.input_mode) {
            (Screen::Chat, InputMode::Normal) => {
                let mut hints = vec![
                    Span::styled(" i ", key_style),
                    Span::styled(" type ", label_style),
                    Span::styled(" j/k ", key_style),
                    Span::styled(" scroll ", label_style),
                ];
                if !app.state().messages.is_empty() {
                    hints.extend(vec![
                        Span::styled(" c ", key_style),
                        Span::styled(" clear ", label_style),
                    ]);
                }
                hints.extend(vec![
                    Span::styled(" d ", key_style),
                    Span::styled(" dashboard ", label_style),
                    Span::styled(" s ", key_style),
                    Span::styled(" API key ", label_style),
                    Span::styled(" q ", key_style),
                    Span::styled(" quit ", label_style),
                ]);
                hints
            }
            (Screen::Chat, InputMode::Editing) => vec![
                Span::styled(" Enter ", key_style),
                Span::styled(" send ", label_style),
                Span::styled(" Esc ", key_style),
                Span::styled(" stop typing ", label_style),
            ],
            (Screen::Dashboard, _) => vec![
                Span::styled(" j/k ", key_style),
                Span::styled(" nav ", label_style),
                Span::styled(" d ", key_style),
                Span::styled(" chat ", label_style),
                Span::styled(" s ", key_style),
                Span::styled(" API key ", label_style),
                Span::styled(" q ", key_style),
                Span::styled(" quit ", label_style),
            ],
        }
    };

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let error_height = if app.state().error.is_some() { 3 } else { 0 };

    let [chat_area, error_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(error_height),
        Constraint::Length(3),
    ])
    .areas(area);

    render_transcript(app, frame, chat_area);

    if let Some(error) = app.state().error.clone() {
        let error_block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red))
            .title(" Error ");
        let banner = Paragraph::new(error)
            .style(Style::default().fg(Color::Red))
            .block(error_block);
        frame.render_widget(banner, error_area);
    }

    render_input(app, frame, input_area);
}

fn message_role_line(msg: &Message) -> Line<'static> {
    let stamp = msg.timestamp.with_timezone(&Local).format("%H:%M");
    let (label, color) = match msg.role {
        Role::User => ("You:", Color::Cyan),
        Role::Assistant => ("AI:", Color::Yellow),
    };
    Line::from(vec![
        Span::styled(
            label.to_string(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!("  {}", stamp), Style::default().fg(Color::DarkGray)),
    ])
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversation ");

    // Store transcript dimensions for scroll calculations (inner size minus borders)
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let state = app.state();

    if state.api_key.is_empty() {
        let welcome = Text::from(vec![
            Line::from(Span::styled(
                "Welcome to chatwrap",
                Style::default().fg(Color::Cyan).bold(),
            )),
            Line::default(),
            Line::from("Please set your OpenAI API key to start chatting."),
            Line::from("Press 's' to open the API key settings."),
        ]);
        let placeholder = Paragraph::new(welcome)
            .style(Style::default().fg(Color::DarkGray))
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(placeholder, area);
        return;
    }

    let chat_text = if state.messages.is_empty() && !state.is_loading {
        Text::from(Span::styled(
            "Start a conversation by typing a message below.",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in &state.messages {
            lines.push(message_role_line(msg));
            match msg.role {
                Role::User => {
                    for line in msg.content.lines() {
                        lines.push(Line::from(line.to_string()));
                    }
                }
                Role::Assistant => {
                    for line in msg.content.lines() {
                        lines.push(parse_markdown_line(line));
                    }
                }
            }
            lines.push(Line::default());
        }

        if state.is_loading {
            lines.push(Line::from(Span::styled(
                "AI:",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let total_lines = chat_text.lines.len() as u16;

    let chat = Paragraph::new(chat_text)
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);

    if total_lines > app.chat_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("^"))
            .end_symbol(Some("v"));

        let mut scrollbar_state =
            ScrollbarState::new(total_lines as usize).position(app.chat_scroll as usize);

        frame.render_stateful_widget(
            scrollbar,
            area.inner(Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let (title, border_color) = if app.send_in_flight() {
        (" Sending... ", Color::DarkGray)
    } else if app.input_mode == InputMode::Editing {
        (" Message (Enter to send) ", Color::Yellow)
    } else {
        (" Message ('i' to type) ", Color::DarkGray)
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;

    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    if app.input_mode == InputMode::Editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_dashboard_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [stats_area, list_area] = Layout::vertical([
        Constraint::Length(5),
        Constraint::Min(0),
    ])
    .areas(area);

    render_stats(app, frame, stats_area);
    render_recent_questions(app, frame, list_area);
}

fn render_stats(app: &App, frame: &mut Frame, area: Rect) {
    let stats = app.state().stats();

    let cells: [(&str, usize); 4] = [
        ("Total Messages", stats.total_messages),
        ("Your Questions", stats.user_messages),
        ("AI Responses", stats.assistant_messages),
        ("Recent Questions", stats.recent_questions),
    ];

    let areas = Layout::horizontal([Constraint::Ratio(1, 4); 4]).split(area);

    for ((label, value), cell_area) in cells.iter().zip(areas.iter()) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray));

        let content = Text::from(vec![
            Line::from(Span::styled(
                value.to_string(),
                Style::default().fg(Color::Cyan).bold(),
            )),
            Line::from(Span::styled(
                label.to_string(),
                Style::default().fg(Color::DarkGray),
            )),
        ]);

        let cell = Paragraph::new(content).block(block);
        frame.render_widget(cell, *cell_area);
    }
}

fn render_recent_questions(app: &mut App, frame: &mut Frame, area: Rect) {
    let recent = &app.state().recent_questions;

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" Recent Questions ({}) ", recent.len()));

    if recent.is_empty() {
        let placeholder = Paragraph::new(
            "No questions yet. Start a conversation to see your recent questions here.",
        )
        .style(Style::default().fg(Color::DarkGray))
        .block(block)
        .wrap(Wrap { trim: true });
        frame.render_widget(placeholder, area);
        return;
    }

    let total = recent.len();
    let items: Vec<ListItem> = recent
        .iter()
        .enumerate()
        .map(|(i, question)| {
            // Newest first in the list; oldest entry is #1
            let number = total - i;
            let stamp = question
                .timestamp
                .with_timezone(&Local)
                .format("%b %d, %Y %H:%M");
            ListItem::new(vec![
                Line::from(vec![
                    Span::styled(
                        format!(" #{} ", number),
                        Style::default().fg(Color::Magenta).bold(),
                    ),
                    Span::raw(preview(&question.content)),
                ]),
                Line::from(Span::styled(
                    format!("    {}", stamp),
                    Style::default().fg(Color::DarkGray),
                )),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.dashboard_state);
}

fn render_api_key_input(app: &App, frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = 7;

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Enter OpenAI API Key ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions =
        Paragraph::new("Paste your API key below. Press Enter to save, Esc to cancel.")
            .style(Style::default().fg(Color::DarkGray));

    let instructions_area = Rect::new(inner.x, inner.y, inner.width, 1);
    frame.render_widget(instructions, instructions_area);

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);

    // Mask the key with asterisks (show last 4 chars)
    let display_text = if app.api_key_input.is_empty() {
        String::new()
    } else if app.api_key_input.chars().count() <= 4 {
        "*".repeat(app.api_key_input.chars().count())
    } else {
        let char_count = app.api_key_input.chars().count();
        let masked_len = char_count - 4;
        let last_four: String = app.api_key_input.chars().skip(masked_len).collect();
        format!("{}...{}", "*".repeat(masked_len.min(20)), last_four)
    };

    let input = Paragraph::new(display_text).style(Style::default().fg(Color::Cyan));
    frame.render_widget(input, input_area);

    let cursor_x = app.api_key_input_cursor.min(input_area.width as usize) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));

    let char_count = format!("{} characters", app.api_key_input.chars().count());
    let status = Paragraph::new(char_count).style(Style::default().fg(Color::DarkGray));

    let status_area = Rect::new(inner.x, inner.y + 4, inner.width, 1);
    frame.render_widget(status, status_area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_long_questions() {
        let long = "x".repeat(150);
        let short = preview(&long);
        assert_eq!(short.chars().count(), PREVIEW_LEN + 3);
        assert!(short.ends_with("..."));
    }

    #[test]
    fn preview_leaves_short_questions_alone() {
        assert_eq!(preview("what is 2+2?"), "what is 2+2?");
    }

    #[test]
    fn markdown_bold_becomes_styled_span() {
        let line = parse_markdown_line("the answer is **4** exactly");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "4");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn unclosed_bold_is_literal() {
        let line = parse_markdown_line("just **literal");
        let flat: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(flat, "just **literal");
    }
}
