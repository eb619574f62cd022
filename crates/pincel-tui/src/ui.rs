use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
};
use crate::app::{clamp_scroll, App, InputMode, Popup, Screen};
use pincel_core::media::is_transient;
use pincel_core::{ChatMessage, ChatRole, ImageData, Operation};

/// Ensure the selected item in a list is visible by adjusting the ListState offset.
fn ensure_selected_visible(state: &mut ListState, visible_height: usize) {
    let visible_height = visible_height.max(1);

    if let Some(selected) = state.selected() {
        // Valid offsets run from "selected at bottom" to "selected at top"
        let min_offset = selected.saturating_sub(visible_height - 1);
        let max_offset = selected;

        let new_offset = state.offset().clamp(min_offset, max_offset);
        if new_offset != state.offset() {
            *state.offset_mut() = new_offset;
        }
    }
}

/// Wrap text to fit within a given width, returning multiple lines
/// Uses word boundaries for wrapping (doesn't break mid-word)
fn wrap_text_to_width(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current_line = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if current_len == 0 {
            current_line = word.to_string();
            current_len = word_len;
        } else if current_len + 1 + word_len <= width {
            current_line.push(' ');
            current_line.push_str(word);
            current_len += 1 + word_len;
        } else {
            lines.push(current_line);
            current_line = word.to_string();
            current_len = word_len;
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }

    lines
}

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                if !current_text.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current_text)));
                }
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

/// One-line summary of an image reference for the thread and gallery
fn describe_image(image: Option<&ImageData>) -> String {
    match image {
        Some(image) => format!("{} · {}", image.media_type, format_size(image.bytes.len())),
        None => "no longer available".to_string(),
    }
}

fn format_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{} KB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}

/// Mask all but the last four characters of a secret
fn mask_secret(secret: &str) -> String {
    let len = secret.chars().count();
    if len <= 4 {
        "*".repeat(len)
    } else {
        let last_four: String = secret.chars().skip(len - 4).collect();
        format!("{}...{}", "*".repeat((len - 4).min(20)), last_four)
    }
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(2));
    Rect::new(
        area.x + (area.width.saturating_sub(width)) / 2,
        area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    )
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
        Screen::Sessions => render_sessions_screen(app, frame, body_area),
        Screen::Gallery => render_gallery_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    // Overlays, viewer below popups
    if app.conversation.selected_image().is_some() {
        render_image_viewer(app, frame, area);
    }
    if let Some(popup) = app.popup {
        render_popup(app, popup, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let tab = |label: &'static str, screen: Screen| {
        if app.screen == screen {
            Span::styled(
                format!(" {} ", label),
                Style::default().fg(Color::Black).bg(Color::Cyan).bold(),
            )
        } else {
            Span::styled(format!(" {} ", label), Style::default().fg(Color::White))
        }
    };

    let key_status = match (&app.provider, app.config.key_source()) {
        (Some(_), Some(source)) => {
            Span::styled(format!(" key: {} ", source), Style::default().fg(Color::Gray))
        }
        (Some(_), None) => Span::raw(""),
        (None, _) => Span::styled(" no API key (K) ", Style::default().fg(Color::Red).bold()),
    };

    let title = Line::from(vec![
        Span::styled(" Pincel ", Style::default().fg(Color::Cyan).bold()),
        tab("Chat", Screen::Chat),
        tab("Sessions", Screen::Sessions),
        tab("Gallery", Screen::Gallery),
        key_status,
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
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
        Screen::Chat if app.input_mode == InputMode::Editing => " TYPE ",
        Screen::Chat => " CHAT ",
        Screen::Sessions => " SESSIONS ",
        Screen::Gallery => " GALLERY ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let hint = |key: &'static str, label: &'static str| {
        [
            Span::styled(format!(" {} ", key), key_style),
            Span::styled(format!(" {} ", label), label_style),
        ]
    };

    let pairs: Vec<[Span; 2]> = if app.popup.is_some() {
        vec![hint("Enter", "confirm"), hint("Esc", "cancel")]
    } else if app.conversation.selected_image().is_some() {
        vec![hint("d", "download"), hint("Esc", "close")]
    } else {
        match (app.screen, app.input_mode) {
            (Screen::Chat, InputMode::Editing) => vec![
                hint("Enter", "send"),
                hint("^O", "attach"),
                hint("^X", "remove"),
                hint("Esc", "stop typing"),
            ],
            (Screen::Chat, InputMode::Normal) => vec![
                hint("i", "type"),
                hint("j/k", "scroll"),
                hint("v", "view image"),
                hint("n", "new chat"),
                hint("s", "sessions"),
                hint("g", "gallery"),
                hint("K", "API key"),
                hint("q", "quit"),
            ],
            (Screen::Sessions, _) => vec![
                hint("j/k", "nav"),
                hint("Enter", "open"),
                hint("n", "new chat"),
                hint("Esc", "chat"),
            ],
            (Screen::Gallery, _) => vec![
                hint("j/k", "nav"),
                hint("Enter", "view"),
                hint("Esc", "chat"),
            ],
        }
    };

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(pairs.into_iter().flatten())
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let banner = app
        .conversation
        .error()
        .map(|e| (e.to_string(), Color::Red))
        .or_else(|| app.status.clone().map(|s| (s, Color::Green)));

    let [banner_area, chat_area, input_area] = Layout::vertical([
        Constraint::Length(if banner.is_some() { 1 } else { 0 }),
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    render_thread(app, frame, chat_area);

    if let Some((text, color)) = banner {
        let banner = Paragraph::new(format!(" {} ", text))
            .style(Style::default().fg(Color::White).bg(color));
        frame.render_widget(banner, banner_area);
    }

    render_composer(app, frame, input_area);
}

/// Lines for one message, wrapped to `width`
fn message_lines(app: &App, msg: &ChatMessage, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let (label, color) = match msg.role {
        ChatRole::User => ("You:", Color::Cyan),
        ChatRole::Model => ("AI:", Color::Yellow),
    };
    lines.push(Line::from(Span::styled(
        label,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )));

    for part in &msg.parts {
        if let Some(url) = &part.image_url {
            let image = app.conversation.resolve_image(url);
            lines.push(Line::from(Span::styled(
                format!("[image {}]", describe_image(image.as_ref())),
                Style::default().fg(Color::Magenta),
            )));
        }
        if let Some(text) = &part.text {
            for raw in text.lines() {
                if raw.trim().is_empty() {
                    lines.push(Line::default());
                    continue;
                }
                for wrapped in wrap_text_to_width(raw, width) {
                    lines.push(match msg.role {
                        ChatRole::User => Line::from(wrapped),
                        ChatRole::Model => parse_markdown_line(&wrapped),
                    });
                }
            }
        }
    }

    lines.push(Line::default());
    lines
}

fn render_thread(app: &mut App, frame: &mut Frame, area: Rect) {
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if app.input_mode == InputMode::Normal {
            Color::Cyan
        } else {
            Color::DarkGray
        }))
        .title(format!(" {} ", app.conversation.active_session().title()));

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);
    let width = app.chat_width as usize;

    let mut lines: Vec<Line> = Vec::new();
    for msg in &app.conversation.active_session().messages {
        lines.extend(message_lines(app, msg, width));
    }

    if app.is_loading() {
        let operation = app
            .pending
            .as_ref()
            .and_then(|(request, _)| request.route.as_ref().ok())
            .map(|route| route.operation())
            .unwrap_or(Operation::Converse);
        lines.push(Line::from(Span::styled(
            "AI:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("{}{}", operation.display_name(), dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let max_scroll = clamp_scroll(lines.len(), app.chat_height);
    app.chat_scroll = app.chat_scroll.min(max_scroll);

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_composer(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let mut title = vec![Span::raw(" Message ")];
    if let Some(attachment) = &app.attachment {
        let name = attachment
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| attachment.path.display().to_string());
        title.push(Span::styled(
            format!("[+ {} · {}] ", name, format_size(attachment.image.bytes.len())),
            Style::default().fg(Color::Magenta),
        ));
    }

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if editing { Color::Yellow } else { Color::DarkGray }))
        .title(Line::from(title));

    // Horizontal scrolling keeps the cursor visible
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.cursor;
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
        .map(|c| if c == '\n' { '⏎' } else { c })
        .collect();

    let style = if app.is_loading() {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Cyan)
    };

    let input = Paragraph::new(visible_text).style(style).block(input_block);
    frame.render_widget(input, area);

    if editing && app.popup.is_none() && app.conversation.selected_image().is_none() {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_sessions_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let active_id = app.conversation.active_id().to_string();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" Chats ({}) ", app.conversation.sessions().len()));

    let items: Vec<ListItem> = app
        .conversation
        .sessions()
        .iter()
        .map(|session| {
            let marker = if session.id == active_id { "* " } else { "  " };
            let style = if session.id == active_id {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{}{}", marker, session.title()), style),
                Span::styled(
                    format!("  ({} messages)", session.messages.len()),
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
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

    let visible_height = area.height.saturating_sub(2) as usize;
    ensure_selected_visible(&mut app.sessions_state, visible_height);

    frame.render_stateful_widget(list, area, &mut app.sessions_state);
}

fn render_gallery_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let gallery = app.gallery();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" Images ({}) ", gallery.len()));

    if gallery.is_empty() {
        let placeholder = Paragraph::new(
            "No images yet.\nAsk for one in the chat, or attach a photo with Ctrl+O.",
        )
        .style(Style::default().fg(Color::DarkGray))
        .block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    if app.gallery_state.selected().is_none() {
        app.gallery_state.select(Some(0));
    }

    let items: Vec<ListItem> = gallery
        .iter()
        .map(|item| {
            let image = app.conversation.resolve_image(&item.image_url);
            ListItem::new(vec![
                Line::from(Span::styled(
                    item.session_title.clone(),
                    Style::default().fg(Color::Yellow).bold(),
                )),
                Line::from(Span::styled(
                    format!("  {}", describe_image(image.as_ref())),
                    Style::default().fg(Color::Magenta),
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

    // Each item is 2 lines, so calculate visible items accordingly
    let visible_items = (area.height.saturating_sub(2) / 2) as usize;
    ensure_selected_visible(&mut app.gallery_state, visible_items);

    frame.render_stateful_widget(list, area, &mut app.gallery_state);
}

fn render_image_viewer(app: &App, frame: &mut Frame, area: Rect) {
    let Some(url) = app.conversation.selected_image() else {
        return;
    };
    let image = app.conversation.resolve_image(url);

    let popup_area = centered_rect(area, 56, 9);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta))
        .title(" Image ");

    let source = if is_transient(url) {
        "this session only"
    } else {
        "saved with the chat"
    };

    let mut lines = vec![
        Line::from(Span::styled(describe_image(image.as_ref()), Style::default().bold())),
        Line::from(Span::styled(source, Style::default().fg(Color::DarkGray))),
        Line::default(),
    ];
    if let Some(status) = &app.status {
        lines.push(Line::from(Span::styled(status.clone(), Style::default().fg(Color::Green))));
    } else {
        lines.push(Line::default());
    }
    lines.push(Line::default());
    lines.push(Line::from(Span::styled(
        "d download · Esc close",
        Style::default().fg(Color::DarkGray),
    )));

    let viewer = Paragraph::new(lines)
        .block(block)
        .alignment(Alignment::Center);
    frame.render_widget(viewer, popup_area);
}

fn render_popup(app: &App, popup: Popup, frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(area, 60, 7);
    frame.render_widget(Clear, popup_area);

    let (title, instructions, display_text) = match popup {
        Popup::AttachPath => (
            " Attach Image ",
            "Path to a PNG, JPEG or WebP file. Enter to attach, Esc to cancel.",
            app.popup_input.clone(),
        ),
        Popup::ApiKey => (
            " Gemini API Key ",
            "Paste your API key below. Press Enter to save, Esc to cancel.",
            mask_secret(&app.popup_input),
        ),
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(title);

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new(instructions).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 1));

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    let visible: String = {
        let len = display_text.chars().count();
        let skip = len.saturating_sub(input_area.width.saturating_sub(1) as usize);
        display_text.chars().skip(skip).collect()
    };
    let cursor_x = visible.chars().count() as u16;
    frame.render_widget(
        Paragraph::new(visible).style(Style::default().fg(Color::Cyan)),
        input_area,
    );
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));

    let char_count = format!("{} characters", app.popup_input.chars().count());
    let status = Paragraph::new(char_count).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(status, Rect::new(inner.x, inner.y + 4, inner.width, 1));
}
