use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crate::app::{App, InputMode, Popup, Screen};
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
        AppEvent::Paste(text) => handle_paste(app, &text),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
            app.poll_pending().await;
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

    if app.popup.is_some() {
        handle_popup(app, key);
        return;
    }

    if app.conversation.selected_image().is_some() {
        handle_image_viewer(app, key);
        return;
    }

    match app.screen {
        Screen::Chat => match app.input_mode {
            InputMode::Normal => handle_chat_normal(app, key),
            InputMode::Editing => handle_chat_editing(app, key),
        },
        Screen::Sessions => handle_sessions(app, key),
        Screen::Gallery => handle_gallery(app, key),
    }
}

fn handle_paste(app: &mut App, text: &str) {
    if app.popup.is_some() {
        app.popup_input.push_str(text.trim_end_matches(['\r', '\n']));
    } else if app.screen == Screen::Chat && app.input_mode == InputMode::Editing {
        let byte_pos = char_to_byte_index(&app.input, app.cursor);
        app.input.insert_str(byte_pos, text);
        app.cursor += text.chars().count();
    }
}

fn handle_popup(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.close_popup(),
        KeyCode::Enter => app.confirm_popup(),
        KeyCode::Backspace => {
            app.popup_input.pop();
        }
        KeyCode::Char(c) => app.popup_input.push(c),
        _ => {}
    }
}

fn handle_image_viewer(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('d') => app.download_selected_image(),
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Enter => app.conversation.close_image(),
        _ => {}
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Back to the composer
        KeyCode::Char('i') | KeyCode::Char('a') | KeyCode::Enter => {
            app.input_mode = InputMode::Editing;
        }

        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),

        KeyCode::Char('v') => app.open_latest_image(),
        KeyCode::Char('o') => app.open_popup(Popup::AttachPath),
        KeyCode::Char('x') => app.remove_attachment(),
        KeyCode::Char('n') => app.new_chat(),
        KeyCode::Char('K') => app.open_popup(Popup::ApiKey),

        // Screen switching
        KeyCode::Char('s') | KeyCode::Tab => {
            app.sessions_state.select(Some(app.conversation.active_index()));
            app.screen = Screen::Sessions;
        }
        KeyCode::Char('g') => app.screen = Screen::Gallery,

        _ => {}
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
            app.conversation.clear_error();
        }
        KeyCode::Char('o') if ctrl => app.open_popup(Popup::AttachPath),
        KeyCode::Char('x') if ctrl => app.remove_attachment(),
        KeyCode::Enter if key.modifiers.contains(KeyModifiers::SHIFT) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, '\n');
            app.cursor += 1;
        }
        KeyCode::Enter => app.submit(),
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::Char(c) if !ctrl => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
}

fn handle_sessions(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('j') | KeyCode::Down => app.sessions_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.sessions_nav_up(),
        KeyCode::Enter | KeyCode::Char('l') => app.open_selected_session(),
        KeyCode::Char('n') => app.new_chat(),
        KeyCode::Char('g') => app.screen = Screen::Gallery,
        KeyCode::Esc | KeyCode::Tab | KeyCode::Char('h') => app.screen = Screen::Chat,
        _ => {}
    }
}

fn handle_gallery(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('j') | KeyCode::Down => app.gallery_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.gallery_nav_up(),
        KeyCode::Enter => app.open_selected_gallery_image(),
        KeyCode::Char('s') => app.screen = Screen::Sessions,
        KeyCode::Esc | KeyCode::Tab => app.screen = Screen::Chat,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventKind, KeyEventState};
    use pincel_core::{Config, Conversation, MessageRouter};

    fn app() -> App {
        App::new(
            Config::default(),
            Conversation::in_memory(MessageRouter::new()),
            None,
        )
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn typing_respects_multibyte_cursor() {
        let mut app = app();
        for c in "pintá".chars() {
            handle_key(&mut app, key(KeyCode::Char(c)));
        }
        handle_key(&mut app, key(KeyCode::Left));
        handle_key(&mut app, key(KeyCode::Backspace));
        assert_eq!(app.input, "piná");
        assert_eq!(app.cursor, 3);

        handle_key(&mut app, key(KeyCode::End));
        handle_key(&mut app, key(KeyCode::Backspace));
        assert_eq!(app.input, "pin");
        assert_eq!(app.cursor, 3);
    }

    #[test]
    fn new_chat_from_sessions_screen_returns_to_chat() {
        let mut app = app();
        handle_key(&mut app, key(KeyCode::Esc));
        handle_key(&mut app, key(KeyCode::Char('s')));
        assert_eq!(app.screen, Screen::Sessions);

        handle_key(&mut app, key(KeyCode::Char('n')));
        assert_eq!(app.screen, Screen::Chat);
        assert_eq!(app.conversation.sessions().len(), 2);
    }

    #[test]
    fn viewer_swallows_keys_until_closed() {
        let mut app = app();
        app.input_mode = InputMode::Normal;
        app.conversation.open_image("data:image/png;base64,AQID");

        handle_key(&mut app, key(KeyCode::Char('q')));
        assert!(!app.should_quit);
        assert!(app.conversation.selected_image().is_none());
    }
}
