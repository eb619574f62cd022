use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use ratatui::widgets::ListState;
use tokio::task::JoinHandle;

use pincel_core::{
    Config, Conversation, GalleryItem, GeminiClient, GenerationProvider, ImageData, MessagePart,
    PendingRequest, RemoteError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Chat,
    Sessions,
    Gallery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Popup {
    AttachPath,
    ApiKey,
}

/// The image waiting in the composer
pub struct Attachment {
    pub path: PathBuf,
    pub image: ImageData,
    /// Transient reference shown in the composer; revoked on replace or remove
    pub preview_url: String,
}

type RequestTask = JoinHandle<Result<Vec<MessagePart>, RemoteError>>;

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,
    pub conversation: Conversation,
    pub config: Config,
    pub provider: Option<Arc<dyn GenerationProvider>>,

    // Composer
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars
    pub attachment: Option<Attachment>,

    // Popup text input (attachment path, API key)
    pub popup: Option<Popup>,
    pub popup_input: String,

    // In-flight request
    pub pending: Option<(PendingRequest, RequestTask)>,

    // Chat view
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations

    // Lists
    pub sessions_state: ListState,
    pub gallery_state: ListState,

    // Info line under the thread (download path, attach errors)
    pub status: Option<String>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation
}

impl App {
    pub fn new(
        config: Config,
        conversation: Conversation,
        provider: Option<Arc<dyn GenerationProvider>>,
    ) -> Self {
        let mut sessions_state = ListState::default();
        sessions_state.select(Some(conversation.active_index()));

        Self {
            should_quit: false,
            screen: Screen::Chat,
            input_mode: InputMode::Editing,
            conversation,
            config,
            provider,

            input: String::new(),
            cursor: 0,
            attachment: None,

            popup: None,
            popup_input: String::new(),

            pending: None,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            sessions_state,
            gallery_state: ListState::default(),

            status: None,
            animation_frame: 0,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.conversation.is_loading()
    }

    // Composer attachment lifecycle

    pub fn attach(&mut self, path: &Path) -> Result<()> {
        let image = ImageData::from_path(path)?;
        self.remove_attachment();
        let preview_url = self.conversation.blobs_mut().create(image.clone());
        self.attachment = Some(Attachment {
            path: path.to_path_buf(),
            image,
            preview_url,
        });
        Ok(())
    }

    pub fn remove_attachment(&mut self) {
        if let Some(attachment) = self.attachment.take() {
            self.conversation.blobs_mut().revoke(&attachment.preview_url);
        }
    }

    /// Send the composer contents. Rejected while a request is in flight.
    pub fn submit(&mut self) {
        if self.pending.is_some() {
            return;
        }

        let image = self.attachment.as_ref().map(|a| a.image.clone());
        let request = match self.conversation.begin_submission(&self.input, image) {
            Ok(request) => request,
            Err(err) => {
                tracing::debug!("submission rejected: {}", err);
                return;
            }
        };

        self.input.clear();
        self.cursor = 0;
        self.remove_attachment();
        self.status = None;

        match self.provider.clone() {
            Some(provider) => {
                let task_request = request.clone();
                let task =
                    tokio::spawn(async move { task_request.execute(provider.as_ref()).await });
                self.pending = Some((request, task));
            }
            None => {
                self.conversation
                    .complete(&request, Err(RemoteError::MissingApiKey));
            }
        }

        self.scroll_chat_to_bottom();
    }

    /// Fold a finished request back into the conversation
    pub async fn poll_pending(&mut self) {
        let finished = matches!(&self.pending, Some((_, task)) if task.is_finished());
        if !finished {
            return;
        }
        if let Some((request, task)) = self.pending.take() {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(err) => Err(RemoteError::Other(err.to_string())),
            };
            self.conversation.complete(&request, outcome);
            self.scroll_chat_to_bottom();
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Sessions

    pub fn new_chat(&mut self) {
        self.conversation.new_chat();
        self.sessions_state.select(Some(0));
        self.chat_scroll = 0;
        self.screen = Screen::Chat;
        self.input_mode = InputMode::Editing;
    }

    pub fn open_selected_session(&mut self) {
        let selected = self
            .sessions_state
            .selected()
            .and_then(|i| self.conversation.sessions().get(i))
            .map(|s| s.id.clone());
        if let Some(id) = selected {
            self.conversation.select_chat(&id);
            self.screen = Screen::Chat;
            self.scroll_chat_to_bottom();
        }
    }

    pub fn sessions_nav_down(&mut self) {
        let len = self.conversation.sessions().len();
        if len > 0 {
            let i = self.sessions_state.selected().unwrap_or(0);
            self.sessions_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn sessions_nav_up(&mut self) {
        let i = self.sessions_state.selected().unwrap_or(0);
        self.sessions_state.select(Some(i.saturating_sub(1)));
    }

    // Gallery and image viewer

    pub fn gallery(&self) -> Vec<GalleryItem> {
        self.conversation.gallery()
    }

    pub fn gallery_nav_down(&mut self) {
        let len = self.gallery().len();
        if len > 0 {
            let i = self.gallery_state.selected().unwrap_or(0);
            self.gallery_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn gallery_nav_up(&mut self) {
        let i = self.gallery_state.selected().unwrap_or(0);
        self.gallery_state.select(Some(i.saturating_sub(1)));
    }

    pub fn open_selected_gallery_image(&mut self) {
        let url = self
            .gallery_state
            .selected()
            .and_then(|i| self.gallery().into_iter().nth(i))
            .map(|item| item.image_url);
        if let Some(url) = url {
            self.conversation.open_image(&url);
        }
    }

    /// Open the newest image in the active session
    pub fn open_latest_image(&mut self) {
        let url = self
            .conversation
            .active_session()
            .messages
            .iter()
            .rev()
            .find_map(|m| m.first_image())
            .map(str::to_string);
        match url {
            Some(url) => self.conversation.open_image(&url),
            None => self.status = Some("No images in this chat yet".to_string()),
        }
    }

    pub fn download_selected_image(&mut self) {
        let dir = self.config.download_dir();
        self.status = Some(match self.conversation.download_selected(&dir) {
            Ok(path) => format!("Saved to {}", path.display()),
            Err(err) => format!("Download failed: {}", err),
        });
    }

    // Popups

    pub fn open_popup(&mut self, popup: Popup) {
        self.popup = Some(popup);
        self.popup_input.clear();
    }

    pub fn close_popup(&mut self) {
        self.popup = None;
        self.popup_input.clear();
    }

    pub fn confirm_popup(&mut self) {
        let value = self.popup_input.trim().to_string();
        let popup = self.popup.take();
        self.popup_input.clear();
        if value.is_empty() {
            return;
        }

        match popup {
            Some(Popup::AttachPath) => {
                let path = expand_home(&value);
                if let Err(err) = self.attach(&path) {
                    self.status = Some(format!("Could not attach {}: {}", path.display(), err));
                }
            }
            Some(Popup::ApiKey) => self.set_api_key(&value),
            None => {}
        }
    }

    fn set_api_key(&mut self, key: &str) {
        self.config.api_key = Some(key.to_string());
        if let Err(err) = Config::save_api_key(key) {
            tracing::error!("failed to save API key: {}", err);
        }
        match GeminiClient::from_config(&self.config) {
            Ok(client) => {
                self.provider = Some(Arc::new(client));
                self.status = Some("API key saved".to_string());
            }
            Err(err) => self.status = Some(err.to_string()),
        }
    }

    /// Number of wrapped lines the active thread takes at the current width
    pub fn thread_line_count(&self) -> usize {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines = 0usize;
        for msg in &self.conversation.active_session().messages {
            total_lines += 1; // Role line ("You:" or "AI:")
            for part in &msg.parts {
                if part.image_url.is_some() {
                    total_lines += 1;
                }
                if let Some(text) = &part.text {
                    for line in text.lines() {
                        // Use character count, not byte length, for proper UTF-8 handling
                        let char_count = line.chars().count();
                        total_lines += char_count / wrap_width + 1;
                    }
                }
            }
            total_lines += 1; // Blank line after message
        }

        if self.is_loading() {
            total_lines += 2; // "AI:" + "Thinking..."
        }
        total_lines
    }

    /// Scroll chat to bottom so the newest message (or "Thinking...") is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };
        self.chat_scroll = clamp_scroll(self.thread_line_count(), visible_height);
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Scroll offset that shows the last `visible` of `total` lines.
/// Offsets past `u16::MAX` pin to the largest scroll ratatui can take.
pub fn clamp_scroll(total: usize, visible: u16) -> u16 {
    let offset = total.saturating_sub(visible as usize);
    u16::try_from(offset).unwrap_or(u16::MAX)
}
