//! In-memory conversation state: every session, the active one, and the
//! per-request flags the UI reads.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{ChatError, RemoteError, ValidationError};
use crate::media::{load_image, BlobRegistry, ImageData};
use crate::provider::GenerationProvider;
use crate::router::{self, MessageRouter, Route};
use crate::state::{ChatMessage, ChatRole, ChatSession, MessagePart};
use crate::store::SessionStore;

/// A submission that passed validation and is waiting on the remote call.
///
/// Owns everything the call needs so it can run on a spawned task.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub session_id: String,
    pub prompt: String,
    /// Planning outcome; an error here skips the remote call
    pub route: Result<Route, String>,
}

impl PendingRequest {
    /// Perform the remote call and normalize its response
    pub async fn execute(
        &self,
        provider: &dyn GenerationProvider,
    ) -> Result<Vec<MessagePart>, RemoteError> {
        match &self.route {
            Ok(route) => router::execute(provider, &self.prompt, route).await,
            Err(message) => Err(RemoteError::Other(message.clone())),
        }
    }
}

/// An image somewhere in the history, for the gallery view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryItem {
    pub session_id: String,
    pub session_title: String,
    pub image_url: String,
}

pub struct Conversation {
    sessions: Vec<ChatSession>,
    active_id: String,
    loading: bool,
    error: Option<String>,
    selected_image: Option<String>,
    blobs: BlobRegistry,
    router: MessageRouter,
    store: Option<SessionStore>,
}

impl Conversation {
    /// Load saved history and keep persisting to `store` after each change
    pub fn open(store: SessionStore, router: MessageRouter) -> Self {
        let sessions = store.load();
        let mut conversation = Self::from_sessions(sessions, router);
        conversation.store = Some(store);
        conversation
    }

    /// Conversation that never touches disk
    pub fn in_memory(router: MessageRouter) -> Self {
        Self::from_sessions(vec![ChatSession::new()], router)
    }

    fn from_sessions(mut sessions: Vec<ChatSession>, router: MessageRouter) -> Self {
        if sessions.is_empty() {
            sessions.push(ChatSession::new());
        }
        let active_id = sessions[0].id.clone();
        Self {
            sessions,
            active_id,
            loading: false,
            error: None,
            selected_image: None,
            blobs: BlobRegistry::new(),
            router,
            store: None,
        }
    }

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn active_id(&self) -> &str {
        &self.active_id
    }

    pub fn active_session(&self) -> &ChatSession {
        self.sessions
            .iter()
            .find(|s| s.id == self.active_id)
            .unwrap_or(&self.sessions[0])
    }

    pub fn active_index(&self) -> usize {
        self.sessions
            .iter()
            .position(|s| s.id == self.active_id)
            .unwrap_or(0)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn blobs(&self) -> &BlobRegistry {
        &self.blobs
    }

    pub fn blobs_mut(&mut self) -> &mut BlobRegistry {
        &mut self.blobs
    }

    /// Start a new session at the top of the list and switch to it
    pub fn new_chat(&mut self) -> &str {
        let mut session = ChatSession::new();
        // Ids are creation timestamps; two chats in the same millisecond need distinct ids
        while self.sessions.iter().any(|s| s.id == session.id) {
            let bumped = session
                .id
                .parse::<i64>()
                .unwrap_or_else(|_| Utc::now().timestamp_millis())
                + 1;
            session.id = bumped.to_string();
        }
        self.active_id = session.id.clone();
        self.sessions.insert(0, session);
        self.persist();
        &self.active_id
    }

    /// Switch the active session. Unknown ids are ignored.
    pub fn select_chat(&mut self, id: &str) -> bool {
        if self.sessions.iter().any(|s| s.id == id) {
            self.active_id = id.to_string();
            true
        } else {
            false
        }
    }

    /// Validate a submission and record the user's message.
    ///
    /// On success the conversation is busy until `complete` is called with
    /// the outcome of `PendingRequest::execute`.
    pub fn begin_submission(
        &mut self,
        prompt: &str,
        image: Option<ImageData>,
    ) -> Result<PendingRequest, ValidationError> {
        if self.loading {
            return Err(ValidationError::Busy);
        }

        let last_model = self.active_session().last_model_message().cloned();
        let route = match self.router.plan(prompt, image.as_ref(), last_model.as_ref()) {
            Ok(route) => Ok(route),
            Err(ChatError::Validation(err)) => {
                self.error = Some(err.to_string());
                return Err(err);
            }
            Err(err) => Err(err.to_string()),
        };

        let mut user_parts = Vec::new();
        if let Some(image) = image {
            user_parts.push(MessagePart::image(self.blobs.create(image)));
        }
        if !prompt.is_empty() {
            user_parts.push(MessagePart::text(prompt));
        }

        let session_id = self.active_id.clone();
        self.push_message(&session_id, ChatMessage::new(ChatRole::User, user_parts));
        self.loading = true;
        self.error = None;

        if let Ok(route) = &route {
            tracing::debug!(
                operation = route.operation().as_str(),
                session = %session_id,
                "submission accepted"
            );
        }

        Ok(PendingRequest {
            session_id,
            prompt: prompt.to_string(),
            route,
        })
    }

    /// Record the model's reply, or an `Error:` message, and go idle
    pub fn complete(
        &mut self,
        request: &PendingRequest,
        outcome: Result<Vec<MessagePart>, RemoteError>,
    ) {
        let parts = match outcome {
            Ok(parts) => parts,
            Err(err) => {
                let message = router::error_text(&err);
                tracing::error!(session = %request.session_id, "request failed: {}", message);
                self.error = Some(message.clone());
                vec![MessagePart::text(format!("Error: {}", message))]
            }
        };

        self.push_message(&request.session_id, ChatMessage::new(ChatRole::Model, parts));
        self.loading = false;
    }

    /// Submit and wait for the reply in one call
    pub async fn send(
        &mut self,
        provider: &dyn GenerationProvider,
        prompt: &str,
        image: Option<ImageData>,
    ) -> Result<(), ValidationError> {
        let request = self.begin_submission(prompt, image)?;
        let outcome = request.execute(provider).await;
        self.complete(&request, outcome);
        Ok(())
    }

    fn push_message(&mut self, session_id: &str, message: ChatMessage) {
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == session_id) {
            session.messages.push(message);
            self.persist();
        }
    }

    fn persist(&self) {
        if let Some(store) = &self.store {
            store.persist(&self.sessions);
        }
    }

    pub fn selected_image(&self) -> Option<&str> {
        self.selected_image.as_deref()
    }

    pub fn open_image(&mut self, url: &str) {
        self.selected_image = Some(url.to_string());
    }

    pub fn close_image(&mut self) {
        self.selected_image = None;
    }

    /// Bytes behind any image reference still resolvable in this process
    pub fn resolve_image(&self, url: &str) -> Option<ImageData> {
        load_image(url, &self.blobs)
    }

    /// Write the selected image to `dir` and return the new file's path
    pub fn download_selected(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        let url = self
            .selected_image
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No image selected"))?;
        let image = self
            .resolve_image(url)
            .ok_or_else(|| anyhow::anyhow!("Image is no longer available"))?;
        save_image(&image, dir)
    }

    /// Every image in the history, newest session first
    pub fn gallery(&self) -> Vec<GalleryItem> {
        self.sessions
            .iter()
            .flat_map(|session| {
                let title = session.title();
                session
                    .messages
                    .iter()
                    .flat_map(|m| m.parts.iter())
                    .filter_map(|p| p.image_url.clone())
                    .map(move |image_url| GalleryItem {
                        session_id: session.id.clone(),
                        session_title: title.clone(),
                        image_url,
                    })
            })
            .collect()
    }
}

/// Save under `imagen-generada-<millis>.<ext>` inside `dir`
pub fn save_image(image: &ImageData, dir: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!(
        "imagen-generada-{}.{}",
        Utc::now().timestamp_millis(),
        image.extension()
    ));
    std::fs::write(&path, &image.bytes)?;
    tracing::info!(path = %path.display(), "image saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ResponsePart;
    use crate::router::NO_NEW_IMAGE_NOTICE;
    use crate::state::GREETING;
    use async_trait::async_trait;

    struct ScriptedProvider {
        reply: Result<Vec<ResponsePart>, String>,
    }

    impl ScriptedProvider {
        fn ok(reply: Vec<ResponsePart>) -> Self {
            Self { reply: Ok(reply) }
        }

        fn err(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
            }
        }

        fn answer(&self) -> Result<Vec<ResponsePart>, RemoteError> {
            self.reply.clone().map_err(RemoteError::Other)
        }
    }

    #[async_trait]
    impl GenerationProvider for ScriptedProvider {
        async fn edit(&self, _: &str, _: &[u8], _: &str) -> Result<Vec<ResponsePart>, RemoteError> {
            self.answer()
        }

        async fn generate(&self, _: &str) -> Result<Vec<ResponsePart>, RemoteError> {
            self.answer()
        }

        async fn converse(&self, _: &str) -> Result<Vec<ResponsePart>, RemoteError> {
            self.answer()
        }
    }

    fn png() -> ResponsePart {
        ResponsePart::InlineData {
            mime_type: "image/png".to_string(),
            data: "AQID".to_string(),
        }
    }

    #[test]
    fn starts_with_one_greeting_session() {
        let conversation = Conversation::in_memory(MessageRouter::new());
        assert_eq!(conversation.sessions().len(), 1);
        let session = conversation.active_session();
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].first_text(), Some(GREETING));
    }

    #[test]
    fn new_chat_goes_first_and_becomes_active() {
        let mut conversation = Conversation::in_memory(MessageRouter::new());
        let first = conversation.active_id().to_string();
        let second = conversation.new_chat().to_string();

        assert_ne!(first, second);
        assert_eq!(conversation.sessions()[0].id, second);
        assert_eq!(conversation.active_index(), 0);

        assert!(conversation.select_chat(&first));
        assert_eq!(conversation.active_id(), first);
        assert!(!conversation.select_chat("missing"));
    }

    #[test]
    fn validation_failure_leaves_session_untouched() {
        let mut conversation = Conversation::in_memory(MessageRouter::new());
        let err = conversation.begin_submission("  ", None).unwrap_err();

        assert_eq!(err, ValidationError::EmptySubmission);
        assert_eq!(conversation.active_session().messages.len(), 1);
        assert!(!conversation.is_loading());
        assert_eq!(conversation.error(), Some(err.to_string().as_str()));
    }

    #[test]
    fn busy_flag_rejects_second_submission() {
        let mut conversation = Conversation::in_memory(MessageRouter::new());
        conversation.begin_submission("hello", None).unwrap();
        assert!(conversation.is_loading());

        let err = conversation.begin_submission("again", None).unwrap_err();
        assert_eq!(err, ValidationError::Busy);
        assert_eq!(conversation.active_session().messages.len(), 2);
    }

    #[tokio::test]
    async fn attached_image_is_recorded_before_prompt_text() {
        let mut conversation = Conversation::in_memory(MessageRouter::new());
        let provider = ScriptedProvider::ok(vec![png()]);
        let image = ImageData::new(vec![1, 2], "image/png");

        conversation
            .send(&provider, "make it red", Some(image.clone()))
            .await
            .unwrap();

        let user = &conversation.active_session().messages[1];
        assert_eq!(user.role, ChatRole::User);
        let blob = user.parts[0].image_url.as_deref().unwrap();
        assert_eq!(conversation.resolve_image(blob), Some(image));
        assert_eq!(user.parts[1].text.as_deref(), Some("make it red"));
    }

    #[tokio::test]
    async fn remote_failure_becomes_error_message() {
        let mut conversation = Conversation::in_memory(MessageRouter::new());
        let provider = ScriptedProvider::err("quota exceeded");

        conversation.send(&provider, "hello", None).await.unwrap();

        let reply = conversation.active_session().messages.last().unwrap();
        assert_eq!(reply.role, ChatRole::Model);
        assert_eq!(reply.parts, vec![MessagePart::text("Error: quota exceeded")]);
        assert_eq!(conversation.error(), Some("quota exceeded"));
        assert!(!conversation.is_loading());
    }

    #[tokio::test]
    async fn broken_history_image_reports_error_in_thread() {
        let mut conversation = Conversation::in_memory(MessageRouter::new());
        let provider = ScriptedProvider::ok(vec![ResponsePart::InlineData {
            mime_type: "image/png".to_string(),
            data: String::new(),
        }]);
        // An image part with no payload
        conversation.send(&provider, "draw a fox", None).await.unwrap();

        conversation.send(&provider, "make it blue", None).await.unwrap();
        let reply = conversation.active_session().messages.last().unwrap();
        assert_eq!(
            reply.parts,
            vec![MessagePart::text("Error: The image URL in history is invalid.")]
        );
    }

    #[tokio::test]
    async fn follow_up_without_image_reply_gets_notice() {
        let mut conversation = Conversation::in_memory(MessageRouter::new());
        conversation
            .send(&ScriptedProvider::ok(vec![png()]), "draw a fox", None)
            .await
            .unwrap();

        conversation
            .send(
                &ScriptedProvider::ok(vec![ResponsePart::Text("Sure".to_string())]),
                "what is it doing?",
                None,
            )
            .await
            .unwrap();

        let reply = conversation.active_session().messages.last().unwrap();
        let text = reply.parts[0].text.as_deref().unwrap();
        assert!(text.ends_with(NO_NEW_IMAGE_NOTICE));
    }

    #[tokio::test]
    async fn replies_land_in_the_session_that_asked() {
        let mut conversation = Conversation::in_memory(MessageRouter::new());
        let asking = conversation.active_id().to_string();
        let request = conversation.begin_submission("hello", None).unwrap();

        conversation.new_chat();
        conversation.complete(&request, Ok(vec![MessagePart::text("hi")]));

        let asked = conversation
            .sessions()
            .iter()
            .find(|s| s.id == asking)
            .unwrap();
        assert_eq!(asked.messages.len(), 3);
        assert_eq!(conversation.active_session().messages.len(), 1);
    }

    #[tokio::test]
    async fn mutations_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::ok(vec![ResponsePart::Text("hi there".to_string())]);

        {
            let mut conversation =
                Conversation::open(SessionStore::new(dir.path()), MessageRouter::new());
            conversation.send(&provider, "hello", None).await.unwrap();
        }

        let reopened = Conversation::open(SessionStore::new(dir.path()), MessageRouter::new());
        let messages = &reopened.active_session().messages;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].first_text(), Some("hi there"));
    }

    #[tokio::test]
    async fn gallery_and_download() {
        let dir = tempfile::tempdir().unwrap();
        let mut conversation = Conversation::in_memory(MessageRouter::new());
        conversation
            .send(&ScriptedProvider::ok(vec![png()]), "paint a boat", None)
            .await
            .unwrap();

        let gallery = conversation.gallery();
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery[0].session_title, "paint a boat");

        conversation.open_image(&gallery[0].image_url);
        let path = conversation.download_selected(dir.path()).unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("png"));
        assert_eq!(std::fs::read(path).unwrap(), vec![1, 2, 3]);

        conversation.close_image();
        assert!(conversation.download_selected(dir.path()).is_err());
    }
}
