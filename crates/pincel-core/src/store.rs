//! Best-effort persistence of the chat history.
//!
//! The whole session list lives under one storage key as a JSON array.
//! Only a sanitized projection is written: transient `blob:` references are
//! stripped and parts left with nothing to show are dropped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::StorageError;
use crate::media::is_data_uri;
use crate::state::{ChatMessage, ChatSession, MessagePart};

/// Fixed key the history is stored under
pub const STORAGE_KEY: &str = "chatHistoryStorage";

pub struct SessionStore {
    path: PathBuf,
    persist_images: bool,
}

impl SessionStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(format!("{}.json", STORAGE_KEY)),
            persist_images: true,
        }
    }

    pub fn open(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(&config.data_dir()?).with_persist_images(config.persist_images()))
    }

    /// When false, image parts are dropped entirely on persist
    pub fn with_persist_images(mut self, keep: bool) -> Self {
        self.persist_images = keep;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the saved sessions. Never fails: missing, corrupt or empty
    /// history yields a single fresh session.
    pub fn load(&self) -> Vec<ChatSession> {
        match self.try_load() {
            Ok(sessions) if !sessions.is_empty() => sessions,
            Ok(_) => vec![ChatSession::new()],
            Err(err) => {
                tracing::warn!(path = %self.path.display(), "error loading history: {}", err);
                vec![ChatSession::new()]
            }
        }
    }

    fn try_load(&self) -> Result<Vec<ChatSession>, StorageError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut sessions: Vec<ChatSession> = serde_json::from_slice(&data)?;
        for session in &mut sessions {
            if session.messages.is_empty() {
                session.messages.push(ChatMessage::greeting());
            }
        }
        Ok(sessions)
    }

    /// Write the sanitized history. Failures are logged and swallowed.
    pub fn persist(&self, sessions: &[ChatSession]) {
        if let Err(err) = self.try_persist(sessions) {
            tracing::error!(path = %self.path.display(), "error saving history: {}", err);
        }
    }

    pub fn try_persist(&self, sessions: &[ChatSession]) -> Result<(), StorageError> {
        let projection = sanitize(sessions, self.persist_images);
        let bytes = serde_json::to_vec(&projection)?;

        let dir = self.path.parent().ok_or(StorageError::NoDataDir)?;
        fs::create_dir_all(dir)?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, bytes)?;
        fs::rename(&tmp_path, &self.path)?;
        tracing::trace!(sessions = projection.len(), "history saved");
        Ok(())
    }
}

/// Project sessions into their storable form
pub fn sanitize(sessions: &[ChatSession], keep_images: bool) -> Vec<ChatSession> {
    sessions
        .iter()
        .map(|session| ChatSession {
            id: session.id.clone(),
            messages: session
                .messages
                .iter()
                .map(|message| ChatMessage {
                    id: message.id.clone(),
                    role: message.role,
                    parts: message
                        .parts
                        .iter()
                        .filter_map(|part| sanitize_part(part, keep_images))
                        .collect(),
                })
                .collect(),
        })
        .collect()
}

fn sanitize_part(part: &MessagePart, keep_images: bool) -> Option<MessagePart> {
    let image_url = part
        .image_url
        .as_ref()
        .filter(|url| keep_images && is_data_uri(url))
        .cloned();
    let text = part.non_blank_text().map(str::to_string);

    if text.is_none() && image_url.is_none() {
        return None;
    }
    Some(MessagePart { text, image_url })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ChatRole, GREETING};

    fn session_with(parts: Vec<MessagePart>) -> ChatSession {
        let mut session = ChatSession::new();
        session.messages.push(ChatMessage::new(ChatRole::User, parts));
        session
    }

    #[test]
    fn missing_history_starts_one_fresh_session() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = SessionStore::new(dir.path()).load();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].messages.len(), 1);
        assert_eq!(sessions[0].messages[0].first_text(), Some(GREETING));
    }

    #[test]
    fn corrupt_or_empty_history_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        fs::write(store.path(), "{not json").unwrap();
        assert_eq!(store.load().len(), 1);

        fs::write(store.path(), "[]").unwrap();
        let sessions = store.load();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].messages[0].first_text(), Some(GREETING));
    }

    #[test]
    fn reload_drops_transient_parts_and_keeps_text_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        let session = session_with(vec![
            MessagePart::image("blob:pincel/1234"),
            MessagePart::text("first"),
            MessagePart::text("   "),
            MessagePart::text("second"),
        ]);
        store.persist(std::slice::from_ref(&session));

        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, session.id);
        let user = &loaded[0].messages[1];
        assert_eq!(
            user.parts,
            vec![MessagePart::text("first"), MessagePart::text("second")]
        );
    }

    #[test]
    fn part_with_text_and_blob_keeps_only_text() {
        let part = MessagePart {
            text: Some("caption".to_string()),
            image_url: Some("blob:pincel/abcd".to_string()),
        };
        assert_eq!(sanitize_part(&part, true), Some(MessagePart::text("caption")));
    }

    #[test]
    fn data_uri_images_survive_unless_disabled() {
        let session = session_with(vec![MessagePart::image("data:image/png;base64,AQID")]);

        let kept = sanitize(std::slice::from_ref(&session), true);
        assert_eq!(kept[0].messages[1].parts.len(), 1);

        let dropped = sanitize(std::slice::from_ref(&session), false);
        assert!(dropped[0].messages[1].parts.is_empty());
    }

    #[test]
    fn persist_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the directory should be makes the write fail
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, "x").unwrap();
        let store = SessionStore::new(&blocker);

        store.persist(&[ChatSession::new()]);
        let err = store.try_persist(&[ChatSession::new()]).unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
    }

    #[test]
    fn stored_json_uses_history_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.persist(&[ChatSession::new()]);

        let raw = fs::read_to_string(dir.path().join("chatHistoryStorage.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0]["messages"][0]["id"], "init");
        assert_eq!(value[0]["messages"][0]["role"], "model");
        assert!(value[0]["messages"][0]["parts"][0]["text"].is_string());
    }
}
