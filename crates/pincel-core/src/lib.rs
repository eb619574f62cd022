pub mod ai;
pub mod config;
pub mod conversation;
pub mod error;
pub mod intent;
pub mod media;
pub mod provider;
pub mod router;
pub mod state;
pub mod store;

// Re-export main types for convenience
pub use ai::GeminiClient;
pub use config::Config;
pub use conversation::{Conversation, GalleryItem, PendingRequest};
pub use error::{ChatError, RemoteError, StorageError, ValidationError};
pub use intent::{Intent, IntentClassifier, KeywordClassifier};
pub use media::{BlobRegistry, ImageData};
pub use provider::{GenerationProvider, Operation, ResponsePart};
pub use router::{MessageRouter, Route};
pub use state::{ChatMessage, ChatRole, ChatSession, MessagePart};
pub use store::SessionStore;
