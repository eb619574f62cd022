use async_trait::async_trait;

use crate::error::RemoteError;

/// One piece of a generation response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePart {
    Text(String),
    /// Base64 payload with its declared media type (may be empty)
    InlineData { mime_type: String, data: String },
}

/// The remote operation a submission was routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Edit,
    Generate,
    Converse,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Edit => "edit",
            Operation::Generate => "generate",
            Operation::Converse => "converse",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Operation::Edit => "Editing image",
            Operation::Generate => "Generating image",
            Operation::Converse => "Thinking",
        }
    }
}

/// The generation service the router talks to
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Edit `image` according to `prompt`. An empty prompt sends the image alone.
    async fn edit(
        &self,
        prompt: &str,
        image: &[u8],
        media_type: &str,
    ) -> Result<Vec<ResponsePart>, RemoteError>;

    /// Synthesize an image from text alone
    async fn generate(&self, prompt: &str) -> Result<Vec<ResponsePart>, RemoteError>;

    /// Plain text conversation
    async fn converse(&self, prompt: &str) -> Result<Vec<ResponsePart>, RemoteError>;
}
