//! Routes a submission to exactly one remote operation and turns the
//! response into message parts.

use crate::error::{ChatError, RemoteError, ValidationError};
use crate::intent::{Intent, IntentClassifier, KeywordClassifier};
use crate::media::{build_data_uri, decode_data_uri, ImageData};
use crate::provider::{GenerationProvider, Operation, ResponsePart};
use crate::state::{ChatMessage, MessagePart};

/// Appended when an implicit edit of the previous image produced no image
pub const NO_NEW_IMAGE_NOTICE: &str = "\n\n(No new image was generated. To create an image from scratch, start a new chat to avoid using the previous image as a reference.)";

/// Used when a response normalizes to nothing
pub const FALLBACK_REPLY: &str = "I couldn't process that request. Could you try again in a different way?";

/// Shown when a failure carries no message of its own
pub const GENERIC_ERROR: &str = "An error occurred. Please try again.";

/// Which remote call a submission resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Edit the image the user attached
    Edit { image: ImageData },
    /// Edit the last image the model produced, using the prompt as the instruction
    ConversationalEdit { reference: ImageData },
    /// Synthesize a new image from the prompt
    Generate,
    /// Plain text reply
    Converse,
}

impl Route {
    pub fn operation(&self) -> Operation {
        match self {
            Route::Edit { .. } | Route::ConversationalEdit { .. } => Operation::Edit,
            Route::Generate => Operation::Generate,
            Route::Converse => Operation::Converse,
        }
    }

    pub fn is_conversational_edit(&self) -> bool {
        matches!(self, Route::ConversationalEdit { .. })
    }
}

pub struct MessageRouter {
    classifier: Box<dyn IntentClassifier>,
    conversational_edit: bool,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self {
            classifier: Box::new(KeywordClassifier::default()),
            conversational_edit: true,
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Toggle reuse of the last model image for text-only follow-ups
    pub fn with_conversational_edit(mut self, enabled: bool) -> Self {
        self.conversational_edit = enabled;
        self
    }

    pub fn classifier_name(&self) -> &'static str {
        self.classifier.name()
    }

    /// Decide the route for a submission.
    ///
    /// Validation failures mean nothing should be sent or recorded. A
    /// `RemoteError` here means the previous image could not be reused; the
    /// exchange still counts as attempted.
    pub fn plan(
        &self,
        prompt: &str,
        image: Option<&ImageData>,
        last_model_message: Option<&ChatMessage>,
    ) -> Result<Route, ChatError> {
        let has_text = !prompt.trim().is_empty();

        if !has_text && image.is_none() {
            return Err(ValidationError::EmptySubmission.into());
        }

        if let Some(image) = image {
            return Ok(Route::Edit {
                image: image.clone(),
            });
        }

        if self.conversational_edit && has_text {
            if let Some(url) = last_model_message.and_then(ChatMessage::first_image) {
                let reference = decode_data_uri(url)?;
                return Ok(Route::ConversationalEdit { reference });
            }
        }

        if !has_text {
            return Err(ValidationError::NothingToDescribe.into());
        }

        Ok(match self.classifier.classify(prompt) {
            Intent::GenerateImage => Route::Generate,
            Intent::Converse => Route::Converse,
        })
    }

    /// Plan, call the provider, and normalize, in one step
    pub async fn run(
        &self,
        provider: &dyn GenerationProvider,
        prompt: &str,
        image: Option<&ImageData>,
        last_model_message: Option<&ChatMessage>,
    ) -> Result<Vec<MessagePart>, ChatError> {
        let route = self.plan(prompt, image, last_model_message)?;
        Ok(execute(provider, prompt, &route).await?)
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Invoke the remote operation for `route`
pub async fn dispatch(
    provider: &dyn GenerationProvider,
    prompt: &str,
    route: &Route,
) -> Result<Vec<ResponsePart>, RemoteError> {
    tracing::info!(operation = route.operation().as_str(), "dispatching request");
    match route {
        Route::Edit { image } => provider.edit(prompt, &image.bytes, &image.media_type).await,
        Route::ConversationalEdit { reference } => {
            provider
                .edit(prompt, &reference.bytes, &reference.media_type)
                .await
        }
        Route::Generate => provider.generate(prompt).await,
        Route::Converse => provider.converse(prompt).await,
    }
}

/// Dispatch and normalize
pub async fn execute(
    provider: &dyn GenerationProvider,
    prompt: &str,
    route: &Route,
) -> Result<Vec<MessagePart>, RemoteError> {
    let parts = dispatch(provider, prompt, route).await?;
    Ok(normalize(parts, route.is_conversational_edit()))
}

/// Turn provider output into display parts. Never returns an empty list.
pub fn normalize(response: Vec<ResponsePart>, conversational_edit: bool) -> Vec<MessagePart> {
    let mut parts = Vec::with_capacity(response.len());
    let mut image_returned = false;

    for part in response {
        match part {
            ResponsePart::Text(text) if !text.is_empty() => parts.push(MessagePart::text(text)),
            ResponsePart::Text(_) => {}
            ResponsePart::InlineData { mime_type, data } => {
                parts.push(MessagePart::image(build_data_uri(&mime_type, &data)));
                image_returned = true;
            }
        }
    }

    if conversational_edit && !image_returned {
        match parts.iter_mut().find_map(|p| p.text.as_mut()) {
            Some(text) => text.push_str(NO_NEW_IMAGE_NOTICE),
            None => parts.push(MessagePart::text(NO_NEW_IMAGE_NOTICE.trim())),
        }
    }

    if parts.is_empty() {
        parts.push(MessagePart::text(FALLBACK_REPLY));
    }
    parts
}

/// User-facing text for a failed exchange
pub fn error_text(err: &RemoteError) -> String {
    let message = err.to_string();
    if message.trim().is_empty() {
        GENERIC_ERROR.to_string()
    } else {
        message
    }
}
