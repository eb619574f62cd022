use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::RemoteError;
use crate::provider::{GenerationProvider, ResponsePart};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_EDIT_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-4.0-generate-001";

const IMAGEN_OUTPUT_TYPE: &str = "image/png";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
}

#[derive(Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Serialize)]
struct PredictInstance {
    prompt: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u32,
    output_mime_type: &'static str,
}

#[derive(Serialize)]
struct PredictRequest {
    instances: Vec<PredictInstance>,
    parameters: PredictParameters,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

/// Client for the Gemini (chat, image edit) and Imagen (image synthesis) APIs
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    chat_model: String,
    edit_model: String,
    image_model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            edit_model: DEFAULT_EDIT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
        }
    }

    /// Build a client from the resolved API key, endpoint and model names
    pub fn from_config(config: &Config) -> Result<Self, RemoteError> {
        let api_key = config.resolve_api_key().ok_or(RemoteError::MissingApiKey)?;
        Ok(Self::new(&api_key)
            .with_base_url(&config.resolve_base_url())
            .with_models(
                config.chat_model(),
                config.edit_model(),
                config.image_model(),
            ))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_models(mut self, chat: &str, edit: &str, image: &str) -> Self {
        self.chat_model = chat.to_string();
        self.edit_model = edit.to_string();
        self.image_model = image.to_string();
        self
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    async fn post<B, R>(&self, url: &str, body: &B) -> Result<R, RemoteError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), url, "generation API returned an error");
            return Err(RemoteError::Http {
                status: status.as_u16(),
                message: api_error_message(&text, status.canonical_reason()),
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| RemoteError::Malformed(e.to_string()))
    }

    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<Vec<WirePart>, RemoteError> {
        let url = self.model_url(model, "generateContent");
        tracing::debug!(model, "sending generateContent request");
        let response: GenerateContentResponse = self.post(&url, request).await?;
        Ok(response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .unwrap_or_default())
    }
}

#[async_trait]
impl GenerationProvider for GeminiClient {
    async fn edit(
        &self,
        prompt: &str,
        image: &[u8],
        media_type: &str,
    ) -> Result<Vec<ResponsePart>, RemoteError> {
        let mut parts = vec![RequestPart::Inline {
            inline_data: InlineData {
                mime_type: media_type.to_string(),
                data: STANDARD.encode(image),
            },
        }];
        if !prompt.is_empty() {
            parts.push(RequestPart::Text {
                text: prompt.to_string(),
            });
        }

        let request = GenerateContentRequest {
            contents: vec![RequestContent { role: "user", parts }],
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["IMAGE", "TEXT"],
            }),
        };

        let parts = self.generate_content(&self.edit_model, &request).await?;
        Ok(parts
            .into_iter()
            .filter(|p| !p.thought)
            .filter_map(|p| match (p.text, p.inline_data) {
                (Some(text), _) => Some(ResponsePart::Text(text)),
                (None, Some(inline)) => Some(ResponsePart::InlineData {
                    mime_type: inline.mime_type,
                    data: inline.data,
                }),
                (None, None) => None,
            })
            .collect())
    }

    async fn generate(&self, prompt: &str) -> Result<Vec<ResponsePart>, RemoteError> {
        let request = PredictRequest {
            instances: vec![PredictInstance {
                prompt: prompt.to_string(),
            }],
            parameters: PredictParameters {
                sample_count: 1,
                output_mime_type: IMAGEN_OUTPUT_TYPE,
            },
        };

        let url = self.model_url(&self.image_model, "predict");
        tracing::debug!(model = %self.image_model, "sending predict request");
        let response: PredictResponse = self.post(&url, &request).await?;

        Ok(response
            .predictions
            .into_iter()
            .next()
            .and_then(|p| {
                let data = p.bytes_base64_encoded?;
                Some(ResponsePart::InlineData {
                    mime_type: p
                        .mime_type
                        .unwrap_or_else(|| IMAGEN_OUTPUT_TYPE.to_string()),
                    data,
                })
            })
            .into_iter()
            .collect())
    }

    async fn converse(&self, prompt: &str) -> Result<Vec<ResponsePart>, RemoteError> {
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart::Text {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: None,
        };

        let parts = self.generate_content(&self.chat_model, &request).await?;
        let text: String = parts
            .into_iter()
            .filter(|p| !p.thought)
            .filter_map(|p| p.text)
            .collect();

        if text.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(vec![ResponsePart::Text(text)])
        }
    }
}

/// Pull `error.message` out of an API error body, falling back to the raw text
fn api_error_message(body: &str, reason: Option<&str>) -> String {
    if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(body) {
        return envelope.error.message;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        reason.unwrap_or("request failed").to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_request_puts_image_before_prompt() {
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![
                    RequestPart::Inline {
                        inline_data: InlineData {
                            mime_type: "image/png".to_string(),
                            data: "AQID".to_string(),
                        },
                    },
                    RequestPart::Text {
                        text: "make it blue".to_string(),
                    },
                ],
            }],
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["IMAGE", "TEXT"],
            }),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json["contents"][0]["parts"][0]["inlineData"]["mimeType"],
            "image/png"
        );
        assert_eq!(json["contents"][0]["parts"][1]["text"], "make it blue");
        assert_eq!(
            json["generationConfig"]["responseModalities"],
            serde_json::json!(["IMAGE", "TEXT"])
        );
    }

    #[test]
    fn api_error_message_prefers_structured_body() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(api_error_message(body, Some("Too Many Requests")), "Quota exceeded");
        assert_eq!(api_error_message("  ", Some("Bad Gateway")), "Bad Gateway");
        assert_eq!(api_error_message("upstream down", None), "upstream down");
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let client = GeminiClient::new("k").with_base_url("http://localhost:9000/");
        assert_eq!(
            client.model_url("m", "predict"),
            "http://localhost:9000/models/m:predict"
        );
    }
}
